//! Output that is safe to produce from inside a signal handler.
//!
//! `println!` takes the stdout lock and may allocate, so handlers format
//! into a stack buffer and hand it to `write(2)` directly.

use std::fmt::{self, Write};
use std::os::fd::BorrowedFd;

const SIO_CAPACITY: usize = 256;

/// Stack buffer for one message. Anything past the capacity is dropped.
pub struct SioBuf {
    buf: [u8; SIO_CAPACITY],
    len: usize,
}

impl SioBuf {
    pub const fn new() -> Self {
        Self {
            buf: [0; SIO_CAPACITY],
            len: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Write for SioBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = SIO_CAPACITY - self.len;
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        if n < s.len() {
            return Err(fmt::Error);
        }
        Ok(())
    }
}

/// Format `args` and write them to stdout with a single `write(2)`.
pub fn sio_print(args: fmt::Arguments<'_>) {
    let mut out = SioBuf::new();
    let _ = out.write_fmt(args);
    // SAFETY: stdout stays open for the lifetime of the shell.
    let stdout = unsafe { BorrowedFd::borrow_raw(libc::STDOUT_FILENO) };
    let _ = nix::unistd::write(stdout, out.as_bytes());
}
