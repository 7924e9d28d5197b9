//! Signal handlers: keyboard relay, child reaper and SIGQUIT.
//!
//! Everything reachable from a handler must be async-signal-safe: no
//! allocation, no locks, no `println!`. The job table is reached through
//! [`JobControl::enter`] like everywhere else; the handlers are installed
//! with the job-control signals in their mask, so they never interleave
//! with each other.

use std::fmt;

use nix::errno::Errno;
use nix::sys::signal::{self, killpg, SaFlags, SigAction, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::control::{job_signals, jobs};
use crate::job::{JobState, JobTable};
use crate::sio::sio_print;

/// What the reaper has to tell the user about one child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Terminated { jid: u32, pid: Pid, signal: Signal },
    Stopped { jid: u32, pid: Pid, signal: Signal },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Notice::Terminated { jid, pid, signal } => write!(
                f,
                "job [{}] ({}) terminated by signal {}",
                jid, pid, signal as i32
            ),
            Notice::Stopped { jid, pid, signal } => write!(
                f,
                "job [{}] ({}) stopped by signal {}",
                jid, pid, signal as i32
            ),
        }
    }
}

/// Fold one collected child status into the table.
///
/// This is the only place a job leaves the table because its process
/// ended, and the only place a job becomes `Stopped`. Children that are
/// not tracked (rejected by a full table) are dropped silently.
pub fn apply_status<const N: usize>(table: &mut JobTable<N>, status: WaitStatus) -> Option<Notice> {
    match status {
        WaitStatus::Exited(pid, _) => {
            table.remove(pid);
            None
        }
        WaitStatus::Signaled(pid, signal, _) => {
            let jid = table.pid_to_jid(pid)?;
            table.remove(pid);
            Some(Notice::Terminated { jid, pid, signal })
        }
        WaitStatus::Stopped(pid, signal) => {
            let jid = table.pid_to_jid(pid)?;
            table.set_state(pid, JobState::Stopped).ok()?;
            Some(Notice::Stopped { jid, pid, signal })
        }
        _ => None,
    }
}

/// Collect every child that has exited, been killed or stopped, without
/// waiting for the ones still running.
fn reap_children() {
    let Ok(mut table) = jobs().enter() else {
        return;
    };
    loop {
        match waitpid(
            Pid::from_raw(-1),
            Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED),
        ) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(status) => {
                if let Some(notice) = apply_status(&mut *table, status) {
                    sio_print(format_args!("{}\n", notice));
                }
            }
        }
    }
}

/// Forward `signal` to the whole foreground process group, if there is one.
fn relay_to_foreground(signal: Signal) {
    let Ok(table) = jobs().enter() else {
        return;
    };
    if let Some(pid) = table.foreground_pid() {
        // a group that is already gone is not an error here
        let _ = killpg(pid, signal);
    }
}

// Handlers must leave errno as they found it, the interrupted code may be
// about to read it.
fn preserving_errno(f: impl FnOnce()) {
    let saved = Errno::last_raw();
    f();
    Errno::set_raw(saved);
}

extern "C" fn on_sigchld(_: libc::c_int) {
    preserving_errno(reap_children);
}

extern "C" fn on_sigint(_: libc::c_int) {
    preserving_errno(|| relay_to_foreground(Signal::SIGINT));
}

/// Only forwards: the reaper records the stop when the child reports it.
extern "C" fn on_sigtstp(_: libc::c_int) {
    preserving_errno(|| relay_to_foreground(Signal::SIGTSTP));
}

extern "C" fn on_sigquit(_: libc::c_int) {
    sio_print(format_args!("Terminating after receipt of SIGQUIT signal\n"));
    // SAFETY: _exit is async-signal-safe and skips atexit handlers.
    unsafe { libc::_exit(1) };
}

pub fn install_signal_handlers() -> nix::Result<()> {
    let handlers: [(Signal, extern "C" fn(libc::c_int)); 4] = [
        (Signal::SIGINT, on_sigint),
        (Signal::SIGTSTP, on_sigtstp),
        (Signal::SIGCHLD, on_sigchld),
        (Signal::SIGQUIT, on_sigquit),
    ];
    for (sig, handler) in handlers {
        let action = SigAction::new(SigHandler::Handler(handler), SaFlags::SA_RESTART, job_signals());
        // SAFETY: every handler above sticks to async-signal-safe calls.
        unsafe { signal::sigaction(sig, &action)? };
    }
    Ok(())
}
