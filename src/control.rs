//! Shared job table and the masking discipline around it.
//!
//! The table is written from two contexts: the read-eval loop and the
//! signal handlers in [`crate::signals`]. No lock can be used, since a
//! handler interrupting a lock holder would deadlock. Instead every access
//! goes through [`JobControl::enter`], which blocks the job-control signals
//! for as long as the returned [`CriticalSection`] lives. A handler can
//! therefore never observe the table mid-update, and the loop never sees
//! it change under a live borrow.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

use nix::errno::Errno;
use nix::sys::signal::{SigSet, SigmaskHow, Signal};
use nix::unistd::Pid;

use crate::error::{Result, ShellError};
use crate::job::{JobState, JobTable};

/// Signals whose handlers touch the job table.
pub fn job_signals() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGCHLD);
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTSTP);
    set
}

pub struct JobControl {
    table: UnsafeCell<JobTable>,
    held: AtomicBool,
}

// SAFETY: the table is only reached through `enter`, which masks every
// handler that could touch it and refuses a second concurrent holder.
unsafe impl Sync for JobControl {}

static JOBS: JobControl = JobControl::new();

/// The process-wide job table, shared with the signal handlers.
pub fn jobs() -> &'static JobControl {
    &JOBS
}

impl JobControl {
    pub const fn new() -> Self {
        Self {
            table: UnsafeCell::new(JobTable::new()),
            held: AtomicBool::new(false),
        }
    }

    /// Block the job-control signals and take the table.
    ///
    /// The previous mask is restored when the guard drops.
    pub fn enter(&self) -> Result<CriticalSection<'_>> {
        let previous = job_signals()
            .thread_swap_mask(SigmaskHow::SIG_BLOCK)
            .map_err(ShellError::os("sigprocmask"))?;
        if self.held.swap(true, Ordering::Acquire) {
            let _ = previous.thread_set_mask();
            return Err(ShellError::NestedCriticalSection);
        }
        Ok(CriticalSection {
            control: self,
            previous,
        })
    }
}

/// Exclusive access to the job table with the job-control signals blocked.
pub struct CriticalSection<'a> {
    control: &'a JobControl,
    previous: SigSet,
}

impl CriticalSection<'_> {
    /// Release the table and wait for one handled signal, then take it back.
    ///
    /// The unmask and the wait happen atomically (`sigsuspend`), so a
    /// notification that is already pending cannot be missed.
    pub fn suspend(&mut self) -> Result<()> {
        let mut waiting = self.previous;
        for signal in job_signals().iter() {
            waiting.remove(signal);
        }
        self.control.held.store(false, Ordering::Release);
        // SAFETY: `waiting` is a valid, initialized signal set.
        let res = Errno::result(unsafe { libc::sigsuspend(waiting.as_ref()) });
        self.control.held.store(true, Ordering::Relaxed);
        match res {
            Ok(_) | Err(Errno::EINTR) => Ok(()),
            Err(e) => Err(ShellError::os("sigsuspend")(e)),
        }
    }

    /// Foreground Waiter: block until `pid` is no longer the foreground job.
    ///
    /// Returns once the job has exited, been killed or been stopped, as
    /// observed by the reaper. Notifications about other children only
    /// cause a re-check.
    pub fn wait_foreground(&mut self, pid: Pid) -> Result<()> {
        self.wait_while(|table| {
            table.find_by_pid(pid).map(|j| j.state()) == Some(JobState::Foreground)
        })
    }

    /// Suspend until `cond` no longer holds for the table.
    pub fn wait_while(&mut self, mut cond: impl FnMut(&JobTable) -> bool) -> Result<()> {
        while cond(&**self) {
            self.suspend()?;
        }
        Ok(())
    }
}

impl Deref for CriticalSection<'_> {
    type Target = JobTable;

    fn deref(&self) -> &JobTable {
        // SAFETY: `held` guarantees this guard is the only live accessor.
        unsafe { &*self.control.table.get() }
    }
}

impl DerefMut for CriticalSection<'_> {
    fn deref_mut(&mut self) -> &mut JobTable {
        // SAFETY: as above, and `&mut self` rules out a second borrow.
        unsafe { &mut *self.control.table.get() }
    }
}

impl Drop for CriticalSection<'_> {
    fn drop(&mut self) {
        self.control.held.store(false, Ordering::Release);
        let _ = self.previous.thread_set_mask();
    }
}
