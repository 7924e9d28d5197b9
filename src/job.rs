use std::fmt;

use nix::unistd::Pid;
use thiserror::Error;

/// Maximum number of jobs tracked at any point in time.
pub const MAX_JOBS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Free slot, never the state of a live job.
    Undefined,
    Foreground,
    Background,
    Stopped,
}

impl JobState {
    /// Label printed by `jobs`.
    pub fn label(self) -> &'static str {
        match self {
            JobState::Undefined => "Undefined",
            JobState::Foreground => "Foreground",
            JobState::Background => "Running",
            JobState::Stopped => "Stopped",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("invalid process id {0}")]
    InvalidPid(Pid),
    #[error("process {0} is already tracked")]
    DuplicatePid(Pid),
    #[error("Tried to create too many jobs")]
    Full,
    #[error("job [{0}] already owns the foreground")]
    ForegroundBusy(u32),
}

#[derive(Debug, Clone)]
pub struct Job {
    pid: Pid,
    jid: u32,
    state: JobState,
    cmdline: String,
}

const EMPTY_JOB: Job = Job {
    pid: Pid::from_raw(0),
    jid: 0,
    state: JobState::Undefined,
    cmdline: String::new(),
};

impl Job {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn jid(&self) -> u32 {
        self.jid
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn cmdline(&self) -> &str {
        &self.cmdline
    }

    fn is_empty(&self) -> bool {
        self.pid.as_raw() == 0
    }

    // Keeps the command line buffer allocated: the reaper clears slots from
    // inside a signal handler, where freeing memory is not allowed.
    fn clear(&mut self) {
        self.pid = Pid::from_raw(0);
        self.jid = 0;
        self.state = JobState::Undefined;
        self.cmdline.clear();
    }
}

/// `jobs` line: `[jid] (pid) Label cmdline`
impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] ({}) {} {}",
            self.jid,
            self.pid,
            self.state.label(),
            self.cmdline
        )
    }
}

/// Fixed-capacity registry of live jobs.
///
/// Slots are scanned linearly; the capacity is small. Mutation is only
/// ever performed through a [`crate::control::CriticalSection`], so the
/// table itself has no synchronization.
pub struct JobTable<const N: usize = MAX_JOBS> {
    slots: [Job; N],
    next_jid: u32, // always above every live jid
}

impl<const N: usize> JobTable<N> {
    pub const fn new() -> Self {
        Self {
            slots: [EMPTY_JOB; N],
            next_jid: 1,
        }
    }

    /// Register a new job and return its job id.
    ///
    /// Fails without touching the table when the pid is not positive or
    /// already tracked, when every slot is taken, or when a second
    /// foreground job is requested.
    pub fn add(&mut self, pid: Pid, state: JobState, cmdline: &str) -> Result<u32, TableError> {
        if pid.as_raw() < 1 {
            return Err(TableError::InvalidPid(pid));
        }
        if self.find_by_pid(pid).is_some() {
            return Err(TableError::DuplicatePid(pid));
        }
        if state == JobState::Foreground {
            if let Some(job) = self.foreground() {
                return Err(TableError::ForegroundBusy(job.jid));
            }
        }

        let jid = self.next_jid;
        let slot = self
            .slots
            .iter_mut()
            .find(|j| j.is_empty())
            .ok_or(TableError::Full)?;
        slot.pid = pid;
        slot.jid = jid;
        slot.state = state;
        slot.cmdline.clear();
        slot.cmdline.push_str(cmdline);
        self.next_jid += 1;
        Ok(jid)
    }

    /// Drop the job with this pid. Does not allocate or free.
    pub fn remove(&mut self, pid: Pid) -> bool {
        if pid.as_raw() < 1 {
            return false;
        }
        match self.slots.iter_mut().find(|j| j.pid == pid) {
            Some(job) => {
                job.clear();
                self.next_jid = self.max_jid() + 1;
                true
            }
            None => false,
        }
    }

    /// Move a live job to `state`. Refuses a second foreground job.
    pub fn set_state(&mut self, pid: Pid, state: JobState) -> Result<(), TableError> {
        if state == JobState::Foreground {
            if let Some(job) = self.foreground().filter(|j| j.pid != pid) {
                return Err(TableError::ForegroundBusy(job.jid));
            }
        }
        match self.find_mut(pid) {
            Some(job) => {
                job.state = state;
                Ok(())
            }
            None => Err(TableError::InvalidPid(pid)),
        }
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        if pid.as_raw() < 1 {
            return None;
        }
        self.slots.iter().find(|j| j.pid == pid)
    }

    pub fn find_by_jid(&self, jid: u32) -> Option<&Job> {
        if jid < 1 {
            return None;
        }
        self.slots.iter().find(|j| j.jid == jid)
    }

    pub fn foreground_pid(&self) -> Option<Pid> {
        self.foreground().map(|j| j.pid)
    }

    pub fn pid_to_jid(&self, pid: Pid) -> Option<u32> {
        self.find_by_pid(pid).map(|j| j.jid)
    }

    /// Occupied slots, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().filter(|j| !j.is_empty())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    fn foreground(&self) -> Option<&Job> {
        self.slots.iter().find(|j| j.state == JobState::Foreground)
    }

    fn find_mut(&mut self, pid: Pid) -> Option<&mut Job> {
        if pid.as_raw() < 1 {
            return None;
        }
        self.slots.iter_mut().find(|j| j.pid == pid)
    }

    fn max_jid(&self) -> u32 {
        self.slots.iter().map(|j| j.jid).max().unwrap_or(0)
    }
}

impl<const N: usize> Default for JobTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
