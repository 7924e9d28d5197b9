use nix::errno::Errno;
use nix::unistd::Pid;
use thiserror::Error;

use crate::job::TableError;

pub type Result<T> = std::result::Result<T, ShellError>;

/// Failures the shell cannot recover from.
///
/// These come from OS calls that only fail in a broken environment
/// (fork, kill, sigprocmask). They are never retried.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{op} error: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: Errno,
    },
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("job table is already held by this thread")]
    NestedCriticalSection,
}

impl ShellError {
    pub fn os(op: &'static str) -> impl FnOnce(Errno) -> ShellError {
        move |source| ShellError::Os { op, source }
    }
}

/// Mistakes in a `bg`/`fg` invocation, reported and then ignored.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobCommandError {
    #[error("{0} requires PID or %jobid argument")]
    MissingArgument(String),
    #[error("{0}: argument must be a PID or %jobid")]
    BadArgument(String),
    #[error("%{0}: No such job")]
    NoSuchJob(u32),
    #[error("({0}): No such process")]
    NoSuchProcess(Pid),
}
