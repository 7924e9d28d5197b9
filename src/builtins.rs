use std::io::{stdout, Write};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tracing::debug;

use crate::control::JobControl;
use crate::error::{JobCommandError, Result, ShellError};
use crate::job::{JobState, JobTable};

pub enum BuiltinResult {
    Handled,
    NotHandled,
}

pub fn try_builtin(control: &JobControl, argv: &[String]) -> Result<BuiltinResult> {
    if argv.is_empty() {
        return Ok(BuiltinResult::NotHandled);
    }
    match argv[0].as_str() {
        "quit" => builtin_quit(),
        "jobs" => builtin_jobs(control)?,
        "bg" | "fg" => {
            if let Err(e) = do_bgfg(control, argv) {
                match e {
                    BgFgError::User(e) => println!("{}", e),
                    BgFgError::Fatal(e) => return Err(e),
                }
            }
        }
        _ => return Ok(BuiltinResult::NotHandled),
    }
    Ok(BuiltinResult::Handled)
}

fn builtin_quit() -> ! {
    let _ = stdout().flush();
    std::process::exit(0);
}

fn builtin_jobs(control: &JobControl) -> Result<()> {
    let table = control.enter()?;
    for job in table.iter() {
        println!("{}", job);
    }
    Ok(())
}

/// Target of a `bg`/`fg`: `%jid` or a bare pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRef {
    Jid(u32),
    Pid(Pid),
}

impl JobRef {
    pub fn parse(cmd: &str, arg: Option<&str>) -> std::result::Result<JobRef, JobCommandError> {
        let arg = arg.ok_or_else(|| JobCommandError::MissingArgument(cmd.to_string()))?;
        let bad = || JobCommandError::BadArgument(cmd.to_string());

        if let Some(jid) = arg.strip_prefix('%') {
            return jid.parse::<u32>().map(JobRef::Jid).map_err(|_| bad());
        }
        if !arg.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(bad());
        }
        arg.parse::<i32>()
            .map(|pid| JobRef::Pid(Pid::from_raw(pid)))
            .map_err(|_| bad())
    }

    /// Resolve to the job's pid, which is also its process group id.
    fn resolve(self, table: &JobTable) -> std::result::Result<Pid, JobCommandError> {
        match self {
            JobRef::Jid(jid) => table
                .find_by_jid(jid)
                .map(|j| j.pid())
                .ok_or(JobCommandError::NoSuchJob(jid)),
            JobRef::Pid(pid) => table
                .find_by_pid(pid)
                .map(|j| j.pid())
                .ok_or(JobCommandError::NoSuchProcess(pid)),
        }
    }
}

#[derive(Debug)]
enum BgFgError {
    User(JobCommandError),
    Fatal(ShellError),
}

impl From<JobCommandError> for BgFgError {
    fn from(e: JobCommandError) -> Self {
        BgFgError::User(e)
    }
}

impl From<ShellError> for BgFgError {
    fn from(e: ShellError) -> Self {
        BgFgError::Fatal(e)
    }
}

/// `bg` resumes a job in the background, `fg` resumes it and waits for it.
fn do_bgfg(control: &JobControl, argv: &[String]) -> std::result::Result<(), BgFgError> {
    let cmd = argv[0].as_str();
    let target = JobRef::parse(cmd, argv.get(1).map(String::as_str))?;

    let mut table = control.enter()?;
    let pid = target.resolve(&table)?;
    let state = if cmd == "fg" {
        JobState::Foreground
    } else {
        JobState::Background
    };

    killpg(pid, Signal::SIGCONT).map_err(ShellError::os("kill"))?;
    table.set_state(pid, state).map_err(ShellError::from)?;
    debug!(%pid, ?state, "resumed job");

    if state == JobState::Background {
        if let Some(job) = table.find_by_pid(pid) {
            println!("[{}] ({}) {}", job.jid(), job.pid(), job.cmdline());
        }
        return Ok(());
    }
    table.wait_foreground(pid)?;
    Ok(())
}
