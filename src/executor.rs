use std::ffi::CString;
use std::io::{stdout, Write};

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{execv, fork, setpgid, ForkResult, Pid};
use tracing::debug;

use crate::builtins::{try_builtin, BuiltinResult};
use crate::control::JobControl;
use crate::error::{Result, ShellError};
use crate::job::{JobState, TableError};
use crate::parser::{parse_line, resolve_path};

/// Evaluate one command line: run a built-in, or launch a job.
pub fn execute_command(control: &JobControl, line: &str) -> Result<()> {
    let command = parse_line(line);
    if command.argv.is_empty() {
        return Ok(());
    }

    match try_builtin(control, &command.argv)? {
        BuiltinResult::Handled => Ok(()),
        BuiltinResult::NotHandled => {
            launch(control, &command.argv, line.trim_end(), command.background)
        }
    }
}

/// Process Launcher.
///
/// SIGCHLD stays blocked from before the fork until the job is in the
/// table, so the reaper cannot collect a child it has never heard of.
fn launch(control: &JobControl, argv: &[String], cmdline: &str, background: bool) -> Result<()> {
    // Everything the child needs is built before the fork.
    let program = resolve_path(&argv[0]);
    let args = match argv
        .iter()
        .map(|a| CString::new(a.as_str()))
        .collect::<std::result::Result<Vec<CString>, _>>()
    {
        Ok(args) => args,
        Err(_) => {
            println!("{}: argument contains a NUL byte", argv[0]);
            return Ok(());
        }
    };
    let _ = stdout().flush();

    let mut table = control.enter()?;
    // SAFETY: the shell is single-threaded, and the child only calls
    // setpgid, sigprocmask and exec before leaving.
    match unsafe { fork() }.map_err(ShellError::os("fork"))? {
        ForkResult::Child => {
            // Own group, so keyboard signals meant for another job skip us.
            let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
            drop(table);
            if let Some(program) = program {
                let _ = execv(&program, args.as_slice());
            }
            println!("{}: Command not found", argv[0]);
            // SAFETY: never return into the shell's loop from the child.
            unsafe { libc::_exit(127) }
        }
        ForkResult::Parent { child } => {
            // Also set from this side so a relay right after the fork finds the group.
            let _ = setpgid(child, child);

            let state = if background {
                JobState::Background
            } else {
                JobState::Foreground
            };
            let jid = match table.add(child, state, cmdline) {
                Ok(jid) => jid,
                Err(e) => {
                    drop(table);
                    return reject(child, e);
                }
            };
            debug!(live = table.len(), "Added job [{}] {} {}", jid, child, cmdline);

            if background {
                println!("[{}] ({}) {}", jid, child, cmdline);
                Ok(())
            } else {
                // Still inside the same critical section, so an exit that
                // already happened is seen by the first check.
                table.wait_foreground(child)
            }
        }
    }
}

/// A child the table could not take is not left running untracked.
fn reject(child: Pid, err: TableError) -> Result<()> {
    debug!(%child, "job not registered: {}", err);
    println!("{}", err);
    match killpg(child, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(ShellError::os("kill")(e)),
    }
}
