use std::io::{stdin, stdout, BufRead, ErrorKind, Write};
use std::os::fd::AsRawFd;

use anyhow::Context;
use clap::Parser;
use executor::execute_command;
use tracing::debug;

mod builtins;
mod control;
mod error;
mod executor;
mod job;
mod logging;
mod parser;
mod signals;
mod sio;

const PROMPT: &str = "tsh> ";

/// A tiny shell with job control.
#[derive(Parser, Debug)]
#[command(name = "tsh")]
#[command(about = "A tiny shell with job control", long_about = None)]
struct Cli {
    /// Print additional diagnostic information
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Do not emit a command prompt
    #[arg(short = 'p', long = "no-prompt")]
    no_prompt: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // One pipe carries everything a driver needs to see.
    nix::unistd::dup2(stdout().as_raw_fd(), libc::STDERR_FILENO)
        .context("redirecting stderr to stdout")?;

    logging::init_tracing(cli.verbose);
    signals::install_signal_handlers().context("installing signal handlers")?;
    debug!(prompt = !cli.no_prompt, "shell ready");

    let jobs = control::jobs();
    let mut input = Vec::new();
    loop {
        if !cli.no_prompt {
            create_prompt();
        }

        input.clear();
        match stdin().lock().read_until(b'\n', &mut input) {
            // ctrl-d
            Ok(0) => {
                let _ = stdout().flush();
                return Ok(());
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("reading command line"),
        }

        // Bytes that are not UTF-8 are replaced rather than ending the shell.
        let line = String::from_utf8_lossy(&input);
        if let Err(e) = execute_command(jobs, &line) {
            println!("{}", e);
            std::process::exit(1);
        }
        let _ = stdout().flush();
    }
}

fn create_prompt() {
    print!("{}", PROMPT);
    if stdout().flush().is_err() {
        eprintln!("Error Flushing");
    }
}
