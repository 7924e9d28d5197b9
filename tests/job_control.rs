//! End-to-end job control: drive the `tsh` binary over pipes and poke it
//! with real signals.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use pretty_assertions::assert_eq;

/// Time for the shell to fork, register and start waiting.
const SETTLE: Duration = Duration::from_millis(300);

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    spawned: Vec<Pid>,
}

impl Session {
    fn start() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_tsh"))
            .arg("-p")
            .env_remove("TSH_LOG")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .expect("spawn tsh");
        let stdin = child.stdin.take().unwrap();
        let stdout = BufReader::new(child.stdout.take().unwrap());
        Session {
            child,
            stdin,
            stdout,
            spawned: Vec::new(),
        }
    }

    fn send(&mut self, line: &str) {
        writeln!(self.stdin, "{}", line).unwrap();
        self.stdin.flush().unwrap();
    }

    fn send_bytes(&mut self, bytes: &[u8]) {
        self.stdin.write_all(bytes).unwrap();
        self.stdin.flush().unwrap();
    }

    fn line(&mut self) -> String {
        let mut buf = String::new();
        let n = self.stdout.read_line(&mut buf).unwrap();
        assert!(n > 0, "tsh closed its output");
        buf.trim_end_matches('\n').to_string()
    }

    /// Lines printed until `marker` is echoed back by a foreground job.
    fn until_marker(&mut self, marker: &str) -> Vec<String> {
        self.send(&format!("/bin/echo {}", marker));
        let mut lines = Vec::new();
        loop {
            let line = self.line();
            if line == marker {
                return lines;
            }
            lines.push(line);
        }
    }

    fn signal_shell(&self, signal: Signal) {
        kill(Pid::from_raw(self.child.id() as i32), signal).unwrap();
    }

    fn track(&mut self, pid: Pid) {
        self.spawned.push(pid);
    }

    fn quit(mut self) {
        for pid in self.spawned.drain(..) {
            let _ = killpg(pid, Signal::SIGKILL);
        }
        self.send("quit");
        let status = self.child.wait().unwrap();
        assert!(status.success());
    }
}

/// Pull `pid` out of `... (pid) ...`.
fn pid_in(line: &str) -> Pid {
    let start = line.find('(').expect("pid open paren") + 1;
    let end = line.find(')').expect("pid close paren");
    Pid::from_raw(line[start..end].parse().unwrap())
}

#[test]
fn background_job_is_reported_and_listed() {
    let mut sh = Session::start();
    sh.send("/bin/sleep 100 &");
    let report = sh.line();
    let pid = pid_in(&report);
    sh.track(pid);
    assert_eq!(report, format!("[1] ({}) /bin/sleep 100 &", pid));

    sh.send("jobs");
    sh.send("jobs");
    let listed = sh.until_marker("listed");
    let expected = format!("[1] ({}) Running /bin/sleep 100 &", pid);
    assert_eq!(listed, vec![expected.clone(), expected]);
    sh.quit();
}

#[test]
fn foreground_job_returns_to_prompt_after_exit() {
    let mut sh = Session::start();
    let started = Instant::now();
    sh.send("/bin/sleep 1");
    sh.send("jobs");
    let lines = sh.until_marker("back");
    assert_eq!(lines, Vec::<String>::new());
    assert!(started.elapsed() >= Duration::from_millis(900));
    sh.quit();
}

#[test]
fn background_exit_does_not_end_the_foreground_wait() {
    let mut sh = Session::start();
    sh.send("/bin/sleep 0.2 &");
    let pid = pid_in(&sh.line());
    sh.track(pid);

    let started = Instant::now();
    sh.send("/bin/sleep 1.5");
    sh.send("jobs");
    assert_eq!(sh.until_marker("waited"), Vec::<String>::new());
    assert!(started.elapsed() >= Duration::from_millis(1400));
    sh.quit();
}

#[test]
fn full_table_rejects_the_extra_job() {
    let mut sh = Session::start();
    let mut listed = Vec::new();
    for jid in 1..=16 {
        sh.send("/bin/sleep 100 &");
        let line = sh.line();
        let pid = pid_in(&line);
        sh.track(pid);
        assert_eq!(line, format!("[{}] ({}) /bin/sleep 100 &", jid, pid));
        listed.push(format!("[{}] ({}) Running /bin/sleep 100 &", jid, pid));
    }

    sh.send("/bin/sleep 100 &");
    assert_eq!(
        sh.until_marker("full"),
        vec!["Tried to create too many jobs".to_string()]
    );
    sh.send("jobs");
    assert_eq!(sh.until_marker("listed"), listed);
    sh.quit();
}

#[test]
fn undecodable_input_is_not_fatal() {
    let mut sh = Session::start();
    sh.send_bytes(b"/bin/echo caf\xff\n");
    assert_eq!(sh.line(), "caf\u{fffd}");
    assert_eq!(sh.until_marker("alive"), Vec::<String>::new());
    sh.quit();
}

#[test]
fn nul_in_an_argument_rejects_the_line() {
    let mut sh = Session::start();
    sh.send_bytes(b"/bin/echo a\0b\n");
    assert_eq!(
        sh.until_marker("after-nul"),
        vec!["/bin/echo: argument contains a NUL byte".to_string()]
    );
    sh.quit();
}

#[test]
fn keyboard_stop_then_bg_then_fg() {
    let mut sh = Session::start();
    sh.send("/bin/sleep 100");
    thread::sleep(SETTLE);
    sh.signal_shell(Signal::SIGTSTP);

    let stopped = sh.line();
    let pid = pid_in(&stopped);
    sh.track(pid);
    assert_eq!(
        stopped,
        format!("job [1] ({}) stopped by signal {}", pid, libc::SIGTSTP)
    );

    sh.send("jobs");
    assert_eq!(
        sh.until_marker("after-stop"),
        vec![format!("[1] ({}) Stopped /bin/sleep 100", pid)]
    );

    sh.send("bg %1");
    assert_eq!(sh.line(), format!("[1] ({}) /bin/sleep 100", pid));
    sh.send("jobs");
    assert_eq!(
        sh.until_marker("after-bg"),
        vec![format!("[1] ({}) Running /bin/sleep 100", pid)]
    );

    // fg by pid, then interrupt it from the keyboard
    sh.send(&format!("fg {}", pid));
    thread::sleep(SETTLE);
    sh.signal_shell(Signal::SIGINT);
    assert_eq!(
        sh.line(),
        format!("job [1] ({}) terminated by signal {}", pid, libc::SIGINT)
    );
    sh.send("jobs");
    assert_eq!(sh.until_marker("after-int"), Vec::<String>::new());
    sh.quit();
}

#[test]
fn bad_bgfg_arguments_are_reported() {
    let mut sh = Session::start();
    sh.send("/bin/sleep 100 &");
    let pid = pid_in(&sh.line());
    sh.track(pid);

    sh.send("fg");
    sh.send("bg abc");
    sh.send("fg %9");
    sh.send("bg 999999");
    sh.send("jobs");
    assert_eq!(
        sh.until_marker("errors"),
        vec![
            "fg requires PID or %jobid argument".to_string(),
            "bg: argument must be a PID or %jobid".to_string(),
            "%9: No such job".to_string(),
            "(999999): No such process".to_string(),
            format!("[1] ({}) Running /bin/sleep 100 &", pid),
        ]
    );
    sh.quit();
}

#[test]
fn missing_program_does_not_take_the_shell_down() {
    let mut sh = Session::start();
    sh.send("/no/such/program arg");
    assert_eq!(
        sh.until_marker("still-here"),
        vec!["/no/such/program: Command not found".to_string()]
    );
    sh.quit();
}

#[test]
fn job_ids_climb_while_jobs_live() {
    let mut sh = Session::start();
    let mut jids = Vec::new();
    for _ in 0..3 {
        sh.send("/bin/sleep 100 &");
        let line = sh.line();
        let pid = pid_in(&line);
        sh.track(pid);
        let jid: u32 = line[1..line.find(']').unwrap()].parse().unwrap();
        jids.push(jid);
    }
    assert_eq!(jids, vec![1, 2, 3]);
    sh.quit();
}

#[test]
fn sigquit_terminates_the_shell() {
    let mut sh = Session::start();
    sh.until_marker("ready");
    sh.signal_shell(Signal::SIGQUIT);
    assert_eq!(sh.line(), "Terminating after receipt of SIGQUIT signal");
    let status = sh.child.wait().unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn end_of_input_exits_cleanly() {
    let sh = Session::start();
    let Session { mut child, stdin, .. } = sh;
    drop(stdin);
    assert!(child.wait().unwrap().success());
}
