use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long readers get to flush once lingering processes are killed.
const READER_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub trait CommandRunner: Send + Sync {
    /// Runs `command` through the shell. Expiry of `timeout` is an error.
    fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;
}

pub struct ShellCommandRunner {
    working_dir: PathBuf,
}

impl ShellCommandRunner {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }
}

impl CommandRunner for ShellCommandRunner {
    fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        let mut shell = Command::new("sh");
        shell
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Background jobs share the group so one signal reaches all of them.
        #[cfg(unix)]
        shell.process_group(0);
        let child = shell
            .spawn()
            .with_context(|| format!("failed to spawn baseline command: {command}"))?;

        let deadline = Instant::now() + timeout;
        let mut guard = ChildGuard { child, armed: true };
        let (sender, receiver) = mpsc::channel();
        let mut pending = 0usize;
        if let Some(pipe) = guard.child_mut().stdout.take() {
            spawn_reader(pipe, Stream::Stdout, sender.clone());
            pending += 1;
        }
        if let Some(pipe) = guard.child_mut().stderr.take() {
            spawn_reader(pipe, Stream::Stderr, sender.clone());
            pending += 1;
        }
        drop(sender);

        let status = loop {
            let polled = guard
                .child_mut()
                .try_wait()
                .with_context(|| format!("failed to poll baseline command: {command}"))?;
            match polled {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    guard.terminate();
                    bail!(
                        "baseline command timed out after {} ms: {command}",
                        timeout.as_millis()
                    );
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };
        let pid = guard.child_mut().id();
        guard.release();

        let mut output = CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: status.code(),
        };
        drain_readers(&receiver, &mut output, &mut pending, deadline);
        if pending > 0 {
            // The shell exited but something it started still holds a pipe open.
            warn!(command, pid, "killing processes left behind by baseline command");
            kill_process_group(pid);
            drain_readers(
                &receiver,
                &mut output,
                &mut pending,
                Instant::now() + READER_GRACE,
            );
        }

        Ok(output)
    }
}

/// Kills and reaps the child on every exit path that did not release it.
struct ChildGuard {
    child: Child,
    armed: bool,
}

impl ChildGuard {
    fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    fn terminate(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        kill_process_group(self.child.id());
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }

    fn release(&mut self) {
        self.armed = false;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = i32::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2) takes no pointers; a negative pid addresses the group.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn spawn_reader<R: Read + Send + 'static>(
    mut pipe: R,
    stream: Stream,
    sender: Sender<(Stream, String)>,
) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = sender.send((stream, String::from_utf8_lossy(&buf).into_owned()));
    });
}

fn drain_readers(
    receiver: &Receiver<(Stream, String)>,
    output: &mut CommandOutput,
    pending: &mut usize,
    until: Instant,
) {
    while *pending > 0 {
        let remaining = until.saturating_duration_since(Instant::now());
        let Ok((stream, text)) = receiver.recv_timeout(remaining) else {
            return;
        };
        match stream {
            Stream::Stdout => output.stdout = text,
            Stream::Stderr => output.stderr = text,
        }
        *pending -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ShellCommandRunner {
        ShellCommandRunner::new(std::env::temp_dir())
    }

    #[test]
    fn captures_stdout_stderr_and_exit_code() {
        let output = runner()
            .run("echo out; echo err 1>&2; exit 3", Duration::from_secs(5))
            .expect("command should run");
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[test]
    fn successful_command_reports_success() {
        let output = runner()
            .run("printf ok", Duration::from_secs(5))
            .expect("command should run");
        assert!(output.success());
        assert_eq!(output.stdout, "ok");
    }

    #[test]
    fn expired_deadline_is_an_error() {
        let started = Instant::now();
        let error = runner()
            .run("exec sleep 5", Duration::from_millis(100))
            .expect_err("deadline should expire");
        assert!(error.to_string().contains("timed out"), "unexpected: {error}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn background_job_holding_the_pipe_does_not_outlive_the_deadline() {
        let started = Instant::now();
        let result = runner().run("sleep 3 & echo hi", Duration::from_millis(200));
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "runner blocked for {:?}",
            started.elapsed()
        );
        let output = result.expect("the shell itself exits immediately");
        assert_eq!(output.stdout.trim(), "hi");
        assert!(output.success());
    }

    #[test]
    fn timed_out_command_takes_its_children_down() {
        let started = Instant::now();
        let error = runner()
            .run("sleep 3 & sleep 3; echo done", Duration::from_millis(150))
            .expect_err("deadline should expire");
        assert!(error.to_string().contains("timed out"), "unexpected: {error}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
