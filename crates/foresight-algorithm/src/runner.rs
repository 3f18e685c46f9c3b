//! Scoring runners.
//!
//! Pipeline of [`ProcessRunner`]:
//! 1. Spawn `<interpreter> <address>` with piped stdio, in its own process
//!    group on unix
//! 2. Feed the payload on stdin, then close it
//! 3. Wait for exit, killing the whole group once the deadline passes
//! 4. Collect stdout and stderr under the same deadline
//! 5. Return stdout on success, stderr inside the error otherwise

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{RunnerError, RunnerResult};

/// How long to wait for pipes to close after the process group was killed.
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Executes an out-of-process scoring routine.
///
/// Calls are synchronous and block the calling thread until the routine
/// returns, fails, or `timeout` elapses. `None` means no deadline.
pub trait AlgorithmRunner: Send + Sync {
    fn run_algorithm_with_value(
        &self,
        address: &str,
        payload: &str,
        timeout: Option<Duration>,
    ) -> RunnerResult<String>;
}

/// Runs scoring scripts as child processes of an interpreter.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    interpreter: PathBuf,
    poll_interval: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// A deadline and the timeout it was derived from.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    timeout: Duration,
}

impl Deadline {
    fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    fn error(&self, address: &str) -> RunnerError {
        RunnerError::Timeout {
            address: address.to_string(),
            timeout: self.timeout,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdin,
    Stdout,
    Stderr,
}

type PipeMessage = (Pipe, io::Result<Vec<u8>>);

impl ProcessRunner {
    /// Runner using `python` from `$PATH`.
    pub fn new() -> Self {
        Self::with_interpreter("python")
    }

    pub fn with_interpreter(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            poll_interval: Duration::from_millis(10),
        }
    }

    pub fn interpreter(&self) -> &PathBuf {
        &self.interpreter
    }

    /// Wait for the child, enforcing the deadline if there is one.
    fn wait(
        &self,
        child: &mut Child,
        address: &str,
        deadline: Option<Deadline>,
    ) -> RunnerResult<ExitStatus> {
        let io_err = |source| RunnerError::Io {
            address: address.to_string(),
            source,
        };

        let Some(deadline) = deadline else {
            return child.wait().map_err(io_err);
        };

        loop {
            if let Some(status) = child.try_wait().map_err(io_err)? {
                return Ok(status);
            }
            if deadline.expired() {
                kill_process_group(child);
                let _ = child.wait();
                warn!(%address, timeout = ?deadline.timeout, "scoring routine timed out, killed");
                return Err(deadline.error(address));
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Collect what the pipe threads read and wrote.
    ///
    /// Processes the routine left behind can hold stdout or stderr open after
    /// it exits. Once the deadline passes they are killed along with the rest
    /// of the group, and whatever the routine wrote is still returned.
    fn collect(
        child: &mut Child,
        messages: &Receiver<PipeMessage>,
        address: &str,
        deadline: Option<Deadline>,
    ) -> RunnerResult<(Vec<u8>, Vec<u8>)> {
        let io_err = |source: io::Error| RunnerError::Io {
            address: address.to_string(),
            source,
        };
        let disconnected = || io_err(io::Error::other("pipe thread exited without reporting"));

        let (mut stdout, mut stderr) = (None, None);
        let mut pending = 3;
        let mut wait_until = deadline.map(|d| d.at);
        let mut killed = false;

        while pending > 0 {
            let (pipe, result) = match (deadline, wait_until) {
                (Some(deadline), Some(at)) => {
                    match messages.recv_timeout(at.saturating_duration_since(Instant::now())) {
                        Ok(message) => message,
                        Err(RecvTimeoutError::Timeout) if killed => {
                            return Err(deadline.error(address));
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            warn!(
                                %address,
                                timeout = ?deadline.timeout,
                                "scoring routine left processes holding its pipes, killed"
                            );
                            kill_process_group(child);
                            killed = true;
                            wait_until = Some(Instant::now() + KILL_GRACE);
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => return Err(disconnected()),
                    }
                }
                _ => messages.recv().map_err(|_| disconnected())?,
            };
            pending -= 1;

            match (pipe, result) {
                // A routine is free to exit without reading all of stdin.
                (Pipe::Stdin, Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => {
                    return Err(io_err(e));
                }
                (Pipe::Stdin, _) => {}
                (Pipe::Stdout, result) => stdout = Some(result.map_err(io_err)?),
                (Pipe::Stderr, result) => stderr = Some(result.map_err(io_err)?),
            }
        }

        Ok((stdout.unwrap_or_default(), stderr.unwrap_or_default()))
    }
}

/// Run `work` on its own thread and report its result on `tx`.
///
/// Pipes are serviced off the calling thread so a chatty routine can't block
/// on a full pipe while we wait for it.
fn pipe_thread<F>(tx: &Sender<PipeMessage>, pipe: Pipe, work: F)
where
    F: FnOnce() -> io::Result<Vec<u8>> + Send + 'static,
{
    let tx = tx.clone();
    thread::spawn(move || {
        // The receiver is gone once the call returned early; nothing to report to.
        let _ = tx.send((pipe, work()));
    });
}

fn drain<R: Read + Send + 'static>(tx: &Sender<PipeMessage>, pipe: Pipe, source: Option<R>) {
    pipe_thread(tx, pipe, move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            source.read_to_end(&mut buf)?;
        }
        Ok(buf)
    });
}

/// Kill the child and everything it started.
#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    // The child leads its own group, so its pid is the group id.
    if let Ok(group) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) takes no pointers; a stale group yields ESRCH.
        unsafe {
            libc::kill(-group, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}

impl AlgorithmRunner for ProcessRunner {
    fn run_algorithm_with_value(
        &self,
        address: &str,
        payload: &str,
        timeout: Option<Duration>,
    ) -> RunnerResult<String> {
        let deadline = timeout.map(|timeout| Deadline {
            at: Instant::now() + timeout,
            timeout,
        });

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(address)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        debug!(?cmd, payload_bytes = payload.len(), ?timeout, "running scoring routine");

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            program: self.interpreter.display().to_string(),
            source,
        })?;

        let (tx, messages) = mpsc::channel();
        let stdin = child.stdin.take();
        let input = payload.as_bytes().to_vec();
        pipe_thread(&tx, Pipe::Stdin, move || {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input)?;
            }
            Ok(Vec::new())
        });
        drain(&tx, Pipe::Stdout, child.stdout.take());
        drain(&tx, Pipe::Stderr, child.stderr.take());
        drop(tx);

        let status = self.wait(&mut child, address, deadline)?;
        let (stdout, stderr) = Self::collect(&mut child, &messages, address, deadline)?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            debug!(%address, code = ?status.code(), %stderr, "scoring routine failed");
            return Err(RunnerError::Failed {
                address: address.to_string(),
                code: status.code(),
                stderr,
            });
        }

        let output = String::from_utf8(stdout).map_err(|_| RunnerError::InvalidOutput {
            address: address.to_string(),
        })?;
        debug!(%address, %output, "scoring routine finished");
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn script(body: &str) -> (TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("algorithm.sh");
        fs::write(&path, body).unwrap();
        (dir, path.to_string_lossy().to_string())
    }

    fn sh() -> ProcessRunner {
        ProcessRunner::with_interpreter("sh")
    }

    #[test]
    fn returns_stdout() {
        let (_dir, path) = script("cat > /dev/null\nprintf 4\n");
        let out = sh()
            .run_algorithm_with_value(&path, r#"{"lookAhead":3}"#, None)
            .unwrap();
        assert_eq!(out, "4");
    }

    #[test]
    fn payload_arrives_on_stdin() {
        let (_dir, path) = script("cat\n");
        let payload = r#"{"lookAhead":3,"evaluations":[]}"#;
        let out = sh()
            .run_algorithm_with_value(&path, payload, Some(Duration::from_secs(10)))
            .unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn routine_ignoring_stdin_still_succeeds() {
        let (_dir, path) = script("printf 7\n");
        let payload = "x".repeat(1 << 20);
        let out = sh().run_algorithm_with_value(&path, &payload, None).unwrap();
        assert_eq!(out, "7");
    }

    #[test]
    fn non_zero_exit_captures_stderr() {
        let (_dir, path) = script("echo boom >&2\nexit 3\n");
        let err = sh().run_algorithm_with_value(&path, "{}", None).unwrap_err();
        match err {
            RunnerError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn timeout_kills_routine() {
        let (_dir, path) = script("sleep 5\n");
        let start = Instant::now();
        let err = sh()
            .run_algorithm_with_value(&path, "{}", Some(Duration::from_millis(100)))
            .unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn background_process_holding_stdout_does_not_outlive_deadline() {
        let (_dir, path) = script("sleep 3 &\nprintf 4\n");
        let start = Instant::now();
        let out = sh()
            .run_algorithm_with_value(&path, "{}", Some(Duration::from_millis(200)))
            .unwrap();
        assert_eq!(out, "4");
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    /// Gone, or a zombie waiting to be reaped by init.
    #[cfg(target_os = "linux")]
    fn is_dead(pid: &str) -> bool {
        match fs::read_to_string(format!("/proc/{pid}/stat")) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit_once(')')
                .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn timeout_kills_processes_started_by_routine() {
        let (dir, path) = script("");
        let pid_file = dir.path().join("background.pid");
        fs::write(
            &path,
            format!("sleep 30 &\necho $! > '{}'\nsleep 10\n", pid_file.display()),
        )
        .unwrap();

        let err = sh()
            .run_algorithm_with_value(&path, "{}", Some(Duration::from_millis(500)))
            .unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { .. }));

        let pid = fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let start = Instant::now();
        while !is_dead(&pid) && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(is_dead(&pid), "background process {pid} survived the timeout");
    }

    #[test]
    fn missing_interpreter_is_spawn_error() {
        let runner = ProcessRunner::with_interpreter("/nonexistent/interpreter");
        let err = runner
            .run_algorithm_with_value("algorithm.py", "{}", None)
            .unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }

    #[test]
    fn default_interpreter_is_python() {
        assert_eq!(ProcessRunner::default().interpreter(), &PathBuf::from("python"));
    }
}
