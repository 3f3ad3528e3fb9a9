//! Bounded subprocess execution.
//!
//! [`ProcessExecutor`] is the seam between the validator and the operating
//! system: callers describe a run with a [`ProcessRequest`] (program, discrete
//! argv, working directory, timeout, output cap) and receive a
//! [`ProcessOutput`]. [`SystemExecutor`] is the production implementation;
//! tests substitute fakes that never spawn real processes.
//!
//! Arguments are always passed as separate argv elements. Nothing here goes
//! through a shell.

use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::ProcessError;

/// Tracing target for process supervision.
const PROCESS_TARGET: &str = "clarigate_validator::process";

/// Default wall-clock limit for a run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on captured bytes per output stream.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Interval between exit polls.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared flag used to abandon an in-flight run.
///
/// Cloning yields a handle to the same flag, so a caller can keep one clone
/// and pass another into [`ProcessExecutor::execute`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every run observing this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Description of one subprocess run.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use clarigate_validator::process::ProcessRequest;
///
/// let request = ProcessRequest::new("clarinet")
///     .arg("check")
///     .current_dir("/tmp/workspace")
///     .timeout(Duration::from_secs(10));
/// assert_eq!(request.args().len(), 1);
/// assert_eq!(request.timeout_duration(), Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    program: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    timeout: Duration,
    max_output_bytes: usize,
}

impl ProcessRequest {
    /// Creates a request with default timeout and output cap.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Sets the wall-clock limit.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the per-stream capture limit.
    #[must_use]
    pub const fn max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    /// Returns the program to run.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Returns the arguments in order.
    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Returns the working directory, if one was set.
    #[must_use]
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Returns the wall-clock limit.
    #[must_use]
    pub const fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    /// Returns the per-stream capture limit.
    #[must_use]
    pub const fn output_limit(&self) -> usize {
        self.max_output_bytes
    }

    fn display_program(&self) -> String {
        self.program.display().to_string()
    }
}

/// Captured result of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    status: Option<i32>,
    stdout: String,
    stderr: String,
    truncated: bool,
}

impl ProcessOutput {
    /// Creates an output record. `status` is `None` when the process was
    /// terminated by a signal.
    #[must_use]
    pub fn new(status: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
            truncated: false,
        }
    }

    /// Marks the output as truncated at the capture limit.
    #[must_use]
    pub const fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    /// Returns the exit code, if any.
    #[must_use]
    pub const fn status(&self) -> Option<i32> {
        self.status
    }

    /// Returns `true` for a zero exit code.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }

    /// Returns captured standard output.
    #[must_use]
    pub const fn stdout(&self) -> &str {
        self.stdout.as_str()
    }

    /// Returns captured standard error.
    #[must_use]
    pub const fn stderr(&self) -> &str {
        self.stderr.as_str()
    }

    /// Returns `true` if either stream exceeded the capture limit.
    #[must_use]
    pub const fn truncated(&self) -> bool {
        self.truncated
    }
}

/// Trait abstracting subprocess execution for testability.
///
/// The production implementation is [`SystemExecutor`]. Implementations must
/// honour the request's timeout and the cancellation token, and must never
/// hand arguments to a shell.
pub trait ProcessExecutor: Send + Sync {
    /// Runs the described process to completion.
    ///
    /// # Errors
    ///
    /// Returns a [`ProcessError`] if the process cannot be spawned, exceeds
    /// its timeout, is cancelled, or cannot be supervised.
    fn execute(
        &self,
        request: &ProcessRequest,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, ProcessError>;
}

impl<T: ProcessExecutor + ?Sized> ProcessExecutor for Arc<T> {
    fn execute(
        &self,
        request: &ProcessRequest,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, ProcessError> {
        (**self).execute(request, cancel)
    }
}

/// Executes requests with [`std::process::Command`].
///
/// Standard input is closed. Both output streams are drained on helper
/// threads so the child never blocks on a full pipe; bytes beyond the cap
/// are read and discarded. The exit is polled until the timeout elapses or
/// the token is cancelled, at which point the child is killed and reaped.
/// The same deadline bounds collecting output, so a grandchild holding the
/// pipes open cannot stretch a run past its timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl ProcessExecutor for SystemExecutor {
    fn execute(
        &self,
        request: &ProcessRequest,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, ProcessError> {
        let program = request.display_program();
        let mut command = Command::new(request.program());
        command
            .args(request.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = request.cwd() {
            command.current_dir(dir);
        }

        debug!(
            target: PROCESS_TARGET,
            program = %program,
            args = ?request.args(),
            cwd = ?request.cwd(),
            "spawning process"
        );

        let start = Instant::now();
        let timeout = request.timeout_duration();
        let deadline = start + timeout;
        let mut child = command.spawn().map_err(|err| ProcessError::SpawnFailed {
            program: program.clone(),
            source: Arc::new(err),
        })?;

        let limit = request.output_limit();
        let stdout = child.stdout.take().map(|pipe| spawn_capture(pipe, limit));
        let stderr = child.stderr.take().map(|pipe| spawn_capture(pipe, limit));

        // Capture threads are never joined. A grandchild may still hold the
        // pipes open, so collection gives up at the deadline instead.
        let status = wait_for_exit(&program, &mut child, timeout, cancel)?;

        let stdout = collect_capture(&program, stdout, deadline, timeout, cancel)?;
        let stderr = collect_capture(&program, stderr, deadline, timeout, cancel)?;

        debug!(
            target: PROCESS_TARGET,
            program = %program,
            status = ?status.code(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            stdout_bytes = stdout.bytes.len(),
            stderr_bytes = stderr.bytes.len(),
            "process exited"
        );

        Ok(ProcessOutput::new(
            status.code(),
            String::from_utf8_lossy(&stdout.bytes),
            String::from_utf8_lossy(&stderr.bytes),
        )
        .with_truncated(stdout.truncated || stderr.truncated))
    }
}

/// Bytes read from one output stream.
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

fn spawn_capture<R>(pipe: R, limit: usize) -> Receiver<io::Result<Captured>>
where
    R: Read + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone once the run has timed out.
        drop(sender.send(read_capped(pipe, limit)));
    });
    receiver
}

fn read_capped<R: Read>(pipe: R, limit: usize) -> io::Result<Captured> {
    let mut bytes = Vec::new();
    let mut limited = pipe.take(u64::try_from(limit).unwrap_or(u64::MAX));
    limited.read_to_end(&mut bytes)?;
    let mut rest = limited.into_inner();
    let discarded = io::copy(&mut rest, &mut io::sink())?;
    Ok(Captured {
        bytes,
        truncated: discarded > 0,
    })
}

/// Waits for a capture thread to finish reading, bounded by the run deadline.
fn collect_capture(
    program: &str,
    receiver: Option<Receiver<io::Result<Captured>>>,
    deadline: Instant,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Captured, ProcessError> {
    let Some(receiver) = receiver else {
        return Ok(Captured {
            bytes: Vec::new(),
            truncated: false,
        });
    };
    let io_error = |source: io::Error| ProcessError::Io {
        program: program.to_owned(),
        source: Arc::new(source),
    };

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(remaining.min(POLL_INTERVAL)) {
            Ok(captured) => return captured.map_err(io_error),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(io_error(io::Error::other(
                    "output capture thread panicked",
                )));
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
        if cancel.is_cancelled() {
            warn!(target: PROCESS_TARGET, program, "run cancelled while collecting output");
            return Err(ProcessError::Cancelled {
                program: program.to_owned(),
            });
        }
        if remaining.is_zero() {
            warn!(
                target: PROCESS_TARGET,
                program,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "output still open at deadline, abandoning capture"
            );
            return Err(ProcessError::Timeout {
                program: program.to_owned(),
                timeout,
            });
        }
    }
}

/// Polls the child until it exits, the timeout elapses, or the token fires.
fn wait_for_exit(
    program: &str,
    child: &mut Child,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ExitStatus, ProcessError> {
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if cancel.is_cancelled() {
                    warn!(target: PROCESS_TARGET, program, "run cancelled, killing process");
                    terminate(child);
                    return Err(ProcessError::Cancelled {
                        program: program.to_owned(),
                    });
                }
                if start.elapsed() > timeout {
                    warn!(
                        target: PROCESS_TARGET,
                        program,
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "process timed out, killing process"
                    );
                    terminate(child);
                    return Err(ProcessError::Timeout {
                        program: program.to_owned(),
                        timeout,
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                terminate(child);
                return Err(ProcessError::Io {
                    program: program.to_owned(),
                    source: Arc::new(err),
                });
            }
        }
    }
}

fn terminate(child: &mut Child) {
    drop(child.kill());
    drop(child.wait());
}
