//! The execution driver.
//!
//! [`FfmpegCommand`] spawns ffmpeg with an assembled [`Arguments`] list and
//! services every pipe argument while it runs. A run goes through five
//! phases:
//!
//! 1. every pipe endpoint is opened,
//! 2. the process is spawned,
//! 3. the exit watcher, one transfer task per pipe and the diagnostic
//!    reader run concurrently,
//! 4. once all of them have finished every endpoint is closed,
//! 5. the run is classified into exactly one [`Outcome`].
//!
//! Two tokens tie the concurrent tasks together. `abort` is a child of the
//! caller's cancellation token and stops the transfers; it also fires when a
//! transfer fails or the process exits unsuccessfully. `exited` fires as soon
//! as the process has exited so that a pipe ffmpeg never opened does not
//! wait for a connection forever.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use futures::future::join_all;
use tokio::io::{AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ffpipe_core::{Error, Failure, FfmpegConfig};

use crate::argument::{Arguments, PipeArgument};
use crate::outcome::Outcome;
use crate::progress::{read_lines, DiagnosticBuffer, ProgressHandlers, ProgressParser};
use crate::tools::ToolRegistry;

/// Why the exit watcher stopped.
#[derive(Debug)]
enum Exit {
    /// The process exited on its own.
    Exited(ExitStatus),
    /// Caller cancellation or timeout.
    Cancelled,
    /// Stopped because a transfer failed.
    Aborted(Option<ExitStatus>),
    WaitFailed(std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cancelled,
    TimedOut,
    Aborted,
}

/// A single ffmpeg invocation.
///
/// # Example
///
/// ```no_run
/// use ffpipe_av::{Arguments, FfmpegCommand, StreamPipeSink};
/// use ffpipe_core::FfmpegConfig;
///
/// # async fn example() -> ffpipe_core::Result<()> {
/// let config = FfmpegConfig::default();
/// let mut encoded = Vec::new();
///
/// let mut args = Arguments::new();
/// args.input_file("/media/in.mkv")
///     .args(["-c:v", "libx264"])
///     .output_pipe(StreamPipeSink::new(&mut encoded).with_format("matroska"));
///
/// FfmpegCommand::new(&config, args)
///     .on_percent_progress(|pct| println!("{pct}%"))
///     .execute()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct FfmpegCommand<'a> {
    config: FfmpegConfig,
    arguments: Arguments<'a>,
    program: Option<PathBuf>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    duration: Option<Duration>,
    handlers: ProgressHandlers<'a>,
}

impl std::fmt::Debug for FfmpegCommand<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegCommand")
            .field("arguments", &self.arguments)
            .field("program", &self.program)
            .field("timeout", &self.timeout)
            .field("duration", &self.duration)
            .field("handlers", &self.handlers)
            .finish()
    }
}

impl<'a> FfmpegCommand<'a> {
    /// A command running `arguments` with the binary and limits from
    /// `config`. Nothing is spawned until [`run`](Self::run).
    pub fn new(config: &FfmpegConfig, arguments: Arguments<'a>) -> Self {
        Self {
            config: config.clone(),
            arguments,
            program: None,
            cancel: CancellationToken::new(),
            timeout: None,
            duration: None,
            handlers: ProgressHandlers::default(),
        }
    }

    /// Run this executable instead of the discovered `ffmpeg`.
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Cancel the run when `token` fires.
    pub fn cancellable(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Cancel the run once `timeout` has elapsed.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Total media duration, enabling percentage progress.
    pub fn duration(mut self, total: Duration) -> Self {
        self.duration = Some(total);
        self
    }

    /// Called with the processed media time each time ffmpeg reports
    /// progress.
    pub fn on_time_progress(mut self, f: impl FnMut(Duration) + Send + 'a) -> Self {
        self.handlers.on_time = Some(Box::new(f));
        self
    }

    /// Called with the completed percentage, rounded to two decimals.
    ///
    /// Only fires when a total was given with [`duration`](Self::duration).
    pub fn on_percent_progress(mut self, f: impl FnMut(f64) + Send + 'a) -> Self {
        self.handlers.on_percent = Some(Box::new(f));
        self
    }

    /// Receive every diagnostic line.
    pub fn on_output(mut self, f: impl FnMut(&str) + Send + 'a) -> Self {
        self.handlers.on_output = Some(Box::new(f));
        self
    }

    /// The argument list this command will run.
    pub fn arguments(&self) -> &Arguments<'a> {
        &self.arguments
    }

    /// Run to completion and classify the result.
    #[tracing::instrument(skip_all, fields(pipes = self.arguments.pipe_count()))]
    pub async fn run(self) -> Outcome {
        let Self {
            config,
            arguments,
            program,
            cancel,
            timeout,
            duration,
            mut handlers,
        } = self;

        let text = arguments.text();
        let has_output_pipe = arguments.has_output_pipe();
        let output_file = arguments.declared_output().map(Path::to_path_buf);
        let (mut tokens, mut pipes) = arguments.into_parts();

        let program = match program {
            Some(program) => program,
            None => match ToolRegistry::discover(&config).require("ffmpeg") {
                Ok(path) => path.to_path_buf(),
                Err(e) => return Outcome::failed(e, Vec::new()),
            },
        };

        if let Some(level) = &config.log_level {
            tokens.splice(0..0, ["-loglevel".to_string(), level.clone()]);
        }

        // Phase 1: open every endpoint before the process exists.
        if let Err(e) = pipes.iter_mut().try_for_each(|pipe| pipe.pre()) {
            close_all(&mut pipes);
            return Outcome::failed(e, Vec::new());
        }

        if cancel.is_cancelled() {
            close_all(&mut pipes);
            return Outcome::Cancelled;
        }

        // Phase 2: spawn.
        tracing::info!("Running {} {}", program.display(), text);
        let mut cmd = Command::new(&program);
        cmd.args(&tokens)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_directory {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                close_all(&mut pipes);
                let cause = Error::tool(program_name(&program), format!("failed to spawn: {e}"));
                return Outcome::failed(cause, Vec::new());
            }
        };
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Phase 3: everything concurrently.
        let abort = cancel.child_token();
        let exited = CancellationToken::new();
        let first_error: OnceLock<Error> = OnceLock::new();
        let grace = config.cancel_grace();

        let exit_task = async {
            let exit = watch_exit(&mut child, stdin, &cancel, &abort, timeout, grace).await;
            exited.cancel();
            if !matches!(&exit, Exit::Exited(status) if status.success()) {
                abort.cancel();
            }
            exit
        };

        let transfers = join_all(pipes.iter_mut().map(|pipe| {
            let (abort, exited, first_error) = (&abort, &exited, &first_error);
            async move {
                let Err(e) = pipe.during(abort, exited).await else {
                    return;
                };
                if e.is_cancelled() {
                    return;
                }
                tracing::debug!(address = %pipe.address(), "Transfer failed: {e}");
                // Only the first failure is kept; it stops the siblings.
                if first_error.set(e).is_ok() {
                    abort.cancel();
                }
            }
        }));

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        let read_stderr = forward_lines(stderr, line_tx.clone());
        let read_stdout = forward_lines(stdout, line_tx);

        let parser = ProgressParser::new(duration);
        let capacity = config.diagnostic_capacity;
        let handlers = &mut handlers;
        let collect = async move {
            let mut buffer = DiagnosticBuffer::new(capacity);
            while let Some(line) = line_rx.recv().await {
                tracing::trace!(target: "ffmpeg", "{line}");
                handlers.handle(&parser, &line);
                buffer.push(line);
            }
            buffer
        };

        let (exit, _, _, _, buffer) =
            tokio::join!(exit_task, transfers, read_stderr, read_stdout, collect);

        // Phase 4: close, whatever happened.
        close_all(&mut pipes);

        // Phase 5: classify.
        tracing::debug!(lines = buffer.len(), "Diagnostics captured");
        let diagnostics = buffer.into_lines();
        let transfer_error = first_error.into_inner();
        let outcome = match exit {
            Exit::Cancelled => Outcome::Cancelled,
            Exit::WaitFailed(e) => Outcome::failed(e.into(), diagnostics),
            Exit::Aborted(status) => {
                let code = status.and_then(|s| s.code());
                let cause = transfer_error.unwrap_or(Error::ProcessExited { code });
                failure(code, cause, diagnostics)
            }
            Exit::Exited(status) if !status.success() => {
                let code = status.code();
                // A pipe breaking is a symptom of the exit, not its cause.
                let cause = match transfer_error {
                    Some(e) if !is_peer_error(&e) => e,
                    _ => Error::ProcessExited { code },
                };
                failure(code, cause, diagnostics)
            }
            Exit::Exited(status) => {
                let missing = match &output_file {
                    Some(path) if !has_output_pipe => {
                        let path = resolve_output(path, config.working_directory.as_deref());
                        is_missing_or_empty(&path).await.then_some(path)
                    }
                    _ => None,
                };
                match (transfer_error, missing) {
                    (Some(e), _) => failure(status.code(), e, diagnostics),
                    (None, Some(path)) => {
                        failure(status.code(), Error::MissingOutput { path }, diagnostics)
                    }
                    (None, None) => Outcome::Success,
                }
            }
        };

        match &outcome {
            Outcome::Success => tracing::info!("ffmpeg finished"),
            Outcome::Cancelled => tracing::info!("ffmpeg run cancelled"),
            Outcome::Failure(f) => tracing::warn!("ffmpeg run failed: {f}"),
        }
        outcome
    }

    /// Run and collapse the outcome into a `Result`.
    pub async fn execute(self) -> ffpipe_core::Result<()> {
        self.run().await.into_result()
    }

    /// Run on a private runtime, returning whether the run succeeded.
    ///
    /// Must not be called from within an async context.
    pub fn run_blocking(self) -> bool {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!("Failed to start runtime: {e}");
                return false;
            }
        };
        runtime.block_on(self.run()).is_success()
    }
}

fn failure(exit_code: Option<i32>, cause: Error, diagnostics: Vec<String>) -> Outcome {
    Outcome::Failure(Failure {
        exit_code,
        cause,
        diagnostics,
    })
}

fn close_all(pipes: &mut [Box<dyn PipeArgument + '_>]) {
    for pipe in pipes {
        pipe.post();
    }
}

fn is_peer_error(err: &Error) -> bool {
    matches!(err, Error::BrokenPipe { .. } | Error::Io { .. })
}

fn program_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string_lossy().to_string())
}

fn resolve_output(path: &Path, working_directory: Option<&Path>) -> PathBuf {
    match working_directory {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

async fn is_missing_or_empty(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() == 0,
        Err(_) => true,
    }
}

/// Wait for the process to exit, stopping it early on cancellation,
/// timeout or abort.
async fn watch_exit(
    child: &mut Child,
    stdin: Option<ChildStdin>,
    cancel: &CancellationToken,
    abort: &CancellationToken,
    timeout: Option<Duration>,
    grace: Duration,
) -> Exit {
    let deadline = async {
        match timeout {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };

    let reason = tokio::select! {
        biased;
        status = child.wait() => {
            return match status {
                Ok(status) => {
                    tracing::debug!("ffmpeg exited with {status}");
                    Exit::Exited(status)
                }
                Err(e) => Exit::WaitFailed(e),
            };
        }
        _ = cancel.cancelled() => StopReason::Cancelled,
        _ = deadline => StopReason::TimedOut,
        _ = abort.cancelled() => StopReason::Aborted,
    };

    match reason {
        StopReason::TimedOut => tracing::warn!("ffmpeg timed out after {timeout:?}"),
        StopReason::Cancelled => tracing::info!("Cancellation requested; stopping ffmpeg"),
        StopReason::Aborted => tracing::debug!("Transfer failed; stopping ffmpeg"),
    }
    abort.cancel();

    let status = stop(child, stdin, grace).await;
    match reason {
        StopReason::Aborted => Exit::Aborted(status),
        StopReason::Cancelled | StopReason::TimedOut => Exit::Cancelled,
    }
}

/// Ask ffmpeg to quit, then kill it if it is still running after `grace`.
async fn stop(child: &mut Child, stdin: Option<ChildStdin>, grace: Duration) -> Option<ExitStatus> {
    if let Some(mut stdin) = stdin {
        // `q` is ffmpeg's interactive quit command.
        let _ = stdin.write_all(b"q").await;
        let _ = stdin.flush().await;
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => return Some(status),
        Ok(Err(e)) => tracing::warn!("Failed to wait for ffmpeg: {e}"),
        Err(_) => tracing::debug!("ffmpeg ignored quit request; killing"),
    }
    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill ffmpeg: {e}");
    }
    child.wait().await.ok()
}

async fn forward_lines<R>(stream: Option<R>, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return;
    };
    let result = read_lines(BufReader::new(stream), |line| {
        let _ = tx.send(line);
    })
    .await;
    if let Err(e) = result {
        tracing::debug!("Diagnostic stream ended with error: {e}");
    }
}
