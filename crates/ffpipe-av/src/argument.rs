//! Command-line assembly and pipe arguments.
//!
//! [`Arguments`] collects the ordered tokens handed to ffmpeg together with
//! the pipe arguments that must be serviced while it runs. Each pipe argument
//! follows the same three-phase lifecycle: `pre` opens the endpoint before
//! the process is spawned, `during` connects and transfers data, and `post`
//! closes the endpoint after every task has finished.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use ffpipe_core::{Error, Result};

use crate::pipe::{PipeAddress, PipeEndpoint, StreamDirection};
use crate::sink::PipeSink;
use crate::source::PipeSource;

/// A command-line argument backed by a pipe endpoint.
#[async_trait]
pub trait PipeArgument: Send {
    fn endpoint(&self) -> &PipeEndpoint;

    fn endpoint_mut(&mut self) -> &mut PipeEndpoint;

    /// The address as it appears on the command line.
    fn address(&self) -> String {
        self.endpoint().address().uri()
    }

    /// Tokens this argument contributes to the command line.
    fn tokens(&mut self) -> Result<Vec<String>>;

    /// Open the endpoint. Runs before the subprocess is spawned.
    fn pre(&mut self) -> Result<()> {
        self.endpoint_mut().open()
    }

    /// Wait for ffmpeg to connect and transfer the data.
    ///
    /// `cancel` fires when the run is being torn down, `exited` once the
    /// subprocess has exited.
    async fn during(&mut self, cancel: &CancellationToken, exited: &CancellationToken)
        -> Result<()>;

    /// Close the endpoint. Runs on every path once all tasks are done.
    fn post(&mut self) {
        self.endpoint_mut().close();
    }
}

/// Attach the pipe address to errors caused by the peer going away.
fn peer_error(address: &PipeAddress, err: Error) -> Error {
    match err {
        Error::Io { source }
            if matches!(
                source.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ) =>
        {
            Error::broken_pipe(address.to_string(), source.to_string())
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// InputPipe
// ---------------------------------------------------------------------------

/// Feeds a [`PipeSource`] to ffmpeg (`-i <pipe>`).
pub struct InputPipe<'a> {
    endpoint: PipeEndpoint,
    source: Box<dyn PipeSource + 'a>,
}

impl<'a> InputPipe<'a> {
    pub fn new(source: impl PipeSource + 'a, address: PipeAddress) -> Self {
        Self {
            endpoint: PipeEndpoint::new(address, StreamDirection::ToSubprocess),
            source: Box::new(source),
        }
    }
}

#[async_trait]
impl<'a> PipeArgument for InputPipe<'a> {
    fn endpoint(&self) -> &PipeEndpoint {
        &self.endpoint
    }

    fn endpoint_mut(&mut self) -> &mut PipeEndpoint {
        &mut self.endpoint
    }

    fn tokens(&mut self) -> Result<Vec<String>> {
        let mut tokens = self.source.format_args()?;
        tokens.push("-i".into());
        tokens.push(self.address());
        Ok(tokens)
    }

    async fn during(&mut self, cancel: &CancellationToken, exited: &CancellationToken) -> Result<()> {
        let mut stream = self.endpoint.wait_for_connection(cancel, exited).await?;
        let address = self.endpoint.address();
        self.source
            .write_to(&mut stream, cancel)
            .await
            .map_err(|e| peer_error(address, e))?;
        // Signal end of input so ffmpeg can finish.
        stream
            .shutdown()
            .await
            .map_err(|e| peer_error(address, e.into()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OutputPipe
// ---------------------------------------------------------------------------

/// Drains ffmpeg output into a [`PipeSink`].
pub struct OutputPipe<'a> {
    endpoint: PipeEndpoint,
    sink: Box<dyn PipeSink + 'a>,
}

impl<'a> OutputPipe<'a> {
    pub fn new(sink: impl PipeSink + 'a, address: PipeAddress) -> Self {
        Self {
            endpoint: PipeEndpoint::new(address, StreamDirection::FromSubprocess),
            sink: Box::new(sink),
        }
    }
}

#[async_trait]
impl<'a> PipeArgument for OutputPipe<'a> {
    fn endpoint(&self) -> &PipeEndpoint {
        &self.endpoint
    }

    fn endpoint_mut(&mut self) -> &mut PipeEndpoint {
        &mut self.endpoint
    }

    fn tokens(&mut self) -> Result<Vec<String>> {
        let mut tokens = self.sink.format_args();
        tokens.push(self.address());
        Ok(tokens)
    }

    async fn during(&mut self, cancel: &CancellationToken, exited: &CancellationToken) -> Result<()> {
        let stream = self.endpoint.wait_for_connection(cancel, exited).await?;
        let address = self.endpoint.address();
        self.sink
            .read_from(Box::new(stream), cancel)
            .await
            .map_err(|e| peer_error(address, e))
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Ordered ffmpeg arguments plus the pipes they reference.
///
/// Tokens are passed to the process as-is, without a shell.
///
/// # Example
///
/// ```
/// use ffpipe_av::Arguments;
///
/// let mut args = Arguments::new();
/// args.overwrite().input_file("in.mkv").args(["-c", "copy"]).output_file("out.mkv");
/// assert_eq!(args.text(), "-y -i in.mkv -c copy out.mkv");
/// ```
pub struct Arguments<'a> {
    tokens: Vec<String>,
    pipes: Vec<Box<dyn PipeArgument + 'a>>,
    output_file: Option<PathBuf>,
    pipe_dir: PathBuf,
}

impl std::fmt::Debug for Arguments<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arguments")
            .field("tokens", &self.tokens)
            .field("pipes", &self.pipes.len())
            .field("output_file", &self.output_file)
            .finish()
    }
}

impl Default for Arguments<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Arguments<'a> {
    /// An empty argument list. Pipes are created in the system temporary
    /// directory unless [`pipe_dir`](Self::pipe_dir) says otherwise.
    pub fn new() -> Self {
        Self {
            tokens: Vec::new(),
            pipes: Vec::new(),
            output_file: None,
            pipe_dir: std::env::temp_dir(),
        }
    }

    /// Directory for pipes created after this call (POSIX only).
    pub fn pipe_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.pipe_dir = dir.into();
        self
    }

    /// Append one token verbatim. No shell is involved, so spaces need no
    /// quoting.
    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.tokens.push(arg.into());
        self
    }

    /// Append several tokens in order.
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a file input (`-i <path>`).
    pub fn input_file(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.arg("-i")
            .arg(path.as_ref().to_string_lossy().into_owned())
    }

    /// Output file path. Checked for existence after a successful run.
    pub fn output_file(&mut self, path: impl AsRef<Path>) -> &mut Self {
        let path = path.as_ref();
        self.output_file = Some(path.to_path_buf());
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Overwrite existing output files (`-y`).
    pub fn overwrite(&mut self) -> &mut Self {
        self.arg("-y")
    }

    /// Add an input fed from `source`.
    ///
    /// Emits the source's format tokens, `-i`, then the pipe address. Fails
    /// if the source cannot describe its format (an empty structured source).
    pub fn input_pipe(&mut self, source: impl PipeSource + 'a) -> Result<&mut Self> {
        let input = InputPipe::new(source, PipeAddress::generate_in(&self.pipe_dir));
        self.push_pipe(input)
    }

    /// Add an output drained into `sink`: format tokens, then the address.
    pub fn output_pipe(&mut self, sink: impl PipeSink + 'a) -> &mut Self {
        let output = OutputPipe::new(sink, PipeAddress::generate_in(&self.pipe_dir));
        let address = output.address();
        let mut tokens = output.sink.format_args();
        tokens.push(address);
        self.tokens.extend(tokens);
        self.pipes.push(Box::new(output));
        self
    }

    /// Register a pipe argument without emitting any tokens.
    ///
    /// Returns the address for the caller to place on the command line.
    pub fn pipe(&mut self, pipe: impl PipeArgument + 'a) -> String {
        let address = pipe.address();
        self.pipes.push(Box::new(pipe));
        address
    }

    fn push_pipe(&mut self, mut pipe: impl PipeArgument + 'a) -> Result<&mut Self> {
        let tokens = pipe.tokens()?;
        self.tokens.extend(tokens);
        self.pipes.push(Box::new(pipe));
        Ok(self)
    }

    /// Tokens as they will be passed to ffmpeg, pipe addresses included.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// The file set with [`output_file`](Self::output_file), if any.
    pub fn declared_output(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    /// Number of registered pipe arguments, inputs and outputs together.
    pub fn pipe_count(&self) -> usize {
        self.pipes.len()
    }

    /// Whether any pipe carries data out of ffmpeg.
    pub fn has_output_pipe(&self) -> bool {
        self.pipes
            .iter()
            .any(|p| p.endpoint().direction() == StreamDirection::FromSubprocess)
    }

    /// The command line as a single string, for logging.
    pub fn text(&self) -> String {
        self.tokens
            .iter()
            .map(|t| {
                if t.is_empty() || t.contains(char::is_whitespace) {
                    format!("\"{t}\"")
                } else {
                    t.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Vec<Box<dyn PipeArgument + 'a>>) {
        (self.tokens, self.pipes)
    }
}
