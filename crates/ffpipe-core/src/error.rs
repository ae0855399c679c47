//! Unified error type for ffpipe.
//!
//! Every failure mode of a pipe-driven ffmpeg run funnels into [`Error`].
//! Terminal run failures are wrapped in [`Failure`], which additionally
//! carries the exit code and the diagnostic lines captured from the
//! subprocess.

use std::path::PathBuf;

/// Unified error type covering all failure modes in ffpipe.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A pipe endpoint was opened twice. Pipe arguments are single-use.
    #[error("pipe already opened: {address}")]
    AlreadyOpen {
        /// Address of the endpoint.
        address: String,
    },

    /// The pipe was disconnected, or no peer ever attached to it.
    #[error("broken pipe [{address}]: {message}")]
    BrokenPipe {
        /// Address of the endpoint.
        address: String,
        /// Human-readable error description.
        message: String,
    },

    /// A structured source produced a record that differs from the format
    /// negotiated on the command line.
    #[error("record {index} has format {actual}, expected {expected}")]
    FormatMismatch {
        /// Zero-based position of the offending record.
        index: usize,
        /// Format declared to the subprocess.
        expected: String,
        /// Format of the offending record.
        actual: String,
    },

    /// The run was cancelled by the caller or timed out.
    #[error("operation cancelled")]
    Cancelled,

    /// The subprocess exited unsuccessfully.
    #[error("{}", describe_exit(.code))]
    ProcessExited {
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
    },

    /// The subprocess reported success but the declared output file is
    /// missing or empty.
    #[error("output file missing or empty: {}", path.display())]
    MissingOutput {
        /// Declared output path.
        path: PathBuf,
    },

    /// An external tool could not be found or started.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Caller-supplied data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A complete run failed; see [`Failure`].
    #[error("{0}")]
    Run(Box<Failure>),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("ffmpeg exited with non-zero exit code {code}"),
        None => "ffmpeg was terminated by a signal".to_string(),
    }
}

impl Error {
    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::BrokenPipe`].
    pub fn broken_pipe(address: impl Into<String>, message: impl Into<String>) -> Self {
        Error::BrokenPipe {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Whether this error represents a cancellation rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Diagnostic lines attached to a run failure, empty otherwise.
    pub fn diagnostics(&self) -> &[String] {
        match self {
            Error::Run(failure) => &failure.diagnostics,
            _ => &[],
        }
    }

    /// Exit code attached to a run failure, if the subprocess exited.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::ProcessExited { code } => *code,
            Error::Run(failure) => failure.exit_code,
            _ => None,
        }
    }
}

/// A terminal run failure: the root cause plus whatever the subprocess said.
#[derive(Debug, thiserror::Error)]
#[error("{cause}{}", last_line(.diagnostics))]
pub struct Failure {
    /// Exit code of the subprocess, if it ran to completion.
    pub exit_code: Option<i32>,
    /// The first fatal error observed.
    #[source]
    pub cause: Error,
    /// Captured diagnostic lines, oldest first.
    pub diagnostics: Vec<String>,
}

fn last_line(diagnostics: &[String]) -> String {
    match diagnostics.iter().rev().find(|l| !l.trim().is_empty()) {
        Some(line) => format!(" ({})", line.trim()),
        None => String::new(),
    }
}

impl Failure {
    /// Build a failure, taking the exit code from the cause when it has one.
    pub fn new(cause: Error, diagnostics: Vec<String>) -> Self {
        Self {
            exit_code: cause.exit_code(),
            cause,
            diagnostics,
        }
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Error::Run(Box::new(failure))
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
