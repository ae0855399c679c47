//! Server-side pipe endpoint.
//!
//! A [`PipeEndpoint`] is created with a fresh [`PipeAddress`], opened before
//! ffmpeg is spawned, and connected once ffmpeg opens the address named on
//! its command line. Endpoints are single-use: once closed they cannot be
//! reopened.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::sync::CancellationToken;

use ffpipe_core::{Error, Result};

use super::{PipeAddress, StreamDirection};

/// Lifecycle of a [`PipeEndpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Unopened,
    Opened,
    Connected,
    Closed,
}

enum Listener {
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
    /// `None` once the server handle has been handed out as a stream.
    #[cfg(windows)]
    Windows(Option<tokio::net::windows::named_pipe::NamedPipeServer>),
}

/// A connected pipe.
pub enum PipeStream {
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
    #[cfg(windows)]
    Windows(tokio::net::windows::named_pipe::NamedPipeServer),
}

impl std::fmt::Debug for PipeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PipeStream")
    }
}

macro_rules! delegate {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self.get_mut() {
            #[cfg(unix)]
            PipeStream::Unix($inner) => $body,
            #[cfg(windows)]
            PipeStream::Windows($inner) => $body,
        }
    };
}

impl AsyncRead for PipeStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        delegate!(self, s => Pin::new(s).poll_read(cx, buf))
    }
}

impl AsyncWrite for PipeStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        delegate!(self, s => Pin::new(s).poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        delegate!(self, s => Pin::new(s).poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        delegate!(self, s => Pin::new(s).poll_shutdown(cx))
    }
}

/// One server-side named pipe.
pub struct PipeEndpoint {
    address: PipeAddress,
    direction: StreamDirection,
    state: EndpointState,
    listener: Option<Listener>,
}

impl std::fmt::Debug for PipeEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeEndpoint")
            .field("address", &self.address)
            .field("direction", &self.direction)
            .field("state", &self.state)
            .finish()
    }
}

impl PipeEndpoint {
    pub fn new(address: PipeAddress, direction: StreamDirection) -> Self {
        Self {
            address,
            direction,
            state: EndpointState::Unopened,
            listener: None,
        }
    }

    pub fn address(&self) -> &PipeAddress {
        &self.address
    }

    pub fn direction(&self) -> StreamDirection {
        self.direction
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    /// Create the pipe and start listening.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`Error::AlreadyOpen`] on any call after the first.
    pub fn open(&mut self) -> Result<()> {
        if self.state != EndpointState::Unopened {
            return Err(Error::AlreadyOpen {
                address: self.address.to_string(),
            });
        }
        let listener = self.bind()?;
        self.listener = Some(listener);
        self.state = EndpointState::Opened;
        tracing::debug!(address = %self.address, direction = ?self.direction, "Pipe opened");
        Ok(())
    }

    #[cfg(unix)]
    fn bind(&self) -> Result<Listener> {
        let listener = tokio::net::UnixListener::bind(self.address.path())
            .map_err(|e| Error::broken_pipe(self.address.to_string(), e.to_string()))?;
        Ok(Listener::Unix(listener))
    }

    #[cfg(windows)]
    fn bind(&self) -> Result<Listener> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let (inbound, outbound) = match self.direction {
            StreamDirection::ToSubprocess => (false, true),
            StreamDirection::FromSubprocess => (true, false),
        };
        let server = ServerOptions::new()
            .first_pipe_instance(true)
            .access_inbound(inbound)
            .access_outbound(outbound)
            .create(self.address.path())
            .map_err(|e| Error::broken_pipe(self.address.to_string(), e.to_string()))?;
        Ok(Listener::Windows(Some(server)))
    }

    /// Wait for the subprocess to attach.
    ///
    /// Resolves with [`Error::Cancelled`] when `cancel` fires and with
    /// [`Error::BrokenPipe`] when `exited` fires first. A peer that is
    /// already queued wins over both.
    pub async fn wait_for_connection(
        &mut self,
        cancel: &CancellationToken,
        exited: &CancellationToken,
    ) -> Result<PipeStream> {
        let address = self.address.to_string();
        let Some(listener) = self.listener.as_mut() else {
            return Err(Error::broken_pipe(address, "pipe is not open"));
        };
        if self.state != EndpointState::Opened {
            return Err(Error::broken_pipe(address, "pipe is already connected"));
        }

        let stream = tokio::select! {
            biased;
            accepted = accept(listener) => {
                accepted.map_err(|e| Error::broken_pipe(address.clone(), e.to_string()))?
            }
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = exited.cancelled() => {
                return Err(Error::broken_pipe(address, "subprocess exited before connecting"));
            }
        };

        self.state = EndpointState::Connected;
        tracing::debug!(address = %self.address, "Pipe connected");
        Ok(stream)
    }

    /// Release the OS handle. Idempotent.
    pub fn close(&mut self) {
        if self.state == EndpointState::Closed {
            return;
        }
        if self.listener.take().is_some() {
            self.remove_socket();
        }
        self.state = EndpointState::Closed;
        tracing::debug!(address = %self.address, "Pipe closed");
    }

    #[cfg(unix)]
    fn remove_socket(&self) {
        match std::fs::remove_file(self.address.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove pipe socket {}: {e}",
                self.address.path().display()
            ),
        }
    }

    // Named pipes vanish with their last handle.
    #[cfg(windows)]
    fn remove_socket(&self) {}
}

impl Drop for PipeEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(unix)]
async fn accept(listener: &mut Listener) -> io::Result<PipeStream> {
    let Listener::Unix(listener) = listener;
    let (stream, _) = listener.accept().await?;
    Ok(PipeStream::Unix(stream))
}

#[cfg(windows)]
async fn accept(listener: &mut Listener) -> io::Result<PipeStream> {
    let Listener::Windows(slot) = listener;
    let server = slot
        .as_ref()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "pipe already taken"))?;
    server.connect().await?;
    let server = slot
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "pipe already taken"))?;
    Ok(PipeStream::Windows(server))
}
