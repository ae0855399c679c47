//! OS pipe plumbing: addresses, server endpoints and the block copy loop.

mod address;
mod endpoint;

pub use address::{unique_name, unix_socket_path, windows_pipe_path, PipeAddress, PIPE_PREFIX};
pub use endpoint::{EndpointState, PipeEndpoint, PipeStream};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use ffpipe_core::{Error, Result};

/// Default transfer block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Which way bytes flow relative to the subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    /// This process writes, ffmpeg reads (an input pipe).
    ToSubprocess,
    /// ffmpeg writes, this process reads (an output pipe).
    FromSubprocess,
}

/// Copy `reader` into `writer` one block at a time until end of stream.
///
/// The token is checked between blocks so a copy never outlives its run.
/// Returns the number of bytes copied.
pub async fn copy_blocks<R, W>(
    reader: &mut R,
    writer: &mut W,
    block_size: usize,
    cancel: &CancellationToken,
) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; block_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = tokio::select! {
            n = reader.read(&mut buf) => n?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };
        if n == 0 {
            break;
        }
        tokio::select! {
            res = writer.write_all(&buf[..n]) => res?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        }
        total += n as u64;
    }
    writer.flush().await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn copies_everything_in_order() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = &data[..];
        let mut out = Vec::new();
        let n = copy_blocks(&mut reader, &mut out, 1000, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(n, 10_000);
        assert_eq!(out, data);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_stops_endless_copy() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let mut reader = tokio::io::repeat(7);
        let mut sink = tokio::io::sink();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            copy_blocks(&mut reader, &mut sink, DEFAULT_BLOCK_SIZE, &cancel),
        )
        .await
        .expect("copy loop did not observe cancellation");
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
