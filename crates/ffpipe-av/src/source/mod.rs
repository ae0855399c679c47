//! Data producers that feed an input pipe.
//!
//! A source contributes the format tokens that precede `-i <pipe>` on the
//! command line and, once ffmpeg connects, streams its bytes into the pipe.
//! Structured sources negotiate their format from the first record.

mod raw_audio;
mod raw_video;
mod stream;

pub use raw_audio::{AudioSample, RawAudioPipeSource, RawAudioSamples};
pub use raw_video::{RawVideoFrame, RawVideoPipeSource, VideoFrame};
pub use stream::StreamPipeSource;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use ffpipe_core::{Error, Result};

/// Writable half handed to a source once the pipe is connected.
pub type PipeWriter = dyn AsyncWrite + Unpin + Send;

/// Something that can feed bytes into an input pipe.
#[async_trait]
pub trait PipeSource: Send {
    /// Tokens describing the stream, emitted before `-i`.
    fn format_args(&mut self) -> Result<Vec<String>>;

    /// Write the whole stream. The caller shuts the writer down afterwards.
    async fn write_to(&mut self, writer: &mut PipeWriter, cancel: &CancellationToken)
        -> Result<()>;
}

/// One-slot lookahead over a record iterator.
///
/// The first record is pulled early to negotiate the format and replayed
/// ahead of the rest.
pub(crate) struct Lookahead<I: Iterator> {
    iter: I,
    slot: Option<I::Item>,
}

impl<I: Iterator> Lookahead<I> {
    pub(crate) fn new(iter: I) -> Self {
        Self { iter, slot: None }
    }

    pub(crate) fn peek(&mut self) -> Option<&I::Item> {
        if self.slot.is_none() {
            self.slot = self.iter.next();
        }
        self.slot.as_ref()
    }

    pub(crate) fn next(&mut self) -> Option<I::Item> {
        self.slot.take().or_else(|| self.iter.next())
    }
}

/// Write one record, giving up as soon as `cancel` fires.
pub(crate) async fn write_record(
    writer: &mut PipeWriter,
    data: &[u8],
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::select! {
        res = writer.write_all(data) => Ok(res?),
        _ = cancel.cancelled() => Err(Error::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookahead_replays_peeked_item() {
        let mut items = Lookahead::new(vec![1, 2, 3].into_iter());
        assert_eq!(items.peek(), Some(&1));
        assert_eq!(items.peek(), Some(&1));
        assert_eq!(items.next(), Some(1));
        assert_eq!(items.next(), Some(2));
        assert_eq!(items.peek(), Some(&3));
        assert_eq!(items.next(), Some(3));
        assert_eq!(items.next(), None);
        assert_eq!(items.peek(), None);
    }

    #[test]
    fn lookahead_without_peek_is_plain_iteration() {
        let mut items = Lookahead::new("ab".chars());
        assert_eq!(items.next(), Some('a'));
        assert_eq!(items.next(), Some('b'));
        assert_eq!(items.next(), None);
    }
}
