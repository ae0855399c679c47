use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use ffpipe_core::{Error, Result, VideoFormat};

use super::{write_record, Lookahead, PipeSource, PipeWriter};

/// Frame rate used when none is configured.
pub const DEFAULT_FRAME_RATE: f64 = 25.0;

/// A single raw video frame.
pub trait VideoFrame: Send {
    fn format(&self) -> &VideoFormat;
    fn data(&self) -> &[u8];
}

/// Owned frame bytes plus their format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVideoFrame {
    pub format: VideoFormat,
    pub data: Bytes,
}

impl RawVideoFrame {
    pub fn new(format: VideoFormat, data: impl Into<Bytes>) -> Self {
        Self {
            format,
            data: data.into(),
        }
    }
}

impl VideoFrame for RawVideoFrame {
    fn format(&self) -> &VideoFormat {
        &self.format
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Streams a sequence of raw frames as `-f rawvideo`.
///
/// The format is taken from the first frame. Every later frame must match it
/// exactly; the first one that does not aborts the transfer before any of
/// its bytes reach the pipe.
pub struct RawVideoPipeSource<I: Iterator> {
    frames: Lookahead<I>,
    frame_rate: f64,
    format: Option<VideoFormat>,
}

impl<I, F> RawVideoPipeSource<I>
where
    I: Iterator<Item = F> + Send,
    F: VideoFrame,
{
    pub fn new(frames: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            frames: Lookahead::new(frames.into_iter()),
            frame_rate: DEFAULT_FRAME_RATE,
            format: None,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    fn negotiate(&mut self) -> Result<VideoFormat> {
        if let Some(format) = &self.format {
            return Ok(format.clone());
        }
        let first = self
            .frames
            .peek()
            .ok_or_else(|| Error::Validation("raw video source is empty".into()))?;
        let format = first.format().clone();
        self.format = Some(format.clone());
        Ok(format)
    }
}

#[async_trait]
impl<I, F> PipeSource for RawVideoPipeSource<I>
where
    I: Iterator<Item = F> + Send,
    F: VideoFrame,
{
    fn format_args(&mut self) -> Result<Vec<String>> {
        let format = self.negotiate()?;
        Ok(vec![
            "-f".into(),
            "rawvideo".into(),
            "-r".into(),
            self.frame_rate.to_string(),
            "-pix_fmt".into(),
            format.pixel_format.clone(),
            "-s".into(),
            format.size(),
        ])
    }

    async fn write_to(&mut self, writer: &mut PipeWriter, cancel: &CancellationToken) -> Result<()> {
        let expected = self.negotiate()?;
        let mut index = 0usize;
        while let Some(frame) = self.frames.next() {
            if frame.format() != &expected {
                return Err(Error::FormatMismatch {
                    index,
                    expected: expected.to_string(),
                    actual: frame.format().to_string(),
                });
            }
            write_record(writer, frame.data(), cancel).await?;
            index += 1;
        }
        tracing::debug!(frames = index, format = %expected, "Raw video source drained");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, fill: u8) -> RawVideoFrame {
        let len = (width * height * 3) as usize;
        RawVideoFrame::new(VideoFormat::new(width, height, "rgb24"), vec![fill; len])
    }

    #[test]
    fn format_args_from_first_frame() {
        let mut source = RawVideoPipeSource::new(vec![frame(256, 256, 0)]);
        assert_eq!(
            source.format_args().unwrap(),
            vec!["-f", "rawvideo", "-r", "25", "-pix_fmt", "rgb24", "-s", "256x256"]
        );
    }

    #[test]
    fn custom_frame_rate() {
        let mut source = RawVideoPipeSource::new(vec![frame(2, 2, 0)]).with_frame_rate(29.97);
        let args = source.format_args().unwrap();
        assert_eq!(args[3], "29.97");
    }

    #[test]
    fn empty_source_is_validation_error() {
        let mut source = RawVideoPipeSource::new(Vec::<RawVideoFrame>::new());
        assert!(matches!(source.format_args(), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn writes_all_frames_including_peeked_one() {
        let frames: Vec<_> = (0..4u8).map(|i| frame(2, 2, i)).collect();
        let mut source = RawVideoPipeSource::new(frames);
        source.format_args().unwrap();

        let mut out = Vec::new();
        source
            .write_to(&mut out, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.len(), 4 * 12);
        assert_eq!(&out[..12], &[0u8; 12]);
        assert_eq!(&out[36..], &[3u8; 12]);
    }

    #[tokio::test]
    async fn mismatch_stops_before_offending_frame() {
        let mut frames: Vec<_> = (0..6).map(|_| frame(2, 2, 1)).collect();
        frames[4] = frame(3, 2, 9);
        let mut source = RawVideoPipeSource::new(frames);
        source.format_args().unwrap();

        let mut out = Vec::new();
        let err = source
            .write_to(&mut out, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            Error::FormatMismatch {
                index,
                expected,
                actual,
            } => {
                assert_eq!(index, 4);
                assert_eq!(expected, "2x2 rgb24");
                assert_eq!(actual, "3x2 rgb24");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(out.len(), 4 * 12);
    }

    #[tokio::test]
    async fn frames_are_pulled_lazily() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let frames = (0..10u8).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            frame(1, 1, i)
        });
        let mut source = RawVideoPipeSource::new(frames);
        source.format_args().unwrap();
        assert_eq!(pulled.load(Ordering::SeqCst), 1);

        let mut out = Vec::new();
        source
            .write_to(&mut out, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(pulled.load(Ordering::SeqCst), 10);
    }
}
