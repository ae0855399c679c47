use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use ffpipe_core::{AudioFormat, Error, Result};

use super::{write_record, Lookahead, PipeSource, PipeWriter};

/// A block of raw interleaved PCM samples.
pub trait AudioSample: Send {
    fn format(&self) -> &AudioFormat;
    fn data(&self) -> &[u8];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAudioSamples {
    pub format: AudioFormat,
    pub data: Bytes,
}

impl RawAudioSamples {
    pub fn new(format: AudioFormat, data: impl Into<Bytes>) -> Self {
        Self {
            format,
            data: data.into(),
        }
    }
}

impl AudioSample for RawAudioSamples {
    fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Streams blocks of raw PCM audio. Negotiates like
/// [`RawVideoPipeSource`](super::RawVideoPipeSource).
pub struct RawAudioPipeSource<I: Iterator> {
    samples: Lookahead<I>,
    format: Option<AudioFormat>,
}

impl<I, S> RawAudioPipeSource<I>
where
    I: Iterator<Item = S> + Send,
    S: AudioSample,
{
    pub fn new(samples: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            samples: Lookahead::new(samples.into_iter()),
            format: None,
        }
    }

    fn negotiate(&mut self) -> Result<AudioFormat> {
        if let Some(format) = &self.format {
            return Ok(format.clone());
        }
        let first = self
            .samples
            .peek()
            .ok_or_else(|| Error::Validation("raw audio source is empty".into()))?;
        let format = first.format().clone();
        self.format = Some(format.clone());
        Ok(format)
    }
}

#[async_trait]
impl<I, S> PipeSource for RawAudioPipeSource<I>
where
    I: Iterator<Item = S> + Send,
    S: AudioSample,
{
    fn format_args(&mut self) -> Result<Vec<String>> {
        let format = self.negotiate()?;
        Ok(vec![
            "-f".into(),
            format.sample_format.clone(),
            "-ar".into(),
            format.sample_rate.to_string(),
            "-ac".into(),
            format.channels.to_string(),
        ])
    }

    async fn write_to(&mut self, writer: &mut PipeWriter, cancel: &CancellationToken) -> Result<()> {
        let expected = self.negotiate()?;
        let mut index = 0usize;
        while let Some(block) = self.samples.next() {
            if block.format() != &expected {
                return Err(Error::FormatMismatch {
                    index,
                    expected: expected.to_string(),
                    actual: block.format().to_string(),
                });
            }
            write_record(writer, block.data(), cancel).await?;
            index += 1;
        }
        tracing::debug!(blocks = index, format = %expected, "Raw audio source drained");
        Ok(())
    }
}
