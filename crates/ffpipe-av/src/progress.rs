//! Diagnostic stream handling: progress extraction and line capture.

use std::collections::VecDeque;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Matches the `time=HH:MM:SS.ff` field of ffmpeg status lines.
pub const TIME_PATTERN: &str = r"time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)";

/// One progress observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub processed: Duration,
    /// Percentage of the total, when a total duration is known.
    pub percent: Option<f64>,
}

/// Extracts processed time from diagnostic lines.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    pattern: Regex,
    total: Option<Duration>,
}

impl ProgressParser {
    /// A parser reporting percentages against `total`, when given.
    pub fn new(total: Option<Duration>) -> Self {
        Self {
            // The pattern is a constant; failure here is a programming error.
            pattern: Regex::new(TIME_PATTERN).expect("valid progress pattern"),
            total,
        }
    }

    /// Processed time reported by `line`, if any.
    pub fn parse_time(&self, line: &str) -> Option<Duration> {
        let caps = self.pattern.captures(line)?;
        let hours: u64 = caps[1].parse().ok()?;
        let minutes: u64 = caps[2].parse().ok()?;
        let seconds: f64 = caps[3].parse().ok()?;
        // Overflowing values are treated as a non-matching line.
        let whole = hours.checked_mul(3600)?.checked_add(minutes * 60)?;
        Duration::from_secs(whole).checked_add(Duration::from_secs_f64(seconds))
    }

    pub fn parse(&self, line: &str) -> Option<ProgressSample> {
        let processed = self.parse_time(line)?;
        Some(ProgressSample {
            processed,
            percent: self.total.and_then(|total| percent(processed, total)),
        })
    }
}

/// `processed / total * 100`, rounded to two decimals. `None` for a zero
/// total.
pub fn percent(processed: Duration, total: Duration) -> Option<f64> {
    if total.is_zero() {
        return None;
    }
    let ratio = processed.as_secs_f64() / total.as_secs_f64() * 100.0;
    Some((ratio * 100.0).round() / 100.0)
}

type TimeCallback<'a> = Box<dyn FnMut(Duration) + Send + 'a>;
type PercentCallback<'a> = Box<dyn FnMut(f64) + Send + 'a>;
type OutputCallback<'a> = Box<dyn FnMut(&str) + Send + 'a>;

/// Callbacks registered on a command.
#[derive(Default)]
pub struct ProgressHandlers<'a> {
    pub(crate) on_time: Option<TimeCallback<'a>>,
    pub(crate) on_percent: Option<PercentCallback<'a>>,
    pub(crate) on_output: Option<OutputCallback<'a>>,
}

impl std::fmt::Debug for ProgressHandlers<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressHandlers")
            .field("on_time", &self.on_time.is_some())
            .field("on_percent", &self.on_percent.is_some())
            .field("on_output", &self.on_output.is_some())
            .finish()
    }
}

impl ProgressHandlers<'_> {
    /// Dispatch one diagnostic line.
    pub(crate) fn handle(&mut self, parser: &ProgressParser, line: &str) {
        if let Some(cb) = self.on_output.as_mut() {
            cb(line);
        }
        if self.on_time.is_none() && self.on_percent.is_none() {
            return;
        }
        let Some(sample) = parser.parse(line) else {
            return;
        };
        if let Some(cb) = self.on_time.as_mut() {
            cb(sample.processed);
        }
        if let (Some(cb), Some(pct)) = (self.on_percent.as_mut(), sample.percent) {
            cb(pct);
        }
    }
}

/// Ring of the most recent diagnostic lines.
#[derive(Debug, Clone)]
pub struct DiagnosticBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticBuffer {
    /// A ring holding at most `capacity` lines. Zero keeps nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append a line, evicting the oldest when full.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The captured lines, oldest first.
    pub fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}

/// Longest diagnostic line kept, in bytes. Anything past it is dropped.
pub const MAX_LINE_LEN: usize = 4096;

/// Read `reader` line by line, treating `\r` as a line break too.
///
/// ffmpeg redraws its status line with carriage returns, so splitting on
/// `\n` alone would deliver progress in one burst at the end. Empty lines
/// are skipped, invalid UTF-8 is replaced and lines longer than
/// [`MAX_LINE_LEN`] are truncated.
pub async fn read_lines<R, F>(mut reader: R, mut on_line: F) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(String),
{
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            break;
        }
        let len = buf.len();
        for &byte in buf {
            if byte == b'\n' || byte == b'\r' {
                if !pending.is_empty() {
                    on_line(String::from_utf8_lossy(&pending).into_owned());
                    pending.clear();
                }
            } else if pending.len() < MAX_LINE_LEN {
                pending.push(byte);
            }
        }
        reader.consume(len);
    }
    if !pending.is_empty() {
        on_line(String::from_utf8_lossy(&pending).into_owned());
    }
    Ok(())
}
