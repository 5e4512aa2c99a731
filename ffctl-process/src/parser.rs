use chrono::{DateTime, Local};
use serde::Serialize;

/// What a supervisor needs from a diagnostic-line consumer.
///
/// `parse` returns a non-zero value when the line carried recognized
/// progress fields; the supervisor uses this to reset its stale clock.
pub trait LineSink: Send + Sync {
    fn parse(&self, line: &str) -> u64;
    fn reset_stats(&self);
    fn reset_log(&self);
    fn log(&self) -> Vec<LogLine>;
}

/// A sink that additionally exposes the parsed progress snapshot.
pub trait ProgressSource: LineSink {
    fn progress(&self) -> Progress;
}

/// A timestamped diagnostic line.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: DateTime<Local>,
    pub data: String,
}

/// Progress snapshot extracted from the child's diagnostic stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub frame: u64,
    #[serde(rename = "size_bytes")]
    pub size: u64,
    #[serde(rename = "time_seconds")]
    pub time: f64,
    pub speed: f64,
    pub drop: u64,
    pub dup: u64,
    #[serde(rename = "q")]
    pub quantizer: f64,
}

/// Sink that treats every line as progress and retains nothing.
pub struct NullSink;

impl LineSink for NullSink {
    fn parse(&self, _line: &str) -> u64 {
        1
    }

    fn reset_stats(&self) {}

    fn reset_log(&self) {}

    fn log(&self) -> Vec<LogLine> {
        Vec::new()
    }
}
