use std::collections::VecDeque;
use std::sync::LazyLock;

use chrono::Local;
use parking_lot::RwLock;
use regex::Regex;

use ffctl_process::{LineSink, LogLine, Progress, ProgressSource};

pub const DEFAULT_LOG_LINES: usize = 100;

// Classic stderr status line fields.
static RE_FRAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"frame=\s*([0-9]+)").unwrap());
static RE_QUANTIZER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"q=\s*([0-9.]+)").unwrap());
static RE_SIZE_KB: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"size=\s*([0-9]+)kB").unwrap());
static RE_SPEED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"speed=\s*([0-9.]+)x").unwrap());
static RE_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=\s*([0-9]+):([0-9]{2}):([0-9]{2})\.([0-9]+)").unwrap());
static RE_DROP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"drop=\s*([0-9]+)|drop_frames=\s*([0-9]+)").unwrap());
static RE_DUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"dup=\s*([0-9]+)|dup_frames=\s*([0-9]+)").unwrap());

// `-progress` key=value fields. out_time_ms carries microseconds despite
// the name.
static RE_SIZE_BYTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"total_size=\s*([0-9]+)").unwrap());
static RE_TIME_US: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"out_time_ms=\s*([0-9]+)").unwrap());

/// Parses the transcoder's diagnostic stream into a progress snapshot
/// and a bounded log ring.
///
/// Field extraction is best-effort: fields absent from a line keep their
/// previous value, and per-field parse failures are swallowed.
#[derive(Debug)]
pub struct ProgressParser {
    capacity: usize,
    inner: RwLock<ParserInner>,
}

#[derive(Debug)]
struct ParserInner {
    progress: Progress,
    log: VecDeque<LogLine>,
}

impl ProgressParser {
    pub fn new(log_lines: usize) -> Self {
        let capacity = if log_lines == 0 {
            DEFAULT_LOG_LINES
        } else {
            log_lines
        };
        Self {
            capacity,
            inner: RwLock::new(ParserInner {
                progress: Progress::default(),
                log: VecDeque::with_capacity(capacity),
            }),
        }
    }
}

impl LineSink for ProgressParser {
    fn parse(&self, line: &str) -> u64 {
        let now = Local::now();
        let mut inner = self.inner.write();

        if inner.log.len() == self.capacity {
            inner.log.pop_front();
        }
        inner.log.push_back(LogLine {
            timestamp: now,
            data: line.to_string(),
        });

        if !line.contains("frame=") {
            return 0;
        }

        if let Some(caps) = RE_FRAME.captures(line) {
            if let Ok(frame) = caps[1].parse() {
                inner.progress.frame = frame;
            }
        }
        if let Some(caps) = RE_QUANTIZER.captures(line) {
            if let Ok(q) = caps[1].parse() {
                inner.progress.quantizer = q;
            }
        }
        if let Some(caps) = RE_SIZE_KB.captures(line) {
            if let Ok(kb) = caps[1].parse::<u64>() {
                inner.progress.size = kb * 1024;
            }
        }
        if let Some(caps) = RE_SIZE_BYTES.captures(line) {
            if let Ok(bytes) = caps[1].parse() {
                inner.progress.size = bytes;
            }
        }
        if let Some(caps) = RE_TIME.captures(line) {
            let hours: u64 = caps[1].parse().unwrap_or(0);
            let minutes: u64 = caps[2].parse().unwrap_or(0);
            let seconds: u64 = caps[3].parse().unwrap_or(0);
            // Honor however many fractional digits were printed.
            let frac = match caps[4].parse::<u64>() {
                Ok(frac) => frac as f64 / 10f64.powi(caps[4].len() as i32),
                Err(_) => 0.0,
            };
            inner.progress.time = (hours * 3600 + minutes * 60 + seconds) as f64 + frac;
        }
        if let Some(caps) = RE_TIME_US.captures(line) {
            if let Ok(us) = caps[1].parse::<u64>() {
                inner.progress.time = us as f64 / 1_000_000.0;
            }
        }
        if let Some(caps) = RE_SPEED.captures(line) {
            if let Ok(speed) = caps[1].parse() {
                inner.progress.speed = speed;
            }
        }
        if let Some(dropped) = first_group(&RE_DROP, line) {
            inner.progress.drop = dropped;
        }
        if let Some(duplicated) = first_group(&RE_DUP, line) {
            inner.progress.dup = duplicated;
        }

        inner.progress.frame
    }

    fn reset_stats(&self) {
        self.inner.write().progress = Progress::default();
    }

    fn reset_log(&self) {
        self.inner.write().log = VecDeque::with_capacity(self.capacity);
    }

    fn log(&self) -> Vec<LogLine> {
        self.inner.read().log.iter().cloned().collect()
    }
}

impl ProgressSource for ProgressParser {
    fn progress(&self) -> Progress {
        self.inner.read().progress
    }
}

fn first_group(re: &Regex, line: &str) -> Option<u64> {
    let caps = re.captures(line)?;
    caps.iter()
        .skip(1)
        .flatten()
        .find_map(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_status_line() {
        let parser = ProgressParser::new(0);
        let n = parser.parse("frame= 42 q=28.0 size= 100kB time=00:00:01.50 speed=1.2x");
        assert_eq!(n, 42);

        let progress = parser.progress();
        assert_eq!(progress.frame, 42);
        assert_eq!(progress.quantizer, 28.0);
        assert_eq!(progress.size, 102_400);
        assert_eq!(progress.time, 1.5);
        assert_eq!(progress.speed, 1.2);
    }

    #[test]
    fn progress_format_line() {
        let parser = ProgressParser::new(0);
        let n = parser.parse("frame=10 out_time_ms=2500000 total_size=4096 speed=2.0x");
        assert_eq!(n, 10);

        let progress = parser.progress();
        assert_eq!(progress.time, 2.5);
        assert_eq!(progress.size, 4096);
        assert_eq!(progress.speed, 2.0);
    }

    #[test]
    fn total_size_wins_over_kb_size() {
        let parser = ProgressParser::new(0);
        parser.parse("frame=1 size= 2kB total_size=9000");
        assert_eq!(parser.progress().size, 9000);
    }

    #[test]
    fn drop_and_dup_variants() {
        let parser = ProgressParser::new(0);
        parser.parse("frame=5 drop=3 dup=1");
        assert_eq!(parser.progress().drop, 3);
        assert_eq!(parser.progress().dup, 1);

        parser.parse("frame=6 drop_frames=8 dup_frames=2");
        assert_eq!(parser.progress().drop, 8);
        assert_eq!(parser.progress().dup, 2);
    }

    #[test]
    fn fractional_time_digits_are_honored() {
        let parser = ProgressParser::new(0);
        parser.parse("frame=1 time=01:02:03.5");
        assert_eq!(parser.progress().time, 3723.5);

        parser.parse("frame=1 time=00:00:10.250");
        assert_eq!(parser.progress().time, 10.25);
    }

    #[test]
    fn missing_fields_keep_previous_values() {
        let parser = ProgressParser::new(0);
        parser.parse("frame=7 q=30.0 speed=0.9x");
        parser.parse("frame=9");

        let progress = parser.progress();
        assert_eq!(progress.frame, 9);
        assert_eq!(progress.quantizer, 30.0);
        assert_eq!(progress.speed, 0.9);
    }

    #[test]
    fn non_progress_line_returns_zero_but_is_logged() {
        let parser = ProgressParser::new(0);
        assert_eq!(parser.parse("Press [q] to stop, [?] for help"), 0);
        assert_eq!(parser.log().len(), 1);
        assert_eq!(parser.progress(), Progress::default());
    }

    #[test]
    fn log_ring_drops_oldest_on_overflow() {
        let parser = ProgressParser::new(3);
        for i in 0..5 {
            parser.parse(&format!("line {i}"));
        }
        let log = parser.log();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].data, "line 2");
        assert_eq!(log[2].data, "line 4");
    }

    #[test]
    fn reset_stats_zeroes_progress() {
        let parser = ProgressParser::new(0);
        parser.parse("frame=100 q=20.0 size= 5kB time=00:01:00.00 speed=1.0x drop=1 dup=2");
        parser.reset_stats();
        assert_eq!(parser.progress(), Progress::default());
    }

    #[test]
    fn reset_log_replaces_ring() {
        let parser = ProgressParser::new(0);
        parser.parse("a");
        parser.parse("b");
        parser.reset_log();
        assert!(parser.log().is_empty());
    }
}
