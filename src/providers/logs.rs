use chrono::{DateTime, Utc};

use crate::models::{LogLevel, LogLine};

/// Where parsed lines came from; copied onto every produced `LogLine`.
#[derive(Debug, Clone, Default)]
pub struct LogContext<'a> {
    pub source: &'a str,
    pub job_id: Option<&'a str>,
    pub step_id: Option<&'a str>,
}

/// Splits raw log text into one `LogLine` per input line.
///
/// Lines starting with an RFC 3339 timestamp (GitHub's format) keep it; every
/// other line is stamped with `fetched_at`. No line is dropped. The result is
/// sorted by timestamp with a stable sort, so lines sharing a timestamp keep
/// their original order.
pub fn parse_log_text(text: &str, context: &LogContext<'_>, fetched_at: DateTime<Utc>) -> Vec<LogLine> {
    let mut lines: Vec<LogLine> = text
        .lines()
        .map(|raw| {
            let (timestamp, message) = split_timestamp(raw).unwrap_or((fetched_at, raw));
            LogLine {
                timestamp,
                level: classify_level(message),
                message: message.to_string(),
                source: context.source.to_string(),
                job_id: context.job_id.map(ToString::to_string),
                step_id: context.step_id.map(ToString::to_string),
            }
        })
        .collect();

    lines.sort_by_key(|line| line.timestamp);
    lines
}

fn split_timestamp(line: &str) -> Option<(DateTime<Utc>, &str)> {
    let (prefix, rest) = line.split_once(' ').unwrap_or((line, ""));
    let timestamp = DateTime::parse_from_rfc3339(prefix).ok()?;
    Some((timestamp.with_timezone(&Utc), rest))
}

/// Substring heuristics for lines without an explicit level.
pub fn classify_level(message: &str) -> LogLevel {
    let lower = message.to_ascii_lowercase();
    if lower.contains("error") || lower.contains("fail") {
        LogLevel::Error
    } else if lower.contains("warn") {
        LogLevel::Warn
    } else if lower.contains("debug") {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context() -> LogContext<'static> {
        LogContext {
            source: "github:job:42",
            job_id: Some("42"),
            step_id: None,
        }
    }

    #[test]
    fn test_classify_level_heuristics() {
        assert_eq!(classify_level("ERROR: build broke"), LogLevel::Error);
        assert_eq!(classify_level("3 tests failed"), LogLevel::Error);
        assert_eq!(classify_level("Warning: deprecated input"), LogLevel::Warn);
        assert_eq!(classify_level("[debug] cache key"), LogLevel::Debug);
        assert_eq!(classify_level("Compiling cilens v0.1.0"), LogLevel::Info);
    }

    #[test]
    fn test_timestamp_prefixed_lines_keep_native_timestamp() {
        let fetched_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let text = "2024-05-01T10:00:00.1234567Z ##[group]Run actions/checkout@v4\n\
                    2024-05-01T10:00:01.0000000Z Error: process completed with exit code 1";

        let lines = parse_log_text(text, &context(), fetched_at);

        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0].timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
                + chrono::Duration::nanoseconds(123_456_700)
        );
        assert_eq!(lines[0].message, "##[group]Run actions/checkout@v4");
        assert_eq!(lines[1].level, LogLevel::Error);
        assert_eq!(lines[1].job_id.as_deref(), Some("42"));
        assert_eq!(lines[1].source, "github:job:42");
    }

    #[test]
    fn test_lines_without_timestamp_use_fetch_time() {
        let fetched_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let text = "Started by user admin\nBuilding in workspace /var/jenkins\nFinished: SUCCESS";

        let lines = parse_log_text(text, &context(), fetched_at);

        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|line| line.timestamp == fetched_at));
        assert_eq!(lines[0].message, "Started by user admin");
        assert_eq!(lines[2].message, "Finished: SUCCESS");
    }

    #[test]
    fn test_line_count_parity_including_blank_lines() {
        let fetched_at = Utc::now();
        let text = "first\n\n   \nnot-a-date message\nlast";

        let lines = parse_log_text(text, &context(), fetched_at);

        assert_eq!(lines.len(), text.lines().count());
        assert_eq!(lines[1].message, "");
        assert_eq!(lines[1].level, LogLevel::Info);
    }

    #[test]
    fn test_output_is_chronological() {
        let fetched_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let text = "continuation without timestamp\n\
                    2024-05-01T10:00:05Z later\n\
                    2024-05-01T10:00:01Z earlier";

        let lines = parse_log_text(text, &context(), fetched_at);

        assert_eq!(lines.len(), 3);
        assert!(lines.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(lines[0].message, "earlier");
        assert_eq!(lines[2].message, "continuation without timestamp");
    }
}
