use chrono::{DateTime, Utc};
use log::warn;

use crate::models::PipelineStatus;

/// Provider-agnostic status vocabulary. Adapters combine provider-specific fields
/// (e.g. GitHub `status` + `conclusion`) before consulting it.
const STATUS_TABLE: &[(&str, PipelineStatus)] = &[
    ("success", PipelineStatus::Success),
    ("completed", PipelineStatus::Success),
    ("passed", PipelineStatus::Success),
    ("failed", PipelineStatus::Failed),
    ("failure", PipelineStatus::Failed),
    ("error", PipelineStatus::Failed),
    ("running", PipelineStatus::Running),
    ("in_progress", PipelineStatus::Running),
    ("pending", PipelineStatus::Pending),
    ("queued", PipelineStatus::Pending),
    ("waiting", PipelineStatus::Pending),
    ("cancelled", PipelineStatus::Cancelled),
    ("canceled", PipelineStatus::Cancelled),
    ("skipped", PipelineStatus::Skipped),
    ("timeout", PipelineStatus::Timeout),
    ("timed_out", PipelineStatus::Timeout),
];

/// Maps a native status token to the canonical status, ignoring case.
/// Unrecognized tokens map to `Unknown`.
pub fn normalize_status(native: &str) -> PipelineStatus {
    let token = native.trim().to_ascii_lowercase();
    STATUS_TABLE
        .iter()
        .find(|(known, _)| *known == token)
        .map_or(PipelineStatus::Unknown, |(_, status)| *status)
}

/// Picks the status to forward to a listing endpoint that filters by a single
/// status: the first one `to_native` can express. Every other requested status
/// is logged as dropped.
pub fn single_native_status(
    provider: &str,
    statuses: &[PipelineStatus],
    to_native: fn(PipelineStatus) -> Option<&'static str>,
) -> Option<&'static str> {
    let mut selected = None;

    for status in statuses {
        match (selected, to_native(*status)) {
            (None, Some(native)) => selected = Some(native),
            (None, None) => warn!("{provider} has no native filter for status {status}; dropping it"),
            (Some(native), _) => {
                warn!("{provider} filters by one status only; forwarding '{native}' and dropping {status}");
            }
        }
    }

    selected
}

/// Elapsed milliseconds between start and finish, clamped at zero.
/// `None` unless both timestamps are known.
pub fn compute_duration_ms(
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
) -> Option<i64> {
    match (started_at, finished_at) {
        (Some(start), Some(finish)) => Some((finish - start).num_milliseconds().max(0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_known_tokens_map_to_documented_status() {
        let cases = [
            ("success", PipelineStatus::Success),
            ("completed", PipelineStatus::Success),
            ("passed", PipelineStatus::Success),
            ("failed", PipelineStatus::Failed),
            ("failure", PipelineStatus::Failed),
            ("error", PipelineStatus::Failed),
            ("running", PipelineStatus::Running),
            ("in_progress", PipelineStatus::Running),
            ("pending", PipelineStatus::Pending),
            ("queued", PipelineStatus::Pending),
            ("waiting", PipelineStatus::Pending),
            ("cancelled", PipelineStatus::Cancelled),
            ("canceled", PipelineStatus::Cancelled),
            ("skipped", PipelineStatus::Skipped),
            ("timeout", PipelineStatus::Timeout),
            ("timed_out", PipelineStatus::Timeout),
        ];

        for (token, expected) in cases {
            assert_eq!(normalize_status(token), expected, "token {token}");
        }
    }

    #[test]
    fn test_normalization_ignores_case_and_whitespace() {
        assert_eq!(normalize_status("SUCCESS"), PipelineStatus::Success);
        assert_eq!(normalize_status("In_Progress"), PipelineStatus::Running);
        assert_eq!(normalize_status("  Canceled "), PipelineStatus::Cancelled);
    }

    #[test]
    fn test_unrecognized_tokens_are_unknown() {
        assert_eq!(normalize_status("manual"), PipelineStatus::Unknown);
        assert_eq!(normalize_status(""), PipelineStatus::Unknown);
        assert_eq!(normalize_status("action_required"), PipelineStatus::Unknown);
    }

    fn native(status: PipelineStatus) -> Option<&'static str> {
        match status {
            PipelineStatus::Failed => Some("failed"),
            PipelineStatus::Success => Some("success"),
            _ => None,
        }
    }

    #[test]
    fn test_single_native_status_skips_unmappable_statuses() {
        assert_eq!(
            single_native_status("test", &[PipelineStatus::Unknown, PipelineStatus::Failed], native),
            Some("failed")
        );
        assert_eq!(
            single_native_status("test", &[PipelineStatus::Success, PipelineStatus::Failed], native),
            Some("success")
        );
        assert_eq!(single_native_status("test", &[PipelineStatus::Unknown], native), None);
        assert_eq!(single_native_status("test", &[], native), None);
    }

    #[test]
    fn test_duration_is_difference_in_milliseconds() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let finish = Utc.with_ymd_and_hms(2024, 3, 1, 10, 2, 30).unwrap();
        assert_eq!(compute_duration_ms(Some(start), Some(finish)), Some(150_000));
    }

    #[test]
    fn test_duration_is_never_negative() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap();
        let finish = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(compute_duration_ms(Some(start), Some(finish)), Some(0));
    }

    #[test]
    fn test_duration_absent_without_finish() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(compute_duration_ms(Some(start), None), None);
        assert_eq!(compute_duration_ms(None, Some(start)), None);
    }
}
