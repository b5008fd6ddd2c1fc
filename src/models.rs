//! Provider-agnostic pipeline model.
//!
//! Every adapter translates its native API and webhook shapes into these types.
//! Values are produced fresh on each call and never mutated afterwards.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder used when a provider does not report author or commit metadata.
pub const UNKNOWN: &str = "unknown";

/// Closed set of pipeline, job, and step states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    #[default]
    Unknown,
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
    Skipped,
    Timeout,
}

impl PipelineStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Cancelled | Self::Skipped | Self::Timeout
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Skipped => "SKIPPED",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl Display for PipelineStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    /// Provider-unique identifier, stable across repeated fetches of the same execution.
    pub id: String,
    /// Provider type that produced this record (e.g. "github").
    pub provider: String,
    pub name: String,
    /// Repository or project the pipeline belongs to.
    pub repository: String,
    pub branch: Option<String>,
    pub status: PipelineStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Always `finished_at - started_at` in milliseconds, never negative.
    pub duration_ms: Option<i64>,
    pub trigger: TriggerInfo,
    pub commit: CommitInfo,
    pub jobs: Vec<JobRecord>,
    pub artifacts: Vec<Artifact>,
    pub logs: Vec<LogLine>,
    pub web_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// What started a pipeline and who started it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub event: String,
    pub actor: String,
}

impl TriggerInfo {
    pub fn new(event: Option<String>, actor: Option<String>) -> Self {
        Self {
            event: or_unknown(event),
            actor: or_unknown(actor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: String,
}

impl CommitInfo {
    pub fn new(sha: Option<String>, message: Option<String>, author: Option<String>) -> Self {
        Self {
            sha: or_unknown(sha),
            message: or_unknown(message),
            author: or_unknown(author),
        }
    }
}

fn or_unknown(value: Option<String>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub name: String,
    pub stage: Option<String>,
    pub status: PipelineStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub runner: Option<RunnerInfo>,
    pub steps: Vec<StepRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: String,
    pub name: String,
    pub status: PipelineStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerInfo {
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub size_bytes: Option<u64>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Where the line came from, e.g. "github:job:123".
    pub source: String,
    pub job_id: Option<String>,
    pub step_id: Option<String>,
}

/// Abstract pipeline query. Each adapter maps it onto its own query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineFilter {
    pub branch: Option<String>,
    pub limit: Option<usize>,
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Vec<PipelineStatus>,
}

impl PipelineFilter {
    pub const DEFAULT_LIMIT: usize = 50;

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }
}

/// Inbound webhook delivery as handed over by the HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub provider: String,
    pub event: String,
    pub payload: serde_json::Value,
    pub signature: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl WebhookEnvelope {
    pub fn new(
        provider: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
        signature: Option<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            event: event.into(),
            payload,
            signature,
            received_at: Utc::now(),
        }
    }

    /// Builds an envelope from the raw request body.
    ///
    /// A body that is not valid JSON is kept as a JSON string so that the adapter
    /// can still acknowledge the delivery.
    pub fn from_raw(
        provider: impl Into<String>,
        event: impl Into<String>,
        raw_body: &[u8],
        signature: Option<String>,
    ) -> Self {
        let payload = serde_json::from_slice(raw_body).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(raw_body).into_owned())
        });
        Self::new(provider, event, payload, signature)
    }
}

/// Provider-side webhook created by `setup_webhook`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRegistration {
    pub id: String,
    pub secret: String,
}

/// Per-adapter call statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetrics {
    pub api_calls_count: u64,
    /// Percentage of successful calls (0-100).
    pub api_calls_success_rate: f64,
    /// Mean latency in milliseconds.
    pub average_response_time: f64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&PipelineStatus::Cancelled).unwrap();
        assert_eq!(json, "\"CANCELLED\"");
        assert_eq!(PipelineStatus::Timeout.to_string(), "TIMEOUT");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(PipelineStatus::Success.is_terminal());
        assert!(PipelineStatus::Timeout.is_terminal());
        assert!(!PipelineStatus::Running.is_terminal());
        assert!(!PipelineStatus::Pending.is_terminal());
        assert!(!PipelineStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_missing_commit_metadata_uses_sentinel() {
        let commit = CommitInfo::new(Some("abc123".to_string()), None, Some("  ".to_string()));
        assert_eq!(commit.sha, "abc123");
        assert_eq!(commit.message, UNKNOWN);
        assert_eq!(commit.author, UNKNOWN);
    }

    #[test]
    fn test_trigger_defaults_to_unknown() {
        let trigger = TriggerInfo::new(None, None);
        assert_eq!(trigger.event, UNKNOWN);
        assert_eq!(trigger.actor, UNKNOWN);
    }

    #[test]
    fn test_filter_default_limit() {
        assert_eq!(PipelineFilter::default().limit(), PipelineFilter::DEFAULT_LIMIT);
        let filter = PipelineFilter {
            limit: Some(5),
            ..PipelineFilter::default()
        };
        assert_eq!(filter.limit(), 5);
    }

    #[test]
    fn test_envelope_from_raw_parses_json() {
        let envelope = WebhookEnvelope::from_raw("github", "workflow_run", br#"{"action":"completed"}"#, None);
        assert_eq!(envelope.payload["action"], "completed");
    }

    #[test]
    fn test_envelope_from_raw_keeps_invalid_json_as_string() {
        let envelope = WebhookEnvelope::from_raw("gitlab", "Pipeline Hook", b"not json", None);
        assert_eq!(envelope.payload, serde_json::Value::String("not json".to_string()));
    }
}
