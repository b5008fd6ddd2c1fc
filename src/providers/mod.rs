//! Provider contract and the adapters implementing it.
//!
//! Each adapter owns an authenticated [`http::ApiClient`] and translates its
//! native shapes into the canonical model in [`crate::models`]. Behavior shared by
//! all adapters (status normalization, durations, metrics, log parsing, webhook
//! signatures) lives in free functions so adapters compose it instead of
//! inheriting it.

pub mod github;
pub mod gitlab;
pub mod http;
pub mod jenkins;
pub mod logs;
pub mod metrics;
pub mod normalize;
pub mod signature;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    LogLine, PipelineFilter, PipelineRecord, ProviderMetrics, WebhookEnvelope, WebhookRegistration,
};

pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;
pub use jenkins::JenkinsProvider;

/// Capability set every CI/CD integration implements.
///
/// Fetch operations record metrics and then propagate errors; retrying is the
/// caller's decision. Connectivity checks and webhook processing never fail
/// outward.
#[async_trait]
pub trait CiProvider: Send + Sync {
    /// Identifier of the external system, e.g. "github".
    fn provider_type(&self) -> &str;

    /// Lightweight authenticated probe.
    ///
    /// Returns `Ok(false)` when the remote rejects the credentials or cannot be
    /// reached, and `Err` only when a mandatory setting is missing.
    async fn validate_config(&self) -> Result<bool>;

    /// Connectivity check that does not require full token scope.
    async fn test_connection(&self) -> bool;

    async fn fetch_pipeline(&self, pipeline_id: &str) -> Result<PipelineRecord>;

    async fn fetch_pipelines(
        &self,
        repository: &str,
        filter: &PipelineFilter,
    ) -> Result<Vec<PipelineRecord>>;

    async fn fetch_pipeline_run(&self, pipeline_id: &str, run_id: &str) -> Result<PipelineRecord>;

    /// Log lines in chronological order.
    async fn fetch_logs(
        &self,
        pipeline_id: &str,
        run_id: &str,
        job_id: Option<&str>,
        step_id: Option<&str>,
    ) -> Result<Vec<LogLine>>;

    /// Maps a webhook delivery to a pipeline record. `None` means the event is
    /// not modeled or the payload was unusable; it is never an error.
    fn process_webhook(&self, envelope: &WebhookEnvelope) -> Option<PipelineRecord>;

    /// Constant-time HMAC check of the raw request body.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool;

    fn supported_events(&self) -> &'static [&'static str];

    async fn setup_webhook(
        &self,
        repository: &str,
        url: &str,
        events: &[String],
    ) -> Result<WebhookRegistration>;

    fn metrics(&self) -> ProviderMetrics;
}
