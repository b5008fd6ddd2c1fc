//! Provider adapters that pull CI/CD pipeline data from GitHub Actions, GitLab CI
//! and Jenkins and normalize it into one canonical model.
//!
//! Build a [`ProviderRegistry`] once at startup, register or use the builtin
//! adapters, and hand it to whatever syncs pipelines or receives webhooks.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod registry;

pub use config::{CustomConfig, GitHubConfig, GitLabConfig, JenkinsConfig, ProviderConfig, ProviderKind};
pub use error::{CILensError, Result};
pub use models::{
    JobRecord, LogLine, PipelineFilter, PipelineRecord, PipelineStatus, ProviderMetrics,
    WebhookEnvelope,
};
pub use providers::CiProvider;
pub use registry::{ProviderRegistration, ProviderRegistry};
