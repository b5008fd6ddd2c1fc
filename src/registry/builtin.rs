use std::sync::Arc;

use crate::config::{
    EnvLookup, GitHubConfig, GitLabConfig, JenkinsConfig, ProviderConfig, ProviderKind,
};
use crate::error::CILensError;
use crate::providers::gitlab::api_base_url;
use crate::providers::http::parse_base_url;
use crate::providers::{CiProvider, GitHubProvider, GitLabProvider, JenkinsProvider};

use super::ProviderRegistration;

pub fn github_registration() -> ProviderRegistration {
    ProviderRegistration::new(ProviderKind::GitHub.as_str(), |config| match config {
        ProviderConfig::GitHub(github) => {
            Ok(Arc::new(GitHubProvider::new(github.clone())?) as Arc<dyn CiProvider>)
        }
        other => Err(mismatched(ProviderKind::GitHub, other)),
    })
    .with_display_name("GitHub Actions")
    .with_validator(|config| match config {
        ProviderConfig::GitHub(github) => {
            let mut errors = common_errors(&github.base_url, github.timeout_ms);
            if github.owner.is_some() != github.repo.is_some() {
                errors.push("owner and repo must be set together".to_string());
            }
            errors
        }
        other => vec![mismatched(ProviderKind::GitHub, other).to_string()],
    })
    .with_required_fields(&["token"])
    .with_optional_fields(&["base_url", "timeout_ms", "webhook_secret", "owner", "repo"])
    .with_supported_features(&[
        "pipelines",
        "jobs",
        "steps",
        "job_logs",
        "runners",
        "webhooks",
        "webhook_setup",
    ])
    .with_env_config(github_from_env)
}

pub fn gitlab_registration() -> ProviderRegistration {
    ProviderRegistration::new(ProviderKind::GitLab.as_str(), |config| match config {
        ProviderConfig::GitLab(gitlab) => {
            Ok(Arc::new(GitLabProvider::new(gitlab.clone())?) as Arc<dyn CiProvider>)
        }
        other => Err(mismatched(ProviderKind::GitLab, other)),
    })
    .with_display_name("GitLab CI")
    .with_validator(|config| match config {
        ProviderConfig::GitLab(gitlab) => {
            common_errors(&api_base_url(&gitlab.base_url), gitlab.timeout_ms)
        }
        other => vec![mismatched(ProviderKind::GitLab, other).to_string()],
    })
    .with_required_fields(&["token"])
    .with_optional_fields(&["base_url", "timeout_ms", "webhook_secret", "project_id"])
    .with_supported_features(&[
        "pipelines",
        "jobs",
        "job_logs",
        "pipeline_logs",
        "artifacts",
        "runners",
        "webhooks",
        "webhook_setup",
    ])
    .with_env_config(gitlab_from_env)
}

pub fn jenkins_registration() -> ProviderRegistration {
    ProviderRegistration::new(ProviderKind::Jenkins.as_str(), |config| match config {
        ProviderConfig::Jenkins(jenkins) => {
            Ok(Arc::new(JenkinsProvider::new(jenkins.clone())?) as Arc<dyn CiProvider>)
        }
        other => Err(mismatched(ProviderKind::Jenkins, other)),
    })
    .with_display_name("Jenkins")
    .with_validator(|config| match config {
        ProviderConfig::Jenkins(jenkins) => common_errors(&jenkins.base_url, jenkins.timeout_ms),
        other => vec![mismatched(ProviderKind::Jenkins, other).to_string()],
    })
    .with_required_fields(&["base_url", "username", "token"])
    .with_optional_fields(&["timeout_ms", "webhook_secret"])
    .with_supported_features(&["pipelines", "stages", "pipeline_logs", "artifacts", "webhooks"])
    .with_env_config(jenkins_from_env)
}

fn github_from_env(lookup: EnvLookup<'_>) -> Option<ProviderConfig> {
    GitHubConfig::from_env_with(lookup).map(ProviderConfig::GitHub)
}

fn gitlab_from_env(lookup: EnvLookup<'_>) -> Option<ProviderConfig> {
    GitLabConfig::from_env_with(lookup).map(ProviderConfig::GitLab)
}

fn jenkins_from_env(lookup: EnvLookup<'_>) -> Option<ProviderConfig> {
    JenkinsConfig::from_env_with(lookup).map(ProviderConfig::Jenkins)
}

fn common_errors(base_url: &str, timeout_ms: u64) -> Vec<String> {
    let mut errors = Vec::new();
    if let Err(err) = parse_base_url(base_url) {
        errors.push(format!("Invalid base_url '{base_url}': {err}"));
    }
    if timeout_ms == 0 {
        errors.push("timeout_ms must be greater than zero".to_string());
    }
    errors
}

fn mismatched(expected: ProviderKind, config: &ProviderConfig) -> CILensError {
    CILensError::Configuration(format!(
        "expected a {expected} configuration, got '{}'",
        config.provider_type()
    ))
}
