use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
use log::{debug, error, info, warn};

use crate::config::{GitHubConfig, ProviderKind};
use crate::error::{CILensError, Result};
use crate::models::{
    CommitInfo, JobRecord, LogLine, PipelineFilter, PipelineRecord, PipelineStatus,
    ProviderMetrics, RunnerInfo, StepRecord, TriggerInfo, WebhookEnvelope, WebhookRegistration,
};
use crate::providers::logs::{parse_log_text, LogContext};
use crate::providers::normalize::{compute_duration_ms, normalize_status, single_native_status};
use crate::providers::signature::{generate_secret, verify_signature};
use crate::providers::CiProvider;

use super::client::{GitHubClient, RunsQuery};
use super::types::{GitHubJob, GitHubStep, GitHubWorkflowRun};

const SIGNATURE_PREFIX: &str = "sha256=";

const SUPPORTED_EVENTS: &[&str] = &[
    "workflow_run",
    "workflow_job",
    "check_run",
    "check_suite",
    "push",
    "pull_request",
];

/// GitHub Actions adapter.
pub struct GitHubProvider {
    client: GitHubClient,
    config: GitHubConfig,
}

impl GitHubProvider {
    /// Create a new GitHub Actions provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let client = GitHubClient::new(&config)?;
        debug!(
            "Created GitHub provider for {} (token {})",
            config.base_url,
            config.token.masked()
        );

        Ok(Self { client, config })
    }

    /// `owner/repo` from the configuration, required by single-run lookups.
    fn configured_repository(&self) -> Result<String> {
        match (self.config.owner.as_deref(), self.config.repo.as_deref()) {
            (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => {
                Ok(format!("{owner}/{repo}"))
            }
            _ => Err(CILensError::Configuration(
                "GitHub owner and repository must be configured".to_string(),
            )),
        }
    }

    async fn fetch_run_with_jobs(&self, repository: &str, run_id: &str) -> Result<PipelineRecord> {
        let run = self.client.fetch_workflow_run(repository, run_id).await?;
        let jobs = self.client.fetch_jobs_for_run(repository, run.id).await?;
        Ok(to_pipeline_record(run, jobs, repository))
    }
}

/// Splits `owner/repo`, rejecting anything else.
pub fn parse_repository(repository: &str) -> Result<(&str, &str)> {
    let parts: Vec<&str> = repository.split('/').collect();
    match parts.as_slice() {
        [owner, repo] if !owner.is_empty() && !repo.is_empty() => Ok((*owner, *repo)),
        _ => Err(CILensError::Configuration(format!(
            "Repository must be in format 'owner/repo', got '{repository}'"
        ))),
    }
}

/// Completed runs carry their outcome in `conclusion`; everything else in `status`.
pub fn combined_status(status: Option<&str>, conclusion: Option<&str>) -> PipelineStatus {
    let status = status.map(|s| s.trim().to_ascii_lowercase());
    let conclusion = conclusion.map(|c| c.trim().to_ascii_lowercase());
    let token = match status.as_deref() {
        Some("completed") => conclusion.as_deref().unwrap_or("completed"),
        Some(other) => other,
        None => conclusion.as_deref().unwrap_or_default(),
    };

    match token {
        "requested" => PipelineStatus::Pending,
        "startup_failure" => PipelineStatus::Failed,
        other => normalize_status(other),
    }
}

fn is_completed(status: Option<&str>) -> bool {
    status.is_some_and(|s| s.trim().eq_ignore_ascii_case("completed"))
}

/// Canonical status to the `status` query value of the runs listing.
fn native_status_filter(status: PipelineStatus) -> Option<&'static str> {
    match status {
        PipelineStatus::Success => Some("success"),
        PipelineStatus::Failed => Some("failure"),
        PipelineStatus::Running => Some("in_progress"),
        PipelineStatus::Pending => Some("queued"),
        PipelineStatus::Cancelled => Some("cancelled"),
        PipelineStatus::Skipped => Some("skipped"),
        PipelineStatus::Timeout => Some("timed_out"),
        PipelineStatus::Unknown => None,
    }
}

pub fn to_pipeline_record(
    run: GitHubWorkflowRun,
    jobs: Vec<GitHubJob>,
    fallback_repository: &str,
) -> PipelineRecord {
    let status = combined_status(run.status.as_deref(), run.conclusion.as_deref());
    let started_at = run.run_started_at.or(run.created_at);
    let finished_at = if is_completed(run.status.as_deref()) {
        run.updated_at
    } else {
        None
    };

    let mut metadata = BTreeMap::new();
    if let Some(workflow_id) = run.workflow_id {
        metadata.insert("workflow_id".to_string(), workflow_id.into());
    }
    if let Some(run_number) = run.run_number {
        metadata.insert("run_number".to_string(), run_number.into());
    }
    if let Some(run_attempt) = run.run_attempt {
        metadata.insert("run_attempt".to_string(), run_attempt.into());
    }
    if let Some(path) = &run.path {
        metadata.insert("workflow_path".to_string(), path.clone().into());
    }

    let commit = run.head_commit.as_ref();
    let actor = run
        .triggering_actor
        .as_ref()
        .or(run.actor.as_ref())
        .map(|user| user.login.clone());

    PipelineRecord {
        id: run.id.to_string(),
        provider: ProviderKind::GitHub.as_str().to_string(),
        name: run
            .name
            .clone()
            .or_else(|| run.display_title.clone())
            .unwrap_or_else(|| format!("run {}", run.id)),
        repository: run
            .repository
            .as_ref()
            .map_or_else(|| fallback_repository.to_string(), |r| r.full_name.clone()),
        branch: run.head_branch.clone(),
        status,
        started_at,
        finished_at,
        duration_ms: compute_duration_ms(started_at, finished_at),
        trigger: TriggerInfo::new(run.event.clone(), actor),
        commit: CommitInfo::new(
            run.head_sha.clone().or_else(|| commit.and_then(|c| c.id.clone())),
            commit.and_then(|c| c.message.clone()),
            commit.and_then(|c| c.author.as_ref()).and_then(|a| a.name.clone()),
        ),
        jobs: jobs.into_iter().map(to_job_record).collect(),
        artifacts: Vec::new(),
        logs: Vec::new(),
        web_url: run.html_url,
        metadata,
    }
}

fn to_job_record(job: GitHubJob) -> JobRecord {
    let runner = job.runner_name.clone().map(|name| RunnerInfo {
        id: job.runner_id.map(|id| id.to_string()),
        name,
        labels: job.labels.clone(),
    });

    JobRecord {
        id: job.id.to_string(),
        name: job.name,
        stage: None,
        status: combined_status(job.status.as_deref(), job.conclusion.as_deref()),
        started_at: job.started_at,
        finished_at: job.completed_at,
        duration_ms: compute_duration_ms(job.started_at, job.completed_at),
        runner,
        steps: job.steps.into_iter().map(to_step_record).collect(),
    }
}

fn to_step_record(step: GitHubStep) -> StepRecord {
    StepRecord {
        id: step.number.to_string(),
        name: step.name,
        status: combined_status(step.status.as_deref(), step.conclusion.as_deref()),
        started_at: step.started_at,
        finished_at: step.completed_at,
        duration_ms: compute_duration_ms(step.started_at, step.completed_at),
    }
}

fn workflow_run_from_webhook(envelope: &WebhookEnvelope) -> Result<(GitHubWorkflowRun, String)> {
    let run_value = envelope
        .payload
        .get("workflow_run")
        .cloned()
        .ok_or_else(|| CILensError::WebhookPayload("missing workflow_run object".to_string()))?;
    let run: GitHubWorkflowRun = serde_json::from_value(run_value)
        .map_err(|e| CILensError::WebhookPayload(format!("invalid workflow_run: {e}")))?;

    let repository = envelope
        .payload
        .pointer("/repository/full_name")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok((run, repository))
}

#[async_trait]
impl CiProvider for GitHubProvider {
    fn provider_type(&self) -> &str {
        ProviderKind::GitHub.as_str()
    }

    async fn validate_config(&self) -> Result<bool> {
        if self.config.token.is_empty() {
            return Err(CILensError::Configuration("GitHub token is required".to_string()));
        }

        match self.client.fetch_authenticated_user().await {
            Ok(_) => Ok(true),
            Err(err) if err.is_auth_failure() => {
                warn!("GitHub rejected the configured token: {err}");
                Ok(false)
            }
            Err(err) => {
                error!("GitHub configuration check failed: {err}");
                Ok(false)
            }
        }
    }

    async fn test_connection(&self) -> bool {
        match self.client.fetch_rate_limit().await {
            Ok(_) => true,
            Err(err) => {
                error!("GitHub connection test failed: {err}");
                false
            }
        }
    }

    async fn fetch_pipeline(&self, pipeline_id: &str) -> Result<PipelineRecord> {
        let repository = self.configured_repository()?;
        self.fetch_run_with_jobs(&repository, pipeline_id).await
    }

    async fn fetch_pipelines(
        &self,
        repository: &str,
        filter: &PipelineFilter,
    ) -> Result<Vec<PipelineRecord>> {
        parse_repository(repository)?;

        // The runs listing accepts a single status.
        let status = single_native_status("GitHub", &filter.status, native_status_filter);

        let query = RunsQuery {
            limit: filter.limit(),
            branch: filter.branch.as_deref(),
            since: filter.since,
            status,
        };

        info!("Fetching up to {} workflow runs for {repository}", query.limit);
        let runs = self.client.fetch_workflow_runs(repository, &query).await?;

        let records = try_join_all(runs.into_iter().map(|run| async move {
            let jobs = self.client.fetch_jobs_for_run(repository, run.id).await?;
            Ok::<_, CILensError>(to_pipeline_record(run, jobs, repository))
        }))
        .await?;

        info!("Fetched {} workflow runs for {repository}", records.len());
        Ok(records)
    }

    async fn fetch_pipeline_run(&self, pipeline_id: &str, run_id: &str) -> Result<PipelineRecord> {
        let repository = self.configured_repository()?;
        debug!("Fetching run {run_id} of workflow {pipeline_id} in {repository}");
        self.fetch_run_with_jobs(&repository, run_id).await
    }

    /// GitHub serves one plain-text log per job; `step_id` is recorded on the
    /// returned lines but does not narrow them. Without a job id the only source
    /// is the whole-run zip archive, which is not parsed: an empty list is returned.
    async fn fetch_logs(
        &self,
        pipeline_id: &str,
        run_id: &str,
        job_id: Option<&str>,
        step_id: Option<&str>,
    ) -> Result<Vec<LogLine>> {
        let repository = self.configured_repository()?;

        let Some(job_id) = job_id else {
            warn!(
                "Whole-run log archives are not supported (workflow {pipeline_id}, run {run_id}); returning no lines"
            );
            return Ok(Vec::new());
        };

        let text = self.client.fetch_job_logs(&repository, job_id).await?;
        let source = format!("github:job:{job_id}");
        let context = LogContext {
            source: &source,
            job_id: Some(job_id),
            step_id,
        };

        Ok(parse_log_text(&text, &context, Utc::now()))
    }

    fn process_webhook(&self, envelope: &WebhookEnvelope) -> Option<PipelineRecord> {
        if envelope.event != "workflow_run" {
            debug!("Ignoring GitHub webhook event '{}'", envelope.event);
            return None;
        }

        match workflow_run_from_webhook(envelope) {
            Ok((run, repository)) => Some(to_pipeline_record(run, Vec::new(), &repository)),
            Err(err) => {
                warn!("Dropping GitHub webhook delivery: {err}");
                None
            }
        }
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        let secret = self.config.webhook_secret.as_ref().map(|s| s.as_str());
        verify_signature(secret, payload, signature, SIGNATURE_PREFIX)
    }

    fn supported_events(&self) -> &'static [&'static str] {
        SUPPORTED_EVENTS
    }

    async fn setup_webhook(
        &self,
        repository: &str,
        url: &str,
        events: &[String],
    ) -> Result<WebhookRegistration> {
        parse_repository(repository)?;

        let secret = match &self.config.webhook_secret {
            Some(secret) if !secret.is_empty() => secret.as_str().to_string(),
            _ => generate_secret()?,
        };

        let hook = self.client.create_hook(repository, url, &secret, events).await?;
        info!("Created GitHub webhook {} on {repository}", hook.id);

        Ok(WebhookRegistration {
            id: hook.id.to_string(),
            secret,
        })
    }

    fn metrics(&self) -> ProviderMetrics {
        self.client.metrics()
    }
}
