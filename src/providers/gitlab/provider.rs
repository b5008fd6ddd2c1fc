use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
use log::{debug, error, info, warn};

use crate::config::{GitLabConfig, ProviderKind};
use crate::error::{CILensError, Result};
use crate::models::{
    Artifact, CommitInfo, JobRecord, LogLine, PipelineFilter, PipelineRecord, PipelineStatus,
    ProviderMetrics, RunnerInfo, TriggerInfo, WebhookEnvelope, WebhookRegistration,
};
use crate::providers::logs::{parse_log_text, LogContext};
use crate::providers::normalize::{compute_duration_ms, normalize_status, single_native_status};
use crate::providers::signature::{generate_secret, verify_signature};
use crate::providers::CiProvider;

use super::client::{GitLabClient, PipelinesQuery};
use super::types::{GitLabCommit, GitLabJob, GitLabPipeline, PipelineHookPayload};

const SIGNATURE_PREFIX: &str = "";

const SUPPORTED_EVENTS: &[&str] = &[
    "pipeline",
    "job",
    "push",
    "merge_request",
    "tag_push",
    "deployment",
];

const TIMEOUT_FAILURE_REASONS: &[&str] = &["job_execution_timeout", "stuck_or_timeout_failure"];

/// GitLab CI adapter.
///
/// GitLab pipeline ids are only unique per instance when paired with their
/// project, so records use `<project_id>:<pipeline_id>` as their id.
pub struct GitLabProvider {
    client: GitLabClient,
    config: GitLabConfig,
}

impl GitLabProvider {
    pub fn new(config: GitLabConfig) -> Result<Self> {
        let client = GitLabClient::new(&config)?;
        debug!(
            "Created GitLab provider for {} (token {})",
            config.base_url,
            config.token.masked()
        );

        Ok(Self { client, config })
    }

    /// Resolves `<project>:<pipeline>` or a bare pipeline id within the
    /// configured project.
    fn resolve_pipeline_id<'a>(&'a self, pipeline_id: &'a str) -> Result<(&'a str, &'a str)> {
        if let Some((project, id)) = pipeline_id.rsplit_once(':') {
            if !project.is_empty() && !id.is_empty() {
                return Ok((project, id));
            }
        }

        match self.config.project_id.as_deref() {
            Some(project) if !project.is_empty() => Ok((project, pipeline_id)),
            _ => Err(CILensError::Configuration(format!(
                "GitLab pipeline id '{pipeline_id}' must be '<project_id>:<pipeline_id>' when no project is configured"
            ))),
        }
    }

    async fn fetch_pipeline_with_jobs(&self, project: &str, pipeline_id: &str) -> Result<PipelineRecord> {
        let (pipeline, jobs) = futures::try_join!(
            self.client.fetch_pipeline(project, pipeline_id),
            self.client.fetch_pipeline_jobs(project, pipeline_id),
        )?;

        Ok(to_pipeline_record(pipeline, jobs, project, None))
    }
}

/// Folds GitLab's extra states onto the shared vocabulary. A failed job whose
/// `failure_reason` is a timeout is reported as `Timeout`.
pub fn combined_status(status: Option<&str>, failure_reason: Option<&str>) -> PipelineStatus {
    let Some(status) = status else {
        return PipelineStatus::Unknown;
    };

    match status.trim().to_ascii_lowercase().as_str() {
        "created" | "waiting_for_resource" | "preparing" | "scheduled" | "manual" => {
            PipelineStatus::Pending
        }
        "canceling" => PipelineStatus::Cancelled,
        "failed" if failure_reason.is_some_and(|r| TIMEOUT_FAILURE_REASONS.contains(&r)) => {
            PipelineStatus::Timeout
        }
        other => normalize_status(other),
    }
}

/// Pipelines have no timeout state, so `Timeout` widens to `failed`.
fn native_status_filter(status: PipelineStatus) -> Option<&'static str> {
    match status {
        PipelineStatus::Success => Some("success"),
        PipelineStatus::Failed | PipelineStatus::Timeout => Some("failed"),
        PipelineStatus::Running => Some("running"),
        PipelineStatus::Pending => Some("pending"),
        PipelineStatus::Cancelled => Some("canceled"),
        PipelineStatus::Skipped => Some("skipped"),
        PipelineStatus::Unknown => None,
    }
}

pub fn to_pipeline_record(
    pipeline: GitLabPipeline,
    mut jobs: Vec<GitLabJob>,
    repository: &str,
    commit: Option<&GitLabCommit>,
) -> PipelineRecord {
    jobs.sort_by_key(|job| job.id);

    let project_key = pipeline
        .project_id
        .map_or_else(|| repository.to_string(), |id| id.to_string());
    let started_at = pipeline.started_at.or(pipeline.created_at);
    let finished_at = pipeline.finished_at;

    // The pipeline endpoint carries no commit message; every job embeds the commit.
    let commit = commit.or_else(|| jobs.iter().find_map(|job| job.commit.as_ref()));
    let commit_info = CommitInfo::new(
        pipeline
            .sha
            .clone()
            .or_else(|| commit.and_then(|c| c.id.clone())),
        commit.and_then(|c| c.message.clone()),
        commit.and_then(GitLabCommit::author),
    );

    let mut metadata = BTreeMap::new();
    metadata.insert("pipeline_id".to_string(), pipeline.id.into());
    if let Some(iid) = pipeline.iid {
        metadata.insert("iid".to_string(), iid.into());
    }
    if let Some(project_id) = pipeline.project_id {
        metadata.insert("project_id".to_string(), project_id.into());
    }

    let artifacts = jobs.iter().flat_map(job_artifacts).collect();

    PipelineRecord {
        id: format!("{project_key}:{}", pipeline.id),
        provider: ProviderKind::GitLab.as_str().to_string(),
        name: pipeline
            .name
            .clone()
            .unwrap_or_else(|| format!("pipeline #{}", pipeline.iid.unwrap_or(pipeline.id))),
        repository: repository.to_string(),
        branch: pipeline.ref_.clone(),
        status: combined_status(pipeline.status.as_deref(), None),
        started_at,
        finished_at,
        duration_ms: compute_duration_ms(started_at, finished_at),
        trigger: TriggerInfo::new(
            pipeline.source.clone(),
            pipeline.user.as_ref().and_then(|u| u.username.clone()),
        ),
        commit: commit_info,
        jobs: jobs.into_iter().map(to_job_record).collect(),
        artifacts,
        logs: Vec::new(),
        web_url: pipeline.web_url,
        metadata,
    }
}

fn to_job_record(job: GitLabJob) -> JobRecord {
    let runner = job.runner.map(|runner| RunnerInfo {
        id: runner.id.map(|id| id.to_string()),
        name: runner
            .description
            .unwrap_or_else(|| runner.id.map_or_else(|| "runner".to_string(), |id| format!("runner {id}"))),
        labels: if runner.tags.is_empty() {
            job.tag_list.clone()
        } else {
            runner.tags
        },
    });

    JobRecord {
        id: job.id.to_string(),
        name: job.name,
        stage: job.stage,
        status: combined_status(job.status.as_deref(), job.failure_reason.as_deref()),
        started_at: job.started_at,
        finished_at: job.finished_at,
        duration_ms: compute_duration_ms(job.started_at, job.finished_at),
        runner,
        steps: Vec::new(),
    }
}

/// Downloadable job artifacts. The trace is exposed through `fetch_logs` instead.
fn job_artifacts(job: &GitLabJob) -> Vec<Artifact> {
    let download_url = job
        .web_url
        .as_ref()
        .map(|url| format!("{}/artifacts/download", url.trim_end_matches('/')));

    if !job.artifacts.is_empty() {
        return job
            .artifacts
            .iter()
            .filter(|artifact| artifact.file_type != "trace")
            .map(|artifact| Artifact {
                name: artifact.filename.clone(),
                size_bytes: artifact.size,
                url: if artifact.file_type == "archive" {
                    download_url.clone()
                } else {
                    None
                },
            })
            .collect();
    }

    job.artifacts_file
        .as_ref()
        .and_then(|file| {
            file.filename.clone().map(|name| Artifact {
                name,
                size_bytes: file.size,
                url: download_url,
            })
        })
        .into_iter()
        .collect()
}

fn is_pipeline_event(envelope: &WebhookEnvelope) -> bool {
    envelope.event == "Pipeline Hook"
        || envelope.event == "pipeline"
        || envelope.payload.get("object_kind").and_then(serde_json::Value::as_str) == Some("pipeline")
}

fn pipeline_from_webhook(envelope: &WebhookEnvelope) -> Result<PipelineRecord> {
    let payload: PipelineHookPayload = serde_json::from_value(envelope.payload.clone())
        .map_err(|e| CILensError::WebhookPayload(format!("invalid pipeline hook: {e}")))?;

    let mut pipeline = payload.object_attributes;
    let project = payload.project.as_ref();
    pipeline.project_id = pipeline.project_id.or(project.and_then(|p| p.id));
    pipeline.user = pipeline.user.or(payload.user);

    let repository = project
        .and_then(|p| p.path_with_namespace.clone())
        .or_else(|| pipeline.project_id.map(|id| id.to_string()))
        .ok_or_else(|| CILensError::WebhookPayload("missing project".to_string()))?;

    Ok(to_pipeline_record(
        pipeline,
        payload.builds,
        &repository,
        payload.commit.as_ref(),
    ))
}

#[async_trait]
impl CiProvider for GitLabProvider {
    fn provider_type(&self) -> &str {
        ProviderKind::GitLab.as_str()
    }

    async fn validate_config(&self) -> Result<bool> {
        if self.config.token.is_empty() {
            return Err(CILensError::Configuration("GitLab token is required".to_string()));
        }

        match self.client.fetch_current_user().await {
            Ok(_) => Ok(true),
            Err(err) if err.is_auth_failure() => {
                warn!("GitLab rejected the configured token: {err}");
                Ok(false)
            }
            Err(err) => {
                error!("GitLab configuration check failed: {err}");
                Ok(false)
            }
        }
    }

    async fn test_connection(&self) -> bool {
        match self.client.fetch_version().await {
            Ok(_) => true,
            Err(err) => {
                error!("GitLab connection test failed: {err}");
                false
            }
        }
    }

    async fn fetch_pipeline(&self, pipeline_id: &str) -> Result<PipelineRecord> {
        let (project, id) = self.resolve_pipeline_id(pipeline_id)?;
        self.fetch_pipeline_with_jobs(project, id).await
    }

    async fn fetch_pipelines(
        &self,
        repository: &str,
        filter: &PipelineFilter,
    ) -> Result<Vec<PipelineRecord>> {
        if repository.trim().is_empty() {
            return Err(CILensError::Configuration(
                "GitLab project id or path is required".to_string(),
            ));
        }

        // The pipelines listing accepts a single status.
        let status = single_native_status("GitLab", &filter.status, native_status_filter);

        let query = PipelinesQuery {
            limit: filter.limit(),
            ref_: filter.branch.as_deref(),
            updated_after: filter.since,
            status,
        };

        info!("Fetching up to {} pipelines for {repository}", query.limit);
        let pipelines = self.client.fetch_pipelines(repository, &query).await?;

        // Listing entries lack timing and user data; load the full pipeline.
        let records = try_join_all(pipelines.iter().map(|pipeline| {
            let id = pipeline.id.to_string();
            async move { self.fetch_pipeline_with_jobs(repository, &id).await }
        }))
        .await?;

        info!("Fetched {} pipelines for {repository}", records.len());
        Ok(records)
    }

    /// `pipeline_id` is the project (id or path) and `run_id` the pipeline id.
    async fn fetch_pipeline_run(&self, pipeline_id: &str, run_id: &str) -> Result<PipelineRecord> {
        debug!("Fetching pipeline {run_id} of project {pipeline_id}");
        self.fetch_pipeline_with_jobs(pipeline_id, run_id).await
    }

    /// Job traces are plain text without timestamps. Without a job id every
    /// job trace of the pipeline is returned, in job order.
    async fn fetch_logs(
        &self,
        pipeline_id: &str,
        run_id: &str,
        job_id: Option<&str>,
        step_id: Option<&str>,
    ) -> Result<Vec<LogLine>> {
        let project = pipeline_id;
        let fetched_at = Utc::now();

        let job_ids = match job_id {
            Some(job_id) => vec![job_id.to_string()],
            None => {
                let mut jobs = self.client.fetch_pipeline_jobs(project, run_id).await?;
                jobs.sort_by_key(|job| job.id);
                jobs.into_iter().map(|job| job.id.to_string()).collect()
            }
        };

        let traces = try_join_all(job_ids.iter().map(|id| async move {
            let text = self.client.fetch_job_trace(project, id).await?;
            Ok::<_, CILensError>((id, text))
        }))
        .await?;

        let mut lines: Vec<LogLine> = traces
            .into_iter()
            .flat_map(|(id, text)| {
                let source = format!("gitlab:job:{id}");
                let context = LogContext {
                    source: &source,
                    job_id: Some(id.as_str()),
                    step_id,
                };
                parse_log_text(&text, &context, fetched_at)
            })
            .collect();
        lines.sort_by_key(|line| line.timestamp);

        Ok(lines)
    }

    fn process_webhook(&self, envelope: &WebhookEnvelope) -> Option<PipelineRecord> {
        if !is_pipeline_event(envelope) {
            debug!("Ignoring GitLab webhook event '{}'", envelope.event);
            return None;
        }

        match pipeline_from_webhook(envelope) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("Dropping GitLab webhook delivery: {err}");
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
        let secret = match &self.config.webhook_secret {
            Some(secret) if !secret.is_empty() => secret.as_str().to_string(),
            _ => generate_secret()?,
        };

        let hook = self.client.create_hook(repository, url, &secret, events).await?;
        info!("Created GitLab webhook {} on {repository}", hook.id);

        Ok(WebhookRegistration {
            id: hook.id.to_string(),
            secret,
        })
    }

    fn metrics(&self) -> ProviderMetrics {
        self.client.metrics()
    }
}
