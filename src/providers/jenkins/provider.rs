use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::try_join_all;
use log::{debug, error, info, warn};

use crate::config::{JenkinsConfig, ProviderKind};
use crate::error::{CILensError, Result};
use crate::models::{
    Artifact, CommitInfo, JobRecord, LogLine, PipelineFilter, PipelineRecord, PipelineStatus,
    ProviderMetrics, RunnerInfo, TriggerInfo, WebhookEnvelope, WebhookRegistration,
};
use crate::providers::logs::{parse_log_text, LogContext};
use crate::providers::normalize::{compute_duration_ms, normalize_status};
use crate::providers::signature::verify_signature;
use crate::providers::CiProvider;

use super::client::{job_name_from_url, JenkinsClient};
use super::types::{JenkinsBuild, NotificationPayload, WorkflowStage};

const SIGNATURE_PREFIX: &str = "sha256=";

const SUPPORTED_EVENTS: &[&str] = &["queued", "started", "completed", "finalized"];

/// Builds scanned when branch, status or date filtering has to happen locally.
const FILTER_SCAN_WINDOW: usize = 100;

/// Jenkins adapter.
///
/// Build numbers are per job, so records use `<job path>:<build number>` as their
/// id. Jenkins has no query parameters for branch, status or date; those filters
/// are applied to the fetched builds.
pub struct JenkinsProvider {
    client: JenkinsClient,
    config: JenkinsConfig,
}

impl JenkinsProvider {
    pub fn new(config: JenkinsConfig) -> Result<Self> {
        let client = JenkinsClient::new(&config)?;
        debug!(
            "Created Jenkins provider for {} as {} (token {})",
            config.base_url,
            config.username,
            config.token.masked()
        );

        Ok(Self { client, config })
    }

    /// Stages of a Pipeline build; freestyle builds have none.
    async fn fetch_stages(&self, job: &str, number: u64) -> Result<Vec<WorkflowStage>> {
        match self.client.fetch_workflow(job, number).await {
            Ok(run) => Ok(run.stages),
            Err(err) if err.is_not_found() => {
                debug!("{job} #{number} has no stage view");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    async fn fetch_build_record(&self, job: &str, number: &str) -> Result<PipelineRecord> {
        let build = self.client.fetch_build(job, number).await?;
        let stages = self.fetch_stages(job, build.number).await?;
        Ok(to_pipeline_record(build, stages, job))
    }
}

/// `<job path>:<build number>`, splitting at the last colon.
pub fn parse_build_id(pipeline_id: &str) -> Result<(&str, &str)> {
    match pipeline_id.rsplit_once(':') {
        Some((job, number)) if !job.is_empty() && number.parse::<u64>().is_ok() => Ok((job, number)),
        _ => Err(CILensError::Configuration(format!(
            "Jenkins pipeline id must be '<job>:<build number>', got '{pipeline_id}'"
        ))),
    }
}

/// Jenkins reports `result = null` while a build is queued or running.
pub fn combined_status(result: Option<&str>, building: bool) -> PipelineStatus {
    if building {
        return PipelineStatus::Running;
    }
    let Some(result) = result else {
        return PipelineStatus::Pending;
    };

    match result.trim().to_ascii_uppercase().as_str() {
        "ABORTED" => PipelineStatus::Cancelled,
        "UNSTABLE" => PipelineStatus::Failed,
        "NOT_BUILT" | "NOT_EXECUTED" => PipelineStatus::Skipped,
        "IN_PROGRESS" => PipelineStatus::Running,
        "PAUSED_PENDING_INPUT" => PipelineStatus::Pending,
        _ => normalize_status(result),
    }
}

fn millis_to_datetime(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.and_then(DateTime::from_timestamp_millis)
}

/// Finish time is start plus duration once the build is over. Durations that
/// do not fit a timestamp yield `None`.
fn finish_time(started_at: Option<DateTime<Utc>>, duration_ms: Option<i64>, running: bool) -> Option<DateTime<Utc>> {
    if running {
        return None;
    }
    let (start, ms) = started_at.zip(duration_ms)?;
    start.checked_add_signed(Duration::try_milliseconds(ms)?)
}

/// `refs/remotes/origin/main` and `origin/main` both become `main`.
fn short_branch(name: &str) -> String {
    name.trim_start_matches("refs/remotes/")
        .trim_start_matches("refs/heads/")
        .trim_start_matches("origin/")
        .to_string()
}

/// Cause class to a trigger event name.
fn trigger_event(class: &str) -> String {
    let simple = class.rsplit(|c: char| c == '.' || c == '$').next().unwrap_or(class);
    match simple {
        "UserIdCause" | "UserCause" => "manual",
        "SCMTriggerCause" | "GitHubPushCause" | "GitLabWebHookCause" | "BranchEventCause" => "push",
        "TimerTriggerCause" => "schedule",
        "UpstreamCause" => "upstream",
        "RemoteCause" => "remote",
        "BranchIndexingCause" => "branch_indexing",
        "ReplayCause" => "replay",
        other => other,
    }
    .to_string()
}

pub fn to_pipeline_record(build: JenkinsBuild, stages: Vec<WorkflowStage>, job: &str) -> PipelineRecord {
    let status = combined_status(build.result.as_deref(), build.building);
    let started_at = millis_to_datetime(build.timestamp);
    let finished_at = finish_time(started_at, build.duration, build.building || build.result.is_none());

    let cause = build.actions.iter().flat_map(|a| a.causes.iter()).next();
    let revision = build
        .actions
        .iter()
        .find_map(|a| a.last_built_revision.as_ref());
    let change = build
        .change_sets
        .iter()
        .flat_map(|set| set.items.iter())
        .last();

    let branch = revision
        .and_then(|r| r.branch.first())
        .and_then(|b| b.name.as_deref())
        .map(short_branch);

    let trigger = TriggerInfo::new(
        cause.and_then(|c| c.class.as_deref()).map(trigger_event),
        cause.and_then(|c| c.user_id.clone().or_else(|| c.user_name.clone())),
    );
    let commit = CommitInfo::new(
        revision
            .and_then(|r| r.sha1.clone())
            .or_else(|| change.and_then(|c| c.commit_id.clone())),
        change.and_then(|c| c.msg.clone()),
        change
            .and_then(|c| c.author.as_ref())
            .and_then(|a| a.full_name.clone()),
    );

    let artifacts = build
        .artifacts
        .iter()
        .map(|artifact| Artifact {
            name: artifact.file_name.clone(),
            size_bytes: None,
            url: build.url.as_ref().map(|url| {
                format!("{}/artifact/{}", url.trim_end_matches('/'), artifact.relative_path)
            }),
        })
        .collect();

    let mut metadata = BTreeMap::new();
    metadata.insert("build_number".to_string(), build.number.into());
    if let Some(description) = cause.and_then(|c| c.short_description.clone()) {
        metadata.insert("cause".to_string(), description.into());
    }

    PipelineRecord {
        id: format!("{job}:{}", build.number),
        provider: ProviderKind::Jenkins.as_str().to_string(),
        name: build
            .full_display_name
            .clone()
            .unwrap_or_else(|| format!("{job} #{}", build.number)),
        repository: job.to_string(),
        branch,
        status,
        started_at,
        finished_at,
        duration_ms: compute_duration_ms(started_at, finished_at),
        trigger,
        commit,
        jobs: stages.into_iter().map(to_job_record).collect(),
        artifacts,
        logs: Vec::new(),
        web_url: build.url,
        metadata,
    }
}

fn to_job_record(stage: WorkflowStage) -> JobRecord {
    let status = combined_status(stage.status.as_deref(), false);
    let started_at = millis_to_datetime(stage.start_time_millis);
    let finished_at = finish_time(
        started_at,
        stage.duration_millis,
        matches!(status, PipelineStatus::Running | PipelineStatus::Pending),
    );

    JobRecord {
        id: stage.id,
        name: stage.name,
        stage: None,
        status,
        started_at,
        finished_at,
        duration_ms: compute_duration_ms(started_at, finished_at),
        runner: stage
            .exec_node
            .filter(|node| !node.is_empty())
            .map(|name| RunnerInfo {
                id: None,
                name,
                labels: Vec::new(),
            }),
        steps: Vec::new(),
    }
}

fn matches_filter(record: &PipelineRecord, filter: &PipelineFilter) -> bool {
    let branch_ok = filter
        .branch
        .as_deref()
        .map_or(true, |branch| record.branch.as_deref() == Some(branch));
    let since_ok = filter
        .since
        .map_or(true, |since| record.started_at.is_some_and(|start| start >= since));
    let status_ok = filter.status.is_empty() || filter.status.contains(&record.status);

    branch_ok && since_ok && status_ok
}

fn record_from_notification(envelope: &WebhookEnvelope) -> Result<PipelineRecord> {
    let payload: NotificationPayload = serde_json::from_value(envelope.payload.clone())
        .map_err(|e| CILensError::WebhookPayload(format!("invalid notification: {e}")))?;
    let build = payload.build;

    let job = payload
        .url
        .as_deref()
        .and_then(job_name_from_url)
        .unwrap_or(payload.name);

    let status = match build.phase.to_ascii_uppercase().as_str() {
        "QUEUED" => PipelineStatus::Pending,
        "STARTED" => PipelineStatus::Running,
        _ => combined_status(build.status.as_deref(), false),
    };
    let running = !status.is_terminal();
    let started_at = millis_to_datetime(build.timestamp);
    let finished_at = finish_time(started_at, build.duration.filter(|d| *d > 0), running);
    let scm = build.scm.as_ref();

    let mut metadata = BTreeMap::new();
    metadata.insert("build_number".to_string(), build.number.into());
    metadata.insert("phase".to_string(), build.phase.clone().into());

    Ok(PipelineRecord {
        id: format!("{job}:{}", build.number),
        provider: ProviderKind::Jenkins.as_str().to_string(),
        name: format!("{job} #{}", build.number),
        repository: job,
        branch: scm.and_then(|s| s.branch.as_deref()).map(short_branch),
        status,
        started_at,
        finished_at,
        duration_ms: compute_duration_ms(started_at, finished_at),
        trigger: TriggerInfo::new(None, None),
        commit: CommitInfo::new(scm.and_then(|s| s.commit.clone()), None, None),
        jobs: Vec::new(),
        artifacts: Vec::new(),
        logs: Vec::new(),
        web_url: build.full_url,
        metadata,
    })
}

#[async_trait]
impl CiProvider for JenkinsProvider {
    fn provider_type(&self) -> &str {
        ProviderKind::Jenkins.as_str()
    }

    async fn validate_config(&self) -> Result<bool> {
        if self.config.base_url.trim().is_empty() {
            return Err(CILensError::Configuration("Jenkins base URL is required".to_string()));
        }
        if self.config.username.trim().is_empty() || self.config.token.is_empty() {
            return Err(CILensError::Configuration(
                "Jenkins username and API token are required".to_string(),
            ));
        }

        match self.client.fetch_current_user().await {
            Ok(_) => Ok(true),
            Err(err) if err.is_auth_failure() => {
                warn!("Jenkins rejected the configured credentials: {err}");
                Ok(false)
            }
            Err(err) => {
                error!("Jenkins configuration check failed: {err}");
                Ok(false)
            }
        }
    }

    async fn test_connection(&self) -> bool {
        match self.client.fetch_server_info().await {
            Ok(_) => true,
            Err(err) => {
                error!("Jenkins connection test failed: {err}");
                false
            }
        }
    }

    async fn fetch_pipeline(&self, pipeline_id: &str) -> Result<PipelineRecord> {
        let (job, number) = parse_build_id(pipeline_id)?;
        self.fetch_build_record(job, number).await
    }

    async fn fetch_pipelines(
        &self,
        repository: &str,
        filter: &PipelineFilter,
    ) -> Result<Vec<PipelineRecord>> {
        if repository.trim_matches('/').is_empty() {
            return Err(CILensError::Configuration("Jenkins job name is required".to_string()));
        }

        let limit = filter.limit();
        let filtered = filter.branch.is_some() || filter.since.is_some() || !filter.status.is_empty();
        let window = if filtered { limit.max(FILTER_SCAN_WINDOW) } else { limit };

        info!("Fetching up to {window} builds of {repository}");
        let builds = self.client.fetch_builds(repository, window).await?;

        let records = try_join_all(builds.into_iter().map(|build| async move {
            let stages = self.fetch_stages(repository, build.number).await?;
            Ok::<_, CILensError>(to_pipeline_record(build, stages, repository))
        }))
        .await?;

        let mut records: Vec<PipelineRecord> = records
            .into_iter()
            .filter(|record| matches_filter(record, filter))
            .collect();
        records.truncate(limit);

        info!("Fetched {} builds of {repository}", records.len());
        Ok(records)
    }

    /// `pipeline_id` is the job path and `run_id` the build number.
    async fn fetch_pipeline_run(&self, pipeline_id: &str, run_id: &str) -> Result<PipelineRecord> {
        self.fetch_build_record(pipeline_id, run_id).await
    }

    /// Console output of the whole build; `job_id` and `step_id` are recorded on
    /// the lines but do not narrow them.
    async fn fetch_logs(
        &self,
        pipeline_id: &str,
        run_id: &str,
        job_id: Option<&str>,
        step_id: Option<&str>,
    ) -> Result<Vec<LogLine>> {
        let text = self.client.fetch_console_text(pipeline_id, run_id).await?;
        let source = format!("jenkins:{pipeline_id}#{run_id}");
        let context = LogContext {
            source: &source,
            job_id,
            step_id,
        };

        Ok(parse_log_text(&text, &context, Utc::now()))
    }

    fn process_webhook(&self, envelope: &WebhookEnvelope) -> Option<PipelineRecord> {
        if envelope.payload.get("build").is_none() {
            debug!("Ignoring Jenkins webhook event '{}'", envelope.event);
            return None;
        }

        match record_from_notification(envelope) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("Dropping Jenkins webhook delivery: {err}");
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
        _url: &str,
        _events: &[String],
    ) -> Result<WebhookRegistration> {
        Err(CILensError::Unsupported(format!(
            "Jenkins has no API for registering webhooks; configure the Notification plugin on '{repository}'"
        )))
    }

    fn metrics(&self) -> ProviderMetrics {
        self.client.metrics()
    }
}
