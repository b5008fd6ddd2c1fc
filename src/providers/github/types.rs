use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// GitHub Actions workflow run, as returned by the REST API and embedded in
/// `workflow_run` webhook deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubWorkflowRun {
    /// Unique identifier for the workflow run
    pub id: u64,
    /// Name of the workflow
    pub name: Option<String>,
    /// Display title for the run
    pub display_title: Option<String>,
    /// Head branch or tag name
    pub head_branch: Option<String>,
    /// SHA of the head commit
    pub head_sha: Option<String>,
    /// Path to the workflow file
    pub path: Option<String>,
    pub workflow_id: Option<u64>,
    pub run_number: Option<u64>,
    pub run_attempt: Option<u64>,
    /// Event that triggered the run
    pub event: Option<String>,
    /// queued, in_progress, completed, ...
    pub status: Option<String>,
    /// Set once `status` is completed (success, failure, cancelled, ...)
    pub conclusion: Option<String>,
    pub html_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub run_started_at: Option<DateTime<Utc>>,
    pub actor: Option<GitHubUser>,
    pub triggering_actor: Option<GitHubUser>,
    pub head_commit: Option<GitHubCommit>,
    pub repository: Option<GitHubRepository>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommit {
    pub id: Option<String>,
    pub message: Option<String>,
    pub author: Option<GitHubCommitAuthor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommitAuthor {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepository {
    pub full_name: String,
}

/// Job within a GitHub Actions workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubJob {
    pub id: u64,
    pub run_id: Option<u64>,
    pub name: String,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<GitHubStep>,
    /// Labels requested by `runs-on`
    #[serde(default)]
    pub labels: Vec<String>,
    pub runner_id: Option<u64>,
    pub runner_name: Option<String>,
}

/// Step within a GitHub Actions job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubStep {
    pub name: String,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub number: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowRunsResponse {
    pub workflow_runs: Vec<GitHubWorkflowRun>,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowJobsResponse {
    pub total_count: usize,
    pub jobs: Vec<GitHubJob>,
}

#[derive(Debug, Serialize)]
pub struct CreateHookRequest<'a> {
    pub name: &'static str,
    pub active: bool,
    pub events: &'a [String],
    pub config: HookConfig<'a>,
}

#[derive(Debug, Serialize)]
pub struct HookConfig<'a> {
    pub url: &'a str,
    pub content_type: &'static str,
    pub secret: &'a str,
    pub insecure_ssl: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct GitHubHook {
    pub id: u64,
}
