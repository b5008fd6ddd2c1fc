use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A GitLab CI/CD pipeline, from the REST API or the `pipeline` webhook's
/// `object_attributes`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabPipeline {
    /// Instance-wide numeric pipeline id
    pub id: u64,
    /// Project-scoped sequence number
    pub iid: Option<u64>,
    pub project_id: Option<u64>,
    /// Pipeline name from `workflow:name`, if set
    pub name: Option<String>,
    /// Git reference that triggered the pipeline (e.g., "main")
    #[serde(rename = "ref")]
    pub ref_: Option<String>,
    pub sha: Option<String>,
    pub status: Option<String>,
    /// Trigger source (e.g., "push", "schedule", "web")
    pub source: Option<String>,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub finished_at: Option<DateTime<Utc>>,
    /// `web_url` in the API, `url` in webhooks
    #[serde(alias = "url")]
    pub web_url: Option<String>,
    pub user: Option<GitLabUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabUser {
    pub username: Option<String>,
    pub name: Option<String>,
}

/// A job within a pipeline. Webhooks call these `builds`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabJob {
    pub id: u64,
    pub name: String,
    pub stage: Option<String>,
    pub status: Option<String>,
    /// Set on failed jobs, e.g. "script_failure" or "job_execution_timeout"
    pub failure_reason: Option<String>,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub finished_at: Option<DateTime<Utc>>,
    pub web_url: Option<String>,
    pub runner: Option<GitLabRunner>,
    #[serde(default)]
    pub tag_list: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<GitLabArtifact>,
    pub artifacts_file: Option<GitLabArtifactsFile>,
    pub commit: Option<GitLabCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabRunner {
    pub id: Option<u64>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One file of a job's artifacts listing.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabArtifact {
    /// archive, metadata, trace, junit, ...
    pub file_type: String,
    pub filename: String,
    pub size: Option<u64>,
}

/// Legacy single-archive field, still the only one sent by webhooks.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabArtifactsFile {
    pub filename: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabCommit {
    pub id: Option<String>,
    pub message: Option<String>,
    /// Jobs API
    pub author_name: Option<String>,
    /// Webhooks
    pub author: Option<GitLabCommitAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabCommitAuthor {
    pub name: Option<String>,
}

impl GitLabCommit {
    pub fn author(&self) -> Option<String> {
        self.author_name
            .clone()
            .or_else(|| self.author.as_ref().and_then(|a| a.name.clone()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabProject {
    pub id: Option<u64>,
    pub path_with_namespace: Option<String>,
}

/// `Pipeline Hook` delivery body.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineHookPayload {
    pub object_attributes: GitLabPipeline,
    pub user: Option<GitLabUser>,
    pub project: Option<GitLabProject>,
    pub commit: Option<GitLabCommit>,
    #[serde(default)]
    pub builds: Vec<GitLabJob>,
}

#[derive(Debug, Serialize)]
pub struct CreateHookRequest<'a> {
    pub url: &'a str,
    pub token: &'a str,
    pub push_events: bool,
    pub pipeline_events: bool,
    pub job_events: bool,
    pub merge_requests_events: bool,
    pub tag_push_events: bool,
    pub deployment_events: bool,
    pub enable_ssl_verification: bool,
}

#[derive(Debug, Deserialize)]
pub struct GitLabHook {
    pub id: u64,
}

/// Accepts RFC 3339 (REST API) and `YYYY-MM-DD HH:MM:SS UTC` (webhooks).
/// Anything else deserializes to `None` rather than failing the whole payload.
fn flexible_datetime<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_gitlab_datetime))
}

pub fn parse_gitlab_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    let naive = raw.strip_suffix(" UTC").unwrap_or(raw);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc())
}
