use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;

use crate::config::GitLabConfig;
use crate::error::Result;
use crate::models::ProviderMetrics;
use crate::providers::http::{ApiAuth, ApiClient};

use super::types::{CreateHookRequest, GitLabHook, GitLabJob, GitLabPipeline};

pub const PAGE_SIZE: usize = 100;

#[derive(Debug, Default)]
pub struct PipelinesQuery<'a> {
    pub limit: usize,
    pub ref_: Option<&'a str>,
    pub updated_after: Option<DateTime<Utc>>,
    pub status: Option<&'static str>,
}

/// GitLab REST v4 client.
pub struct GitLabClient {
    api: ApiClient,
}

impl GitLabClient {
    pub fn new(config: &GitLabConfig) -> Result<Self> {
        let api = ApiClient::new(
            &api_base_url(&config.base_url),
            ApiAuth::Header {
                name: "private-token",
                token: config.token.clone(),
            },
            config.timeout_ms,
            "application/json",
        )?;

        Ok(Self { api })
    }

    pub fn metrics(&self) -> ProviderMetrics {
        self.api.metrics()
    }

    pub async fn fetch_current_user(&self) -> Result<serde_json::Value> {
        self.api.get_json("user", &[]).await
    }

    pub async fn fetch_version(&self) -> Result<serde_json::Value> {
        self.api.get_json("version", &[]).await
    }

    pub async fn fetch_pipelines(
        &self,
        project: &str,
        query: &PipelinesQuery<'_>,
    ) -> Result<Vec<GitLabPipeline>> {
        let mut all_pipelines = Vec::new();
        let mut page = 1;
        let path = format!("{}/pipelines", project_path(project));

        loop {
            let remaining = query.limit.saturating_sub(all_pipelines.len());
            if remaining == 0 {
                break;
            }
            let per_page = remaining.min(PAGE_SIZE);

            let mut params = vec![
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
                ("order_by", "id".to_string()),
                ("sort", "desc".to_string()),
            ];
            if let Some(ref_) = query.ref_ {
                params.push(("ref", ref_.to_string()));
            }
            if let Some(since) = query.updated_after {
                params.push((
                    "updated_after",
                    since.to_rfc3339_opts(SecondsFormat::Secs, true),
                ));
            }
            if let Some(status) = query.status {
                params.push(("status", status.to_string()));
            }

            let pipelines: Vec<GitLabPipeline> = self.api.get_json(&path, &params).await?;
            let fetched = pipelines.len();
            all_pipelines.extend(pipelines);

            debug!("Fetched page {page} of pipelines for {project} ({fetched} pipelines)");

            if fetched < per_page {
                break;
            }

            page += 1;
        }

        all_pipelines.truncate(query.limit);

        Ok(all_pipelines)
    }

    pub async fn fetch_pipeline(&self, project: &str, pipeline_id: &str) -> Result<GitLabPipeline> {
        self.api
            .get_json(
                &format!("{}/pipelines/{pipeline_id}", project_path(project)),
                &[],
            )
            .await
    }

    /// Every job of a pipeline, including retried ones.
    pub async fn fetch_pipeline_jobs(&self, project: &str, pipeline_id: &str) -> Result<Vec<GitLabJob>> {
        let mut all_jobs = Vec::new();
        let mut page = 1;
        let path = format!("{}/pipelines/{pipeline_id}/jobs", project_path(project));

        loop {
            let params = [
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
                ("include_retried", "true".to_string()),
            ];
            let jobs: Vec<GitLabJob> = self.api.get_json(&path, &params).await?;
            let fetched = jobs.len();
            all_jobs.extend(jobs);

            if fetched < PAGE_SIZE {
                break;
            }

            page += 1;
        }

        Ok(all_jobs)
    }

    /// Raw job trace.
    pub async fn fetch_job_trace(&self, project: &str, job_id: &str) -> Result<String> {
        self.api
            .get_text(&format!("{}/jobs/{job_id}/trace", project_path(project)))
            .await
    }

    pub async fn create_hook(&self, project: &str, url: &str, secret: &str, events: &[String]) -> Result<GitLabHook> {
        let wants = |event: &str| events.iter().any(|e| e == event);
        let body = CreateHookRequest {
            url,
            token: secret,
            push_events: wants("push"),
            pipeline_events: events.is_empty() || wants("pipeline"),
            job_events: wants("job"),
            merge_requests_events: wants("merge_request"),
            tag_push_events: wants("tag_push"),
            deployment_events: wants("deployment"),
            enable_ssl_verification: true,
        };

        self.api
            .post_json(&format!("{}/hooks", project_path(project)), &body)
            .await
    }
}

/// Instance URL to REST base, tolerating URLs that already point at `/api/v4`.
pub fn api_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.ends_with("/api/v4") {
        format!("{trimmed}/")
    } else {
        format!("{trimmed}/api/v4/")
    }
}

/// Numeric ids pass through; `group/project` paths are URL-encoded.
fn project_path(project: &str) -> String {
    format!("projects/{}", urlencoding::encode(project))
}
