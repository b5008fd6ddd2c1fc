use chrono::{DateTime, Utc};
use log::debug;

use crate::config::GitHubConfig;
use crate::error::Result;
use crate::models::ProviderMetrics;
use crate::providers::http::{ApiAuth, ApiClient};

use super::types::{
    CreateHookRequest, GitHubHook, GitHubJob, GitHubWorkflowRun, HookConfig, WorkflowJobsResponse,
    WorkflowRunsResponse,
};

const MAX_PAGE_SIZE: usize = 100;

/// Query parameters accepted by the workflow runs listing.
#[derive(Debug, Default)]
pub struct RunsQuery<'a> {
    pub limit: usize,
    pub branch: Option<&'a str>,
    pub since: Option<DateTime<Utc>>,
    pub status: Option<&'static str>,
}

/// GitHub REST client for workflow data.
pub struct GitHubClient {
    api: ApiClient,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let api = ApiClient::new(
            &config.base_url,
            ApiAuth::Bearer(config.token.clone()),
            config.timeout_ms,
            "application/vnd.github+json",
        )?;

        Ok(Self { api })
    }

    pub fn metrics(&self) -> ProviderMetrics {
        self.api.metrics()
    }

    pub async fn fetch_authenticated_user(&self) -> Result<serde_json::Value> {
        self.api.get_json("user", &[]).await
    }

    /// Does not consume rate limit and works with any token scope.
    pub async fn fetch_rate_limit(&self) -> Result<serde_json::Value> {
        self.api.get_json("rate_limit", &[]).await
    }

    /// Fetch workflow runs page by page until `limit` runs are collected or the
    /// listing is exhausted.
    pub async fn fetch_workflow_runs(
        &self,
        repository: &str,
        query: &RunsQuery<'_>,
    ) -> Result<Vec<GitHubWorkflowRun>> {
        let mut all_runs = Vec::new();
        let mut page = 1;
        let per_page = MAX_PAGE_SIZE.min(query.limit.max(1));
        let path = format!("repos/{repository}/actions/runs");

        loop {
            let mut params = vec![
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ];
            if let Some(branch) = query.branch {
                params.push(("branch", branch.to_string()));
            }
            if let Some(since) = query.since {
                params.push(("created", format!(">={}", since.format("%Y-%m-%dT%H:%M:%SZ"))));
            }
            if let Some(status) = query.status {
                params.push(("status", status.to_string()));
            }

            let response: WorkflowRunsResponse = self.api.get_json(&path, &params).await?;
            let response_len = response.workflow_runs.len();
            all_runs.extend(response.workflow_runs);

            debug!("Fetched page {page} of workflow runs for {repository} ({response_len} runs)");

            if response_len < per_page || all_runs.len() >= query.limit {
                break;
            }

            page += 1;
        }

        all_runs.truncate(query.limit);

        Ok(all_runs)
    }

    pub async fn fetch_workflow_run(&self, repository: &str, run_id: &str) -> Result<GitHubWorkflowRun> {
        self.api
            .get_json(&format!("repos/{repository}/actions/runs/{run_id}"), &[])
            .await
    }

    /// Fetch every job of a workflow run (latest attempt).
    pub async fn fetch_jobs_for_run(&self, repository: &str, run_id: u64) -> Result<Vec<GitHubJob>> {
        let mut all_jobs = Vec::new();
        let mut page = 1;
        let path = format!("repos/{repository}/actions/runs/{run_id}/jobs");

        loop {
            let params = [
                ("per_page", MAX_PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];
            let response: WorkflowJobsResponse = self.api.get_json(&path, &params).await?;
            let response_len = response.jobs.len();
            all_jobs.extend(response.jobs);

            if response_len < MAX_PAGE_SIZE || all_jobs.len() >= response.total_count {
                break;
            }

            page += 1;
        }

        Ok(all_jobs)
    }

    /// Plain-text log of a single job.
    pub async fn fetch_job_logs(&self, repository: &str, job_id: &str) -> Result<String> {
        self.api
            .get_text(&format!("repos/{repository}/actions/jobs/{job_id}/logs"))
            .await
    }

    pub async fn create_hook(
        &self,
        repository: &str,
        url: &str,
        secret: &str,
        events: &[String],
    ) -> Result<GitHubHook> {
        let body = CreateHookRequest {
            name: "web",
            active: true,
            events,
            config: HookConfig {
                url,
                content_type: "json",
                secret,
                insecure_ssl: "0",
            },
        };

        self.api
            .post_json(&format!("repos/{repository}/hooks"), &body)
            .await
    }
}
