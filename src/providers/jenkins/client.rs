use log::debug;

use crate::config::JenkinsConfig;
use crate::error::Result;
use crate::models::ProviderMetrics;
use crate::providers::http::{ApiAuth, ApiClient};

use super::types::{BuildsResponse, JenkinsBuild, WorkflowRun, BUILD_TREE};

/// Jenkins JSON API client. Authenticates with the user's API token over basic auth.
pub struct JenkinsClient {
    api: ApiClient,
}

impl JenkinsClient {
    pub fn new(config: &JenkinsConfig) -> Result<Self> {
        let api = ApiClient::new(
            &config.base_url,
            ApiAuth::Basic {
                username: config.username.clone(),
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
        self.api.get_json("me/api/json", &[]).await
    }

    pub async fn fetch_server_info(&self) -> Result<serde_json::Value> {
        self.api
            .get_json("api/json", &[("tree", "mode,nodeDescription".to_string())])
            .await
    }

    /// Most recent `count` builds of a job, newest first.
    pub async fn fetch_builds(&self, job: &str, count: usize) -> Result<Vec<JenkinsBuild>> {
        let tree = format!("builds[{BUILD_TREE}]{{0,{count}}}");
        let response: BuildsResponse = self
            .api
            .get_json(&format!("{}/api/json", job_path(job)), &[("tree", tree)])
            .await?;

        debug!("Fetched {} builds of {job}", response.builds.len());
        Ok(response.builds)
    }

    pub async fn fetch_build(&self, job: &str, number: &str) -> Result<JenkinsBuild> {
        self.api
            .get_json(
                &format!("{}/{number}/api/json", job_path(job)),
                &[("tree", BUILD_TREE.to_string())],
            )
            .await
    }

    /// Stage view of a Pipeline build. Freestyle jobs answer 404.
    pub async fn fetch_workflow(&self, job: &str, number: u64) -> Result<WorkflowRun> {
        self.api
            .get_json(&format!("{}/{number}/wfapi/describe", job_path(job)), &[])
            .await
    }

    pub async fn fetch_console_text(&self, job: &str, number: &str) -> Result<String> {
        self.api
            .get_text(&format!("{}/{number}/consoleText", job_path(job)))
            .await
    }
}

/// `team/widgets` to `job/team/job/widgets`.
pub fn job_path(job: &str) -> String {
    job.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| format!("job/{}", urlencoding::encode(segment)))
        .collect::<Vec<_>>()
        .join("/")
}

/// Inverse of [`job_path`]: `job/team/job/widgets/` to `team/widgets`.
pub fn job_name_from_url(url: &str) -> Option<String> {
    let mut segments = url.split('/').filter(|s| !s.is_empty());
    let mut names = Vec::new();

    while let Some(segment) = segments.next() {
        if segment != "job" {
            continue;
        }
        if let Some(name) = segments.next() {
            let decoded = urlencoding::decode(name).map_or_else(|_| name.to_string(), |n| n.into_owned());
            names.push(decoded);
        }
    }

    if names.is_empty() {
        None
    } else {
        Some(names.join("/"))
    }
}
