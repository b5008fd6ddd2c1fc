use serde::Deserialize;

/// Fields requested for every build, in Jenkins `tree` syntax.
pub const BUILD_TREE: &str = "number,url,result,building,timestamp,duration,fullDisplayName,\
actions[causes[_class,shortDescription,userId,userName],lastBuiltRevision[SHA1,branch[name]]],\
changeSets[items[commitId,msg,author[fullName]]],artifacts[fileName,relativePath]";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsBuild {
    pub number: u64,
    pub url: Option<String>,
    /// SUCCESS, FAILURE, UNSTABLE, ABORTED, NOT_BUILT; null while running
    pub result: Option<String>,
    #[serde(default)]
    pub building: bool,
    /// Start time, epoch milliseconds
    pub timestamp: Option<i64>,
    /// Milliseconds, 0 while running
    pub duration: Option<i64>,
    pub full_display_name: Option<String>,
    /// Heterogeneous list; entries without a known shape deserialize empty
    #[serde(default)]
    pub actions: Vec<JenkinsAction>,
    #[serde(default)]
    pub change_sets: Vec<JenkinsChangeSet>,
    #[serde(default)]
    pub artifacts: Vec<JenkinsArtifact>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsAction {
    #[serde(default)]
    pub causes: Vec<JenkinsCause>,
    pub last_built_revision: Option<JenkinsRevision>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsCause {
    #[serde(rename = "_class")]
    pub class: Option<String>,
    pub short_description: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JenkinsRevision {
    #[serde(rename = "SHA1")]
    pub sha1: Option<String>,
    #[serde(default)]
    pub branch: Vec<JenkinsBranch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JenkinsBranch {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JenkinsChangeSet {
    #[serde(default)]
    pub items: Vec<JenkinsChange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsChange {
    pub commit_id: Option<String>,
    pub msg: Option<String>,
    pub author: Option<JenkinsAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsAuthor {
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsArtifact {
    pub file_name: String,
    pub relative_path: String,
}

#[derive(Debug, Deserialize)]
pub struct BuildsResponse {
    #[serde(default)]
    pub builds: Vec<JenkinsBuild>,
}

/// `wfapi/describe` of a Pipeline build.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRun {
    #[serde(default)]
    pub stages: Vec<WorkflowStage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStage {
    pub id: String,
    pub name: String,
    /// SUCCESS, FAILED, IN_PROGRESS, ABORTED, UNSTABLE, NOT_EXECUTED, PAUSED_PENDING_INPUT
    pub status: Option<String>,
    pub start_time_millis: Option<i64>,
    pub duration_millis: Option<i64>,
    pub exec_node: Option<String>,
}

/// Notification plugin delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationPayload {
    pub name: String,
    /// Relative job URL, e.g. `job/team/job/widgets/`
    pub url: Option<String>,
    pub build: NotificationBuild,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationBuild {
    pub number: u64,
    pub full_url: Option<String>,
    /// QUEUED, STARTED, COMPLETED, FINALIZED
    pub phase: String,
    pub status: Option<String>,
    pub timestamp: Option<i64>,
    pub duration: Option<i64>,
    pub scm: Option<NotificationScm>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationScm {
    pub branch: Option<String>,
    pub commit: Option<String>,
}
