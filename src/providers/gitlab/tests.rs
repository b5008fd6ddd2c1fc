use chrono::{TimeZone, Utc};
use mockito::{Matcher, Server};

use super::*;
use crate::auth::Token;
use crate::config::GitLabConfig;
use crate::error::CILensError;
use crate::models::{PipelineFilter, PipelineStatus, WebhookEnvelope};
use crate::providers::signature::sign_payload;
use crate::providers::CiProvider;

const PIPELINE_JSON: &str = r#"{
    "id": 1001,
    "iid": 17,
    "project_id": 42,
    "ref": "main",
    "sha": "a1b2c3",
    "status": "failed",
    "source": "push",
    "created_at": "2024-05-01T10:00:00.000Z",
    "updated_at": "2024-05-01T10:10:05.000Z",
    "started_at": "2024-05-01T10:00:05.000Z",
    "finished_at": "2024-05-01T10:10:05.000Z",
    "web_url": "https://gitlab.example.com/acme/widgets/-/pipelines/1001",
    "user": {"username": "dev", "name": "Dev"}
}"#;

const JOBS_JSON: &str = r#"[
    {
        "id": 2002,
        "name": "lint",
        "stage": "test",
        "status": "success",
        "started_at": "2024-05-01T10:00:05.000Z",
        "finished_at": "2024-05-01T10:01:05.000Z",
        "web_url": "https://gitlab.example.com/acme/widgets/-/jobs/2002",
        "tag_list": [],
        "artifacts": [],
        "commit": {"id": "a1b2c3", "message": "Add feature", "author_name": "Jane"}
    },
    {
        "id": 2001,
        "name": "build",
        "stage": "build",
        "status": "failed",
        "failure_reason": "job_execution_timeout",
        "started_at": "2024-05-01T10:00:05.000Z",
        "finished_at": "2024-05-01T10:10:05.000Z",
        "web_url": "https://gitlab.example.com/acme/widgets/-/jobs/2001",
        "runner": {"id": 7, "description": "shared-runner-7"},
        "tag_list": ["docker"],
        "artifacts": [
            {"file_type": "archive", "filename": "artifacts.zip", "size": 1024},
            {"file_type": "trace", "filename": "job.log", "size": 10}
        ],
        "commit": {"id": "a1b2c3", "message": "Add feature", "author_name": "Jane"}
    }
]"#;

fn config_for(server: &Server) -> GitLabConfig {
    let mut config = GitLabConfig::new("glpat-test");
    config.base_url = server.url();
    config.webhook_secret = Some(Token::from("hook-secret"));
    config
}

fn provider_for(server: &Server) -> GitLabProvider {
    GitLabProvider::new(config_for(server)).unwrap()
}

async fn mock_pipeline_detail(server: &mut Server) {
    server
        .mock("GET", "/api/v4/projects/42/pipelines/1001")
        .match_query(Matcher::Any)
        .match_header("private-token", "glpat-test")
        .with_status(200)
        .with_body(PIPELINE_JSON)
        .create_async()
        .await;
    server
        .mock("GET", "/api/v4/projects/42/pipelines/1001/jobs")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(JOBS_JSON)
        .create_async()
        .await;
}

#[test]
fn test_combined_status_folds_gitlab_states() {
    assert_eq!(combined_status(Some("created"), None), PipelineStatus::Pending);
    assert_eq!(combined_status(Some("waiting_for_resource"), None), PipelineStatus::Pending);
    assert_eq!(combined_status(Some("manual"), None), PipelineStatus::Pending);
    assert_eq!(combined_status(Some("canceling"), None), PipelineStatus::Cancelled);
    assert_eq!(combined_status(Some("canceled"), None), PipelineStatus::Cancelled);
    assert_eq!(combined_status(Some("failed"), Some("script_failure")), PipelineStatus::Failed);
    assert_eq!(
        combined_status(Some("failed"), Some("stuck_or_timeout_failure")),
        PipelineStatus::Timeout
    );
    assert_eq!(combined_status(Some("success"), Some("job_execution_timeout")), PipelineStatus::Success);
    assert_eq!(combined_status(Some("mystery"), None), PipelineStatus::Unknown);
    assert_eq!(combined_status(None, None), PipelineStatus::Unknown);
}

#[test]
fn test_parse_gitlab_datetime_formats() {
    let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    assert_eq!(parse_gitlab_datetime("2024-05-01T10:00:00.000Z"), Some(expected));
    assert_eq!(parse_gitlab_datetime("2024-05-01 10:00:00 UTC"), Some(expected));
    assert_eq!(parse_gitlab_datetime("yesterday"), None);
}

#[test]
fn test_api_base_url() {
    assert_eq!(api_base_url("https://gitlab.com"), "https://gitlab.com/api/v4/");
    assert_eq!(api_base_url("https://gitlab.example.com/"), "https://gitlab.example.com/api/v4/");
    assert_eq!(
        api_base_url("https://gitlab.example.com/api/v4"),
        "https://gitlab.example.com/api/v4/"
    );
}

#[tokio::test]
async fn test_fetch_pipeline_with_composed_id() {
    let mut server = Server::new_async().await;
    mock_pipeline_detail(&mut server).await;

    let record = provider_for(&server).fetch_pipeline("42:1001").await.unwrap();

    assert_eq!(record.id, "42:1001");
    assert_eq!(record.provider, "gitlab");
    assert_eq!(record.name, "pipeline #17");
    assert_eq!(record.repository, "42");
    assert_eq!(record.branch.as_deref(), Some("main"));
    assert_eq!(record.status, PipelineStatus::Failed);
    assert_eq!(record.duration_ms, Some(600_000));
    assert_eq!(record.trigger.event, "push");
    assert_eq!(record.trigger.actor, "dev");
    assert_eq!(record.commit.sha, "a1b2c3");
    assert_eq!(record.commit.message, "Add feature");
    assert_eq!(record.commit.author, "Jane");

    assert_eq!(record.jobs.len(), 2);
    let build = &record.jobs[0];
    assert_eq!(build.id, "2001");
    assert_eq!(build.stage.as_deref(), Some("build"));
    assert_eq!(build.status, PipelineStatus::Timeout);
    let runner = build.runner.as_ref().unwrap();
    assert_eq!(runner.name, "shared-runner-7");
    assert_eq!(runner.labels, vec!["docker"]);
    assert_eq!(record.jobs[1].duration_ms, Some(60_000));

    assert_eq!(record.artifacts.len(), 1);
    assert_eq!(record.artifacts[0].name, "artifacts.zip");
    assert_eq!(record.artifacts[0].size_bytes, Some(1024));
    assert_eq!(
        record.artifacts[0].url.as_deref(),
        Some("https://gitlab.example.com/acme/widgets/-/jobs/2001/artifacts/download")
    );
}

#[tokio::test]
async fn test_fetch_pipeline_bare_id_uses_configured_project() {
    let mut server = Server::new_async().await;
    mock_pipeline_detail(&mut server).await;

    let mut config = config_for(&server);
    config.project_id = Some("42".to_string());
    let provider = GitLabProvider::new(config).unwrap();

    let first = provider.fetch_pipeline("1001").await.unwrap();
    let second = provider.fetch_pipeline_run("42", "1001").await.unwrap();

    assert_eq!(first.id, "42:1001");
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn test_fetch_pipeline_bare_id_without_project_is_configuration_error() {
    let server = Server::new_async().await;

    let err = provider_for(&server).fetch_pipeline("1001").await.unwrap_err();

    assert!(matches!(err, CILensError::Configuration(_)));
}

#[tokio::test]
async fn test_fetch_pipelines_forwards_first_status_and_ref() {
    let mut server = Server::new_async().await;
    let listing = server
        .mock("GET", "/api/v4/projects/42/pipelines")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("ref".into(), "main".into()),
            Matcher::UrlEncoded("status".into(), "failed".into()),
            Matcher::UrlEncoded("per_page".into(), "5".into()),
            Matcher::UrlEncoded("updated_after".into(), "2024-04-30T00:00:00Z".into()),
        ]))
        .with_status(200)
        .with_body(r#"[{"id": 1001, "project_id": 42, "status": "failed", "ref": "main"}]"#)
        .create_async()
        .await;
    mock_pipeline_detail(&mut server).await;

    let filter = PipelineFilter {
        branch: Some("main".to_string()),
        limit: Some(5),
        since: Some(Utc.with_ymd_and_hms(2024, 4, 30, 0, 0, 0).unwrap()),
        status: vec![PipelineStatus::Failed, PipelineStatus::Success],
    };

    let provider = provider_for(&server);
    let records = provider.fetch_pipelines("42", &filter).await.unwrap();

    listing.assert_async().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "42:1001");
    assert_eq!(provider.metrics().api_calls_count, 3);
}

#[tokio::test]
async fn test_fetch_pipelines_skips_status_without_native_filter() {
    let mut server = Server::new_async().await;
    let listing = server
        .mock("GET", "/api/v4/projects/42/pipelines")
        .match_query(Matcher::UrlEncoded("status".into(), "failed".into()))
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let filter = PipelineFilter {
        status: vec![PipelineStatus::Unknown, PipelineStatus::Failed],
        ..PipelineFilter::default()
    };
    let records = provider_for(&server).fetch_pipelines("42", &filter).await.unwrap();

    listing.assert_async().await;
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_fetch_pipelines_propagates_http_errors() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v4/projects/42/pipelines")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let provider = provider_for(&server);
    let err = provider
        .fetch_pipelines("42", &PipelineFilter::default())
        .await
        .unwrap_err();

    assert!(matches!(err, CILensError::Api { status: 500, .. }));
    assert_eq!(provider.metrics().error_count, 1);
}

#[tokio::test]
async fn test_fetch_logs_without_job_concatenates_traces() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v4/projects/42/pipelines/1001/jobs")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(JOBS_JSON)
        .create_async()
        .await;
    server
        .mock("GET", "/api/v4/projects/42/jobs/2001/trace")
        .with_status(200)
        .with_body("Compiling widgets\nERROR: job timed out\n")
        .create_async()
        .await;
    server
        .mock("GET", "/api/v4/projects/42/jobs/2002/trace")
        .with_status(200)
        .with_body("Running linter\nwarning: unused import\nok\n")
        .create_async()
        .await;

    let lines = provider_for(&server)
        .fetch_logs("42", "1001", None, None)
        .await
        .unwrap();

    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0].message, "Compiling widgets");
    assert_eq!(lines[0].source, "gitlab:job:2001");
    assert_eq!(lines[1].level, crate::models::LogLevel::Error);
    assert_eq!(lines[3].job_id.as_deref(), Some("2002"));
    assert_eq!(lines[3].level, crate::models::LogLevel::Warn);
}

#[tokio::test]
async fn test_fetch_logs_for_single_job() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v4/projects/42/jobs/2002/trace")
        .with_status(200)
        .with_body("one\ntwo\n")
        .create_async()
        .await;

    let lines = provider_for(&server)
        .fetch_logs("42", "1001", Some("2002"), Some("lint"))
        .await
        .unwrap();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1].step_id.as_deref(), Some("lint"));
}

#[tokio::test]
async fn test_validate_config_returns_false_on_401() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v4/user")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"message": "401 Unauthorized"}"#)
        .create_async()
        .await;

    assert!(!provider_for(&server).validate_config().await.unwrap());
}

#[tokio::test]
async fn test_validate_config_without_token_is_an_error() {
    let provider = GitLabProvider::new(GitLabConfig::new(" ")).unwrap();
    assert!(matches!(
        provider.validate_config().await,
        Err(CILensError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_connection_uses_version_endpoint() {
    let mut server = Server::new_async().await;
    let version = server
        .mock("GET", "/api/v4/version")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"version": "17.0.0", "revision": "abc"}"#)
        .create_async()
        .await;

    assert!(provider_for(&server).test_connection().await);
    version.assert_async().await;
}

#[tokio::test]
async fn test_process_pipeline_hook() {
    let server = Server::new_async().await;
    let payload = br#"{
        "object_kind": "pipeline",
        "object_attributes": {
            "id": 1001,
            "iid": 17,
            "ref": "main",
            "sha": "a1b2c3",
            "status": "running",
            "source": "merge_request_event",
            "created_at": "2024-05-01 10:00:00 UTC",
            "finished_at": null,
            "url": "https://gitlab.example.com/acme/widgets/-/pipelines/1001"
        },
        "user": {"username": "dev", "name": "Dev"},
        "project": {"id": 42, "path_with_namespace": "acme/widgets"},
        "commit": {"id": "a1b2c3", "message": "Add feature", "author": {"name": "Jane"}},
        "builds": [
            {"id": 2001, "name": "build", "stage": "build", "status": "running",
             "started_at": "2024-05-01 10:00:05 UTC", "finished_at": null}
        ]
    }"#;
    let envelope = WebhookEnvelope::from_raw("gitlab", "Pipeline Hook", payload, None);

    let record = provider_for(&server).process_webhook(&envelope).unwrap();

    assert_eq!(record.id, "42:1001");
    assert_eq!(record.repository, "acme/widgets");
    assert_eq!(record.status, PipelineStatus::Running);
    assert_eq!(
        record.started_at,
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
    );
    assert_eq!(record.duration_ms, None);
    assert_eq!(record.commit.author, "Jane");
    assert_eq!(record.trigger.actor, "dev");
    assert_eq!(record.jobs[0].status, PipelineStatus::Running);
    assert_eq!(
        record.web_url.as_deref(),
        Some("https://gitlab.example.com/acme/widgets/-/pipelines/1001")
    );
}

#[tokio::test]
async fn test_unmodeled_or_malformed_hooks_are_none() {
    let server = Server::new_async().await;
    let provider = provider_for(&server);

    let push = WebhookEnvelope::from_raw("gitlab", "Push Hook", br#"{"object_kind": "push"}"#, None);
    assert!(provider.process_webhook(&push).is_none());

    let malformed = WebhookEnvelope::from_raw(
        "gitlab",
        "Pipeline Hook",
        br#"{"object_kind": "pipeline", "object_attributes": {"status": "running"}}"#,
        None,
    );
    assert!(provider.process_webhook(&malformed).is_none());
}

#[tokio::test]
async fn test_verify_signature_without_prefix() {
    let server = Server::new_async().await;
    let provider = provider_for(&server);
    let body = br#"{"object_kind":"pipeline"}"#;

    let signature = sign_payload("hook-secret", body, "");
    assert!(provider.verify_webhook_signature(body, &signature));
    assert!(!provider.verify_webhook_signature(body, &format!("sha256={signature}")));
    assert!(!provider.verify_webhook_signature(body, &signature[..signature.len() - 2]));
}

#[tokio::test]
async fn test_setup_webhook_subscribes_pipeline_events() {
    let mut server = Server::new_async().await;
    let hook = server
        .mock(
            "POST",
            Matcher::Regex(r"^/api/v4/projects/acme(%2F|/)widgets/hooks$".to_string()),
        )
        .match_body(Matcher::PartialJson(serde_json::json!({
            "url": "https://hooks.example.com/gitlab",
            "token": "hook-secret",
            "pipeline_events": true,
            "job_events": true,
            "push_events": false
        })))
        .with_status(201)
        .with_body(r#"{"id": 55}"#)
        .create_async()
        .await;

    let registration = provider_for(&server)
        .setup_webhook(
            "acme/widgets",
            "https://hooks.example.com/gitlab",
            &["pipeline".to_string(), "job".to_string()],
        )
        .await
        .unwrap();

    hook.assert_async().await;
    assert_eq!(registration.id, "55");
    assert_eq!(registration.secret, "hook-secret");
}
