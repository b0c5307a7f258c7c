//! End-to-end pipeline tests against an in-process mock provider.

#![allow(clippy::expect_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use kane_ci::client::RemoteId;
use kane_ci::observability::LogFormat;
use kane_ci::stages::orchestrate;
use kane_ci::{Config, Error};

/// base64("ci-user:ci-key")
const EXPECTED_AUTH: &str = "Basic Y2ktdXNlcjpjaS1rZXk=";

#[derive(Clone)]
struct ProviderOptions {
    create_response: Value,
    reject_update: bool,
    trigger_response: Value,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            create_response: json!({ "data": { "test_run_id": 9001 } }),
            reject_update: false,
            trigger_response: json!({ "job_id": "job-abc" }),
        }
    }
}

#[derive(Debug, Default)]
struct Recorded {
    test_case_queries: Vec<(String, HashMap<String, String>)>,
    environment_queries: Vec<HashMap<String, String>>,
    creates: Vec<Value>,
    updates: Vec<(String, Value)>,
    triggers: Vec<Value>,
    unauthorized: usize,
}

#[derive(Clone)]
struct ProviderState {
    options: ProviderOptions,
    recorded: Arc<Mutex<Recorded>>,
}

impl ProviderState {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        let ok = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            == Some(EXPECTED_AUTH);
        if !ok {
            self.recorded.lock().expect("lock").unauthorized += 1;
        }
        ok
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "bad credentials" }))).into_response()
}

async fn list_test_cases(
    State(state): State<ProviderState>,
    Path(project_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state
        .recorded
        .lock()
        .expect("lock")
        .test_case_queries
        .push((project_id, query));

    Json(json!({
        "data": [
            { "test_case_id": 40, "title": null, "created_by": { "id": 3 } },
            { "test_case_id": -1.5, "title": 99, "description": ["legacy"] },
            { "test_case_id": 41, "folder_id": 7, "title": "Signup",
              "description": "", "created_by": "bob" },
            { "test_case_id": 42, "folder_id": 7, "title": "Login Flow",
              "description": "happy path", "created_by": "alice" }
        ]
    }))
    .into_response()
}

async fn list_environments(
    State(state): State<ProviderState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state
        .recorded
        .lock()
        .expect("lock")
        .environment_queries
        .push(query);

    Json(json!({
        "data": [
            { "id": 9, "name": null, "environments": null },
            { "id": 10, "name": "Firefox/Linux", "environments": [
                { "os": "linux", "os_version": 22.04, "browser": "firefox",
                  "browser_version": 121, "platform": null } ] },
            { "id": 11, "name": "Chrome/Win", "environments": [
                { "os": "win", "os_name": "Windows", "os_version": "11",
                  "browser": "chrome", "browser_version": "120" } ] },
            { "id": 12, "name": "Safari/Mac", "environments": [
                { "os": "mac", "os_name": "macOS", "os_version": "Sonoma",
                  "browser": "safari", "browser_version": "17", "platform": "desktop" } ] }
        ]
    }))
    .into_response()
}

async fn create_run(
    State(state): State<ProviderState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state.recorded.lock().expect("lock").creates.push(body);
    Json(state.options.create_response.clone()).into_response()
}

async fn update_run(
    State(state): State<ProviderState>,
    Path(run_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state
        .recorded
        .lock()
        .expect("lock")
        .updates
        .push((run_id, body));

    if state.options.reject_update {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "message": "invalid test_run_instances" })),
        )
            .into_response();
    }
    Json(json!({ "status": "success" })).into_response()
}

async fn trigger(
    State(state): State<ProviderState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state.recorded.lock().expect("lock").triggers.push(body);
    Json(state.options.trigger_response.clone()).into_response()
}

struct MockProvider {
    base_url: String,
    recorded: Arc<Mutex<Recorded>>,
    _handle: tokio::task::JoinHandle<()>,
}

async fn start_provider(options: ProviderOptions) -> MockProvider {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let state = ProviderState {
        options,
        recorded: Arc::clone(&recorded),
    };

    let app = Router::new()
        .route("/api/v1/projects/:project_id/test-cases", get(list_test_cases))
        .route("/api/v1/environments", get(list_environments))
        .route("/api/v1/test-run", post(create_run))
        .route("/api/v1/test-run/:run_id", put(update_run))
        .route("/api/atm/v1/hyperexecute", post(trigger))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr: SocketAddr = listener.local_addr().expect("listener addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock provider");
    });

    MockProvider {
        base_url: format!("http://{addr}"),
        recorded,
        _handle: handle,
    }
}

fn config(provider: &MockProvider, title: &str, names: &[&str], job_file: PathBuf) -> Config {
    Config {
        username: "ci-user".to_string(),
        access_key: "ci-key".to_string(),
        project_id: 1234,
        target_title: title.to_string(),
        target_env_names: names.iter().map(|n| (*n).to_string()).collect(),
        api_url: format!("{}/api/v1", provider.base_url),
        hyperexecute_url: format!("{}/api/atm/v1/hyperexecute", provider.base_url),
        job_file,
        log_format: LogFormat::Pretty,
    }
}

#[tokio::test]
async fn pipeline_creates_populates_and_triggers() {
    let provider = start_provider(ProviderOptions::default()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let job_file = dir.path().join("kane_job.env");
    let config = config(
        &provider,
        "Login Flow",
        &["Chrome/Win", "Safari/Mac"],
        job_file.clone(),
    );

    let job_id = orchestrate(&config).await.expect("pipeline succeeds");

    assert_eq!(job_id, RemoteId::from("job-abc"));
    assert_eq!(
        std::fs::read_to_string(&job_file).expect("job file"),
        "KANE_JOB_ID=job-abc"
    );

    let recorded = provider.recorded.lock().expect("lock");
    assert_eq!(recorded.unauthorized, 0);

    let (project, query) = &recorded.test_case_queries[0];
    assert_eq!(project, "1234");
    assert_eq!(query.get("per_page").map(String::as_str), Some("40"));
    assert_eq!(
        recorded.environment_queries[0].get("per_page").map(String::as_str),
        Some("50")
    );

    assert_eq!(recorded.creates.len(), 1);
    let create = &recorded.creates[0];
    assert_eq!(create["test_run_instances"], json!([]));
    assert_eq!(create["objective"], json!("Triggered via Kane AI CI Orchestrator"));
    assert_eq!(create["tags"], json!(["CI", "KaneAI"]));
    assert_eq!(create["project_id"], json!("1234"));
    assert_eq!(create["is_auteur_generated"], json!(true));
    let title = create["title"].as_str().expect("title");
    assert!(title.starts_with("API GEN CI Run - "));
    assert!(!title.contains(':'));

    assert_eq!(recorded.updates.len(), 1);
    let (run_id, update) = &recorded.updates[0];
    assert_eq!(run_id, "9001");
    assert_eq!(update["id"], json!(9001));
    assert_eq!(update["title"], create["title"]);
    assert_eq!(update["objective"], create["objective"]);
    assert_eq!(update["tags"], create["tags"]);
    assert_eq!(update["is_auteur_generated"], json!(true));
    assert_eq!(
        update["test_run_instances"],
        json!([
            { "test_case_id": 42, "environment_id": 11, "name": "Login Flow",
              "serial_no": 1, "assignee": "alice" },
            { "test_case_id": 42, "environment_id": 12, "name": "Login Flow",
              "serial_no": 2, "assignee": "alice" }
        ])
    );

    assert_eq!(
        recorded.triggers,
        vec![json!({
            "test_run_id": 9001,
            "concurrency": 2,
            "title": "KaneAI Build - 9001",
            "retry_on_failure": true,
            "max_retries": 1
        })]
    );
}

#[tokio::test]
async fn pipeline_skips_unknown_environment_names() {
    let provider = start_provider(ProviderOptions::default()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let job_file = dir.path().join("kane_job.env");
    let config = config(
        &provider,
        "Login Flow",
        &["Edge/Linux", "Safari/Mac"],
        job_file.clone(),
    );

    orchestrate(&config).await.expect("pipeline succeeds");

    let recorded = provider.recorded.lock().expect("lock");
    let instances = recorded.updates[0].1["test_run_instances"]
        .as_array()
        .expect("instances")
        .clone();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0]["serial_no"], json!(1));
    assert_eq!(instances[0]["environment_id"], json!(12));
    assert!(job_file.exists());
}

#[tokio::test]
async fn pipeline_fails_before_run_creation_when_no_environment_matches() {
    let provider = start_provider(ProviderOptions::default()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let job_file = dir.path().join("kane_job.env");
    let config = config(&provider, "Login Flow", &["Edge/Linux"], job_file.clone());

    let err = orchestrate(&config).await.expect_err("nothing resolves");

    assert!(matches!(err, Error::EmptyResult { .. }), "got: {err}");
    let recorded = provider.recorded.lock().expect("lock");
    assert!(recorded.creates.is_empty());
    assert!(recorded.triggers.is_empty());
    assert!(!job_file.exists());
}

#[tokio::test]
async fn pipeline_fails_when_title_is_not_on_first_page() {
    let provider = start_provider(ProviderOptions::default()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let job_file = dir.path().join("kane_job.env");
    let config = config(&provider, "login flow", &["Chrome/Win"], job_file.clone());

    let err = orchestrate(&config).await.expect_err("title differs in case");

    assert!(
        matches!(&err, Error::NotFound { name, .. } if name == "login flow"),
        "got: {err}"
    );
    let recorded = provider.recorded.lock().expect("lock");
    assert!(recorded.environment_queries.is_empty());
    assert!(!job_file.exists());
}

#[tokio::test]
async fn pipeline_leaves_empty_run_when_update_is_rejected() {
    let provider = start_provider(ProviderOptions {
        reject_update: true,
        ..ProviderOptions::default()
    })
    .await;
    let dir = tempfile::tempdir().expect("tempdir");
    let job_file = dir.path().join("kane_job.env");
    let config = config(&provider, "Login Flow", &["Chrome/Win"], job_file.clone());

    let err = orchestrate(&config).await.expect_err("update rejected");

    match &err {
        Error::Transport { method, status, .. } => {
            assert_eq!(*method, "PUT");
            assert_eq!(*status, reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        }
        other => panic!("expected transport error, got: {other}"),
    }
    assert!(err
        .response_body()
        .expect("body")
        .contains("invalid test_run_instances"));

    let recorded = provider.recorded.lock().expect("lock");
    assert_eq!(recorded.creates.len(), 1);
    assert_eq!(recorded.updates.len(), 1);
    assert!(recorded.triggers.is_empty());
    assert!(!job_file.exists());
}

#[tokio::test]
async fn pipeline_accepts_flat_create_response() {
    let provider = start_provider(ProviderOptions {
        create_response: json!({ "id": "TR-5" }),
        trigger_response: json!({ "data": { "job_id": 77 } }),
        ..ProviderOptions::default()
    })
    .await;
    let dir = tempfile::tempdir().expect("tempdir");
    let job_file = dir.path().join("kane_job.env");
    let config = config(&provider, "Login Flow", &["Chrome/Win"], job_file.clone());

    let job_id = orchestrate(&config).await.expect("pipeline succeeds");

    assert_eq!(job_id, RemoteId::from(77));
    assert_eq!(
        std::fs::read_to_string(&job_file).expect("job file"),
        "KANE_JOB_ID=77"
    );
    let recorded = provider.recorded.lock().expect("lock");
    assert_eq!(recorded.updates[0].0, "TR-5");
    assert_eq!(recorded.triggers[0]["test_run_id"], json!("TR-5"));
    assert_eq!(recorded.triggers[0]["title"], json!("KaneAI Build - TR-5"));
}

#[tokio::test]
async fn pipeline_fails_when_create_response_has_no_run_id() {
    let provider = start_provider(ProviderOptions {
        create_response: json!({ "status": "success" }),
        ..ProviderOptions::default()
    })
    .await;
    let dir = tempfile::tempdir().expect("tempdir");
    let job_file = dir.path().join("kane_job.env");
    let config = config(&provider, "Login Flow", &["Chrome/Win"], job_file.clone());

    let err = orchestrate(&config).await.expect_err("no run id");

    assert!(matches!(err, Error::AmbiguousResponse { .. }), "got: {err}");
    let recorded = provider.recorded.lock().expect("lock");
    assert!(recorded.updates.is_empty());
    assert!(!job_file.exists());
}

#[tokio::test]
async fn pipeline_fails_when_trigger_response_has_no_job_id() {
    let provider = start_provider(ProviderOptions {
        trigger_response: json!({ "status": "queued", "message": "ok" }),
        ..ProviderOptions::default()
    })
    .await;
    let dir = tempfile::tempdir().expect("tempdir");
    let job_file = dir.path().join("kane_job.env");
    let config = config(&provider, "Login Flow", &["Chrome/Win"], job_file.clone());

    let err = orchestrate(&config).await.expect_err("no job id");

    assert!(matches!(err, Error::AmbiguousResponse { .. }), "got: {err}");
    assert_eq!(provider.recorded.lock().expect("lock").triggers.len(), 1);
    assert!(!job_file.exists());
}

#[tokio::test]
async fn pipeline_reports_rejected_credentials_as_transport_failure() {
    let provider = start_provider(ProviderOptions::default()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let job_file = dir.path().join("kane_job.env");
    let mut config = config(&provider, "Login Flow", &["Chrome/Win"], job_file.clone());
    config.access_key = "wrong-key".to_string();

    let err = orchestrate(&config).await.expect_err("unauthorized");

    assert!(
        matches!(&err, Error::Transport { status, .. } if *status == reqwest::StatusCode::UNAUTHORIZED),
        "got: {err}"
    );
    assert_eq!(provider.recorded.lock().expect("lock").unauthorized, 1);
    assert!(!job_file.exists());
}

#[tokio::test]
async fn pipeline_tolerates_loosely_typed_listing_entries() {
    let provider = start_provider(ProviderOptions::default()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let job_file = dir.path().join("kane_job.env");
    let config = config(
        &provider,
        "Login Flow",
        &["Firefox/Linux", "Chrome/Win"],
        job_file.clone(),
    );

    orchestrate(&config).await.expect("pipeline succeeds");

    let recorded = provider.recorded.lock().expect("lock");
    assert_eq!(
        recorded.updates[0].1["test_run_instances"],
        json!([
            { "test_case_id": 42, "environment_id": 10, "name": "Login Flow",
              "serial_no": 1, "assignee": "alice" },
            { "test_case_id": 42, "environment_id": 11, "name": "Login Flow",
              "serial_no": 2, "assignee": "alice" }
        ])
    );
    assert!(job_file.exists());
}
