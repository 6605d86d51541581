use super::*;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::error::ErrorCode;
use tokio::{net::TcpListener, sync::Mutex};

use crate::error::error_code;

#[derive(Clone, Default)]
struct ServerState {
    completion_requests: Arc<Mutex<Vec<Value>>>,
}

async fn list_models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [
            { "id": "Qwen3-0.6B-q4f16_1-MLC", "object": "model" },
            { "id": "other-model", "object": "model" }
        ]
    }))
}

async fn chat_completions(State(state): State<ServerState>, Json(body): Json<Value>) -> Json<Value> {
    state.completion_requests.lock().await.push(body);
    Json(json!({
        "choices": [
            { "index": 0, "message": { "role": "assistant", "content": "<think>hm</think>Prompt: a castle" } }
        ]
    }))
}

async fn failing_completion() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn empty_completion() -> Json<Value> {
    Json(json!({ "choices": [] }))
}

async fn spawn_server(app: Router) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}/v1"))
}

async fn spawn_engine_server() -> anyhow::Result<(String, ServerState)> {
    let state = ServerState::default();
    let app = Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state.clone());
    Ok((spawn_server(app).await?, state))
}

fn connector(base_url: &str) -> HttpEngineConnector {
    HttpEngineConnector::new(base_url, Duration::from_secs(5)).expect("connector")
}

#[test]
fn endpoint_keeps_versioned_base_path() {
    let base = Url::parse("http://127.0.0.1:8080/v1").expect("url");
    assert_eq!(
        endpoint(&base, "chat/completions"),
        "http://127.0.0.1:8080/v1/chat/completions"
    );
    let base = Url::parse("http://127.0.0.1:8080/v1/").expect("url");
    assert_eq!(endpoint(&base, "models"), "http://127.0.0.1:8080/v1/models");
}

#[test]
fn rejects_unparseable_base_url() {
    let err = HttpEngineConnector::new("not a url", Duration::from_secs(1)).expect_err("invalid");
    assert!(matches!(err, EngineError::InvalidBaseUrl { .. }));
}

#[tokio::test]
async fn acquire_reports_progress_and_completes_chat() {
    let (base_url, state) = spawn_engine_server().await.expect("spawn server");
    let progress = ProgressReporter::detached();

    let engine = connector(&base_url)
        .acquire(
            "Qwen3-0.6B-q4f16_1-MLC",
            &EngineOptions {
                context_window_size: Some(4096),
                max_tokens: Some(512),
                ..EngineOptions::default()
            },
            progress.clone(),
        )
        .await
        .expect("acquire");
    assert_eq!(engine.model_id(), "Qwen3-0.6B-q4f16_1-MLC");
    assert_eq!(progress.current().fraction, 1.0);

    let reply = engine
        .complete(&[
            ChatMessage::system("be an engineer"),
            ChatMessage::user("Create a detailed image prompt for: a castle"),
        ])
        .await
        .expect("complete");
    assert_eq!(reply, "<think>hm</think>Prompt: a castle");

    let requests = state.completion_requests.lock().await;
    assert_eq!(requests.len(), 1);
    let body = &requests[0];
    assert_eq!(body["model"], "Qwen3-0.6B-q4f16_1-MLC");
    assert_eq!(body["stream"], false);
    assert_eq!(body["options"]["num_ctx"], 4096);
    assert_eq!(body["max_tokens"], 512);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(
        body["messages"][1]["content"],
        "Create a detailed image prompt for: a castle"
    );
}

#[tokio::test]
async fn acquire_fails_for_model_the_server_does_not_serve() {
    let (base_url, _state) = spawn_engine_server().await.expect("spawn server");

    let err = connector(&base_url)
        .acquire(
            "missing-model",
            &EngineOptions::default(),
            ProgressReporter::detached(),
        )
        .await
        .err()
        .expect("unknown model must fail");
    assert_eq!(error_code(&err), ErrorCode::ModelUnavailable);
}

#[tokio::test]
async fn acquire_rejects_malformed_model_identifier_without_network() {
    let err = connector("http://127.0.0.1:9/v1")
        .acquire("  ", &EngineOptions::default(), ProgressReporter::detached())
        .await
        .err()
        .expect("blank model id must fail");
    assert_eq!(error_code(&err), ErrorCode::ModelUnavailable);
}

#[tokio::test]
async fn acquire_maps_unreachable_server_to_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = connector(&format!("http://{addr}/v1"))
        .acquire(
            "Qwen3-0.6B-q4f16_1-MLC",
            &EngineOptions::default(),
            ProgressReporter::detached(),
        )
        .await
        .err()
        .expect("closed port must fail");
    assert_eq!(error_code(&err), ErrorCode::Transport);
}

#[tokio::test]
async fn completion_surfaces_http_status_failures() {
    let app = Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(failing_completion));
    let base_url = spawn_server(app).await.expect("spawn server");

    let engine = connector(&base_url)
        .acquire(
            "Qwen3-0.6B-q4f16_1-MLC",
            &EngineOptions::default(),
            ProgressReporter::detached(),
        )
        .await
        .expect("acquire");
    let err = engine
        .complete(&[ChatMessage::user("a castle")])
        .await
        .expect_err("500 must fail");
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::Status { status, .. }) => assert_eq!(*status, 500),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn completion_omits_unset_limits() {
    let (base_url, state) = spawn_engine_server().await.expect("spawn server");

    let engine = connector(&base_url)
        .acquire(
            "other-model",
            &EngineOptions::default(),
            ProgressReporter::detached(),
        )
        .await
        .expect("acquire");
    engine
        .complete(&[ChatMessage::user("a castle")])
        .await
        .expect("complete");

    let requests = state.completion_requests.lock().await;
    let body = requests[0].as_object().expect("json object");
    assert!(!body.contains_key("max_tokens"));
    assert!(!body.contains_key("options"));
}

#[tokio::test]
async fn completion_without_choices_is_malformed() {
    let app = Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(empty_completion));
    let base_url = spawn_server(app).await.expect("spawn server");

    let engine = connector(&base_url)
        .acquire(
            "other-model",
            &EngineOptions::default(),
            ProgressReporter::detached(),
        )
        .await
        .expect("acquire");
    let err = engine
        .complete(&[ChatMessage::user("a castle")])
        .await
        .expect_err("empty choices must fail");
    assert_eq!(error_code(&err), ErrorCode::MalformedResponse);
}
