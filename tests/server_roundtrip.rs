//! `genterm serve` end to end: console gateway → backend router → fake
//! upstream model, all on ephemeral local ports.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use genterm::config::{GatewayConfig, LlmConfig};
use genterm::console::Console;
use genterm::gateway::{AiGateway, ChatRequest, HttpGateway, SessionGateway};
use genterm::llm::LlmClient;
use genterm::models::{LineKind, UploadedFile, MIME_TEXT};
use genterm::server::{router, AppState};

#[derive(Clone, Default)]
struct Upstream {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
    /// Number of leading calls answered with 503.
    fail_first: usize,
    /// Answer every call with this status instead.
    status: Option<StatusCode>,
}

async fn completions(
    State(up): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let n = up.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        up.auth.lock().unwrap().push(auth.to_string());
    }
    up.bodies.lock().unwrap().push(body);

    if let Some(status) = up.status {
        return (status, "nope").into_response();
    }
    if n < up.fail_first {
        return (StatusCode::SERVICE_UNAVAILABLE, "warming up").into_response();
    }
    Json(json!({
        "choices": [{"message": {"role": "assistant", "content": format!("answer {}", n + 1)}}]
    }))
    .into_response()
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Starts a fake upstream and a genterm backend in front of it. Returns
/// the backend URL.
async fn start(upstream: Upstream, max_retries: u32) -> String {
    let upstream_url = serve(
        Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(upstream),
    )
    .await;

    let llm = LlmClient::new(&LlmConfig {
        base_url: format!("{}/v1", upstream_url),
        max_retries,
        api_key: Some("sk-test".into()),
        ..Default::default()
    })
    .unwrap();
    serve(router(AppState::new(llm))).await
}

fn gateway(base_url: &str) -> HttpGateway {
    HttpGateway::new(&GatewayConfig {
        base_url: base_url.to_string(),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn console_through_backend_to_model() {
    let upstream = Upstream::default();
    let backend = start(upstream.clone(), 0).await;
    let gw = gateway(&backend);

    let mut console = Console::new(Duration::from_secs(10));
    console.connect(&gw).await.unwrap();
    console.upload(vec![UploadedFile::new("notes.txt", MIME_TEXT, b"hello".to_vec())]);

    console.submit("what does the file say", &gw).await;
    assert_eq!(console.lines().last().unwrap().text, "answer 1");
    console.submit("and again?", &gw).await;
    assert_eq!(console.lines().last().unwrap().kind, LineKind::Assistant);

    let bodies = upstream.bodies.lock().unwrap().clone();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["model"], "gpt-4o");
    assert_eq!(bodies[0]["max_tokens"], 2000);
    assert_eq!(
        bodies[0]["messages"],
        json!([
            {"role": "system", "content": "You are a helpful assistant. Use the provided context to answer questions accurately."},
            {"role": "user", "content": "Context information:\n\n[1] [File: notes.txt]\nhello\n\n"},
            {"role": "user", "content": "what does the file say"}
        ])
    );

    // The second turn carries the first exchange as history.
    let second = bodies[1]["messages"].as_array().unwrap();
    let roles: Vec<_> = second.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, ["system", "user", "user", "assistant", "user"]);
    assert_eq!(second[3]["content"], "answer 1");

    assert_eq!(upstream.auth.lock().unwrap()[0], "Bearer sk-test");
}

#[tokio::test]
async fn image_turn_is_recorded_with_marker() {
    let upstream = Upstream::default();
    let backend = start(upstream.clone(), 0).await;
    let gw = gateway(&backend);
    let session = gw.create_session().await.unwrap();

    let request = ChatRequest::image(
        &session.id,
        "describe this image",
        vec![],
        "data:image/jpeg;base64,AQID".into(),
    );
    let reply = gw.chat(&request).await.unwrap();
    assert_eq!(reply.session_id.as_deref(), Some(session.id.as_str()));

    let bodies = upstream.bodies.lock().unwrap().clone();
    let messages = bodies[0]["messages"].as_array().unwrap();
    // No context entry: system prompt, then the multimodal turn.
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["content"][1]["type"], "image_url");

    let client = reqwest::Client::new();
    let history: Value = client
        .post(format!("{}/api/session", backend))
        .json(&json!({"action": "get", "id": session.id}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["messages"][0]["content"], "describe this image [with image]");
    assert_eq!(history["messages"][1]["role"], "assistant");
}

#[tokio::test]
async fn transient_upstream_errors_are_retried() {
    let upstream = Upstream {
        fail_first: 1,
        ..Default::default()
    };
    let backend = start(upstream.clone(), 2).await;
    let gw = gateway(&backend);
    let session = gw.create_session().await.unwrap();

    let reply = gw
        .chat(&ChatRequest::text(&session.id, "hi", vec![]))
        .await
        .unwrap();
    assert_eq!(reply.response, "answer 2");
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let upstream = Upstream {
        status: Some(StatusCode::UNAUTHORIZED),
        ..Default::default()
    };
    let backend = start(upstream.clone(), 3).await;
    let gw = gateway(&backend);
    let session = gw.create_session().await.unwrap();

    let err = gw
        .chat(&ChatRequest::text(&session.id, "hi", vec![]))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("500"), "got: {}", message);
    assert!(message.contains("Error generating response"), "got: {}", message);
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn session_and_chat_error_responses() {
    let backend = start(Upstream::default(), 0).await;
    let client = reqwest::Client::new();

    let missing = client
        .post(format!("{}/api/session", backend))
        .json(&json!({"action": "get", "id": "nope"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body, json!({"error": "Session not found"}));

    let bad_action = client
        .post(format!("{}/api/session", backend))
        .json(&json!({"action": "delete"}))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_action.status(), 400);

    let unknown_session = client
        .post(format!("{}/api/chat", backend))
        .json(&json!({"sessionId": "nope", "query": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown_session.status(), 400);
    let body: Value = unknown_session.json().await.unwrap();
    assert_eq!(body["error"], "Invalid session");

    let malformed = client
        .post(format!("{}/api/chat", backend))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 400);
}

#[tokio::test]
async fn health_reports_version() {
    let backend = start(Upstream::default(), 0).await;
    let body: Value = reqwest::get(format!("{}/health", backend))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
