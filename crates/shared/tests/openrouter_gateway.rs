use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use shared::llm::{
    LlmChatRequest, LlmGateway, LlmGatewayError, OpenRouterGateway, OpenRouterGatewayConfig,
};
use shared::models::Message;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc, oneshot};

#[derive(Debug, Clone)]
struct MockReply {
    status: StatusCode,
    body: String,
}

#[derive(Debug, Clone)]
struct TestServerState {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    seen_payloads: Arc<Mutex<Vec<Value>>>,
    seen_auth_headers: Arc<Mutex<Vec<String>>>,
}

impl TestServerState {
    fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            seen_payloads: Arc::new(Mutex::new(Vec::new())),
            seen_auth_headers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[tokio::test]
async fn streams_deltas_in_order_and_sends_transcript() {
    let state = TestServerState::with_replies(vec![sse_reply(&[
        ": OPENROUTER PROCESSING",
        &delta_line("gen-1", "Sure! "),
        &delta_line("gen-1", "[SEARCH_EVENT: Taylor"),
        &delta_line("gen-1", " Swift]"),
        &finish_line("gen-1"),
        "data: [DONE]",
    ])]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = OpenRouterGateway::new(config_for(url)).expect("gateway should build");
    let (chunk_tx, mut chunk_rx) = mpsc::channel(16);
    let summary = gateway
        .stream_chat(
            LlmChatRequest::new(
                "system prompt",
                vec![Message::user("I want to see Taylor Swift")],
            )
            .with_requester_id("user-1"),
            chunk_tx,
        )
        .await
        .expect("stream should complete");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    let mut chunks = Vec::new();
    while let Some(chunk) = chunk_rx.recv().await {
        chunks.push(chunk);
    }
    assert_eq!(chunks, vec!["Sure! ", "[SEARCH_EVENT: Taylor", " Swift]"]);
    assert_eq!(summary.text, "Sure! [SEARCH_EVENT: Taylor Swift]");
    assert_eq!(summary.model, "provider-model");
    assert_eq!(summary.provider_request_id.as_deref(), Some("gen-1"));

    let payloads = state.seen_payloads.lock().await.clone();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["model"], "test-model");
    assert_eq!(payloads[0]["stream"], true);
    assert_eq!(payloads[0]["user"], "user-1");
    assert_eq!(payloads[0]["messages"][0]["role"], "system");
    assert_eq!(payloads[0]["messages"][1]["role"], "user");
    assert_eq!(
        payloads[0]["messages"][1]["content"],
        "I want to see Taylor Swift"
    );

    let auth_headers = state.seen_auth_headers.lock().await.clone();
    assert_eq!(auth_headers, vec!["Bearer test-openrouter-key".to_string()]);
}

#[tokio::test]
async fn stream_closed_early_is_interrupted_and_keeps_partial_chunks() {
    let state = TestServerState::with_replies(vec![sse_reply(&[
        &delta_line("gen-2", "Partial "),
        &delta_line("gen-2", "answer"),
    ])]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state).await;

    let gateway = OpenRouterGateway::new(config_for(url)).expect("gateway should build");
    let (chunk_tx, mut chunk_rx) = mpsc::channel(16);
    let err = gateway
        .stream_chat(LlmChatRequest::new("system", vec![Message::user("hi")]), chunk_tx)
        .await
        .expect_err("stream without completion should fail");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert!(matches!(err, LlmGatewayError::StreamInterrupted(_)));
    let mut received = String::new();
    while let Some(chunk) = chunk_rx.recv().await {
        received.push_str(&chunk);
    }
    assert_eq!(received, "Partial answer");
}

#[tokio::test]
async fn http_error_is_provider_failure_without_retry() {
    let state = TestServerState::with_replies(vec![
        MockReply {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: json!({"error": {"code": "rate_limited"}}).to_string(),
        },
        sse_reply(&[&delta_line("gen-3", "never sent"), "data: [DONE]"]),
    ]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = OpenRouterGateway::new(config_for(url)).expect("gateway should build");
    let (chunk_tx, _chunk_rx) = mpsc::channel(16);
    let err = gateway
        .stream_chat(LlmChatRequest::new("system", vec![Message::user("hi")]), chunk_tx)
        .await
        .expect_err("429 should fail");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert!(matches!(
        err,
        LlmGatewayError::ProviderFailure(message) if message == "status=429 code=rate_limited"
    ));
    assert_eq!(state.seen_payloads.lock().await.len(), 1);
}

#[tokio::test]
async fn malformed_chunk_is_invalid_payload() {
    let state = TestServerState::with_replies(vec![sse_reply(&["data: {not json"])]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state).await;

    let gateway = OpenRouterGateway::new(config_for(url)).expect("gateway should build");
    let (chunk_tx, _chunk_rx) = mpsc::channel(16);
    let err = gateway
        .stream_chat(LlmChatRequest::new("system", vec![Message::user("hi")]), chunk_tx)
        .await
        .expect_err("bad chunk should fail");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert!(matches!(err, LlmGatewayError::InvalidProviderPayload(_)));
}

#[tokio::test]
async fn crlf_framed_stream_and_mid_stream_error_chunk() {
    let body = format!(
        "{}\r\n\r\n{}\r\n\r\n",
        delta_line("gen-3", "Checking "),
        r#"data: {"error":{"code":"overloaded","message":"busy"}}"#
    );
    let state = TestServerState::with_replies(vec![MockReply {
        status: StatusCode::OK,
        body,
    }]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state).await;

    let gateway = OpenRouterGateway::new(config_for(url)).expect("gateway should build");
    let (chunk_tx, mut chunk_rx) = mpsc::channel(16);
    let err = gateway
        .stream_chat(LlmChatRequest::new("system", vec![Message::user("hi")]), chunk_tx)
        .await
        .expect_err("error chunk should fail the stream");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert!(matches!(
        err,
        LlmGatewayError::ProviderFailure(message) if message == "stream_error code=overloaded"
    ));
    assert_eq!(chunk_rx.recv().await.as_deref(), Some("Checking "));
}

fn config_for(chat_completions_url: String) -> OpenRouterGatewayConfig {
    OpenRouterGatewayConfig {
        chat_completions_url,
        api_key: "test-openrouter-key".to_string(),
        timeout_ms: 2_000,
        model: "test-model".to_string(),
    }
}

fn delta_line(id: &str, content: &str) -> String {
    format!(
        "data: {}",
        json!({
            "id": id,
            "model": "provider-model",
            "choices": [{"delta": {"content": content}, "finish_reason": null}]
        })
    )
}

fn finish_line(id: &str) -> String {
    format!(
        "data: {}",
        json!({
            "id": id,
            "model": "provider-model",
            "choices": [{"delta": {}, "finish_reason": "stop"}]
        })
    )
}

fn sse_reply(lines: &[&str]) -> MockReply {
    let mut body = String::new();
    for line in lines {
        body.push_str(line);
        body.push_str("\n\n");
    }

    MockReply {
        status: StatusCode::OK,
        body,
    }
}

async fn spawn_test_server(
    state: TestServerState,
) -> (String, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/chat/completions", post(test_chat_completions_handler))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let local_addr = listener
        .local_addr()
        .expect("listener address should resolve");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let server_task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });

        server.await.expect("test server should run");
    });

    (
        format!("http://{local_addr}/chat/completions"),
        shutdown_tx,
        server_task,
    )
}

async fn test_chat_completions_handler(
    State(state): State<TestServerState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    state.seen_payloads.lock().await.push(payload);

    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
    {
        state.seen_auth_headers.lock().await.push(value.to_string());
    }

    let reply = state.replies.lock().await.pop_front().unwrap_or(MockReply {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: json!({"error": {"code": "exhausted_test_replies"}}).to_string(),
    });

    (
        reply.status,
        [(header::CONTENT_TYPE, "text/event-stream")],
        reply.body,
    )
}
