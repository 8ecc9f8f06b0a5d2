use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

pub struct JsonResponse {
    pub status: StatusCode,
    pub body: Value,
}

pub async fn send_json(app: &axum::Router, request: Request<Body>) -> JsonResponse {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should succeed");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should read");
    let body = serde_json::from_slice::<Value>(&body).unwrap_or_else(|_| json!({}));

    JsonResponse { status, body }
}

/// Sends a request whose response is a server-sent event stream and
/// collects every `data:` payload until the stream closes.
pub async fn send_sse(app: &axum::Router, request: Request<Body>) -> (StatusCode, Vec<Value>) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should succeed");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("event stream should read");

    (status, sse_payloads(&body))
}

pub fn sse_payloads(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<Value>(data.trim()).ok())
        .collect()
}

pub fn request(method: Method, path: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::ACCEPT, "application/json");

    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, token);
    }

    let request_body = body
        .map(|value| {
            serde_json::to_vec(&value).expect("json body should serialize for integration request")
        })
        .unwrap_or_default();
    if !request_body.is_empty() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }

    builder
        .body(Body::from(request_body))
        .expect("integration request should build")
}

pub fn error_code(body: &Value) -> Option<&str> {
    body.get("error")?.get("code")?.as_str()
}

pub fn update_types(updates: &[Value]) -> Vec<&str> {
    updates
        .iter()
        .filter_map(|update| update.get("type")?.as_str())
        .collect()
}
