use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, warn};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;
const PLANNER_SESSIONS_PREFIX: &str = "/v1/planner/sessions/";
const EVENT_STREAM: &str = "text/event-stream";

#[derive(Clone, Debug)]
pub(super) struct RequestContext {
    pub(super) request_id: String,
}

/// Logs one line per request. Planner actions answer with an SSE stream, so
/// their line is written when the stream's headers go out and `streaming`
/// marks that the latency excludes the body.
pub(super) async fn request_observability_middleware(mut req: Request, next: Next) -> Response {
    let request_id = resolve_request_id(&req);
    let planner_session = planner_session_id(req.uri().path());
    req.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });

    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let started_at = Instant::now();

    let mut response = next.run(req).await;
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(
            header::HeaderName::from_static(REQUEST_ID_HEADER),
            header_value,
        );
    }

    let status = response.status().as_u16();
    let streaming = is_event_stream(response.headers());
    let latency_ms = started_at.elapsed().as_millis() as u64;
    let session = planner_session.map(|id| id.to_string()).unwrap_or_default();
    if status >= 500 {
        warn!(
            request_id = %request_id,
            method = %method,
            route = %route,
            planner_session = %session,
            status,
            streaming,
            latency_ms,
            "planner api request failed"
        );
    } else {
        info!(
            request_id = %request_id,
            method = %method,
            route = %route,
            planner_session = %session,
            status,
            streaming,
            latency_ms,
            "planner api request"
        );
    }

    response
}

fn planner_session_id(path: &str) -> Option<Uuid> {
    let rest = path.strip_prefix(PLANNER_SESSIONS_PREFIX)?;
    let segment = rest.split('/').next()?;
    Uuid::parse_str(segment).ok()
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(EVENT_STREAM))
}

fn resolve_request_id(req: &Request) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(normalize_request_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn normalize_request_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_REQUEST_ID_LEN {
        return None;
    }

    let valid = trimmed
        .bytes()
        .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.'));
    valid.then(|| trimmed.to_string())
}
