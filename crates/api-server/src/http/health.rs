use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use shared::models::OkResponse;
use tracing::warn;

use super::AppState;

/// Which upstreams have credentials. A missing one degrades its lookups to
/// `failed` results instead of failing readiness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub llm: bool,
    pub events: bool,
    pub places: bool,
    pub hotels: bool,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    ok: bool,
    store: bool,
    #[serde(flatten)]
    upstreams: Readiness,
}

pub(super) async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(OkResponse { ok: true }))
}

/// Only the chat store gates readiness.
pub(super) async fn readyz(State(state): State<AppState>) -> Response {
    let store = match state.store.ping().await {
        Ok(()) => true,
        Err(err) => {
            warn!("chat store is not ready: {err}");
            false
        }
    };

    let status = if store {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            ok: store,
            store,
            upstreams: state.readiness,
        }),
    )
        .into_response()
}
