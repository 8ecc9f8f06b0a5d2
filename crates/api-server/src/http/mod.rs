use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Router, middleware};
use shared::controller::PlannerDeps;
use shared::repos::{ChatStore, IdentityResolver};
use shared::search::DistanceMatrix;
use uuid::Uuid;

mod authn;
mod chats;
mod errors;
mod health;
mod observability;
mod planner;
mod search;

pub use health::Readiness;
pub use planner::PlannerRegistry;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub identity: Arc<dyn IdentityResolver>,
    pub planner: Arc<PlannerDeps>,
    pub distances: Arc<dyn DistanceMatrix>,
    pub sessions: PlannerRegistry,
    pub readiness: Readiness,
}

/// Caller identity. `None` is a guest: planning works, nothing is saved.
#[derive(Clone, Copy)]
pub(super) struct AuthUser {
    pub(super) user_id: Option<Uuid>,
}

pub fn build_router(app_state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/v1/events", get(search::search_events))
        .route("/v1/places", get(search::search_places))
        .route("/v1/hotels", get(search::search_hotels))
        .route("/v1/distances", post(search::distances))
        .with_state(app_state.clone());

    let auth_layer_state = app_state.clone();

    let identified_routes = Router::new()
        .route("/v1/chats", get(chats::list_chats))
        .route(
            "/v1/chats/{chat_id}",
            get(chats::get_chat)
                .patch(chats::update_chat)
                .delete(chats::delete_chat),
        )
        .route("/v1/planner/sessions", post(planner::create_session))
        .route("/v1/planner/sessions/{session_id}", get(planner::get_session))
        .route(
            "/v1/planner/sessions/{session_id}/open",
            post(planner::open_session),
        )
        .route(
            "/v1/planner/sessions/{session_id}/actions",
            post(planner::apply_action),
        )
        .layer(middleware::from_fn_with_state(
            auth_layer_state,
            authn::auth_middleware,
        ))
        .with_state(app_state);

    public_routes
        .merge(identified_routes)
        .layer(middleware::from_fn(
            observability::request_observability_middleware,
        ))
}
