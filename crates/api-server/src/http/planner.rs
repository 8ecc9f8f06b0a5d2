use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream;
use serde::Serialize;
use shared::controller::{ControllerError, PlannerAction, PlanningController, SessionUpdate};
use shared::persistence::SidebarEdits;
use shared::planning::SessionView;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use super::errors::{
    conflict_response, not_found_response, store_error_response, unauthorized_response,
};
use super::observability::RequestContext;
use super::{AppState, AuthUser};

const UPDATE_CHANNEL_CAPACITY: usize = 64;
const SESSION_NOT_FOUND: &str = "Planning session not found";
const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

type SharedController = Arc<AsyncMutex<PlanningController>>;

/// Live planning sessions of this process, keyed by session id. A session is
/// only visible to the caller that created or opened it. Sessions idle past
/// the TTL are swept on insert unless an action still holds them.
#[derive(Clone)]
pub struct PlannerRegistry {
    slots: Arc<Mutex<HashMap<Uuid, PlannerSlot>>>,
    idle_ttl: Duration,
}

struct PlannerSlot {
    owner: Option<Uuid>,
    controller: SharedController,
    sidebar: Arc<SidebarEdits>,
    last_active: Instant,
}

impl Default for PlannerRegistry {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }
}

impl PlannerRegistry {
    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            slots: Arc::default(),
            idle_ttl,
        }
    }

    pub fn insert(&self, controller: PlanningController) -> SharedController {
        let id = controller.id();
        let slot = PlannerSlot {
            owner: controller.owner(),
            sidebar: controller.sidebar(),
            controller: Arc::new(AsyncMutex::new(controller)),
            last_active: Instant::now(),
        };
        let shared = slot.controller.clone();

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|_, slot| {
            slot.last_active.elapsed() < self.idle_ttl || slot.controller.try_lock().is_err()
        });
        let evicted = before - slots.len();
        if evicted > 0 {
            debug!(evicted, live = slots.len(), "idle planning sessions evicted");
        }
        slots.insert(id, slot);
        shared
    }

    pub fn get(&self, session_id: Uuid, requester: Option<Uuid>) -> Option<SharedController> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots
            .get_mut(&session_id)
            .filter(|slot| slot.owner == requester)?;
        slot.last_active = Instant::now();
        Some(slot.controller.clone())
    }

    /// Sidebar cell of a live session, for renames made outside the session.
    pub fn sidebar(&self, session_id: Uuid, requester: Option<Uuid>) -> Option<Arc<SidebarEdits>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session_id)
            .filter(|slot| slot.owner == requester)
            .map(|slot| slot.sidebar.clone())
    }

    /// Drops a live session and marks it deleted, so an action still running
    /// on it saves nothing more.
    pub fn remove(&self, session_id: Uuid, requester: Option<Uuid>) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if !slots
            .get(&session_id)
            .is_some_and(|slot| slot.owner == requester)
        {
            return false;
        }
        let Some(slot) = slots.remove(&session_id) else {
            return false;
        };
        slot.sidebar.mark_deleted();
        true
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PlannerSessionResponse {
    session_id: Uuid,
    view: SessionView,
}

pub(super) async fn create_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    let controller = PlanningController::new_draft(state.planner.clone(), user.user_id);
    let response = PlannerSessionResponse {
        session_id: controller.id(),
        view: controller.view(),
    };
    state.sessions.insert(controller);
    debug!(session_id = %response.session_id, guest = user.user_id.is_none(), "draft planning session created");

    (StatusCode::CREATED, Json(response)).into_response()
}

/// Reopens a saved chat. A session that is already live for this user is
/// returned as is.
pub(super) async fn open_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(user_id) = user.user_id else {
        return unauthorized_response();
    };
    let Ok(session_id) = Uuid::parse_str(&session_id) else {
        return not_found_response(SESSION_NOT_FOUND);
    };

    if let Some(controller) = state.sessions.get(session_id, Some(user_id)) {
        let Ok(controller) = controller.try_lock() else {
            return in_flight_response();
        };
        return view_response(&controller);
    }

    let controller = match PlanningController::open(
        state.planner.clone(),
        state.store.as_ref(),
        user_id,
        session_id,
    )
    .await
    {
        Ok(controller) => controller,
        Err(ControllerError::NotFound) => return not_found_response(SESSION_NOT_FOUND),
        Err(ControllerError::Store(err)) => return store_error_response(err),
        Err(err) => {
            debug!(session_id = %session_id, "failed to open chat: {err}");
            return not_found_response(SESSION_NOT_FOUND);
        }
    };

    let response = view_response(&controller);
    state.sessions.insert(controller);
    info!(session_id = %session_id, "planning session opened");
    response
}

pub(super) async fn get_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(controller) = lookup(&state, &session_id, user) else {
        return not_found_response(SESSION_NOT_FOUND);
    };
    let Ok(controller) = controller.try_lock() else {
        return in_flight_response();
    };

    view_response(&controller)
}

/// Runs one action and streams its updates as server-sent events. The
/// action keeps running if the client goes away.
pub(super) async fn apply_action(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(context): Extension<RequestContext>,
    Path(session_id): Path<String>,
    Json(action): Json<PlannerAction>,
) -> Response {
    let Some(controller) = lookup(&state, &session_id, user) else {
        return not_found_response(SESSION_NOT_FOUND);
    };
    let Ok(mut controller) = controller.try_lock_owned() else {
        return in_flight_response();
    };

    let (update_tx, update_rx) = mpsc::channel::<SessionUpdate>(UPDATE_CHANNEL_CAPACITY);
    let request_id = context.request_id;
    tokio::spawn(async move {
        let result = controller.apply(action, &update_tx).await;
        let session_id = controller.id();
        // Unlock before the stream closes so the client's next action is accepted.
        drop(controller);
        drop(update_tx);
        if let Err(err) = result {
            debug!(
                request_id = %request_id,
                session_id = %session_id,
                code = err.code(),
                "planner action finished with rejection"
            );
        }
    });

    let updates = stream::unfold(update_rx, |mut update_rx| async move {
        let update = update_rx.recv().await?;
        Some((Event::default().json_data(&update), update_rx))
    });

    Sse::new(updates)
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn lookup(state: &AppState, session_id: &str, user: AuthUser) -> Option<SharedController> {
    let session_id = Uuid::parse_str(session_id).ok()?;
    state.sessions.get(session_id, user.user_id)
}

fn view_response(controller: &PlanningController) -> Response {
    (
        StatusCode::OK,
        Json(PlannerSessionResponse {
            session_id: controller.id(),
            view: controller.view(),
        }),
    )
        .into_response()
}

fn in_flight_response() -> Response {
    conflict_response(
        "response_in_flight",
        "A response is still streaming for this session",
    )
}
