use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::directory::ChatDirectory;
use shared::models::{ChatDetailResponse, ListChatsResponse, OkResponse, UpdateChatRequest};
use shared::session::{ChatSession, UNTITLED_CHAT_TITLE, normalize_title};
use tracing::info;
use uuid::Uuid;

use super::errors::{
    bad_request_response, not_found_response, store_error_response, store_unavailable_response,
    unauthorized_response,
};
use super::{AppState, AuthUser};

const CHAT_NOT_FOUND: &str = "Chat not found";

pub(super) async fn list_chats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    let Some(user_id) = user.user_id else {
        return (StatusCode::OK, Json(ListChatsResponse { items: Vec::new() })).into_response();
    };

    match ChatDirectory::load(state.store.clone(), user_id).await {
        Ok(directory) => (
            StatusCode::OK,
            Json(ListChatsResponse {
                items: directory.into_sessions(),
            }),
        )
            .into_response(),
        Err(err) => store_error_response(err),
    }
}

pub(super) async fn get_chat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(chat_id): Path<String>,
) -> Response {
    let Some(user_id) = user.user_id else {
        return unauthorized_response();
    };
    let Ok(chat_id) = Uuid::parse_str(&chat_id) else {
        return not_found_response(CHAT_NOT_FOUND);
    };

    let record = match state.store.get_chat(user_id, chat_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return not_found_response(CHAT_NOT_FOUND),
        Err(err) => return store_error_response(err),
    };
    let session = match ChatSession::from_record(record) {
        Ok(session) => session,
        Err(err) => return store_error_response(err),
    };

    (
        StatusCode::OK,
        Json(ChatDetailResponse {
            id: session.id,
            title: session
                .title
                .clone()
                .unwrap_or_else(|| UNTITLED_CHAT_TITLE.to_string()),
            is_pinned: session.is_pinned,
            created_at: session.created_at,
            updated_at: session.updated_at,
            data: session.data(),
        }),
    )
        .into_response()
}

/// Renames and/or pins a chat. A live planning session for the chat gets the
/// edit first and queued snapshots are flushed, so no older snapshot can
/// overwrite the rename afterwards.
pub(super) async fn update_chat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(chat_id): Path<String>,
    Json(request): Json<UpdateChatRequest>,
) -> Response {
    let Some(user_id) = user.user_id else {
        return unauthorized_response();
    };
    let Ok(chat_id) = Uuid::parse_str(&chat_id) else {
        return not_found_response(CHAT_NOT_FOUND);
    };
    if request.title.is_none() && request.is_pinned.is_none() {
        return bad_request_response("empty_update", "Provide a title or isPinned");
    }

    if let Some(sidebar) = state.sessions.sidebar(chat_id, Some(user_id)) {
        if let Some(title) = request.title.as_deref() {
            sidebar.rename(normalize_title(title));
        }
        if let Some(is_pinned) = request.is_pinned {
            sidebar.set_pinned(is_pinned);
        }
    }
    flush_pending_saves(&state).await;

    let mut directory = match ChatDirectory::load(state.store.clone(), user_id).await {
        Ok(directory) => directory,
        Err(err) => return store_error_response(err),
    };

    if let Some(title) = request.title.as_deref() {
        let outcome = directory.rename(chat_id, title).await;
        if !outcome.found {
            return not_found_response(CHAT_NOT_FOUND);
        }
        if !outcome.persisted {
            return store_unavailable_response();
        }
    }
    if let Some(is_pinned) = request.is_pinned {
        let outcome = directory.set_pinned(chat_id, is_pinned).await;
        if !outcome.found {
            return not_found_response(CHAT_NOT_FOUND);
        }
        if !outcome.persisted {
            return store_unavailable_response();
        }
    }

    let Some(summary) = directory
        .sessions()
        .iter()
        .find(|session| session.id == chat_id)
        .cloned()
    else {
        return not_found_response(CHAT_NOT_FOUND);
    };

    // A busy session picks the edit up at its next action or save.
    if let Some(controller) = state.sessions.get(chat_id, Some(user_id)) {
        if let Ok(mut controller) = controller.try_lock() {
            controller.sync_sidebar();
        }
    }

    info!(chat_id = %chat_id, is_pinned = summary.is_pinned, "chat updated");
    (StatusCode::OK, Json(summary)).into_response()
}

pub(super) async fn delete_chat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(chat_id): Path<String>,
) -> Response {
    let Some(user_id) = user.user_id else {
        return unauthorized_response();
    };
    let Ok(chat_id) = Uuid::parse_str(&chat_id) else {
        return not_found_response(CHAT_NOT_FOUND);
    };

    // The live session stops saving before its queued snapshots drain, so
    // the delete below is the last write for this chat.
    let had_live_session = state.sessions.remove(chat_id, Some(user_id));
    flush_pending_saves(&state).await;

    let mut directory = match ChatDirectory::load(state.store.clone(), user_id).await {
        Ok(directory) => directory,
        Err(err) => return store_error_response(err),
    };
    let outcome = directory.delete(chat_id).await;
    if !outcome.found {
        return not_found_response(CHAT_NOT_FOUND);
    }
    if !outcome.persisted {
        return store_unavailable_response();
    }

    if let Some(writer) = state.planner.writer.as_ref() {
        writer.forget(chat_id);
    }
    info!(chat_id = %chat_id, had_live_session, "chat deleted");
    (StatusCode::OK, Json(OkResponse { ok: true })).into_response()
}

async fn flush_pending_saves(state: &AppState) {
    if let Some(writer) = state.planner.writer.as_ref() {
        writer.flush().await;
    }
}
