use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use super::errors::{store_error_response, unauthorized_response};
use super::{AppState, AuthUser};

/// Resolves an optional bearer token. No header means a guest; a header that
/// does not resolve to a user is rejected.
pub(super) async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().map(str::to_string));

    let user_id = match auth_header {
        None => None,
        Some(Err(_)) => {
            warn!("authorization header is not valid ascii");
            return unauthorized_response();
        }
        Some(Ok(value)) => {
            let Some(token) = value
                .strip_prefix("Bearer ")
                .map(str::trim)
                .filter(|token| !token.is_empty())
            else {
                warn!("missing or invalid authorization header");
                return unauthorized_response();
            };

            match state.identity.resolve_user(token).await {
                Ok(Some(user_id)) => Some(user_id),
                Ok(None) => {
                    warn!("bearer token did not resolve to a user");
                    return unauthorized_response();
                }
                Err(err) => return store_error_response(err),
            }
        }
    };

    req.extensions_mut().insert(AuthUser { user_id });
    next.run(req).await
}
