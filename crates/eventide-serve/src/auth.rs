//! Bearer token authentication middleware for admin routes.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::AppState;

/// Middleware that requires a valid Bearer token on admin requests.
///
/// The token must be provided in the `Authorization` header as:
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// Tokens are validated against `EVENTIDE_ADMIN_TOKENS`. With no tokens
/// configured every request passes.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.config.admin_tokens.is_empty() {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "));

    let Some(token) = token else {
        tracing::debug!("missing or malformed authorization header");
        return Err(ApiError::Unauthorized);
    };

    if !state.config.admin_tokens.contains(token) {
        tracing::debug!("invalid admin token");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
