//! Bearer-token authentication for the public API routes.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::server::AppState;

/// Compare two byte strings without short-circuiting on the first
/// mismatch, so the comparison time does not depend on how much of
/// the token was right.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Reject requests whose `Authorization: Bearer <token>` header does
/// not match the configured secret.
pub async fn require_bearer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let authorized = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| constant_time_eq(token.as_bytes(), state.config.auth_token.as_bytes()))
        .unwrap_or(false);

    if authorized {
        next.run(req).await
    } else {
        ApiError::Unauthorized.into_response()
    }
}
