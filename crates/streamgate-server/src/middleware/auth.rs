//! Bearer-token authentication middleware

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::state::AppState;

/// Reject requests whose `Authorization: Bearer <token>` header is missing
/// or does not match the configured API token.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let rejection = match request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
    {
        None => Some("Token is missing!"),
        Some(token) if !verify_token(token, &state.config.auth.api_token) => {
            Some("Invalid token!")
        }
        Some(_) => None,
    };

    if let Some(message) = rejection {
        warn!(uri = %request.uri(), reason = message, "Rejected unauthenticated request");
        return unauthorized(message);
    }

    next.run(request).await
}

/// Token part of a `Bearer <token>` header value.
pub fn bearer_token(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .and_then(|rest| rest.split(' ').next())
        .filter(|token| !token.is_empty())
}

/// Compare tokens in constant time. A blank expected token matches nothing.
pub fn verify_token(token: &str, expected: &str) -> bool {
    if expected.trim().is_empty() || token.len() != expected.len() {
        return false;
    }

    token
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "message": message })),
    )
        .into_response()
}
