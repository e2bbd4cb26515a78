use axum::{
    Json,
    body::{Body, to_bytes},
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::server::AppState;

/// Slash command payloads are a handful of form fields.
pub const COMMAND_BODY_LIMIT: usize = 16 * 1024;

// =============================================================================
// Chat Command Signature Middleware
// =============================================================================

/// Rejects chat commands whose signature does not match the signing secret.
///
/// The body is buffered so the signature can cover the raw bytes, then handed
/// on unchanged. Requests pass through untouched when no signing secret is
/// configured.
pub async fn verify_command_signature(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(verifier) = state.command_verifier.clone() else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, COMMAND_BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "Chat command body rejected");
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "payload_too_large" })),
            )
                .into_response();
        }
    };

    if let Err(e) = verifier.verify(&parts.headers, &bytes) {
        tracing::warn!(error = %e, "Rejected chat command with a bad signature");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid_signature", "message": e.to_string() })),
        )
            .into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
