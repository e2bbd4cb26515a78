use axum::{
    Form, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::error::{ErrorKind, SyncError};
use crate::resolver::Resolution;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "rollcall",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "running" }))
}

/// Ready when the membership store answers.
pub async fn readyz(State(state): State<AppState>) -> Response {
    match state.store.count().await {
        Ok(principals) => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "principals": principals })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::AuthFailure | ErrorKind::ProviderUnavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Busy => StatusCode::CONFLICT,
    }
}

fn error_response(kind: ErrorKind, message: String) -> Response {
    (
        status_for(kind),
        Json(json!({ "error": kind.to_string(), "message": message })),
    )
        .into_response()
}

// ---- Resolution ----

#[derive(Debug, Serialize)]
pub struct GroupsResponse {
    pub principal: String,
    pub groups: Vec<String>,
}

pub async fn principal_groups(
    State(state): State<AppState>,
    Path(principal): Path<String>,
) -> Response {
    match state.resolver.resolve(&principal).await {
        Ok(Resolution::Found(groups)) => (
            StatusCode::OK,
            Json(GroupsResponse {
                principal: principal.trim().to_string(),
                groups: groups.to_vec(),
            }),
        )
            .into_response(),
        Ok(Resolution::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "principal": principal.trim(), "error": "not_found" })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, kind = %e.kind(), "Group resolution failed");
            error_response(e.kind(), e.to_string())
        }
    }
}

// ---- Reconciliation trigger ----

fn bearer_matches(headers: &HeaderMap, secret: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token.as_bytes().ct_eq(secret.as_bytes()).into())
}

/// Runs one reconciliation. Requires `Authorization: Bearer <cron_secret>`.
pub async fn trigger_reconcile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let authorized = state
        .cron_secret
        .as_deref()
        .is_some_and(|secret| bearer_matches(&headers, secret));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "success": false }))).into_response();
    }

    match state.reconciler.reconcile_once().await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({ "message": "Cron job completed successfully", "report": report })),
        )
            .into_response(),
        Err(e) => error_response(e.kind(), e.to_string()),
    }
}

// ---- Slash command ----

#[derive(Debug, Deserialize)]
pub struct PermissionsCommand {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct CommandReply {
    pub response_type: &'static str,
    pub text: String,
}

/// Reply text for a `/permissions` lookup.
pub fn permissions_reply_text(principal: &str, result: &Result<Resolution, SyncError>) -> String {
    match result {
        Ok(Resolution::Found(groups)) if groups.is_empty() => {
            format!("User *{principal}* doesn't belong to any groups.")
        }
        Ok(Resolution::Found(groups)) => {
            let listing = groups.iter().collect::<Vec<_>>().join("\n");
            format!("User *{principal}* belongs to the following groups:\n```\n{listing}\n```")
        }
        Ok(Resolution::NotFound) => format!("User *{principal}* not found."),
        Err(_) => "An error occurred while fetching user data.".to_string(),
    }
}

pub async fn permissions_command(
    State(state): State<AppState>,
    Form(command): Form<PermissionsCommand>,
) -> Json<CommandReply> {
    let principal = command.text.trim();
    tracing::info!(principal, "Processing permissions command");

    let result = if principal.is_empty() {
        Ok(Resolution::NotFound)
    } else {
        state.resolver.resolve(principal).await
    };
    if let Err(e) = &result {
        tracing::error!(error = %e, "Permissions command failed");
    }

    Json(CommandReply {
        response_type: "ephemeral",
        text: permissions_reply_text(principal, &result),
    })
}
