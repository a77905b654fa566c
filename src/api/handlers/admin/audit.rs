//! Read access to the audit log.

use super::super::auth::{
    audit::{self, AuditAction, AuditLogEntry},
    principal::require_admin,
    AuthError, AuthState,
};
use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditLogQuery {
    /// Page size, clamped into `1..=500`. Defaults to 100.
    pub limit: Option<i64>,
    /// Rows to skip. Negative values read as 0.
    pub offset: Option<i64>,
    /// Restrict to one action code, like `LOGIN_FAILURE`.
    pub action: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/audit-log",
    params(AuditLogQuery),
    responses(
        (status = 200, description = "Audit entries, newest first.", body = [AuditLogEntry]),
        (status = 400, description = "Unknown action code."),
        (status = 401, description = "Missing or invalid access token."),
        (status = 403, description = "Caller is not an admin."),
    ),
    tag = "admin"
)]
pub async fn list_audit_log(
    Query(query): Query<AuditLogQuery>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    if let Err(err) = require_admin(&headers, &pool, &auth_state).await {
        return err.into_response();
    }

    let action = match query.action.as_deref() {
        Some(code) => match AuditAction::parse(code) {
            Some(action) => Some(action),
            None => return (StatusCode::BAD_REQUEST, "Unknown audit action").into_response(),
        },
        None => None,
    };

    match audit::list(&pool, query.limit, query.offset, action).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => AuthError::from(err).into_response(),
    }
}
