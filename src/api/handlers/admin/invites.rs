//! Invite-token administration.

use super::super::auth::{
    audit::{self, AuditAction, AuditEvent},
    extract_request_meta,
    invites::{self, clamp_batch_count, DeleteOutcome, InviteToken},
    principal::require_admin,
    AuthError, AuthState,
};
use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct InviteBatchRequest {
    /// Requested number of tokens; clamped into `1..=100`.
    pub count: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/invite-tokens",
    request_body = InviteBatchRequest,
    responses(
        (status = 201, description = "Freshly minted invite tokens.", body = [InviteToken]),
        (status = 401, description = "Missing or invalid access token."),
        (status = 403, description = "Caller is not an admin."),
    ),
    tag = "admin"
)]
pub async fn create_invite_tokens(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<InviteBatchRequest>>,
) -> Response {
    let principal = match require_admin(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let count = clamp_batch_count(
        payload
            .and_then(|Json(request)| request.count)
            .unwrap_or(1),
    );
    let meta = extract_request_meta(&headers);

    let result: Result<Vec<InviteToken>, AuthError> = async {
        let tokens = invites::batch_create(&pool, count).await?;
        let detail = format!("count={}", tokens.len());
        audit::record(
            &pool.0,
            AuditEvent {
                user_id: Some(principal.user_id),
                user_email: Some(&principal.email),
                action: AuditAction::InviteCreate,
                detail: Some(&detail),
                meta: &meta,
            },
        )
        .await?;
        Ok(tokens)
    }
    .await;

    match result {
        Ok(tokens) => (StatusCode::CREATED, Json(tokens)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/invite-tokens",
    responses(
        (status = 200, description = "All invite tokens, newest first.", body = [InviteToken]),
        (status = 401, description = "Missing or invalid access token."),
        (status = 403, description = "Caller is not an admin."),
    ),
    tag = "admin"
)]
pub async fn list_invite_tokens(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    if let Err(err) = require_admin(&headers, &pool, &auth_state).await {
        return err.into_response();
    }

    match invites::list(&pool).await {
        Ok(tokens) => (StatusCode::OK, Json(tokens)).into_response(),
        Err(err) => AuthError::from(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/invite-tokens/{token}",
    params(
        ("token" = String, Path, description = "Invite token value")
    ),
    responses(
        (status = 204, description = "Unused invite deleted."),
        (status = 401, description = "Missing or invalid access token."),
        (status = 403, description = "Caller is not an admin."),
        (status = 404, description = "No such invite."),
        (status = 409, description = "Invite already used; kept as history."),
    ),
    tag = "admin"
)]
pub async fn delete_invite_token(
    Path(token): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_admin(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let meta = extract_request_meta(&headers);

    let result: Result<(), AuthError> = async {
        match invites::delete(&pool, &token).await? {
            DeleteOutcome::Deleted => {}
            DeleteOutcome::NotFound => return Err(AuthError::NotFound),
            DeleteOutcome::Used => {
                return Err(AuthError::Conflict("Invite token already used"))
            }
        }
        audit::record(
            &pool.0,
            AuditEvent {
                user_id: Some(principal.user_id),
                user_email: Some(&principal.email),
                action: AuditAction::InviteDelete,
                detail: None,
                meta: &meta,
            },
        )
        .await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}
