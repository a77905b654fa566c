//! Logout endpoints and the current-user probe.

use super::{
    audit::{self, AuditAction, AuditEvent},
    principal::{require_auth, Principal},
    refresh_tokens,
    types::{RefreshRequest, UserOut},
    utils::{extract_request_meta, RequestMeta},
    AuthError, AuthState,
};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Refresh token revoked. Idempotent."),
        (status = 400, description = "Missing payload."),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let meta = extract_request_meta(&headers);

    match handle_logout(&pool, &principal, &request.refresh_token, &meta).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle_logout(
    pool: &PgPool,
    principal: &Principal,
    refresh_token: &str,
    meta: &RequestMeta,
) -> Result<(), AuthError> {
    // Unknown, already revoked and foreign tokens all no-op; the response
    // never reveals whether the token existed.
    if let Some(record) = refresh_tokens::find_active(pool, refresh_token).await? {
        if record.user_id == principal.user_id {
            refresh_tokens::revoke(pool, refresh_token).await?;
        }
    }

    audit::record(
        pool,
        AuditEvent {
            user_id: Some(principal.user_id),
            user_email: Some(&principal.email),
            action: AuditAction::Logout,
            detail: None,
            meta,
        },
    )
    .await?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout-all",
    responses(
        (status = 204, description = "Every refresh token of the caller revoked."),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "auth"
)]
pub async fn logout_all(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let meta = extract_request_meta(&headers);

    match handle_logout_all(&pool, &principal, &meta).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle_logout_all(
    pool: &PgPool,
    principal: &Principal,
    meta: &RequestMeta,
) -> Result<(), AuthError> {
    let revoked = refresh_tokens::revoke_all_for_user(pool, principal.user_id).await?;

    let detail = format!("revoked={revoked}");
    audit::record(
        pool,
        AuditEvent {
            user_id: Some(principal.user_id),
            user_email: Some(&principal.email),
            action: AuditAction::TokenRevokeAll,
            detail: Some(&detail),
            meta,
        },
    )
    .await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "The authenticated user.", body = UserOut),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => (
            StatusCode::OK,
            Json(UserOut {
                id: principal.user_id,
                email: principal.email,
                is_admin: principal.is_admin,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
