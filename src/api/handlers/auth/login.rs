//! Credential login and refresh-token rotation.

use super::{
    audit::{self, AuditAction, AuditEvent},
    password, refresh_tokens, storage, tokens,
    types::{LoginRequest, RefreshRequest, TokenPair},
    utils::{extract_request_meta, RequestMeta},
    AuthError, AuthState,
};
use anyhow::Context;
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::{PgExecutor, PgPool};
use std::sync::Arc;

/// Issue a fresh access/refresh pair for `user_id`, persisting the refresh
/// token through `executor` so callers control the transaction boundary.
pub(super) async fn issue_pair<'e>(
    executor: impl PgExecutor<'e>,
    state: &AuthState,
    user_id: i64,
    issued_to_ip: Option<&str>,
) -> Result<TokenPair, AuthError> {
    let access_token = state.tokens().issue_access_token(user_id)?;
    let refresh_token = tokens::generate_refresh_token_value()?;
    refresh_tokens::create(
        executor,
        user_id,
        &refresh_token,
        state.config().refresh_ttl_days(),
        issued_to_ip,
    )
    .await?;
    Ok(TokenPair::bearer(access_token, refresh_token))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/token",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access and refresh token pair.", body = TokenPair),
        (status = 400, description = "Missing payload."),
        (status = 401, description = "Unknown email or wrong password."),
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let meta = extract_request_meta(&headers);

    match handle_login(&pool, &auth_state, &request, &meta).await {
        Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle_login(
    pool: &PgPool,
    state: &AuthState,
    request: &LoginRequest,
    meta: &RequestMeta,
) -> Result<TokenPair, AuthError> {
    let user = storage::find_by_email(pool, &request.email).await?;
    let verified = user
        .as_ref()
        .is_some_and(|user| password::verify(&request.password, &user.password_hash));

    let Some(user) = user.filter(|_| verified) else {
        // Unknown email and wrong password are indistinguishable to the caller.
        audit::record(
            pool,
            AuditEvent {
                user_id: None,
                user_email: Some(&request.email),
                action: AuditAction::LoginFailure,
                detail: None,
                meta,
            },
        )
        .await?;
        return Err(AuthError::Unauthorized);
    };

    let pair = issue_pair(pool, state, user.id, meta.ip_address.as_deref()).await?;
    audit::record(
        pool,
        AuditEvent {
            user_id: Some(user.id),
            user_email: Some(&user.email),
            action: AuditAction::LoginSuccess,
            detail: None,
            meta,
        },
    )
    .await?;

    Ok(pair)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/token/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated token pair; the presented refresh token is revoked.", body = TokenPair),
        (status = 400, description = "Missing payload."),
        (status = 401, description = "Unknown, expired or revoked refresh token."),
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let meta = extract_request_meta(&headers);

    match handle_refresh(&pool, &auth_state, &request, &meta).await {
        Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle_refresh(
    pool: &PgPool,
    state: &AuthState,
    request: &RefreshRequest,
    meta: &RequestMeta,
) -> Result<TokenPair, AuthError> {
    // Rotation is transactional: the revoke and the replacement insert commit
    // together or not at all. Two racing refreshes of the same token yield
    // exactly one winner; the loser gets a 401.
    let mut tx = pool
        .begin()
        .await
        .context("failed to begin refresh transaction")?;

    let Some(user_id) = refresh_tokens::consume_for_rotation(&mut *tx, &request.refresh_token).await?
    else {
        return Err(AuthError::Unauthorized);
    };

    let user = storage::find_by_id(&mut *tx, user_id)
        .await?
        .ok_or(AuthError::Unauthorized)?;

    let pair = issue_pair(&mut *tx, state, user.id, meta.ip_address.as_deref()).await?;
    audit::record(
        &mut *tx,
        AuditEvent {
            user_id: Some(user.id),
            user_email: Some(&user.email),
            action: AuditAction::TokenRefresh,
            detail: None,
            meta,
        },
    )
    .await?;

    tx.commit()
        .await
        .context("failed to commit refresh transaction")?;

    Ok(pair)
}
