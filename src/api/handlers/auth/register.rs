//! Invite-only registration.

use super::{
    audit::{self, AuditAction, AuditEvent},
    invites, password, storage,
    types::{RegisterRequest, UserOut},
    utils::{extract_request_meta, valid_email, RequestMeta},
    AuthError,
};
use anyhow::Context;
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created; the invite is consumed.", body = UserOut),
        (status = 400, description = "Invalid email, weak password, used invite or taken email."),
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<RegisterRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    if !valid_email(&request.email) {
        return (StatusCode::BAD_REQUEST, "Invalid email address").into_response();
    }

    let meta = extract_request_meta(&headers);

    match handle_register(&pool, &request, &meta).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle_register(
    pool: &PgPool,
    request: &RegisterRequest,
    meta: &RequestMeta,
) -> Result<UserOut, AuthError> {
    // Cheap pre-checks outside the transaction; the invite consume and the
    // unique email index re-check both atomically below.
    if !invites::is_available(pool, &request.invite_token).await? {
        return Err(AuthError::InvalidInvite);
    }
    if storage::find_by_email(pool, &request.email).await?.is_some() {
        return Err(AuthError::EmailTaken);
    }

    password::validate_strength(&request.password).map_err(AuthError::WeakPassword)?;
    let password_hash = password::hash(&request.password)?;

    let mut tx = pool
        .begin()
        .await
        .context("failed to begin register transaction")?;

    let Some(user_id) = storage::insert_user(&mut *tx, &request.email, &password_hash).await?
    else {
        return Err(AuthError::EmailTaken);
    };

    if !invites::consume(&mut *tx, &request.invite_token, user_id).await? {
        // The invite was claimed concurrently; the user insert rolls back
        // with the transaction.
        return Err(AuthError::InvalidInvite);
    }

    audit::record(
        &mut *tx,
        AuditEvent {
            user_id: Some(user_id),
            user_email: Some(&request.email),
            action: AuditAction::Register,
            detail: None,
            meta,
        },
    )
    .await?;

    tx.commit()
        .await
        .context("failed to commit register transaction")?;

    Ok(UserOut {
        id: user_id,
        email: request.email.clone(),
        is_admin: false,
    })
}
