//! User administration: listing, patching and deletion.

use super::super::auth::{
    audit::{self, AuditAction, AuditEvent},
    extract_request_meta,
    principal::{require_admin, Principal},
    refresh_tokens, storage,
    storage::SetEmailOutcome,
    valid_email, AuthError, AuthState, RequestMeta,
};
use crate::api::handlers::auth::password;
use anyhow::Context;
use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminUserOut {
    pub id: i64,
    pub email: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Explicit patch: absent fields stay untouched. Unknown fields are rejected
/// rather than silently dropped.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserPatchRequest {
    pub email: Option<String>,
    pub is_admin: Option<bool>,
    pub password: Option<String>,
}

impl UserPatchRequest {
    fn is_empty(&self) -> bool {
        self.email.is_none() && self.is_admin.is_none() && self.password.is_none()
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    responses(
        (status = 200, description = "All users, newest first.", body = [AdminUserOut]),
        (status = 401, description = "Missing or invalid access token."),
        (status = 403, description = "Caller is not an admin."),
    ),
    tag = "admin"
)]
pub async fn list_users(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    if let Err(err) = require_admin(&headers, &pool, &auth_state).await {
        return err.into_response();
    }

    match storage::list_users(&pool).await {
        Ok(users) => {
            let users: Vec<AdminUserOut> = users
                .into_iter()
                .map(|user| AdminUserOut {
                    id: user.id,
                    email: user.email,
                    is_admin: user.is_admin,
                    created_at: user.created_at,
                })
                .collect();
            (StatusCode::OK, Json(users)).into_response()
        }
        Err(err) => AuthError::from(err).into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/users/{user_id}",
    params(
        ("user_id" = i64, Path, description = "Target user id")
    ),
    request_body = UserPatchRequest,
    responses(
        (status = 200, description = "Updated user.", body = AdminUserOut),
        (status = 400, description = "Empty patch, malformed or taken email, or weak password."),
        (status = 401, description = "Missing or invalid access token."),
        (status = 403, description = "Caller is not an admin, or tried to drop their own admin role."),
        (status = 404, description = "No such user."),
    ),
    tag = "admin"
)]
pub async fn update_user(
    Path(user_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UserPatchRequest>>,
) -> Response {
    let principal = match require_admin(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(patch)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    if patch.is_empty() {
        return (StatusCode::BAD_REQUEST, "No updates provided").into_response();
    }

    let meta = extract_request_meta(&headers);

    match apply_patch(&pool, &principal, user_id, &patch, &meta).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn apply_patch(
    pool: &PgPool,
    principal: &Principal,
    user_id: i64,
    patch: &UserPatchRequest,
    meta: &RequestMeta,
) -> Result<AdminUserOut, AuthError> {
    // Admins cannot lock themselves out by dropping their own role.
    if patch.is_admin == Some(false) && user_id == principal.user_id {
        return Err(AuthError::Forbidden(
            "Admins cannot revoke their own admin role",
        ));
    }

    // Patched emails pass the same format check registration applies.
    if patch.email.as_deref().is_some_and(|email| !valid_email(email)) {
        return Err(AuthError::InvalidEmail);
    }

    let mut changed: Vec<&str> = Vec::new();

    let mut tx = pool
        .begin()
        .await
        .context("failed to begin user update transaction")?;

    if storage::find_by_id(&mut *tx, user_id).await?.is_none() {
        return Err(AuthError::NotFound);
    }

    if let Some(email) = patch.email.as_deref() {
        match storage::set_email(&mut *tx, user_id, email).await? {
            SetEmailOutcome::Updated => changed.push("email"),
            SetEmailOutcome::NotFound => return Err(AuthError::NotFound),
            SetEmailOutcome::EmailTaken => return Err(AuthError::EmailTaken),
        }
    }

    if let Some(is_admin) = patch.is_admin {
        if !storage::set_admin_flag(&mut *tx, user_id, is_admin).await? {
            return Err(AuthError::NotFound);
        }
        changed.push("is_admin");
    }

    if let Some(new_password) = patch.password.as_deref() {
        password::validate_strength(new_password).map_err(AuthError::WeakPassword)?;
        let password_hash = password::hash(new_password)?;
        if !storage::set_password_hash(&mut *tx, user_id, &password_hash).await? {
            return Err(AuthError::NotFound);
        }
        // An admin reset invalidates the target's sessions like a
        // self-service change would.
        refresh_tokens::revoke_all_for_user(&mut *tx, user_id).await?;
        changed.push("password");
    }

    let updated = storage::find_summary_by_id(&mut *tx, user_id)
        .await?
        .ok_or(AuthError::NotFound)?;

    let detail = format!("user_id={user_id} fields={}", changed.join(","));
    audit::record(
        &mut *tx,
        AuditEvent {
            user_id: Some(principal.user_id),
            user_email: Some(&principal.email),
            action: AuditAction::UserUpdate,
            detail: Some(&detail),
            meta,
        },
    )
    .await?;

    tx.commit()
        .await
        .context("failed to commit user update transaction")?;

    Ok(AdminUserOut {
        id: updated.id,
        email: updated.email,
        is_admin: updated.is_admin,
        created_at: updated.created_at,
    })
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/users/{user_id}",
    params(
        ("user_id" = i64, Path, description = "Target user id")
    ),
    responses(
        (status = 204, description = "User deleted; calendar data cascades."),
        (status = 401, description = "Missing or invalid access token."),
        (status = 403, description = "Caller is not an admin, or tried to delete their own account."),
        (status = 404, description = "No such user."),
    ),
    tag = "admin"
)]
pub async fn delete_user(
    Path(user_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_admin(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let meta = extract_request_meta(&headers);

    match handle_delete(&pool, &principal, user_id, &meta).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle_delete(
    pool: &PgPool,
    principal: &Principal,
    user_id: i64,
    meta: &RequestMeta,
) -> Result<(), AuthError> {
    if user_id == principal.user_id {
        return Err(AuthError::Forbidden("Admins cannot delete their own account"));
    }

    let mut tx = pool
        .begin()
        .await
        .context("failed to begin user delete transaction")?;

    let target = storage::find_by_id(&mut *tx, user_id)
        .await?
        .ok_or(AuthError::NotFound)?;

    if !storage::delete_user(&mut *tx, user_id).await? {
        return Err(AuthError::NotFound);
    }

    let detail = format!("deleted user_id={user_id} email={}", target.email);
    audit::record(
        &mut *tx,
        AuditEvent {
            user_id: Some(principal.user_id),
            user_email: Some(&principal.email),
            action: AuditAction::UserDelete,
            detail: Some(&detail),
            meta,
        },
    )
    .await?;

    tx.commit()
        .await
        .context("failed to commit user delete transaction")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

    // Pool pointing at a closed port; queries fail fast with a connection error.
    fn unreachable_pool() -> PgPool {
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("tempo")
            .database("tempo");
        PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(50))
            .connect_lazy_with(options)
    }

    #[test]
    fn patch_rejects_unknown_fields() {
        let result: Result<UserPatchRequest, _> =
            serde_json::from_str(r#"{"email":"a@example.com","role":"admin"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn patch_absent_fields_deserialize_as_none() {
        let patch: UserPatchRequest = serde_json::from_str(r#"{"is_admin":true}"#).unwrap();
        assert_eq!(patch.email, None);
        assert_eq!(patch.is_admin, Some(true));
        assert_eq!(patch.password, None);
        assert!(!patch.is_empty());
    }

    #[test]
    fn empty_patch_is_detected() {
        let patch: UserPatchRequest = serde_json::from_str("{}").unwrap();
        assert!(patch.is_empty());
    }

    #[tokio::test]
    async fn patch_rejects_malformed_email_before_writing() {
        let pool = unreachable_pool();
        let principal = Principal {
            user_id: 1,
            email: "admin@example.com".to_string(),
            is_admin: true,
        };
        let patch: UserPatchRequest = serde_json::from_str(r#"{"email":"not-an-email"}"#).unwrap();
        let err = apply_patch(&pool, &principal, 2, &patch, &RequestMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidEmail));
    }
}
