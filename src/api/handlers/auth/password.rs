//! Password hashing, strength policy and the change-password endpoint.

use super::{
    audit::{self, AuditAction, AuditEvent},
    principal::require_auth,
    refresh_tokens, storage,
    types::ChangePasswordRequest,
    utils::{extract_request_meta, RequestMeta},
    AuthError, AuthState,
};
use anyhow::{Context, Result};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;

const SYMBOLS: &str = r##"!@#$%^&*()-_=+[]{};:'",.<>?/\|`~"##;

/// Check a candidate password against the account policy.
///
/// The returned message is safe to show to the caller.
pub(crate) fn validate_strength(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters long");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit");
    }
    if !password.chars().any(|c| SYMBOLS.contains(c)) {
        return Err("Password must contain at least one special character");
    }
    Ok(())
}

pub(crate) fn hash(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).context("failed to hash password")
}

/// Constant-false on malformed stored hashes; a broken row must read as a
/// failed login, not a 500.
pub(super) fn verify(password: &str, password_hash: &str) -> bool {
    bcrypt::verify(password, password_hash).unwrap_or(false)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed; all refresh tokens revoked."),
        (status = 400, description = "New password violates the policy."),
        (status = 401, description = "Missing token or wrong current password."),
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let meta = extract_request_meta(&headers);

    match handle_change_password(&pool, principal.user_id, &request, &meta).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle_change_password(
    pool: &PgPool,
    user_id: i64,
    request: &ChangePasswordRequest,
    meta: &RequestMeta,
) -> Result<(), AuthError> {
    let user = storage::find_by_id(pool, user_id)
        .await?
        .ok_or(AuthError::Unauthorized)?;

    if !verify(&request.current_password, &user.password_hash) {
        return Err(AuthError::Unauthorized);
    }

    validate_strength(&request.new_password).map_err(AuthError::WeakPassword)?;
    let new_hash = hash(&request.new_password)?;

    let mut tx = pool
        .begin()
        .await
        .context("failed to begin password change transaction")?;

    storage::set_password_hash(&mut *tx, user.id, &new_hash).await?;
    // Old sessions must not survive a password change.
    refresh_tokens::revoke_all_for_user(&mut *tx, user.id).await?;
    audit::record(
        &mut *tx,
        AuditEvent {
            user_id: Some(user.id),
            user_email: Some(&user.email),
            action: AuditAction::PasswordChange,
            detail: None,
            meta,
        },
    )
    .await?;

    tx.commit()
        .await
        .context("failed to commit password change transaction")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_rejects_short_passwords() {
        assert!(validate_strength("Aa1!aaa").is_err());
        assert!(validate_strength("").is_err());
    }

    #[test]
    fn policy_requires_uppercase_digit_and_symbol() {
        assert_eq!(
            validate_strength("aa1!aaaa"),
            Err("Password must contain at least one uppercase letter")
        );
        assert_eq!(
            validate_strength("Aaa!aaaa"),
            Err("Password must contain at least one digit")
        );
        assert_eq!(
            validate_strength("Aa1aaaaa"),
            Err("Password must contain at least one special character")
        );
    }

    #[test]
    fn policy_accepts_minimal_valid_password() {
        assert_eq!(validate_strength("Aa1!aaaa"), Ok(()));
        assert_eq!(validate_strength("Sup3r,long pass"), Ok(()));
    }

    #[test]
    fn policy_counts_characters_not_bytes() {
        // 8 characters, more than 8 bytes.
        assert_eq!(validate_strength("Aa1!aaaé"), Ok(()));
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let hashed = hash("Aa1!aaaa").unwrap();
        assert!(verify("Aa1!aaaa", &hashed));
        assert!(!verify("Aa1!aaab", &hashed));
    }

    #[test]
    fn verify_handles_malformed_hash() {
        assert!(!verify("Aa1!aaaa", "not-a-bcrypt-hash"));
    }
}
