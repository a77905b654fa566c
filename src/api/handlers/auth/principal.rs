//! Authenticated principal extraction for protected endpoints.

use super::{storage, AuthError, AuthState};
use axum::http::HeaderMap;
use sqlx::PgPool;

/// The authenticated caller, resolved from a bearer access token.
#[derive(Clone, Debug)]
pub(crate) struct Principal {
    pub(crate) user_id: i64,
    pub(crate) email: String,
    pub(crate) is_admin: bool,
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Resolve the caller or fail with a uniform 401.
///
/// A decoded token whose user no longer exists is treated as unauthenticated;
/// tokens can outlive accounts.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<Principal, AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::Unauthorized)?;
    let user_id = state
        .tokens()
        .decode_access_token(token)
        .ok_or(AuthError::Unauthorized)?;
    let user = storage::find_by_id(pool, user_id)
        .await?
        .ok_or(AuthError::Unauthorized)?;
    Ok(Principal {
        user_id: user.id,
        email: user.email,
        is_admin: user.is_admin,
    })
}

/// Like [`require_auth`], but the caller must also hold the admin flag.
pub(crate) async fn require_admin(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<Principal, AuthError> {
    let principal = require_auth(headers, pool, state).await?;
    if principal.is_admin {
        Ok(principal)
    } else {
        Err(AuthError::Forbidden("Not enough permissions"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extract_bearer_token_reads_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn extract_bearer_token_rejects_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc123"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn extract_bearer_token_rejects_empty_value() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);

        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
