//! Refresh-token persistence: the session store.
//!
//! Rows are never deleted. Revocation flips a one-way flag so session
//! history stays available next to the audit log.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgExecutor, Row};
use tracing::Instrument;

pub(super) struct RefreshTokenRecord {
    pub(super) user_id: i64,
    #[allow(dead_code)]
    pub(super) expires_at: DateTime<Utc>,
}

/// Persist a refresh token valid for `ttl_days` from now, recording the
/// client IP it was issued to when one is known.
pub(super) async fn create<'e>(
    executor: impl PgExecutor<'e>,
    user_id: i64,
    token_value: &str,
    ttl_days: i64,
    issued_to_ip: Option<&str>,
) -> Result<()> {
    let created_at = Utc::now();
    let expires_at = created_at + Duration::days(ttl_days);
    let query = r"
        INSERT INTO refresh_tokens (token, user_id, issued_to_ip, created_at, expires_at)
        VALUES ($1, $2, $3, $4, $5)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_value)
        .bind(user_id)
        .bind(issued_to_ip)
        .bind(created_at)
        .bind(expires_at)
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to persist refresh token")?;
    Ok(())
}

/// Look up a token that is neither revoked nor expired.
pub(super) async fn find_active<'e>(
    executor: impl PgExecutor<'e>,
    token_value: &str,
) -> Result<Option<RefreshTokenRecord>> {
    let query = r"
        SELECT user_id, expires_at
        FROM refresh_tokens
        WHERE token = $1 AND NOT revoked AND expires_at > NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_value)
        .fetch_optional(executor)
        .instrument(span)
        .await
        .context("failed to look up refresh token")?;
    Ok(row.map(|row| RefreshTokenRecord {
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
    }))
}

/// Atomically claim a token for rotation.
///
/// The revoke-if-active update adjudicates concurrent refreshes: exactly one
/// caller gets the user id back, everyone else sees `None`.
pub(super) async fn consume_for_rotation<'e>(
    executor: impl PgExecutor<'e>,
    token_value: &str,
) -> Result<Option<i64>> {
    let query = r"
        UPDATE refresh_tokens
        SET revoked = TRUE
        WHERE token = $1 AND NOT revoked AND expires_at > NOW()
        RETURNING user_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_value)
        .fetch_optional(executor)
        .instrument(span)
        .await
        .context("failed to rotate refresh token")?;
    Ok(row.map(|row| row.get("user_id")))
}

/// Revoke one token. Idempotent: revoking an unknown or already revoked
/// token is not an error.
pub(super) async fn revoke<'e>(executor: impl PgExecutor<'e>, token_value: &str) -> Result<()> {
    let query = r"
        UPDATE refresh_tokens
        SET revoked = TRUE
        WHERE token = $1 AND NOT revoked
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_value)
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to revoke refresh token")?;
    Ok(())
}

/// Revoke every live token a user holds, returning how many were revoked.
pub(crate) async fn revoke_all_for_user<'e>(
    executor: impl PgExecutor<'e>,
    user_id: i64,
) -> Result<u64> {
    let query = r"
        UPDATE refresh_tokens
        SET revoked = TRUE
        WHERE user_id = $1 AND NOT revoked
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to revoke refresh tokens")?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

    // Pool pointing at a closed port; queries fail fast with a connection error.
    fn unreachable_pool() -> sqlx::PgPool {
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("tempo")
            .database("tempo");
        PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(50))
            .connect_lazy_with(options)
    }

    #[tokio::test]
    async fn create_surfaces_connection_errors() {
        let pool = unreachable_pool();
        let result = create(&pool, 1, "token", 30, Some("1.2.3.4")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn find_active_surfaces_connection_errors() {
        let pool = unreachable_pool();
        let result = find_active(&pool, "token").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn consume_for_rotation_surfaces_connection_errors() {
        let pool = unreachable_pool();
        let result = consume_for_rotation(&pool, "token").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn revoke_all_surfaces_connection_errors() {
        let pool = unreachable_pool();
        let result = revoke_all_for_user(&pool, 1).await;
        assert!(result.is_err());
    }
}
