//! Single-use invite tokens gating registration: the invite ledger.

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sqlx::{PgExecutor, PgPool, Row};
use tracing::Instrument;
use utoipa::ToSchema;

const INVITE_TOKEN_BYTES: usize = 32;
const MAX_BATCH: i64 = 100;

/// Clamp a requested batch size into `1..=100` instead of rejecting it.
pub(crate) const fn clamp_batch_count(count: i64) -> i64 {
    if count < 1 {
        1
    } else if count > MAX_BATCH {
        MAX_BATCH
    } else {
        count
    }
}

fn generate_invite_token_value() -> Result<String> {
    let mut bytes = [0u8; INVITE_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate invite token")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct InviteToken {
    pub id: i64,
    pub token: String,
    pub used: bool,
    pub used_by_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

/// Mint a batch of unused invite tokens in one transaction.
pub(crate) async fn batch_create(pool: &PgPool, count: i64) -> Result<Vec<InviteToken>> {
    let count = clamp_batch_count(count);
    let mut tx = pool
        .begin()
        .await
        .context("failed to begin invite transaction")?;

    let query = r"
        INSERT INTO invite_tokens (token)
        VALUES ($1)
        RETURNING id, created_at
    ";
    let mut created = Vec::with_capacity(usize::try_from(count).unwrap_or(1));
    for _ in 0..count {
        let token = generate_invite_token_value()?;
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&token)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert invite token")?;
        created.push(InviteToken {
            id: row.get("id"),
            token,
            used: false,
            used_by_user_id: None,
            created_at: row.get("created_at"),
            used_at: None,
        });
    }

    tx.commit()
        .await
        .context("failed to commit invite transaction")?;
    Ok(created)
}

/// Check that an invite exists and is still unused. Registration re-checks
/// atomically via [`consume`]; this is the cheap early rejection.
pub(super) async fn is_available(pool: &PgPool, token_value: &str) -> Result<bool> {
    let query = r"
        SELECT 1 AS one
        FROM invite_tokens
        WHERE token = $1 AND NOT used
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_value)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up invite token")?;
    Ok(row.is_some())
}

/// Atomically mark an invite as used by `user_id`. Returns `false` when the
/// invite does not exist or was already claimed, including by a concurrent
/// registration.
pub(super) async fn consume<'e>(
    executor: impl PgExecutor<'e>,
    token_value: &str,
    user_id: i64,
) -> Result<bool> {
    let query = r"
        UPDATE invite_tokens
        SET used = TRUE, used_by_user_id = $2, used_at = NOW()
        WHERE token = $1 AND NOT used
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(token_value)
        .bind(user_id)
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to consume invite token")?;
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum DeleteOutcome {
    Deleted,
    NotFound,
    Used,
}

/// Delete an unused invite. Used invites are kept as registration history.
pub(crate) async fn delete(pool: &PgPool, token_value: &str) -> Result<DeleteOutcome> {
    let query = r"
        DELETE FROM invite_tokens
        WHERE token = $1 AND NOT used
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(token_value)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete invite token")?;
    if result.rows_affected() > 0 {
        return Ok(DeleteOutcome::Deleted);
    }

    let query = r"
        SELECT used
        FROM invite_tokens
        WHERE token = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_value)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up invite token")?;
    match row {
        Some(_) => Ok(DeleteOutcome::Used),
        None => Ok(DeleteOutcome::NotFound),
    }
}

/// All invites, newest first.
pub(crate) async fn list(pool: &PgPool) -> Result<Vec<InviteToken>> {
    let query = r"
        SELECT id, token, used, used_by_user_id, created_at, used_at
        FROM invite_tokens
        ORDER BY created_at DESC, id DESC
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list invite tokens")?;
    Ok(rows
        .into_iter()
        .map(|row| InviteToken {
            id: row.get("id"),
            token: row.get("token"),
            used: row.get("used"),
            used_by_user_id: row.get("used_by_user_id"),
            created_at: row.get("created_at"),
            used_at: row.get("used_at"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_batch_count_bounds() {
        assert_eq!(clamp_batch_count(0), 1);
        assert_eq!(clamp_batch_count(-3), 1);
        assert_eq!(clamp_batch_count(1), 1);
        assert_eq!(clamp_batch_count(100), 100);
        assert_eq!(clamp_batch_count(500), 100);
    }

    #[test]
    fn invite_token_values_are_opaque_and_distinct() {
        let first = generate_invite_token_value().unwrap();
        let second = generate_invite_token_value().unwrap();
        assert_ne!(first, second);
        assert_eq!(
            URL_SAFE_NO_PAD.decode(first.as_bytes()).unwrap().len(),
            INVITE_TOKEN_BYTES
        );
    }
}
