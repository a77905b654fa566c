//! User persistence: the credential store.
//!
//! Email lookups are exact, case-sensitive matches against the stored value.

use super::utils::is_unique_violation;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Row};
use tracing::Instrument;

pub(crate) struct UserRecord {
    pub(crate) id: i64,
    pub(crate) email: String,
    pub(crate) password_hash: String,
    pub(crate) is_admin: bool,
}

pub(crate) struct UserSummaryRecord {
    pub(crate) id: i64,
    pub(crate) email: String,
    pub(crate) is_admin: bool,
    pub(crate) created_at: DateTime<Utc>,
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_admin: row.get("is_admin"),
    }
}

pub(super) async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT id, email, password_hash, is_admin
        FROM users
        WHERE email = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up user by email")?;
    Ok(row.as_ref().map(user_from_row))
}

pub(crate) async fn find_by_id<'e>(
    executor: impl PgExecutor<'e>,
    user_id: i64,
) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT id, email, password_hash, is_admin
        FROM users
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(executor)
        .instrument(span)
        .await
        .context("failed to look up user by id")?;
    Ok(row.as_ref().map(user_from_row))
}

/// Insert a user row. `None` means the email is already registered; the
/// unique index is the final arbiter under concurrent registrations.
pub(super) async fn insert_user<'e>(
    executor: impl PgExecutor<'e>,
    email: &str,
    password_hash: &str,
) -> Result<Option<i64>> {
    let query = r"
        INSERT INTO users (email, password_hash)
        VALUES ($1, $2)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(email)
        .bind(password_hash)
        .fetch_one(executor)
        .instrument(span)
        .await;
    match result {
        Ok(row) => Ok(Some(row.get("id"))),
        Err(err) if is_unique_violation(&err) => Ok(None),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

pub(crate) async fn set_password_hash<'e>(
    executor: impl PgExecutor<'e>,
    user_id: i64,
    password_hash: &str,
) -> Result<bool> {
    let query = r"
        UPDATE users
        SET password_hash = $2
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to update password hash")?;
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SetEmailOutcome {
    Updated,
    NotFound,
    EmailTaken,
}

pub(crate) async fn set_email<'e>(
    executor: impl PgExecutor<'e>,
    user_id: i64,
    email: &str,
) -> Result<SetEmailOutcome> {
    let query = r"
        UPDATE users
        SET email = $2
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(email)
        .execute(executor)
        .instrument(span)
        .await;
    match result {
        Ok(done) if done.rows_affected() > 0 => Ok(SetEmailOutcome::Updated),
        Ok(_) => Ok(SetEmailOutcome::NotFound),
        Err(err) if is_unique_violation(&err) => Ok(SetEmailOutcome::EmailTaken),
        Err(err) => Err(err).context("failed to update email"),
    }
}

pub(crate) async fn set_admin_flag<'e>(
    executor: impl PgExecutor<'e>,
    user_id: i64,
    is_admin: bool,
) -> Result<bool> {
    let query = r"
        UPDATE users
        SET is_admin = $2
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(is_admin)
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to update admin flag")?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find_summary_by_id<'e>(
    executor: impl PgExecutor<'e>,
    user_id: i64,
) -> Result<Option<UserSummaryRecord>> {
    let query = r"
        SELECT id, email, is_admin, created_at
        FROM users
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(executor)
        .instrument(span)
        .await
        .context("failed to look up user summary")?;
    Ok(row.map(|row| UserSummaryRecord {
        id: row.get("id"),
        email: row.get("email"),
        is_admin: row.get("is_admin"),
        created_at: row.get("created_at"),
    }))
}

pub(crate) async fn list_users(pool: &PgPool) -> Result<Vec<UserSummaryRecord>> {
    let query = r"
        SELECT id, email, is_admin, created_at
        FROM users
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
        .context("failed to list users")?;
    Ok(rows
        .into_iter()
        .map(|row| UserSummaryRecord {
            id: row.get("id"),
            email: row.get("email"),
            is_admin: row.get("is_admin"),
            created_at: row.get("created_at"),
        })
        .collect())
}

/// Delete a user. Calendar data cascades at the schema level; audit rows and
/// consumed invites keep a NULL reference instead.
pub(crate) async fn delete_user<'e>(executor: impl PgExecutor<'e>, user_id: i64) -> Result<bool> {
    let query = r"
        DELETE FROM users
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to delete user")?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn get_preferences(
    pool: &PgPool,
    user_id: i64,
) -> Result<Option<serde_json::Value>> {
    let query = r"
        SELECT preferences
        FROM users
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to read preferences")?;
    Ok(row.and_then(|row| row.get::<Option<serde_json::Value>, _>("preferences")))
}

pub(crate) async fn set_preferences(
    pool: &PgPool,
    user_id: i64,
    preferences: &serde_json::Value,
) -> Result<bool> {
    let query = r"
        UPDATE users
        SET preferences = $2
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(preferences)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to write preferences")?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

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
    async fn find_by_email_surfaces_connection_errors() {
        let pool = unreachable_pool();
        assert!(find_by_email(&pool, "a@example.com").await.is_err());
    }

    #[tokio::test]
    async fn insert_user_surfaces_connection_errors() {
        let pool = unreachable_pool();
        assert!(insert_user(&pool, "a@example.com", "hash").await.is_err());
    }

    #[tokio::test]
    async fn set_email_surfaces_connection_errors() {
        let pool = unreachable_pool();
        assert!(set_email(&pool, 1, "a@example.com").await.is_err());
    }

    #[tokio::test]
    async fn preferences_surface_connection_errors() {
        let pool = unreachable_pool();
        assert!(get_preferences(&pool, 1).await.is_err());
        assert!(set_preferences(&pool, 1, &serde_json::json!({}))
            .await
            .is_err());
    }
}
