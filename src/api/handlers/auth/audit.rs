//! Append-only audit log of security-relevant events.

use super::utils::RequestMeta;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgExecutor, PgPool, Row};
use tracing::Instrument;
use utoipa::ToSchema;

/// Event codes stored in `audit_logs.action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuditAction {
    LoginSuccess,
    LoginFailure,
    Logout,
    Register,
    PasswordChange,
    TokenRefresh,
    TokenRevoke,
    TokenRevokeAll,
    InviteCreate,
    InviteDelete,
    UserUpdate,
    UserDelete,
}

impl AuditAction {
    #[must_use]
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailure => "LOGIN_FAILURE",
            Self::Logout => "LOGOUT",
            Self::Register => "REGISTER",
            Self::PasswordChange => "PASSWORD_CHANGE",
            Self::TokenRefresh => "TOKEN_REFRESH",
            Self::TokenRevoke => "TOKEN_REVOKE",
            Self::TokenRevokeAll => "TOKEN_REVOKE_ALL",
            Self::InviteCreate => "INVITE_CREATE",
            Self::InviteDelete => "INVITE_DELETE",
            Self::UserUpdate => "USER_UPDATE",
            Self::UserDelete => "USER_DELETE",
        }
    }

    #[must_use]
    pub(crate) fn parse(code: &str) -> Option<Self> {
        match code {
            "LOGIN_SUCCESS" => Some(Self::LoginSuccess),
            "LOGIN_FAILURE" => Some(Self::LoginFailure),
            "LOGOUT" => Some(Self::Logout),
            "REGISTER" => Some(Self::Register),
            "PASSWORD_CHANGE" => Some(Self::PasswordChange),
            "TOKEN_REFRESH" => Some(Self::TokenRefresh),
            "TOKEN_REVOKE" => Some(Self::TokenRevoke),
            "TOKEN_REVOKE_ALL" => Some(Self::TokenRevokeAll),
            "INVITE_CREATE" => Some(Self::InviteCreate),
            "INVITE_DELETE" => Some(Self::InviteDelete),
            "USER_UPDATE" => Some(Self::UserUpdate),
            "USER_DELETE" => Some(Self::UserDelete),
            _ => None,
        }
    }
}

/// One event to append. `user_email` is snapshotted at event time so the row
/// stays meaningful after email changes or account deletion.
#[derive(Debug)]
pub(crate) struct AuditEvent<'a> {
    pub(crate) user_id: Option<i64>,
    pub(crate) user_email: Option<&'a str>,
    pub(crate) action: AuditAction,
    pub(crate) detail: Option<&'a str>,
    pub(crate) meta: &'a RequestMeta,
}

pub(crate) async fn record<'e>(executor: impl PgExecutor<'e>, event: AuditEvent<'_>) -> Result<()> {
    let query = r"
        INSERT INTO audit_logs (user_id, user_email, action, detail, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(event.user_id)
        .bind(event.user_email)
        .bind(event.action.as_str())
        .bind(event.detail)
        .bind(event.meta.ip_address.as_deref())
        .bind(event.meta.user_agent.as_deref())
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to record audit event")?;
    Ok(())
}

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct AuditLogEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub user_email: Option<String>,
    pub action: String,
    pub detail: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

const MAX_PAGE_SIZE: i64 = 500;

/// Clamp caller-provided paging to sane bounds instead of erroring.
pub(crate) const fn clamp_page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = match limit {
        Some(limit) if limit >= 1 && limit <= MAX_PAGE_SIZE => limit,
        Some(limit) if limit > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
        _ => 100,
    };
    let offset = match offset {
        Some(offset) if offset > 0 => offset,
        _ => 0,
    };
    (limit, offset)
}

/// Newest entries first, optionally narrowed to one action code.
pub(crate) async fn list(
    pool: &PgPool,
    limit: Option<i64>,
    offset: Option<i64>,
    action: Option<AuditAction>,
) -> Result<Vec<AuditLogEntry>> {
    let (limit, offset) = clamp_page(limit, offset);
    let query = r"
        SELECT id, user_id, user_email, action, detail, ip_address, user_agent, created_at
        FROM audit_logs
        WHERE $3::TEXT IS NULL OR action = $3
        ORDER BY created_at DESC, id DESC
        LIMIT $1 OFFSET $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(limit)
        .bind(offset)
        .bind(action.map(AuditAction::as_str))
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list audit log")?;
    Ok(rows
        .into_iter()
        .map(|row| AuditLogEntry {
            id: row.get("id"),
            user_id: row.get("user_id"),
            user_email: row.get("user_email"),
            action: row.get("action"),
            detail: row.get("detail"),
            ip_address: row.get("ip_address"),
            user_agent: row.get("user_agent"),
            created_at: row.get("created_at"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_codes_are_stable() {
        assert_eq!(AuditAction::LoginSuccess.as_str(), "LOGIN_SUCCESS");
        assert_eq!(AuditAction::LoginFailure.as_str(), "LOGIN_FAILURE");
        assert_eq!(AuditAction::TokenRevokeAll.as_str(), "TOKEN_REVOKE_ALL");
        assert_eq!(AuditAction::InviteDelete.as_str(), "INVITE_DELETE");
        assert_eq!(AuditAction::UserDelete.as_str(), "USER_DELETE");
    }

    #[test]
    fn action_codes_round_trip() {
        let actions = [
            AuditAction::LoginSuccess,
            AuditAction::LoginFailure,
            AuditAction::Logout,
            AuditAction::Register,
            AuditAction::PasswordChange,
            AuditAction::TokenRefresh,
            AuditAction::TokenRevoke,
            AuditAction::TokenRevokeAll,
            AuditAction::InviteCreate,
            AuditAction::InviteDelete,
            AuditAction::UserUpdate,
            AuditAction::UserDelete,
        ];
        for action in actions {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::parse("NOT_AN_ACTION"), None);
    }

    #[test]
    fn clamp_page_defaults_and_bounds() {
        assert_eq!(clamp_page(None, None), (100, 0));
        assert_eq!(clamp_page(Some(50), Some(10)), (50, 10));
        assert_eq!(clamp_page(Some(0), Some(-5)), (100, 0));
        assert_eq!(clamp_page(Some(10_000), None), (500, 0));
    }
}
