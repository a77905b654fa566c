//! Eisenhower matrix tasks.
//!
//! The urgent/important flags place a task in one of four quadrants; patch
//! is how drag & drop between quadrants lands in the database.

use super::auth::{principal::require_auth, AuthState};
use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{error, Instrument};
use utoipa::ToSchema;

const STATUSES: [&str; 3] = ["todo", "in_progress", "done"];

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskOut {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub urgent: bool,
    pub important: bool,
    pub status: String,
    pub linked_event_id: Option<i64>,
    pub due_date: Option<DateTime<Utc>>,
    pub target_quadrant: Option<String>,
    pub recurrence_days: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskCreateRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub important: bool,
    pub status: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub target_quadrant: Option<String>,
    pub recurrence_days: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub urgent: Option<bool>,
    pub important: Option<bool>,
    pub status: Option<String>,
    pub linked_event_id: Option<i64>,
    pub due_date: Option<DateTime<Utc>>,
    pub target_quadrant: Option<String>,
    pub recurrence_days: Option<i32>,
}

#[derive(Debug)]
pub(crate) enum ServiceError {
    NotFound,
    BadRequest(&'static str),
    Database(anyhow::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => (StatusCode::NOT_FOUND, "Task not found").into_response(),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::Database(err) => {
                error!("Failed to handle task request: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn db_err(err: sqlx::Error) -> ServiceError {
    ServiceError::Database(err.into())
}

fn valid_status(status: &str) -> bool {
    STATUSES.contains(&status)
}

fn task_from_row(row: &sqlx::postgres::PgRow) -> TaskOut {
    TaskOut {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        urgent: row.get("urgent"),
        important: row.get("important"),
        status: row.get("status"),
        linked_event_id: row.get("linked_event_id"),
        due_date: row.get("due_date"),
        target_quadrant: row.get("target_quadrant"),
        recurrence_days: row.get("recurrence_days"),
        created_at: row.get("created_at"),
    }
}

const TASK_COLUMNS: &str = r"
        id, title, description, urgent, important, status, linked_event_id,
        due_date, target_quadrant, recurrence_days, created_at
";

#[utoipa::path(
    get,
    path = "/api/v1/eisenhower-tasks",
    responses(
        (status = 200, description = "Tasks of the caller, oldest first.", body = [TaskOut]),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "planning"
)]
pub async fn list_tasks(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let query = format!(
        r"
        SELECT {TASK_COLUMNS}
        FROM eisenhower_tasks
        WHERE user_id = $1
        ORDER BY created_at
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    match sqlx::query(&query)
        .bind(principal.user_id)
        .fetch_all(&pool.0)
        .instrument(span)
        .await
    {
        Ok(rows) => {
            let tasks: Vec<TaskOut> = rows.iter().map(task_from_row).collect();
            (StatusCode::OK, Json(tasks)).into_response()
        }
        Err(err) => db_err(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/eisenhower-tasks",
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "Task created.", body = TaskOut),
        (status = 400, description = "Unknown status."),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "planning"
)]
pub async fn create_task(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TaskCreateRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    match insert_task(&pool, principal.user_id, &request).await {
        Ok(task) => (StatusCode::CREATED, Json(task)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn insert_task(
    pool: &PgPool,
    user_id: i64,
    request: &TaskCreateRequest,
) -> Result<TaskOut, ServiceError> {
    let status = request.status.as_deref().unwrap_or("todo");
    if !valid_status(status) {
        return Err(ServiceError::BadRequest("Unknown task status"));
    }

    let query = format!(
        r"
        INSERT INTO eisenhower_tasks
            (user_id, title, description, urgent, important, status, due_date,
             target_quadrant, recurrence_days)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {TASK_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(&request.title)
        .bind(request.description.as_deref())
        .bind(request.urgent)
        .bind(request.important)
        .bind(status)
        .bind(request.due_date)
        .bind(request.target_quadrant.as_deref())
        .bind(request.recurrence_days)
        .fetch_one(pool)
        .instrument(span)
        .await
        .map_err(db_err)?;
    Ok(task_from_row(&row))
}

#[utoipa::path(
    get,
    path = "/api/v1/eisenhower-tasks/{task_id}",
    params(
        ("task_id" = i64, Path, description = "Task id")
    ),
    responses(
        (status = 200, description = "The task.", body = TaskOut),
        (status = 401, description = "Missing or invalid access token."),
        (status = 404, description = "No such task for this user."),
    ),
    tag = "planning"
)]
pub async fn get_task(
    Path(task_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let query = format!(
        r"
        SELECT {TASK_COLUMNS}
        FROM eisenhower_tasks
        WHERE id = $1 AND user_id = $2
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    match sqlx::query(&query)
        .bind(task_id)
        .bind(principal.user_id)
        .fetch_optional(&pool.0)
        .instrument(span)
        .await
    {
        Ok(Some(row)) => (StatusCode::OK, Json(task_from_row(&row))).into_response(),
        Ok(None) => ServiceError::NotFound.into_response(),
        Err(err) => db_err(err).into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/api/v1/eisenhower-tasks/{task_id}",
    params(
        ("task_id" = i64, Path, description = "Task id")
    ),
    request_body = TaskUpdateRequest,
    responses(
        (status = 200, description = "Updated task.", body = TaskOut),
        (status = 400, description = "Unknown status."),
        (status = 401, description = "Missing or invalid access token."),
        (status = 404, description = "No such task for this user."),
    ),
    tag = "planning"
)]
pub async fn update_task(
    Path(task_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TaskUpdateRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    match apply_task_update(&pool, principal.user_id, task_id, &request).await {
        Ok(task) => (StatusCode::OK, Json(task)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn apply_task_update(
    pool: &PgPool,
    user_id: i64,
    task_id: i64,
    request: &TaskUpdateRequest,
) -> Result<TaskOut, ServiceError> {
    if let Some(status) = request.status.as_deref() {
        if !valid_status(status) {
            return Err(ServiceError::BadRequest("Unknown task status"));
        }
    }

    let query = format!(
        r"
        UPDATE eisenhower_tasks
        SET
            title = COALESCE($3, title),
            description = COALESCE($4, description),
            urgent = COALESCE($5, urgent),
            important = COALESCE($6, important),
            status = COALESCE($7, status),
            linked_event_id = COALESCE($8, linked_event_id),
            due_date = COALESCE($9, due_date),
            target_quadrant = COALESCE($10, target_quadrant),
            recurrence_days = COALESCE($11, recurrence_days)
        WHERE id = $1 AND user_id = $2
        RETURNING {TASK_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(task_id)
        .bind(user_id)
        .bind(request.title.as_deref())
        .bind(request.description.as_deref())
        .bind(request.urgent)
        .bind(request.important)
        .bind(request.status.as_deref())
        .bind(request.linked_event_id)
        .bind(request.due_date)
        .bind(request.target_quadrant.as_deref())
        .bind(request.recurrence_days)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .map_err(db_err)?;

    row.map(|row| task_from_row(&row))
        .ok_or(ServiceError::NotFound)
}

#[utoipa::path(
    delete,
    path = "/api/v1/eisenhower-tasks/{task_id}",
    params(
        ("task_id" = i64, Path, description = "Task id")
    ),
    responses(
        (status = 204, description = "Task deleted."),
        (status = 401, description = "Missing or invalid access token."),
        (status = 404, description = "No such task for this user."),
    ),
    tag = "planning"
)]
pub async fn delete_task(
    Path(task_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let query = r"
        DELETE FROM eisenhower_tasks
        WHERE id = $1 AND user_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(task_id)
        .bind(principal.user_id)
        .execute(&pool.0)
        .instrument(span)
        .await
    {
        Ok(result) if result.rows_affected() > 0 => StatusCode::NO_CONTENT.into_response(),
        Ok(_) => ServiceError::NotFound.into_response(),
        Err(err) => db_err(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_allow_list() {
        assert!(valid_status("todo"));
        assert!(valid_status("in_progress"));
        assert!(valid_status("done"));
        assert!(!valid_status("archived"));
        assert!(!valid_status(""));
    }

    #[test]
    fn create_request_defaults_flags_to_false() {
        let request: TaskCreateRequest = serde_json::from_str(r#"{"title":"Plan week"}"#).unwrap();
        assert!(!request.urgent);
        assert!(!request.important);
        assert_eq!(request.status, None);
    }
}
