//! Activity templates: reusable building blocks for calendar events.

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

#[derive(Debug, Serialize, ToSchema)]
pub struct TemplateOut {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub default_duration: i32,
    pub description: Option<String>,
    pub is_background: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TemplateCreateRequest {
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub default_duration: Option<i32>,
    pub description: Option<String>,
    pub is_background: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TemplateUpdateRequest {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub default_duration: Option<i32>,
    pub description: Option<String>,
    pub is_background: Option<bool>,
}

#[derive(Debug)]
pub(crate) enum ServiceError {
    NotFound,
    Database(anyhow::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::Database(err) => {
                error!("Failed to handle template request: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err)
    }
}

fn template_from_row(row: &sqlx::postgres::PgRow) -> TemplateOut {
    TemplateOut {
        id: row.get("id"),
        name: row.get("name"),
        color: row.get("color"),
        icon: row.get("icon"),
        default_duration: row.get("default_duration"),
        description: row.get("description"),
        is_background: row.get("is_background"),
        created_at: row.get("created_at"),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/activity-templates",
    responses(
        (status = 200, description = "Templates of the caller, oldest first.", body = [TemplateOut]),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "calendar"
)]
pub async fn list_templates(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match fetch_templates(&pool, principal.user_id).await {
        Ok(templates) => (StatusCode::OK, Json(templates)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn fetch_templates(pool: &PgPool, user_id: i64) -> Result<Vec<TemplateOut>, ServiceError> {
    let query = r"
        SELECT id, name, color, icon, default_duration, description, is_background, created_at
        FROM activity_templates
        WHERE user_id = $1
        ORDER BY created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .map_err(|err| ServiceError::Database(err.into()))?;
    Ok(rows.iter().map(template_from_row).collect())
}

#[utoipa::path(
    post,
    path = "/api/v1/activity-templates",
    request_body = TemplateCreateRequest,
    responses(
        (status = 201, description = "Template created.", body = TemplateOut),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "calendar"
)]
pub async fn create_template(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TemplateCreateRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    match insert_template(&pool, principal.user_id, &request).await {
        Ok(template) => (StatusCode::CREATED, Json(template)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn insert_template(
    pool: &PgPool,
    user_id: i64,
    request: &TemplateCreateRequest,
) -> Result<TemplateOut, ServiceError> {
    let query = r"
        INSERT INTO activity_templates
            (user_id, name, color, icon, default_duration, description, is_background)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, name, color, icon, default_duration, description, is_background, created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(&request.name)
        .bind(request.color.as_deref().unwrap_or("#6366f1"))
        .bind(request.icon.as_deref().unwrap_or("📚"))
        .bind(request.default_duration.unwrap_or(60))
        .bind(request.description.as_deref())
        .bind(request.is_background.unwrap_or(false))
        .fetch_one(pool)
        .instrument(span)
        .await
        .map_err(|err| ServiceError::Database(err.into()))?;
    Ok(template_from_row(&row))
}

#[utoipa::path(
    put,
    path = "/api/v1/activity-templates/{template_id}",
    params(
        ("template_id" = i64, Path, description = "Template id")
    ),
    request_body = TemplateUpdateRequest,
    responses(
        (status = 200, description = "Updated template; description changes propagate to linked events.", body = TemplateOut),
        (status = 401, description = "Missing or invalid access token."),
        (status = 404, description = "No such template for this user."),
    ),
    tag = "calendar"
)]
pub async fn update_template(
    Path(template_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TemplateUpdateRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    match apply_template_update(&pool, principal.user_id, template_id, &request).await {
        Ok(template) => (StatusCode::OK, Json(template)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn apply_template_update(
    pool: &PgPool,
    user_id: i64,
    template_id: i64,
    request: &TemplateUpdateRequest,
) -> Result<TemplateOut, ServiceError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| ServiceError::Database(err.into()))?;

    let query = r"
        UPDATE activity_templates
        SET
            name = COALESCE($3, name),
            color = COALESCE($4, color),
            icon = COALESCE($5, icon),
            default_duration = COALESCE($6, default_duration),
            description = COALESCE($7, description),
            is_background = COALESCE($8, is_background)
        WHERE id = $1 AND user_id = $2
        RETURNING id, name, color, icon, default_duration, description, is_background, created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(template_id)
        .bind(user_id)
        .bind(request.name.as_deref())
        .bind(request.color.as_deref())
        .bind(request.icon.as_deref())
        .bind(request.default_duration)
        .bind(request.description.as_deref())
        .bind(request.is_background)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .map_err(|err| ServiceError::Database(err.into()))?;

    let Some(row) = row else {
        return Err(ServiceError::NotFound);
    };
    let template = template_from_row(&row);

    // Keep event copies of the description in sync with the template.
    if let Some(description) = request.description.as_deref() {
        let query = r"
            UPDATE events
            SET description = $3
            WHERE activity_template_id = $1 AND user_id = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(template_id)
            .bind(user_id)
            .bind(description)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .map_err(|err| ServiceError::Database(err.into()))?;
    }

    tx.commit()
        .await
        .map_err(|err| ServiceError::Database(err.into()))?;

    Ok(template)
}

#[utoipa::path(
    delete,
    path = "/api/v1/activity-templates/{template_id}",
    params(
        ("template_id" = i64, Path, description = "Template id")
    ),
    responses(
        (status = 204, description = "Template deleted; events keep their copied fields."),
        (status = 401, description = "Missing or invalid access token."),
        (status = 404, description = "No such template for this user."),
    ),
    tag = "calendar"
)]
pub async fn delete_template(
    Path(template_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match remove_template(&pool, principal.user_id, template_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn remove_template(
    pool: &PgPool,
    user_id: i64,
    template_id: i64,
) -> Result<bool, ServiceError> {
    let query = r"
        DELETE FROM activity_templates
        WHERE id = $1 AND user_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(template_id)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .map_err(|err| ServiceError::Database(err.into()))?;
    Ok(result.rows_affected() > 0)
}
