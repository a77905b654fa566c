//! Personal contacts with birthdays for calendar reminders.

use super::auth::{principal::require_auth, AuthState};
use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{error, Instrument};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ContactOut {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ContactCreateRequest {
    pub name: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ContactUpdateRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub photo_url: Option<String>,
}

#[derive(Debug)]
pub(crate) enum ServiceError {
    NotFound,
    Database(anyhow::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => (StatusCode::NOT_FOUND, "Contact not found").into_response(),
            Self::Database(err) => {
                error!("Failed to handle contact request: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn db_err(err: sqlx::Error) -> ServiceError {
    ServiceError::Database(err.into())
}

fn contact_from_row(row: &sqlx::postgres::PgRow) -> ContactOut {
    ContactOut {
        id: row.get("id"),
        name: row.get("name"),
        phone: row.get("phone"),
        notes: row.get("notes"),
        birthday: row.get("birthday"),
        photo_url: row.get("photo_url"),
        created_at: row.get("created_at"),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/contacts",
    responses(
        (status = 200, description = "Contacts of the caller sorted by name.", body = [ContactOut]),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "planning"
)]
pub async fn list_contacts(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let query = r"
        SELECT id, name, phone, notes, birthday, photo_url, created_at
        FROM contacts
        WHERE user_id = $1
        ORDER BY name
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(principal.user_id)
        .fetch_all(&pool.0)
        .instrument(span)
        .await
    {
        Ok(rows) => {
            let contacts: Vec<ContactOut> = rows.iter().map(contact_from_row).collect();
            (StatusCode::OK, Json(contacts)).into_response()
        }
        Err(err) => db_err(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/contacts",
    request_body = ContactCreateRequest,
    responses(
        (status = 201, description = "Contact created.", body = ContactOut),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "planning"
)]
pub async fn create_contact(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ContactCreateRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let query = r"
        INSERT INTO contacts (user_id, name, phone, notes, birthday, photo_url)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, name, phone, notes, birthday, photo_url, created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(principal.user_id)
        .bind(&request.name)
        .bind(request.phone.as_deref())
        .bind(request.notes.as_deref())
        .bind(request.birthday)
        .bind(request.photo_url.as_deref())
        .fetch_one(&pool.0)
        .instrument(span)
        .await
    {
        Ok(row) => (StatusCode::CREATED, Json(contact_from_row(&row))).into_response(),
        Err(err) => db_err(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/contacts/{contact_id}",
    params(
        ("contact_id" = i64, Path, description = "Contact id")
    ),
    responses(
        (status = 200, description = "The contact.", body = ContactOut),
        (status = 401, description = "Missing or invalid access token."),
        (status = 404, description = "No such contact for this user."),
    ),
    tag = "planning"
)]
pub async fn get_contact(
    Path(contact_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let query = r"
        SELECT id, name, phone, notes, birthday, photo_url, created_at
        FROM contacts
        WHERE id = $1 AND user_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(contact_id)
        .bind(principal.user_id)
        .fetch_optional(&pool.0)
        .instrument(span)
        .await
    {
        Ok(Some(row)) => (StatusCode::OK, Json(contact_from_row(&row))).into_response(),
        Ok(None) => ServiceError::NotFound.into_response(),
        Err(err) => db_err(err).into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/contacts/{contact_id}",
    params(
        ("contact_id" = i64, Path, description = "Contact id")
    ),
    request_body = ContactUpdateRequest,
    responses(
        (status = 200, description = "Updated contact.", body = ContactOut),
        (status = 401, description = "Missing or invalid access token."),
        (status = 404, description = "No such contact for this user."),
    ),
    tag = "planning"
)]
pub async fn update_contact(
    Path(contact_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ContactUpdateRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let query = r"
        UPDATE contacts
        SET
            name = COALESCE($3, name),
            phone = COALESCE($4, phone),
            notes = COALESCE($5, notes),
            birthday = COALESCE($6, birthday),
            photo_url = COALESCE($7, photo_url)
        WHERE id = $1 AND user_id = $2
        RETURNING id, name, phone, notes, birthday, photo_url, created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(contact_id)
        .bind(principal.user_id)
        .bind(request.name.as_deref())
        .bind(request.phone.as_deref())
        .bind(request.notes.as_deref())
        .bind(request.birthday)
        .bind(request.photo_url.as_deref())
        .fetch_optional(&pool.0)
        .instrument(span)
        .await
    {
        Ok(Some(row)) => (StatusCode::OK, Json(contact_from_row(&row))).into_response(),
        Ok(None) => ServiceError::NotFound.into_response(),
        Err(err) => db_err(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/contacts/{contact_id}",
    params(
        ("contact_id" = i64, Path, description = "Contact id")
    ),
    responses(
        (status = 204, description = "Contact deleted."),
        (status = 401, description = "Missing or invalid access token."),
        (status = 404, description = "No such contact for this user."),
    ),
    tag = "planning"
)]
pub async fn delete_contact(
    Path(contact_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let query = r"
        DELETE FROM contacts
        WHERE id = $1 AND user_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(contact_id)
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
