//! Calendar events: CRUD, weekly filtering, recurring series and
//! task-to-event linking.

use super::auth::{principal::require_auth, AuthState};
use super::templates::TemplateOut;
use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool, Row};
use std::sync::Arc;
use tracing::{error, Instrument};
use utoipa::{IntoParams, ToSchema};

const MAX_OCCURRENCES: i64 = 730;

#[derive(Debug, Serialize, ToSchema)]
pub struct EventOut {
    pub id: i64,
    pub title: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub recurrence_rule: Option<String>,
    pub activity_template_id: Option<i64>,
    pub is_background: bool,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub eisenhower_quadrant: Option<String>,
    pub created_at: DateTime<Utc>,
    pub activity_template: Option<TemplateOut>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EventCreateRequest {
    pub title: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub recurrence_rule: Option<String>,
    pub activity_template_id: Option<i64>,
    #[serde(default)]
    pub is_background: bool,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub eisenhower_quadrant: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EventUpdateRequest {
    pub title: Option<String>,
    pub start_datetime: Option<DateTime<Utc>>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub recurrence_rule: Option<String>,
    pub activity_template_id: Option<i64>,
    pub is_background: Option<bool>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub eisenhower_quadrant: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecurringEventRequest {
    pub title: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub activity_template_id: Option<i64>,
    /// Days between occurrences; 7 is weekly, 30 roughly monthly.
    pub interval_days: i64,
    /// Number of occurrences to generate, capped at 730.
    pub occurrences: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EventListQuery {
    /// Start of the week to filter by, `YYYY-MM-DD`.
    pub week_start: Option<String>,
}

#[derive(Debug)]
pub(crate) enum ServiceError {
    NotFound(&'static str),
    BadRequest(&'static str),
    Database(anyhow::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::Database(err) => {
                error!("Failed to handle event request: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn db_err(err: sqlx::Error) -> ServiceError {
    ServiceError::Database(err.into())
}

/// Parse a `week_start` filter; a bare date reads as UTC midnight.
fn parse_week_start(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

const EVENT_COLUMNS: &str = r"
        e.id, e.title, e.start_datetime, e.end_datetime, e.description, e.location,
        e.recurrence_rule, e.activity_template_id, e.is_background, e.color, e.icon,
        e.eisenhower_quadrant, e.created_at,
        t.id AS template_id, t.name AS template_name, t.color AS template_color,
        t.icon AS template_icon, t.default_duration AS template_default_duration,
        t.description AS template_description, t.is_background AS template_is_background,
        t.created_at AS template_created_at
";

fn event_from_row(row: &sqlx::postgres::PgRow) -> EventOut {
    let activity_template =
        row.get::<Option<i64>, _>("template_id")
            .map(|template_id| TemplateOut {
                id: template_id,
                name: row.get("template_name"),
                color: row.get("template_color"),
                icon: row.get("template_icon"),
                default_duration: row.get("template_default_duration"),
                description: row.get("template_description"),
                is_background: row.get("template_is_background"),
                created_at: row.get("template_created_at"),
            });
    EventOut {
        id: row.get("id"),
        title: row.get("title"),
        start_datetime: row.get("start_datetime"),
        end_datetime: row.get("end_datetime"),
        description: row.get("description"),
        location: row.get("location"),
        recurrence_rule: row.get("recurrence_rule"),
        activity_template_id: row.get("activity_template_id"),
        is_background: row.get("is_background"),
        color: row.get("color"),
        icon: row.get("icon"),
        eisenhower_quadrant: row.get("eisenhower_quadrant"),
        created_at: row.get("created_at"),
        activity_template,
    }
}

async fn fetch_event<'e>(
    executor: impl PgExecutor<'e>,
    user_id: i64,
    event_id: i64,
) -> Result<Option<EventOut>, ServiceError> {
    let query = format!(
        r"
        SELECT {EVENT_COLUMNS}
        FROM events e
        LEFT JOIN activity_templates t ON t.id = e.activity_template_id
        WHERE e.id = $1 AND e.user_id = $2
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(executor)
        .instrument(span)
        .await
        .map_err(db_err)?;
    Ok(row.as_ref().map(event_from_row))
}

#[utoipa::path(
    get,
    path = "/api/v1/events",
    params(EventListQuery),
    responses(
        (status = 200, description = "Events of the caller ordered by start time.", body = [EventOut]),
        (status = 400, description = "Invalid week_start format."),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "calendar"
)]
pub async fn list_events(
    Query(query): Query<EventListQuery>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let week = match query.week_start.as_deref() {
        Some(value) => match parse_week_start(value) {
            Some(start) => Some((start, start + Duration::days(7))),
            None => {
                return (StatusCode::BAD_REQUEST, "Invalid week_start format").into_response()
            }
        },
        None => None,
    };

    match fetch_events(&pool, principal.user_id, week).await {
        Ok(events) => (StatusCode::OK, Json(events)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn fetch_events(
    pool: &PgPool,
    user_id: i64,
    week: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Result<Vec<EventOut>, ServiceError> {
    let rows = if let Some((start, end)) = week {
        let query = format!(
            r"
            SELECT {EVENT_COLUMNS}
            FROM events e
            LEFT JOIN activity_templates t ON t.id = e.activity_template_id
            WHERE e.user_id = $1 AND e.start_datetime >= $2 AND e.start_datetime < $3
            ORDER BY e.start_datetime
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        sqlx::query(&query)
            .bind(user_id)
            .bind(start)
            .bind(end)
            .fetch_all(pool)
            .instrument(span)
            .await
            .map_err(db_err)?
    } else {
        let query = format!(
            r"
            SELECT {EVENT_COLUMNS}
            FROM events e
            LEFT JOIN activity_templates t ON t.id = e.activity_template_id
            WHERE e.user_id = $1
            ORDER BY e.start_datetime
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        sqlx::query(&query)
            .bind(user_id)
            .fetch_all(pool)
            .instrument(span)
            .await
            .map_err(db_err)?
    };
    Ok(rows.iter().map(event_from_row).collect())
}

#[utoipa::path(
    post,
    path = "/api/v1/events",
    request_body = EventCreateRequest,
    responses(
        (status = 201, description = "Event created.", body = EventOut),
        (status = 400, description = "end_datetime not after start_datetime."),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "calendar"
)]
pub async fn create_event(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<EventCreateRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    if request.end_datetime <= request.start_datetime {
        return (
            StatusCode::BAD_REQUEST,
            "end_datetime must be after start_datetime",
        )
            .into_response();
    }

    match insert_event(&pool, principal.user_id, &request).await {
        Ok(event) => (StatusCode::CREATED, Json(event)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn insert_event(
    pool: &PgPool,
    user_id: i64,
    request: &EventCreateRequest,
) -> Result<EventOut, ServiceError> {
    let event_id = insert_event_row(pool, user_id, request).await?;
    fetch_event(pool, user_id, event_id)
        .await?
        .ok_or(ServiceError::NotFound("Event not found"))
}

async fn insert_event_row<'e>(
    executor: impl PgExecutor<'e>,
    user_id: i64,
    request: &EventCreateRequest,
) -> Result<i64, ServiceError> {
    let query = r"
        INSERT INTO events
            (user_id, title, start_datetime, end_datetime, description, location,
             recurrence_rule, activity_template_id, is_background, color, icon,
             eisenhower_quadrant)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(&request.title)
        .bind(request.start_datetime)
        .bind(request.end_datetime)
        .bind(request.description.as_deref())
        .bind(request.location.as_deref())
        .bind(request.recurrence_rule.as_deref())
        .bind(request.activity_template_id)
        .bind(request.is_background)
        .bind(request.color.as_deref())
        .bind(request.icon.as_deref())
        .bind(request.eisenhower_quadrant.as_deref())
        .fetch_one(executor)
        .instrument(span)
        .await
        .map_err(db_err)?;
    Ok(row.get("id"))
}

#[utoipa::path(
    get,
    path = "/api/v1/events/{event_id}",
    params(
        ("event_id" = i64, Path, description = "Event id")
    ),
    responses(
        (status = 200, description = "The event.", body = EventOut),
        (status = 401, description = "Missing or invalid access token."),
        (status = 404, description = "No such event for this user."),
    ),
    tag = "calendar"
)]
pub async fn get_event(
    Path(event_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match fetch_event(&pool.0, principal.user_id, event_id).await {
        Ok(Some(event)) => (StatusCode::OK, Json(event)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Event not found").into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/events/{event_id}",
    params(
        ("event_id" = i64, Path, description = "Event id")
    ),
    request_body = EventUpdateRequest,
    responses(
        (status = 200, description = "Updated event; description edits propagate through the template.", body = EventOut),
        (status = 401, description = "Missing or invalid access token."),
        (status = 404, description = "No such event for this user."),
    ),
    tag = "calendar"
)]
pub async fn update_event(
    Path(event_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<EventUpdateRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    match apply_event_update(&pool, principal.user_id, event_id, &request).await {
        Ok(event) => (StatusCode::OK, Json(event)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn apply_event_update(
    pool: &PgPool,
    user_id: i64,
    event_id: i64,
    request: &EventUpdateRequest,
) -> Result<EventOut, ServiceError> {
    let mut tx = pool.begin().await.map_err(db_err)?;

    let query = r"
        UPDATE events
        SET
            title = COALESCE($3, title),
            start_datetime = COALESCE($4, start_datetime),
            end_datetime = COALESCE($5, end_datetime),
            description = COALESCE($6, description),
            location = COALESCE($7, location),
            recurrence_rule = COALESCE($8, recurrence_rule),
            activity_template_id = COALESCE($9, activity_template_id),
            is_background = COALESCE($10, is_background),
            color = COALESCE($11, color),
            icon = COALESCE($12, icon),
            eisenhower_quadrant = COALESCE($13, eisenhower_quadrant)
        WHERE id = $1 AND user_id = $2
        RETURNING activity_template_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(event_id)
        .bind(user_id)
        .bind(request.title.as_deref())
        .bind(request.start_datetime)
        .bind(request.end_datetime)
        .bind(request.description.as_deref())
        .bind(request.location.as_deref())
        .bind(request.recurrence_rule.as_deref())
        .bind(request.activity_template_id)
        .bind(request.is_background)
        .bind(request.color.as_deref())
        .bind(request.icon.as_deref())
        .bind(request.eisenhower_quadrant.as_deref())
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .map_err(db_err)?;

    let Some(row) = row else {
        return Err(ServiceError::NotFound("Event not found"));
    };

    // Description edits flow event -> template -> sibling events, so every
    // event minted from the template shows the same text.
    if let (Some(description), Some(template_id)) = (
        request.description.as_deref(),
        row.get::<Option<i64>, _>("activity_template_id"),
    ) {
        let query = r"
            UPDATE activity_templates
            SET description = $3
            WHERE id = $1 AND user_id = $2
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
            .map_err(db_err)?;

        let query = r"
            UPDATE events
            SET description = $4
            WHERE activity_template_id = $1 AND user_id = $2 AND id <> $3
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
            .bind(event_id)
            .bind(description)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .map_err(db_err)?;
    }

    let event = fetch_event(&mut *tx, user_id, event_id)
        .await?
        .ok_or(ServiceError::NotFound("Event not found"))?;

    tx.commit().await.map_err(db_err)?;

    Ok(event)
}

#[utoipa::path(
    delete,
    path = "/api/v1/events/{event_id}",
    params(
        ("event_id" = i64, Path, description = "Event id")
    ),
    responses(
        (status = 204, description = "Event deleted."),
        (status = 401, description = "Missing or invalid access token."),
        (status = 404, description = "No such event for this user."),
    ),
    tag = "calendar"
)]
pub async fn delete_event(
    Path(event_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match remove_event(&pool, principal.user_id, event_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "Event not found").into_response(),
        Err(err) => err.into_response(),
    }
}

async fn remove_event(pool: &PgPool, user_id: i64, event_id: i64) -> Result<bool, ServiceError> {
    let query = r"
        DELETE FROM events
        WHERE id = $1 AND user_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(event_id)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .map_err(db_err)?;
    Ok(result.rows_affected() > 0)
}

#[utoipa::path(
    post,
    path = "/api/v1/events/recurring",
    request_body = RecurringEventRequest,
    responses(
        (status = 201, description = "Generated series, ordered by start time.", body = [EventOut]),
        (status = 400, description = "interval_days or occurrences below 1."),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "calendar"
)]
pub async fn create_recurring_events(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RecurringEventRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    match insert_recurring(&pool, principal.user_id, &request).await {
        Ok(events) => (StatusCode::CREATED, Json(events)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Shift the requested window by `occurrence` intervals. `None` when the
/// multiplication overflows or the shifted dates leave the representable
/// range.
fn occurrence_window(
    request: &RecurringEventRequest,
    occurrence: i64,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let days = request.interval_days.checked_mul(occurrence)?;
    let delta = Duration::try_days(days)?;
    let start = request.start_datetime.checked_add_signed(delta)?;
    let end = request.end_datetime.checked_add_signed(delta)?;
    Some((start, end))
}

async fn insert_recurring(
    pool: &PgPool,
    user_id: i64,
    request: &RecurringEventRequest,
) -> Result<Vec<EventOut>, ServiceError> {
    if request.interval_days < 1 {
        return Err(ServiceError::BadRequest("interval_days must be >= 1"));
    }
    let occurrences = request.occurrences.min(MAX_OCCURRENCES);
    if occurrences < 1 {
        return Err(ServiceError::BadRequest("occurrences must be >= 1"));
    }

    // Every window is computed up front so an out-of-range interval is a 400
    // before anything is written.
    let mut windows = Vec::with_capacity(usize::try_from(occurrences).unwrap_or(1));
    for occurrence in 0..occurrences {
        let window = occurrence_window(request, occurrence).ok_or(ServiceError::BadRequest(
            "interval_days puts occurrences out of range",
        ))?;
        windows.push(window);
    }

    let recurrence_rule = format!("INTERVAL_DAYS={}", request.interval_days);

    let mut tx = pool.begin().await.map_err(db_err)?;
    let mut created = Vec::with_capacity(windows.len());
    for (start_datetime, end_datetime) in windows {
        let event = EventCreateRequest {
            title: request.title.clone(),
            start_datetime,
            end_datetime,
            description: request.description.clone(),
            location: request.location.clone(),
            recurrence_rule: Some(recurrence_rule.clone()),
            activity_template_id: request.activity_template_id,
            is_background: false,
            color: None,
            icon: None,
            eisenhower_quadrant: None,
        };
        let event_id = insert_event_row(&mut *tx, user_id, &event).await?;
        created.push(event_id);
    }

    let mut events = Vec::with_capacity(created.len());
    for event_id in created {
        let event = fetch_event(&mut *tx, user_id, event_id)
            .await?
            .ok_or(ServiceError::NotFound("Event not found"))?;
        events.push(event);
    }

    tx.commit().await.map_err(db_err)?;

    events.sort_by_key(|event| event.start_datetime);
    Ok(events)
}

#[utoipa::path(
    post,
    path = "/api/v1/events/from-task/{task_id}",
    params(
        ("task_id" = i64, Path, description = "Eisenhower task id")
    ),
    request_body = EventCreateRequest,
    responses(
        (status = 201, description = "Event created and linked back to the task.", body = EventOut),
        (status = 401, description = "Missing or invalid access token."),
        (status = 404, description = "No such task for this user."),
    ),
    tag = "calendar"
)]
pub async fn create_event_from_task(
    Path(task_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<EventCreateRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    match insert_event_from_task(&pool, principal.user_id, task_id, request).await {
        Ok(event) => (StatusCode::CREATED, Json(event)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn insert_event_from_task(
    pool: &PgPool,
    user_id: i64,
    task_id: i64,
    mut request: EventCreateRequest,
) -> Result<EventOut, ServiceError> {
    let mut tx = pool.begin().await.map_err(db_err)?;

    let query = r"
        SELECT title
        FROM eisenhower_tasks
        WHERE id = $1 AND user_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let task = sqlx::query(query)
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .map_err(db_err)?;

    let Some(task) = task else {
        return Err(ServiceError::NotFound("Task not found"));
    };

    if request.title.trim().is_empty() {
        request.title = task.get("title");
    }

    let event_id = insert_event_row(&mut *tx, user_id, &request).await?;

    let query = r"
        UPDATE eisenhower_tasks
        SET linked_event_id = $3
        WHERE id = $1 AND user_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(task_id)
        .bind(user_id)
        .bind(event_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .map_err(db_err)?;

    let event = fetch_event(&mut *tx, user_id, event_id)
        .await?
        .ok_or(ServiceError::NotFound("Event not found"))?;

    tx.commit().await.map_err(db_err)?;

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_week_start_accepts_bare_date() {
        let parsed = parse_week_start("2025-01-06").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-01-06T00:00:00+00:00");
    }

    #[test]
    fn parse_week_start_accepts_rfc3339() {
        let parsed = parse_week_start("2025-01-06T12:30:00+02:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-01-06T10:30:00+00:00");
    }

    #[test]
    fn parse_week_start_rejects_garbage() {
        assert!(parse_week_start("next monday").is_none());
        assert!(parse_week_start("2025-13-40").is_none());
    }

    #[test]
    fn create_request_defaults_background_to_false() {
        let request: EventCreateRequest = serde_json::from_str(
            r#"{
                "title": "Standup",
                "start_datetime": "2025-01-06T09:00:00Z",
                "end_datetime": "2025-01-06T09:15:00Z"
            }"#,
        )
        .unwrap();
        assert!(!request.is_background);
        assert_eq!(request.title, "Standup");
    }

    fn recurring_request(interval_days: i64) -> RecurringEventRequest {
        RecurringEventRequest {
            title: "Gym".to_string(),
            start_datetime: "2025-01-06T18:00:00Z".parse().unwrap(),
            end_datetime: "2025-01-06T19:00:00Z".parse().unwrap(),
            description: None,
            location: None,
            activity_template_id: None,
            interval_days,
            occurrences: 4,
        }
    }

    #[test]
    fn occurrence_window_shifts_by_whole_intervals() {
        let request = recurring_request(7);
        let (start, end) = occurrence_window(&request, 2).unwrap();
        assert_eq!(start.to_rfc3339(), "2025-01-20T18:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-01-20T19:00:00+00:00");
    }

    #[test]
    fn occurrence_window_rejects_intervals_past_the_date_range() {
        let request = recurring_request(1_000_000_000_000_000);
        assert!(occurrence_window(&request, 1).is_none());
    }

    #[test]
    fn occurrence_window_rejects_overflowing_multiplication() {
        let request = recurring_request(i64::MAX);
        assert!(occurrence_window(&request, 2).is_none());
    }
}
