//! Per-user UI settings, stored as a JSON preferences blob.

use super::auth::{principal::require_auth, storage, AuthError, AuthState};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

/// Effective settings; every field has a default so partial blobs read fine.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct UserSettings {
    pub scroll_mode: Option<String>,
    pub view_mode: Option<String>,
    pub first_day_of_week: Option<i32>,
    pub hour_start: Option<i32>,
    pub hour_end: Option<i32>,
}

fn effective_settings(preferences: Option<&Value>) -> UserSettings {
    let empty = json!({});
    let prefs = preferences.unwrap_or(&empty);
    UserSettings {
        scroll_mode: Some(
            prefs
                .get("scroll_mode")
                .and_then(Value::as_str)
                .unwrap_or("vertical")
                .to_string(),
        ),
        view_mode: Some(
            prefs
                .get("view_mode")
                .and_then(Value::as_str)
                .unwrap_or("dynamic")
                .to_string(),
        ),
        first_day_of_week: Some(
            prefs
                .get("first_day_of_week")
                .and_then(Value::as_i64)
                .and_then(|value| i32::try_from(value).ok())
                .unwrap_or(1),
        ),
        hour_start: Some(
            prefs
                .get("hour_start")
                .and_then(Value::as_i64)
                .and_then(|value| i32::try_from(value).ok())
                .unwrap_or(8),
        ),
        hour_end: Some(
            prefs
                .get("hour_end")
                .and_then(Value::as_i64)
                .and_then(|value| i32::try_from(value).ok())
                .unwrap_or(22),
        ),
    }
}

/// Merge provided fields over the stored blob; `None` leaves keys untouched.
fn merge_settings(preferences: Option<Value>, update: &UserSettings) -> Value {
    // A corrupted non-object blob is discarded rather than patched.
    let mut object = match preferences {
        Some(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    if let Some(scroll_mode) = &update.scroll_mode {
        object.insert("scroll_mode".to_string(), json!(scroll_mode));
    }
    if let Some(view_mode) = &update.view_mode {
        object.insert("view_mode".to_string(), json!(view_mode));
    }
    if let Some(first_day_of_week) = update.first_day_of_week {
        object.insert("first_day_of_week".to_string(), json!(first_day_of_week));
    }
    if let Some(hour_start) = update.hour_start {
        object.insert("hour_start".to_string(), json!(hour_start));
    }
    if let Some(hour_end) = update.hour_end {
        object.insert("hour_end".to_string(), json!(hour_end));
    }
    Value::Object(object)
}

#[utoipa::path(
    get,
    path = "/api/v1/settings",
    responses(
        (status = 200, description = "Effective settings with defaults applied.", body = UserSettings),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "planning"
)]
pub async fn get_settings(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match storage::get_preferences(&pool, principal.user_id).await {
        Ok(preferences) => {
            let settings = effective_settings(preferences.as_ref());
            (StatusCode::OK, Json(settings)).into_response()
        }
        Err(err) => AuthError::from(err).into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/settings",
    request_body = UserSettings,
    responses(
        (status = 200, description = "Merged settings after the update.", body = UserSettings),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "planning"
)]
pub async fn update_settings(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UserSettings>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(update)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let result: Result<UserSettings, AuthError> = async {
        let preferences = storage::get_preferences(&pool, principal.user_id).await?;
        let merged = merge_settings(preferences, &update);
        if !storage::set_preferences(&pool, principal.user_id, &merged).await? {
            return Err(AuthError::Unauthorized);
        }
        Ok(effective_settings(Some(&merged)))
    }
    .await;

    match result {
        Ok(settings) => (StatusCode::OK, Json(settings)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_settings_fills_defaults() {
        let settings = effective_settings(None);
        assert_eq!(settings.scroll_mode.as_deref(), Some("vertical"));
        assert_eq!(settings.view_mode.as_deref(), Some("dynamic"));
        assert_eq!(settings.first_day_of_week, Some(1));
        assert_eq!(settings.hour_start, Some(8));
        assert_eq!(settings.hour_end, Some(22));
    }

    #[test]
    fn effective_settings_reads_stored_values() {
        let prefs = json!({"scroll_mode": "horizontal", "hour_start": 6});
        let settings = effective_settings(Some(&prefs));
        assert_eq!(settings.scroll_mode.as_deref(), Some("horizontal"));
        assert_eq!(settings.hour_start, Some(6));
        assert_eq!(settings.hour_end, Some(22));
    }

    #[test]
    fn merge_keeps_unrelated_keys() {
        let stored = json!({"scroll_mode": "horizontal", "theme": "dark"});
        let update = UserSettings {
            scroll_mode: None,
            view_mode: Some("fixed".to_string()),
            first_day_of_week: None,
            hour_start: None,
            hour_end: None,
        };
        let merged = merge_settings(Some(stored), &update);
        assert_eq!(merged["scroll_mode"], "horizontal");
        assert_eq!(merged["view_mode"], "fixed");
        assert_eq!(merged["theme"], "dark");
    }

    #[test]
    fn merge_replaces_non_object_blob() {
        let merged = merge_settings(
            Some(json!("corrupted")),
            &UserSettings {
                scroll_mode: Some("vertical".to_string()),
                view_mode: None,
                first_day_of_week: None,
                hour_start: None,
                hour_end: None,
            },
        );
        assert_eq!(merged["scroll_mode"], "vertical");
    }
}
