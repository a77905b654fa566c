use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

/// Failures surfaced by the auth and admin handlers.
///
/// `Unauthorized` deliberately carries no sub-reason: bad credentials and
/// unknown, expired or revoked tokens all render identically so responses do
/// not leak account or token state.
#[derive(Debug)]
pub enum AuthError {
    Unauthorized,
    Forbidden(&'static str),
    InvalidInvite,
    InvalidEmail,
    EmailTaken,
    WeakPassword(&'static str),
    NotFound,
    Conflict(&'static str),
    Internal(anyhow::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response()
            }
            Self::Forbidden(message) => (StatusCode::FORBIDDEN, message).into_response(),
            Self::InvalidInvite => {
                (StatusCode::BAD_REQUEST, "Invalid or already used invite token").into_response()
            }
            Self::InvalidEmail => {
                (StatusCode::BAD_REQUEST, "Invalid email address").into_response()
            }
            Self::EmailTaken => {
                (StatusCode::BAD_REQUEST, "Email already registered").into_response()
            }
            Self::WeakPassword(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::Conflict(message) => (StatusCode::CONFLICT, message).into_response(),
            Self::Internal(err) => {
                error!("Failed to handle auth request: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_401() {
        let response = AuthError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn invite_and_password_errors_map_to_400() {
        let response = AuthError::InvalidInvite.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AuthError::WeakPassword("too short").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AuthError::InvalidEmail.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_maps_to_500() {
        let response = AuthError::Internal(anyhow::anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn conflict_maps_to_409() {
        let response = AuthError::Conflict("already used").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
