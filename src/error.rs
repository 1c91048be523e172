use std::sync::OnceLock;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::config::Environment;

static DETAIL_MODE: OnceLock<Environment> = OnceLock::new();

/// Seed the error renderer with the parsed runtime mode, once at startup.
/// Until seeded (unit tests, mostly) internal detail stays visible.
pub fn init_detail_mode(environment: Environment) {
    let _ = DETAIL_MODE.set(environment);
}

fn detail_visible() -> bool {
    !matches!(DETAIL_MODE.get(), Some(Environment::Production))
}

/// Operational errors carry their message to the client; anything that falls
/// through to `Internal` is logged and reported generically.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Email already in use")]
    DuplicateEmail,
    #[error("Incorrect email or password")]
    InvalidCredentials,
    #[error("User not found.")]
    UserNotFound,
    #[error("PIN has expired.")]
    PinExpired,
    #[error("Invalid PIN. Please try again.")]
    InvalidPin,
    #[error("You are not logged in! Please log in to get access.")]
    Unauthenticated,
    #[error("Invalid token. Please log in again!")]
    InvalidToken,
    #[error("Your token has expired. Please log in again!")]
    TokenExpired,
    #[error("User recently changed password! Please log in again.")]
    PasswordChangedSince,
    #[error("You do not have permission to perform this action.")]
    Forbidden,
    #[error("{0} not found.")]
    NotFound(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::DuplicateEmail
            | ApiError::PinExpired
            | ApiError::InvalidPin => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials
            | ApiError::Unauthenticated
            | ApiError::InvalidToken
            | ApiError::TokenExpired
            | ApiError::PasswordChangedSince => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::UserNotFound | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Translate store-layer constraint violations to the nearest operational kind.
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation => {
                    return ApiError::Validation(
                        "Duplicate field value. Please use another value!".into(),
                    )
                }
                sqlx::error::ErrorKind::ForeignKeyViolation => {
                    return ApiError::Validation("Foreign key constraint violation".into())
                }
                _ => {}
            }
        }
        ApiError::Internal(err.into())
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => ApiError::TokenExpired,
            _ => ApiError::InvalidToken,
        }
    }
}

impl ApiError {
    /// What the client sees. Operational errors always carry their message;
    /// internal detail is only exposed outside production.
    fn client_message(&self, detail_visible: bool) -> String {
        match self {
            ApiError::Internal(_) if !detail_visible => {
                "Something went wrong! Please try again later.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = ?self, "unexpected internal error");
        }
        let message = self.client_message(detail_visible());
        (status, Json(json!({ "status": "error", "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operational_errors_map_to_expected_status() {
        assert_eq!(ApiError::DuplicateEmail.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::UserNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::PinExpired.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn expired_jwt_maps_to_token_expired() {
        let err = jsonwebtoken::errors::Error::from(
            jsonwebtoken::errors::ErrorKind::ExpiredSignature,
        );
        assert!(matches!(ApiError::from(err), ApiError::TokenExpired));
    }

    #[test]
    fn malformed_jwt_maps_to_invalid_token() {
        let err =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidToken);
        assert!(matches!(ApiError::from(err), ApiError::InvalidToken));
    }

    #[test]
    fn internal_detail_is_hidden_in_production() {
        let err = ApiError::Internal(anyhow::anyhow!("pool timed out"));
        assert_eq!(
            err.client_message(false),
            "Something went wrong! Please try again later."
        );
        assert_eq!(err.client_message(true), "pool timed out");
    }

    #[test]
    fn operational_messages_survive_production_mode() {
        assert_eq!(
            ApiError::InvalidPin.client_message(false),
            "Invalid PIN. Please try again."
        );
        assert_eq!(
            ApiError::UserNotFound.client_message(false),
            "User not found."
        );
    }

    #[test]
    fn login_failures_share_one_message() {
        // Unknown email and wrong password must be indistinguishable to the client.
        assert_eq!(
            ApiError::InvalidCredentials.to_string(),
            "Incorrect email or password"
        );
    }
}
