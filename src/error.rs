use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;
use std::fmt::Display;
use tracing::error;

/// Process-level error: everything that can reach `main` or an HTTP handler.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// Implement conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Never echo storage or config internals to the caller
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": message
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(e) => match e {
                AuthError::UserExists => StatusCode::CONFLICT,
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::AppNotFound => StatusCode::NOT_FOUND,
                AuthError::RefreshTokenNotFound => StatusCode::NOT_FOUND,
                AuthError::RefreshTokenDead => StatusCode::FORBIDDEN,
                AuthError::UserNotFound => StatusCode::NOT_FOUND,
                AuthError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The error kinds the authentication core reports to its callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("User already exists")]
    UserExists,

    /// Unknown email and wrong password are deliberately the same kind.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Application not found")]
    AppNotFound,

    #[error("Refresh token not found")]
    RefreshTokenNotFound,

    /// Covers both expired and already consumed refresh tokens.
    #[error("Refresh token is expired or already used")]
    RefreshTokenDead,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error")]
    Internal,
}

impl AuthError {
    /// Logs the full cause and collapses it into the opaque `Internal` kind.
    pub(crate) fn internal(op: &str, cause: impl Display) -> Self {
        error!(op, error = %cause, "unexpected failure");
        AuthError::Internal
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Record not found")]
    NotFound,

    #[error("Record already exists")]
    AlreadyExists,
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StorageError::AlreadyExists
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::ConnectionError(err.to_string())
            }
            _ => StorageError::QueryError(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationError(err.to_string())
    }
}

/// Outcome of a failed refresh-session consumption.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Refresh session not found")]
    NotFound,

    #[error("Refresh session expired")]
    Expired,

    #[error("Refresh session already used")]
    AlreadyUsed,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let config_err = config::ConfigError::NotFound(String::from("key not found"));
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));

        let storage_err: StorageError = sqlx::Error::RowNotFound.into();
        assert!(matches!(storage_err, StorageError::NotFound));

        let storage_err: StorageError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(storage_err, StorageError::ConnectionError(_)));

        let storage_err: StorageError = sqlx::Error::ColumnNotFound("used".into()).into();
        assert!(matches!(storage_err, StorageError::QueryError(_)));
    }

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (AuthError::UserExists, StatusCode::CONFLICT),
            (AuthError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AuthError::AppNotFound, StatusCode::NOT_FOUND),
            (AuthError::RefreshTokenNotFound, StatusCode::NOT_FOUND),
            (AuthError::RefreshTokenDead, StatusCode::FORBIDDEN),
            (AuthError::UserNotFound, StatusCode::NOT_FOUND),
            (AuthError::InvalidArgument("email".into()), StatusCode::BAD_REQUEST),
            (AuthError::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::AuthError(err).status_code(), status);
        }

        let err = AppError::StorageError(StorageError::NotFound);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_display() {
        let err = AppError::AuthError(AuthError::InvalidCredentials);
        assert_eq!(err.to_string(), "Authentication error: Invalid credentials");

        // Internal failures carry no detail outward
        let err = AuthError::internal("test", "disk I/O error at /var/lib/sso.db");
        assert_eq!(err, AuthError::Internal);
        assert_eq!(err.to_string(), "Internal error");
    }

    #[actix_web::test]
    async fn test_internal_error_body_is_opaque() {
        let err = AppError::StorageError(StorageError::QueryError("no such table: users".into()));
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["status"], 500);
        assert_eq!(json["error"]["message"], "Internal server error");
    }
}
