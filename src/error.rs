use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Unauthenticated")]
    Unauthenticated,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Already consumed: {0}")]
    AlreadyConsumed(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unavailable: {0}")]
    Unavailable(String),
    #[error("Deadline exceeded")]
    DeadlineExceeded,
    #[error("Internal server error")]
    Internal,
    #[error("Internal server error: {0}")]
    InternalWithMsg(String),
}

impl AppError {
    /// Transient failures that the store retries with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Unavailable(_) => true,
            AppError::Database(e) => is_transient_db_error(e),
            _ => false,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(e) if is_unique_violation(e) => "already_exists",
            AppError::Database(e) if is_transient_db_error(e) => "unavailable",
            AppError::Database(_) => "internal",
            AppError::Unauthenticated | AppError::InvalidCredentials => "unauthenticated",
            AppError::PermissionDenied(_) => "permission_denied",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::AlreadyConsumed(_) => "already_consumed",
            AppError::InvalidArgument(_) => "invalid_argument",
            AppError::Conflict(_) => "conflict",
            AppError::Unavailable(_) => "unavailable",
            AppError::DeadlineExceeded => "deadline_exceeded",
            AppError::Internal | AppError::InternalWithMsg(_) => "internal",
        }
    }

    /// Short message safe to show to an end user.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(e) if is_unique_violation(e) => "Resource already exists (duplicate entry)".to_string(),
            AppError::Database(e) if is_transient_db_error(e) => "Service temporarily unavailable".to_string(),
            AppError::Database(_) | AppError::Internal | AppError::InternalWithMsg(_) => "Internal error".to_string(),
            AppError::Unauthenticated => "Unauthenticated".to_string(),
            AppError::InvalidCredentials => "Failed to sign in. Check your email and password.".to_string(),
            AppError::DeadlineExceeded => "Request timed out".to_string(),
            AppError::PermissionDenied(msg)
            | AppError::NotFound(msg)
            | AppError::AlreadyExists(msg)
            | AppError::AlreadyConsumed(msg)
            | AppError::InvalidArgument(msg)
            | AppError::Conflict(msg)
            | AppError::Unavailable(msg) => msg.clone(),
        }
    }
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    if let Some(db_err) = e.as_database_error() {
        let code = db_err.code().unwrap_or_default();
        // 2067 = SQLite Unique Constraint
        // 23505 = PostgreSQL Unique Violation
        return code == "2067" || code == "1555" || code == "23505";
    }
    false
}

fn is_transient_db_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().unwrap_or_default();
            // 5 / 6 = SQLITE_BUSY / SQLITE_LOCKED
            // 40001 / 40P01 = serialization failure / deadlock
            matches!(code.as_ref(), "5" | "6" | "517" | "40001" | "40P01")
        }
        _ => false,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(e) => {
                if is_unique_violation(e) {
                    StatusCode::CONFLICT
                } else if is_transient_db_error(e) {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    error!("Database error: {:?}", e);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
            AppError::Unauthenticated | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) | AppError::AlreadyConsumed(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalWithMsg(msg) => {
                error!("Internal error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.public_message(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
