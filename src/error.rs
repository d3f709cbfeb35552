use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

/// Postgres SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Test is not active")]
    TestInactive,

    #[error("Test is outside of its active window")]
    OutsideActiveWindow,

    #[error("Attempt quota exceeded: {used} of {max} attempts used")]
    QuotaExceeded { used: i64, max: i32 },

    #[error("Another attempt is already in progress: {0}")]
    AttemptInProgress(uuid::Uuid),

    #[error("Attempt is already completed")]
    AttemptCompleted,

    #[error("Time limit of {limit_minutes} minutes exceeded")]
    TimeLimitExceeded { limit_minutes: i32 },

    #[error("Invalid answer: {0}")]
    InvalidAnswer(String),

    #[error("Concurrent modification: {0}")]
    ConcurrencyConflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code used in response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::BadRequest(_) | Error::Json(_) => "bad_request",
            Error::Unauthorized(_) => "unauthorized",
            Error::NotFound(_) => "not_found",
            Error::TestInactive => "test_inactive",
            Error::OutsideActiveWindow => "outside_active_window",
            Error::QuotaExceeded { .. } => "quota_exceeded",
            Error::AttemptInProgress(_) => "attempt_in_progress",
            Error::AttemptCompleted => "attempt_completed",
            Error::TimeLimitExceeded { .. } => "time_limit_exceeded",
            Error::InvalidAnswer(_) => "invalid_answer",
            Error::ConcurrencyConflict(_) => "concurrency_conflict",
            Error::Validation(_) => "validation_error",
            _ => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) | Error::Json(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::TestInactive | Error::OutsideActiveWindow | Error::TimeLimitExceeded { .. } => {
                StatusCode::FORBIDDEN
            }
            Error::QuotaExceeded { .. }
            | Error::AttemptInProgress(_)
            | Error::AttemptCompleted
            | Error::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            Error::InvalidAnswer(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = ?self, "request failed");
            "An unexpected error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({ "error": self.code(), "message": message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Error::ConcurrencyConflict(db.message().to_string())
            }
            other => Error::Database(other),
        }
    }
}
