// src/error.rs

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Every failure is scoped to the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request: bad option index, bad duration, malformed code...
    InvalidInput(String),

    // 401 Unauthorized
    AuthError(String),

    // 404 Not Found
    NotFound(String),

    // 410 Gone: the session passed its time window
    Expired,

    // 400 Bad Request: operation not valid for this kind of session
    WrongType(String),

    // 403 Forbidden: caller is not the session creator
    NotOwner,

    // 403 Forbidden: caller lacks the role for this read
    Forbidden(String),

    // 409 Conflict: question is live in another session
    AlreadyReserved(i64),

    // 409 Conflict: nothing is broadcast in the class session
    NoActiveQuestion,

    // 409 Conflict: the student already answered this question
    DuplicateSubmission,
}

impl AppError {
    /// Stable machine-readable kind, sent next to the human message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InternalServerError(_) => "internal",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::AuthError(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::Expired => "expired",
            AppError::WrongType(_) => "wrong_type",
            AppError::NotOwner => "not_owner",
            AppError::Forbidden(_) => "forbidden",
            AppError::AlreadyReserved(_) => "already_reserved",
            AppError::NoActiveQuestion => "no_active_question",
            AppError::DuplicateSubmission => "duplicate_submission",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidInput(_) | AppError::WrongType(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Expired => StatusCode::GONE,
            AppError::NotOwner | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::AlreadyReserved(_)
            | AppError::NoActiveQuestion
            | AppError::DuplicateSubmission => StatusCode::CONFLICT,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InternalServerError(msg) => write!(f, "internal error: {}", msg),
            AppError::InvalidInput(msg)
            | AppError::AuthError(msg)
            | AppError::NotFound(msg)
            | AppError::WrongType(msg)
            | AppError::Forbidden(msg) => f.write_str(msg),
            AppError::Expired => f.write_str("Session has expired"),
            AppError::NotOwner => f.write_str("Only the session creator can do this"),
            AppError::AlreadyReserved(id) => {
                write!(f, "Question {} is live in another session", id)
            }
            AppError::NoActiveQuestion => f.write_str("No question is currently active"),
            AppError::DuplicateSubmission => {
                f.write_str("You have already answered this question")
            }
        }
    }
}

impl std::error::Error for AppError {}

/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(json!({
            "error": error_message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

/// Malformed or mistyped JSON bodies get the same `invalid_input` shape as
/// every other validation failure instead of axum's plain-text 422.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}
