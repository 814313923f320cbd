//! Error handling module for compass.
//!
//! One error type is shared by the gateway, the domain services, the local
//! backend and the dev server. On the wire it travels as a PostgREST-style
//! body (`code`, `message`, `details`, `hint`) and is mapped back on the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const INVALID_API_KEY: &str = "INVALID_API_KEY";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    /// PostgREST's code for "function not found in the schema cache".
    pub const PROCEDURE_NOT_FOUND: &str = "PGRST202";
    pub const REJECTED: &str = "REJECTED";
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

/// Application error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// No authenticated identity
    Unauthenticated(String),
    /// Input rejected before any I/O
    Validation(String),
    /// Row or resource not found
    NotFound(String),
    /// The named stored procedure is not installed on the backend
    ProcedureUnavailable(String),
    /// Data or policy rejection by the backend
    Rejected(String),
    /// Backend unreachable or the transport failed
    Network(String),
    /// Database error inside the local backend
    Database(String),
    /// Internal error
    Internal(String),
    /// Malformed request
    BadRequest(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ProcedureUnavailable(_) => StatusCode::NOT_FOUND,
            AppError::Rejected(_) => StatusCode::FORBIDDEN,
            AppError::Network(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => codes::UNAUTHENTICATED,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::ProcedureUnavailable(_) => codes::PROCEDURE_NOT_FOUND,
            AppError::Rejected(_) => codes::REJECTED,
            AppError::Network(_) => codes::NETWORK_ERROR,
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Unauthenticated(msg)
            | AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::ProcedureUnavailable(msg)
            | AppError::Rejected(msg)
            | AppError::Network(msg)
            | AppError::Database(msg)
            | AppError::Internal(msg)
            | AppError::BadRequest(msg) => msg.clone(),
        }
    }

    /// True when a procedure call failed only because the procedure is missing.
    pub fn is_procedure_unavailable(&self) -> bool {
        matches!(self, AppError::ProcedureUnavailable(_))
    }

    /// Rebuild an error from a backend error body and HTTP status.
    pub fn from_body(status: u16, body: ErrorBody) -> Self {
        let message = body.message;
        match body.code.as_str() {
            codes::UNAUTHENTICATED | codes::INVALID_API_KEY => AppError::Unauthenticated(message),
            codes::VALIDATION_ERROR => AppError::Validation(message),
            codes::NOT_FOUND => AppError::NotFound(message),
            codes::PROCEDURE_NOT_FOUND => AppError::ProcedureUnavailable(message),
            codes::REJECTED => AppError::Rejected(message),
            codes::DATABASE_ERROR => AppError::Database(message),
            codes::BAD_REQUEST => AppError::BadRequest(message),
            _ => match status {
                401 => AppError::Unauthenticated(message),
                403 | 409 => AppError::Rejected(message),
                404 => AppError::NotFound(message),
                400 | 422 => AppError::BadRequest(message),
                _ => AppError::Internal(message),
            },
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(db) => match db.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    tracing::warn!("Constraint violation: {}", db.message());
                    AppError::Rejected(format!("Constraint violation: {}", db.message()))
                }
                _ => {
                    tracing::error!("Database error: {:?}", err);
                    AppError::Database(format!("Database error: {}", err))
                }
            },
            _ => {
                tracing::error!("Database error: {:?}", err);
                AppError::Database(format!("Database error: {}", err))
            }
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!("Transport error: {:?}", err);
        if err.is_decode() {
            AppError::Internal(format!("Malformed response: {}", err))
        } else {
            AppError::Network(format!("Network error: {}", err))
        }
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        tracing::error!("Password hashing error: {:?}", err);
        AppError::Internal("Password hashing failed".to_string())
    }
}

/// PostgREST-style error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl ErrorBody {
    pub fn new(error: &AppError) -> Self {
        let hint = match error {
            AppError::ProcedureUnavailable(_) => {
                Some("Install the procedure or use the direct table form".to_string())
            }
            _ => None,
        };

        Self {
            code: error.error_code().to_string(),
            message: error.message(),
            details: None,
            hint,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ErrorBody::new(&self))).into_response()
    }
}
