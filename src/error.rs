//! Error types for the maintenance service.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl DatabaseError {
    /// Classify a libsql failure, keeping unique/constraint violations distinct
    /// so callers can map them to conflicts.
    pub fn from_libsql(context: &str, err: libsql::Error) -> Self {
        let msg = err.to_string();
        if msg.contains("UNIQUE constraint failed") || msg.contains("constraint failed") {
            DatabaseError::Constraint(format!("{context}: {msg}"))
        } else {
            DatabaseError::Query(format!("{context}: {msg}"))
        }
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, DatabaseError::Constraint(_))
    }
}

/// Telephony vendor errors (SMS, media, number management).
#[derive(Debug, thiserror::Error)]
pub enum TelephonyError {
    #[error("Telephony is not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid media URL: {0}")]
    InvalidMediaUrl(String),

    #[error("Request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Vendor returned HTTP {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("No sender number available for outbound SMS")]
    NoSender,
}

/// Vision / LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Inbound pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Missing phone numbers")]
    MissingNumbers,

    #[error("Destination not configured: {0}")]
    UnknownDestination(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// HTTP-facing error. Every handler returns `Result<_, ApiError>`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("validation failed")]
    Validation(serde_json::Map<String, serde_json::Value>),

    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation(errors) => serde_json::json!({ "errors": errors }),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                serde_json::json!({ "error": "Internal server error" })
            }
            other => serde_json::json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity, .. } => ApiError::NotFound(format!("{entity} not found")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
