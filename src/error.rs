//! Service error types with HTTP status code mapping.
//!
//! [`AppError`] is the central error type for request handling. Each
//! variant maps to a specific HTTP status code and structured JSON error
//! response. Batch jobs do not surface these to clients; they log and
//! continue.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{EventId, MediaId, ValidationError};
use crate::mail::MailError;
use crate::persistence::StoreError;
use crate::storage::StorageError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "custom_label: custom label is required for Other events",
///     "details": "custom_label"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see ranges on [`AppError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details, such as the offending field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status                     |
/// |-----------|-------------------|---------------------------------|
/// | 1000–1099 | Validation        | 400 Bad Request                 |
/// | 1100–1199 | Authentication    | 401 / 403 / 429                 |
/// | 2000–2999 | State / Not Found | 404 / 409 / 410                 |
/// | 3000–3099 | Server            | 500 Internal Server Error       |
/// | 3100–3199 | Upstream services | 502 Bad Gateway                 |
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A field failed domain validation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Request could not be interpreted.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The account exists but its email address is not verified yet.
    #[error("email address not verified")]
    EmailNotVerified,

    /// The share link is protected and no valid password was supplied.
    #[error("this card is password protected")]
    PasswordRequired,

    /// Client exceeded the failed-login allowance.
    #[error("too many failed attempts; retry after {retry_after_secs} s")]
    RateLimited {
        /// Seconds until the client may retry.
        retry_after_secs: u64,
    },

    /// Event with the given ID was not found for this user.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// Media with the given ID was not found for this user.
    #[error("media not found: {0}")]
    MediaNotFound(MediaId),

    /// Any other missing resource.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness rule would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The share link is past its expiry.
    #[error("This link has expired")]
    ShareExpired,

    /// Object storage call failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Mail provider call failed.
    #[error("mail error: {0}")]
    Mail(#[from] MailError),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::InvalidRequest(_) => 1002,
            Self::Unauthorized(_) => 1101,
            Self::Forbidden(_) => 1102,
            Self::EmailNotVerified => 1103,
            Self::PasswordRequired => 1104,
            Self::RateLimited { .. } => 1129,
            Self::EventNotFound(_) => 2001,
            Self::MediaNotFound(_) => 2002,
            Self::NotFound(_) => 2003,
            Self::Conflict(_) => 2009,
            Self::ShareExpired => 2010,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::Storage(_) => 3101,
            Self::Mail(_) => 3102,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) | Self::PasswordRequired => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::EmailNotVerified => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::EventNotFound(_) | Self::MediaNotFound(_) | Self::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ShareExpired => StatusCode::GONE,
            Self::Storage(_) | Self::Mail(_) => StatusCode::BAD_GATEWAY,
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::Validation(err) => Some(err.field.to_string()),
            Self::RateLimited { retry_after_secs } => Some(format!("retry_after={retry_after_secs}")),
            _ => None,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            other => Self::PersistenceError(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
