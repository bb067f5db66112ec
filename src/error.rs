// HTTP API Error Types
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::auth::IdentityError;
use crate::database::repository::StoreError;
use crate::services::ProvisioningError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    InvalidJson(String),
    InvalidName(String),
    WeakPassword(String),

    // 401 Unauthorized
    Unauthorized(String),
    AuthFailed(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict { code: &'static str, message: String },

    // 410 Gone
    AlreadyRevealed(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 502 Bad Gateway (cluster issues)
    BadGateway { code: &'static str, message: String },

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::InvalidName(_) => 400,
            ApiError::WeakPassword(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::AuthFailed(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict { .. } => 409,
            ApiError::AlreadyRevealed(_) => 410,
            ApiError::InternalServerError(_) => 500,
            ApiError::BadGateway { .. } => 502,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::InvalidJson(msg) => msg,
            ApiError::InvalidName(msg) => msg,
            ApiError::WeakPassword(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::AuthFailed(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict { message, .. } => message,
            ApiError::AlreadyRevealed(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::BadGateway { message, .. } => message,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::InvalidName(_) => "INVALID_NAME",
            ApiError::WeakPassword(_) => "WEAK_PASSWORD",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::AuthFailed(_) => "AUTH_FAILED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict { code, .. } => *code,
            ApiError::AlreadyRevealed(_) => "ALREADY_REVEALED",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::BadGateway { code, .. } => *code,
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "success": false,
            "error": self.message(),
            "code": self.error_code()
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn bad_gateway(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadGateway {
            code,
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<ProvisioningError> for ApiError {
    fn from(err: ProvisioningError) -> Self {
        let message = err.to_string();
        match err {
            ProvisioningError::Forbidden(msg) => ApiError::forbidden(msg),
            ProvisioningError::NotFound(_) => ApiError::not_found(message),
            ProvisioningError::InvalidName(msg) => ApiError::InvalidName(msg),
            ProvisioningError::DuplicateName(_) => ApiError::conflict("DUPLICATE_NAME", message),
            ProvisioningError::QuotaExceeded { .. } => ApiError::conflict("QUOTA_EXCEEDED", message),
            ProvisioningError::AlreadyDecided(_) => ApiError::conflict("ALREADY_DECIDED", message),
            ProvisioningError::NotProvisioned(_) => ApiError::conflict("NOT_PROVISIONED", message),
            ProvisioningError::AlreadyRevealed => ApiError::AlreadyRevealed(message),
            ProvisioningError::WeakPassword(_) => ApiError::WeakPassword(message),
            ProvisioningError::Credentials(e) => {
                tracing::error!("Credential handling failed: {}", e);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            // Cluster details stay in the logs
            ProvisioningError::ProvisioningFailed(_) => ApiError::bad_gateway("PROVISIONING_FAILED", message),
            ProvisioningError::Unreachable(_) => ApiError::bad_gateway("UNREACHABLE", message),
            ProvisioningError::AuthFailed => ApiError::AuthFailed(message),
            ProvisioningError::Store(store_err) => store_err.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => ApiError::conflict("DUPLICATE_NAME", "Request already exists"),
            StoreError::QuotaExceeded { limit } => ApiError::conflict(
                "QUOTA_EXCEEDED",
                format!("Request limit reached: at most {} requests per user", limit),
            ),
            StoreError::Inconsistent(e) => {
                tracing::error!("Inconsistent request record: {}", e);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            StoreError::Sql(
                sqlx_err @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)),
            ) => {
                tracing::error!("Request directory unavailable: {}", sqlx_err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            StoreError::Sql(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        ApiError::unauthorized(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidJson(rejection.body_text())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
