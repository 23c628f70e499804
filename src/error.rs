//! Unified error handling for OMAA.
//!
//! Provides a consistent error type across all modules.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

use crate::gate::BlockReason;

/// Unified error type for OMAA operations.
#[derive(Debug, Clone)]
pub enum OmaaError {
    /// Requested provider identifier is not in the catalog.
    UnknownProvider(String),
    /// No API key configured for the selected provider.
    ApiKeyMissing(String),
    /// Upstream API returned a non-success status.
    UpstreamError {
        status: Option<u16>,
        message: String,
    },
    /// Request never reached the upstream (connect/timeout).
    NetworkError(String),
    /// Failed to parse an upstream response body.
    ParseError(String),
    /// The access gate denied the send.
    AccessDenied(BlockReason),
    /// Billing is not configured or the payment API misbehaved.
    BillingError(String),
    /// Malformed client request.
    InvalidRequest(String),
    /// Local storage failure.
    Storage(String),
    /// Internal error.
    Internal(String),
}

impl fmt::Display for OmaaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProvider(id) => write!(f, "Unknown provider '{}'", id),
            Self::ApiKeyMissing(provider) => {
                write!(f, "No API key configured for {}", provider)
            }
            Self::UpstreamError { status, message } => match status {
                Some(code) => write!(f, "Upstream error ({}): {}", code, message),
                None => write!(f, "Upstream error: {}", message),
            },
            Self::NetworkError(msg) => write!(f, "Network error: {}", msg),
            Self::ParseError(msg) => write!(f, "Parse error: {}", msg),
            Self::AccessDenied(reason) => write!(f, "Access denied: {}", reason),
            Self::BillingError(msg) => write!(f, "Billing error: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for OmaaError {}

/// Error response structure for JSON serialization.
#[derive(Serialize)]
struct ErrorResponseBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    message: String,
    r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl OmaaError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownProvider(_) => StatusCode::BAD_REQUEST,
            Self::ApiKeyMissing(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamError { .. } => StatusCode::BAD_GATEWAY,
            Self::NetworkError(_) => StatusCode::BAD_GATEWAY,
            Self::ParseError(_) => StatusCode::BAD_GATEWAY,
            Self::AccessDenied(_) => StatusCode::PAYMENT_REQUIRED,
            Self::BillingError(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type string.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::UnknownProvider(_) => "invalid_request",
            Self::ApiKeyMissing(_) => "configuration_error",
            Self::UpstreamError { .. } => "upstream_error",
            Self::NetworkError(_) => "network_error",
            Self::ParseError(_) => "upstream_error",
            Self::AccessDenied(_) => "access_denied",
            Self::BillingError(_) => "billing_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Storage(_) => "storage_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for OmaaError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::AccessDenied(reason) => ErrorResponseBody {
                error: ErrorDetail {
                    message: self.to_string(),
                    r#type: self.error_type().to_string(),
                    reason: Some(reason.as_str().to_string()),
                },
            },
            _ => ErrorResponseBody {
                error: ErrorDetail {
                    message: self.to_string(),
                    r#type: self.error_type().to_string(),
                    reason: None,
                },
            },
        };

        (status, Json(body)).into_response()
    }
}
