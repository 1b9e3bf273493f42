// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the admission gate.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Gate error taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Client-caused; retrying without changing the input will fail again.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    /// Terminal until an administrator unblocks the address.
    #[error("access denied")]
    Blocked { retry_after_secs: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::Validation(_) => StatusCode::BAD_REQUEST,
            GateError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GateError::Blocked { .. } => StatusCode::FORBIDDEN,
            GateError::Internal(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GateError::Validation(_) => "VALIDATION_FAILED",
            GateError::RateLimitExceeded { .. } => "RATE_LIMITED",
            GateError::Blocked { .. } => "BLOCKED",
            GateError::Internal(_) => "INTERNAL",
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            GateError::RateLimitExceeded { retry_after_secs }
            | GateError::Blocked { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after_secs = self.retry_after_secs();
        let body = match &self {
            GateError::Validation(errors) => ErrorResponse {
                error: "invalid input".to_string(),
                code: self.code(),
                details: errors.clone(),
                retry_after_secs,
            },
            GateError::Internal(detail) => {
                error!(detail = %detail, "Internal gate error");
                ErrorResponse {
                    error: "service unavailable".to_string(),
                    code: self.code(),
                    details: Vec::new(),
                    retry_after_secs,
                }
            }
            other => ErrorResponse {
                error: other.to_string(),
                code: other.code(),
                details: Vec::new(),
                retry_after_secs,
            },
        };

        match retry_after_secs {
            Some(secs) => (
                status,
                [(header::RETRY_AFTER, secs.to_string())],
                Json(body),
            )
                .into_response(),
            None => (status, Json(body)).into_response(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GateError>;
