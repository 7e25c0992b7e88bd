//! Error types for the webhook gateway.

use axum::Json;
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors raised by the webhook gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The listener could not bind its address.
    #[error("failed to bind webhook gateway to {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server failed while accepting connections.
    #[error("webhook gateway failed: {0}")]
    Serve(#[source] std::io::Error),

    /// The request body is not valid JSON.
    #[error("invalid JSON body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// The dispatcher is no longer consuming webhook events.
    #[error("webhook queue is closed")]
    QueueClosed,

    /// The path or body could not be extracted.
    #[error("{reason}")]
    Rejected {
        /// Status chosen by the extractor, e.g. 413 for an oversized body.
        status: StatusCode,
        reason: String,
    },

    /// No webhook route matches the request path.
    #[error("no webhook route for this path")]
    NotFound,

    /// The path exists but only accepts `POST`.
    #[error("webhooks must be sent with POST")]
    MethodNotAllowed,
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// HTTP status the error is answered with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Rejected { status, .. } => *status,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<PathRejection> for GatewayError {
    fn from(rejection: PathRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            reason: rejection.body_text(),
        }
    }
}

impl From<BytesRejection> for GatewayError {
    fn from(rejection: BytesRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            reason: rejection.body_text(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(json!({ "status": "failed", "reason": self.to_string() })),
        )
            .into_response()
    }
}
