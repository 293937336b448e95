use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to producers calling into the relay.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Malformed or missing required fields in a telemetry or command submission.
    #[error("{0}")]
    InvalidInput(String),
    /// Only raised under the `reject_newest` overflow policy.
    #[error("Command queue full ({capacity} pending)")]
    QueueFull { capacity: usize },
}

impl RelayError {
    pub fn invalid(message: impl Into<String>) -> Self {
        RelayError::InvalidInput(message.into())
    }
}

impl ResponseError for RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RelayError::QueueFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "status": "error",
            "message": self.to_string(),
        }))
    }
}

/// A single subscriber's send failed. Never leaves the broadcast pass.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Subscriber connection closed")]
    Closed,
    #[error("Subscriber send buffer full")]
    BufferFull,
    #[error("Transport error: {0}")]
    Transport(String),
}
