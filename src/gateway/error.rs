//! Gateway error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::net::SocketAddr;
use thiserror::Error;

/// Requests the gateway turns away.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The underlying connection was already upgraded once
    #[error("connection from {0} is already upgraded")]
    DoubleUpgrade(SocketAddr),

    /// Shutdown has begun, no new subscribers
    #[error("relay is shutting down")]
    ShuttingDown,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::DoubleUpgrade(_) => StatusCode::CONFLICT,
            GatewayError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            GatewayError::DoubleUpgrade(_) => "already_upgraded",
            GatewayError::ShuttingDown => "shutting_down",
        }
    }
}

/// JSON error envelope.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    code: &'static str,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                message: self.to_string(),
                code: self.code(),
            },
        };
        (self.status_code(), Json(body)).into_response()
    }
}
