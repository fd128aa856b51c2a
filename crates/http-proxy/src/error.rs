use crate::response::CommandResponse;

use axum::Json;
use axum::response::{IntoResponse, Response as AxumResponse};
use http::StatusCode;
use thiserror::Error;
use tracing::error;
use vcmd_vehicle::VehicleError;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Already started.
    #[error("already started")]
    AlreadyStarted,

    /// Client error.
    #[error("client error: {0}")]
    Client(String),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),
}

/// A request that could not be completed, as reported to the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body or parameters were malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The cloud relay could not be reached or failed mid-exchange.
    #[error("upstream request failed: {0}")]
    BadGateway(String),

    /// The credential was missing or rejected.
    #[error("{0}")]
    Forbidden(String),

    /// The cloud relay did not answer in time.
    #[error("upstream request timed out")]
    GatewayTimeout,

    /// The proxy could not complete the exchange with the vehicle.
    #[error("{0}")]
    Internal(String),

    /// The command name is not in the catalogue.
    #[error("unknown command: {0}")]
    InvalidCommand(String),

    /// The path segment in the VIN position is not a VIN.
    #[error("expected 17-character VIN in path (do not use Fleet API ID)")]
    InvalidVin,

    /// Waiting for the vehicle's serialization slot took too long.
    #[error("timed out waiting for the vehicle to become available")]
    LockTimeout,

    /// The command route only accepts `POST`.
    #[error("method not allowed")]
    MethodNotAllowed,
}

impl ApiError {
    /// The HTTP status this error is reported with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::InvalidCommand(_) => StatusCode::BAD_REQUEST,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidVin => StatusCode::NOT_FOUND,
            Self::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Machine-readable error code placed in the `error` field.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "invalid_request",
            Self::BadGateway(_) => "bad_gateway",
            Self::Forbidden(_) => "forbidden",
            Self::GatewayTimeout => "gateway_timeout",
            Self::Internal(_) => "internal_error",
            Self::InvalidCommand(_) => "invalid_command",
            Self::InvalidVin => "not_found",
            Self::LockTimeout => "service_unavailable",
            Self::MethodNotAllowed => "method_not_allowed",
        }
    }
}

impl From<VehicleError> for ApiError {
    fn from(e: VehicleError) -> Self {
        match e {
            VehicleError::Auth(message) => Self::Forbidden(message),
            VehicleError::InvalidParameters(_) => Self::BadRequest(e.to_string()),
            VehicleError::UnknownCommand(name) => Self::InvalidCommand(name),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> AxumResponse {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, "request failed: {}", self);
        }

        let body = CommandResponse::failed(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}
