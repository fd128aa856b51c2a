use axum::Json;
use axum::body::Body;
use axum::response::{IntoResponse, Response as AxumResponse};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

/// A response relayed from the cloud REST API.
#[derive(Clone, Debug)]
pub struct Response {
    /// The body of the response.
    pub body: Bytes,

    /// The headers of the response, per-hop headers removed.
    pub headers: HeaderMap,

    /// The status code of the response.
    pub status_code: StatusCode,
}

impl IntoResponse for Response {
    fn into_response(self) -> AxumResponse {
        (self.status_code, self.headers, Body::from(self.body)).into_response()
    }
}

/// What the vehicle answered.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CarResponse {
    /// Whether the vehicle carried out the command.
    pub result: bool,

    /// The vehicle's reason for refusing, empty on success.
    pub reason: String,
}

/// Body of every response the proxy produces itself.
///
/// `response` carries what the vehicle said; `error` and `error_description`
/// carry what went wrong in the proxy. The two never mix.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CommandResponse {
    /// The vehicle's answer, absent when the exchange failed.
    pub response: Option<CarResponse>,

    /// Machine-readable error code, empty when the exchange completed.
    pub error: String,

    /// Human-readable error detail.
    pub error_description: String,
}

impl CommandResponse {
    /// The vehicle carried out the command.
    #[must_use]
    pub const fn executed() -> Self {
        Self {
            response: Some(CarResponse {
                result: true,
                reason: String::new(),
            }),
            error: String::new(),
            error_description: String::new(),
        }
    }

    /// The vehicle refused the command for `reason`.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            response: Some(CarResponse {
                result: false,
                reason: reason.into(),
            }),
            error: String::new(),
            error_description: String::new(),
        }
    }

    /// The proxy could not complete the request.
    #[must_use]
    pub fn failed(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            response: None,
            error: code.into(),
            error_description: description.into(),
        }
    }
}

impl IntoResponse for CommandResponse {
    fn into_response(self) -> AxumResponse {
        (StatusCode::OK, Json(self)).into_response()
    }
}
