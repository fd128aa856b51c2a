//! Pass-through forwarding to the cloud REST API.

use crate::error::{ApiError, Error};
use crate::request::Request;
use crate::response::Response;

use http::header::{CONTENT_LENGTH, HOST};
use http::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Headers that describe one hop and are never forwarded.
const HOP_HEADERS: [&str; 6] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Forwards requests verbatim to an account's cloud host.
#[derive(Clone, Debug)]
pub struct CloudRelay {
    client: Client,
    scheme: String,
}

impl CloudRelay {
    /// Creates a relay reaching hosts over `scheme`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Client`] if the HTTP client cannot be built.
    pub fn new(scheme: impl Into<String>) -> Result<Self, Error> {
        // Bodies are relayed as received, so content encoding is left alone.
        let client = Client::builder()
            .no_brotli()
            .no_gzip()
            .build()
            .map_err(|e| Error::Client(e.to_string()))?;

        Ok(Self {
            client,
            scheme: scheme.into(),
        })
    }

    /// Sends `request` to `host`, giving up at `deadline`.
    pub async fn forward(
        &self,
        host: &str,
        request: &Request,
        deadline: Instant,
    ) -> Result<Response, ApiError> {
        let url = format!("{}://{}{}", self.scheme, host, request.path_and_query());
        debug!(%url, "forwarding request");

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ApiError::GatewayTimeout);
        }

        let headers = outbound_headers(request)?;
        let upstream = self
            .client
            .request(request.method.clone(), url)
            .headers(headers)
            .body(request.body.clone())
            .timeout(remaining)
            .send()
            .await
            .map_err(classify)?;

        let status_code = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_headers(&mut headers);
        let body = upstream.bytes().await.map_err(classify)?;

        Ok(Response {
            body,
            headers,
            status_code,
        })
    }
}

fn classify(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        warn!("cloud relay timed out");
        ApiError::GatewayTimeout
    } else {
        warn!("cloud relay failed: {}", e);
        ApiError::BadGateway(e.to_string())
    }
}

fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in HOP_HEADERS {
        headers.remove(name);
    }
}

/// Copies the inbound headers for the upstream hop and records the caller
/// in `X-Forwarded-For`, flattening repeated headers into one.
fn outbound_headers(request: &Request) -> Result<HeaderMap, ApiError> {
    let mut headers = request.headers.clone();
    strip_hop_headers(&mut headers);
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);

    let mut forwarded = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .map(|value| {
            value
                .to_str()
                .map(str::to_string)
                .map_err(|_| ApiError::BadRequest("invalid X-Forwarded-For header".to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    forwarded.push(request.client_addr.ip().to_string());

    let value = HeaderValue::from_str(&forwarded.join(", "))
        .map_err(|_| ApiError::BadRequest("invalid X-Forwarded-For header".to_string()))?;
    headers.insert(X_FORWARDED_FOR, value);

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::{Method, Uri};
    use uuid::Uuid;

    fn request(headers: HeaderMap) -> Request {
        Request {
            id: Uuid::new_v4(),
            body: bytes::Bytes::new(),
            client_addr: "192.0.2.7:50000".parse().unwrap(),
            headers,
            method: Method::GET,
            uri: Uri::from_static("/api/1/vehicles"),
        }
    }

    #[test]
    fn test_forwarded_for_is_appended() {
        let headers = outbound_headers(&request(HeaderMap::new())).unwrap();
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "192.0.2.7");
    }

    #[test]
    fn test_forwarded_for_is_flattened() {
        let mut inbound = HeaderMap::new();
        inbound.append("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        inbound.append("x-forwarded-for", HeaderValue::from_static("10.0.0.2"));

        let headers = outbound_headers(&request(inbound)).unwrap();
        let values: Vec<_> = headers.get_all("x-forwarded-for").iter().collect();
        assert_eq!(values, vec!["10.0.0.1, 10.0.0.2, 192.0.2.7"]);
    }

    #[test]
    fn test_hop_headers_are_stripped() {
        let mut inbound = HeaderMap::new();
        inbound.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        inbound.insert("proxy-connection", HeaderValue::from_static("keep-alive"));
        inbound.insert("upgrade", HeaderValue::from_static("websocket"));
        inbound.insert("te", HeaderValue::from_static("trailers"));
        inbound.insert("authorization", HeaderValue::from_static("Bearer token"));

        let headers = outbound_headers(&request(inbound)).unwrap();
        for name in HOP_HEADERS {
            assert!(!headers.contains_key(name), "{name} was forwarded");
        }
        assert_eq!(headers.get("authorization").unwrap(), "Bearer token");
    }
}
