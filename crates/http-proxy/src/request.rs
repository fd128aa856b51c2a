//! HTTP proxy request types.

use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use uuid::Uuid;

/// A request to the HTTP proxy.
#[derive(Clone, Debug)]
pub struct Request {
    /// The request ID for correlation.
    pub id: Uuid,

    /// The body of the request.
    pub body: Bytes,

    /// Address of the peer that sent the request.
    pub client_addr: SocketAddr,

    /// The headers of the request.
    pub headers: HeaderMap,

    /// The method of the request.
    pub method: Method,

    /// The request target as received.
    pub uri: Uri,
}

impl Request {
    /// Path and query, as forwarded to the cloud relay.
    #[must_use]
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map_or_else(|| self.uri.path(), |pq| pq.as_str())
    }
}
