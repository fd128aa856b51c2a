use crate::error::{ApiError, Error};
use crate::proxy::Proxy;
use crate::request::Request;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, DefaultBodyLimit, State};
use axum::response::{IntoResponse, Response as AxumResponse};
use http::{HeaderMap, Method, Uri};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use uuid::Uuid;
use vcmd_vehicle::AccountResolver;

/// Serves a [`Proxy`] over HTTP.
pub struct HttpProxyServer<R>
where
    R: AccountResolver,
{
    listen_addr: SocketAddr,
    local_addr: Mutex<Option<SocketAddr>>,
    proxy: Arc<Proxy<R>>,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl<R> HttpProxyServer<R>
where
    R: AccountResolver,
{
    /// Creates a server that will listen on `listen_addr`.
    #[must_use]
    pub fn new(listen_addr: SocketAddr, proxy: Proxy<R>) -> Self {
        Self {
            listen_addr,
            local_addr: Mutex::new(None),
            proxy: Arc::new(proxy),
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    /// The proxy being served.
    #[must_use]
    pub const fn proxy(&self) -> &Arc<Proxy<R>> {
        &self.proxy
    }

    /// The address actually bound, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Binds the listener and starts serving in the background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] on a second call, or [`Error::Io`]
    /// if the listener cannot be bound.
    pub async fn start(&self) -> Result<JoinHandle<()>, Error> {
        if self.task_tracker.is_closed() {
            return Err(Error::AlreadyStarted);
        }

        let app = Router::new()
            .fallback(handle_request::<R>)
            .layer(DefaultBodyLimit::disable())
            .with_state(self.proxy.clone());

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| {
                error!("failed to bind HTTP listener: {}", e);
                Error::Io("failed to bind HTTP listener", e)
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Io("failed to read bound address", e))?;
        *self.local_addr.lock() = Some(local_addr);

        info!("vehicle command proxy listening on http://{}", local_addr);

        let shutdown_token = self.shutdown_token.clone();
        let handle = self.task_tracker.spawn(async move {
            let served = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_token.cancelled_owned())
            .await;

            if let Err(e) = served {
                error!("HTTP server error: {}", e);
            }
        });

        self.task_tracker.close();

        Ok(handle)
    }

    /// Stops accepting requests and waits for in-flight ones to finish.
    pub async fn shutdown(&self) {
        info!("vehicle command proxy shutting down...");

        self.shutdown_token.cancel();
        self.task_tracker.wait().await;

        info!("vehicle command proxy shutdown");
    }
}

async fn handle_request<R>(
    State(proxy): State<Arc<Proxy<R>>>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> AxumResponse
where
    R: AccountResolver,
{
    let limit = proxy.config().body_read_limit();
    let body = match axum::body::to_bytes(body, limit).await {
        Ok(body) => body,
        Err(e) => {
            warn!(%method, path = %uri.path(), "rejected request body: {}", e);
            let description = format!("request body unreadable or over {limit} bytes");
            return ApiError::BadRequest(description).into_response();
        }
    };

    proxy
        .handle(Request {
            id: Uuid::new_v4(),
            body,
            client_addr,
            headers,
            method,
            uri,
        })
        .await
}
