//! HTTP server hosting the gate in front of the protected routes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{GatekeeperError, Result};
use crate::gate::{enforce, Gate};
use crate::store::CounterStore;

/// Build the router with every route behind the rate-limiting gate.
pub fn router<S>(gate: Arc<Gate<S>>) -> Router
where
    S: CounterStore + 'static,
{
    Router::new()
        .route("/", get(hello))
        .layer(middleware::from_fn_with_state(gate, enforce::<S>))
}

async fn hello() -> &'static str {
    "Hello, World!"
}

/// HTTP server for the rate-limited service.
pub struct HttpServer<S: CounterStore + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The gate guarding every route
    gate: Arc<Gate<S>>,
}

impl<S: CounterStore + 'static> HttpServer<S> {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, gate: Arc<Gate<S>>) -> Self {
        Self { addr, gate }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_on(listener, signal).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Starting HTTP server with graceful shutdown");

        let app = router(self.gate).into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                GatekeeperError::Server(e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::TierLimits;
    use crate::ratelimit::RateLimiter;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn test_gate() -> Arc<Gate<MemoryStore>> {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        let limits = TierLimits {
            anonymous: 1,
            credentialed: 2,
            window: Duration::from_secs(60),
        };
        Arc::new(Gate::new(limiter, limits))
    }

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let _server = HttpServer::new(addr, test_gate());
    }

    #[tokio::test]
    async fn test_serve_on_tcp_with_peer_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let server = HttpServer::new(addr, test_gate());
        let handle = tokio::spawn(server.serve_on(listener, async move {
            rx.await.ok();
        }));

        let first = raw_get(addr).await;
        let second = raw_get(addr).await;
        assert!(first.starts_with("HTTP/1.1 200"), "got: {}", first);
        assert!(first.ends_with("Hello, World!"));
        assert!(second.starts_with("HTTP/1.1 429"), "got: {}", second);

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    async fn raw_get(addr: SocketAddr) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }
}
