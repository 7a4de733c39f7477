//! HTTP server lifecycle.
//!
//! Binds the configured address, spawns `axum::serve` on the tokio runtime
//! and hands back a handle whose shutdown channel stops it gracefully.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::api::router::api_router;
use crate::core_state::CoreState;

/// Handle to a running API server.
pub struct ApiServer {
    pub addr: SocketAddr,
    pub started_at: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ApiServer {
    /// Signal the server to stop accepting connections.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!(addr = %self.addr, "API server shutdown requested");
        }
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start the API server on the configured `bindAddr`.
pub async fn start_api_server(core: Arc<CoreState>) -> Result<ApiServer, String> {
    let addr = core
        .config()
        .socket_addr()
        .map_err(|e| format!("Invalid bind address: {e}"))?;
    start_api_server_on(core, addr).await
}

/// Start the API server on a specific address. Port 0 picks an ephemeral port.
pub async fn start_api_server_on(core: Arc<CoreState>, addr: SocketAddr) -> Result<ApiServer, String> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind API server on {addr}: {e}"))?;

    let addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get server address: {e}"))?;

    let app = api_router(core);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }

        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        addr,
        started_at: chrono::Local::now().to_rfc3339(),
        shutdown_tx: Some(shutdown_tx),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::test_support::test_core;

    fn loopback() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[tokio::test]
    async fn start_serves_health_and_stops() {
        let (_dir, core) = test_core();
        let mut server = start_api_server_on(Arc::new(core), loopback())
            .await
            .expect("server should start");
        assert!(server.addr.port() > 0);
        assert!(!server.started_at.is_empty());

        let mut stream = tokio::net::TcpStream::connect(server.addr).await.unwrap();
        stream
            .write_all(b"GET /api/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
        assert!(response.contains("\"status\":\"ok\""));

        server.shutdown();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (_dir, core) = test_core();
        let mut server = start_api_server_on(Arc::new(core), loopback())
            .await
            .expect("server should start");

        server.shutdown();
        server.shutdown();
    }

    #[tokio::test]
    async fn occupied_address_fails_to_bind() {
        let (_dir, core) = test_core();
        let core = Arc::new(core);
        let first = start_api_server_on(core.clone(), loopback()).await.unwrap();
        let err = start_api_server_on(core, first.addr).await.err().unwrap();
        assert!(err.contains("Failed to bind"));
    }
}
