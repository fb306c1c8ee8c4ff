//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::{router, AppState};
use crate::error::Result;

/// HTTP server for the download endpoint.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Handler state
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Bind the configured address and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;

        Self::serve_on(listener, self.state, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_on<F>(listener: TcpListener, state: AppState, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(addr = %addr, "Starting HTTP server with graceful shutdown");

        axum::serve(
            listener,
            router(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{DownloadService, MemoryDownloadLog};
    use crate::mail::LogMailer;
    use crate::ratelimit::{MemoryStateStore, RateLimiter};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn test_state() -> AppState {
        let limiter = Arc::new(RateLimiter::new(Arc::new(MemoryStateStore::new())));
        let service = DownloadService::new(
            limiter,
            Arc::new(MemoryDownloadLog::new()),
            Arc::new(LogMailer),
            "https://cdn.example.com/report.pdf",
        );
        AppState::new(Arc::new(service))
    }

    async fn post_download(addr: SocketAddr) -> String {
        let body = r#"{"email":"reader@example.com"}"#;
        let request = format!(
            "POST /api/download HTTP/1.1\r\n\
             Host: {addr}\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n{body}",
            body.len()
        );

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let _server = HttpServer::new(addr, test_state());
    }

    #[tokio::test]
    async fn test_serves_over_tcp_keyed_by_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(HttpServer::serve_on(listener, test_state(), async move {
            let _ = stop_rx.await;
        }));

        for _ in 0..3 {
            let response = post_download(addr).await;
            assert!(response.starts_with("HTTP/1.1 200"), "{response}");
            assert!(response.contains("downloadUrl"));
        }

        let response = post_download(addr).await;
        assert!(response.starts_with("HTTP/1.1 429"), "{response}");

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
