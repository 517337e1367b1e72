//! HTTP server lifecycle

use super::router;
use crate::error::{AppError, Result};
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};

/// API server manager
pub struct ApiServer {
    state: Arc<AppState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ApiServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            shutdown_tx: None,
        }
    }

    /// Bind the listener and serve in a background task
    pub async fn start(&mut self) -> Result<SocketAddr> {
        let config = &self.state.config;
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid address: {}", e)))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        info!("Starting {} API server on {}", config.product_name, local_addr);

        let app = router(self.state.clone()).into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("API server shutting down");
            });

            if let Err(e) = server.await {
                error!("API server error: {}", e);
            }
        });

        info!("=== Endpoints ===");
        info!("  GET  http://{}/health", local_addr);
        info!("  GET  http://{}/api/download?category=...&format=json|csv|xlsx|iqy", local_addr);
        info!("  GET  http://{}/api/download/categories", local_addr);
        info!("  GET  http://{}/api/templates/power-query?dashboard=...", local_addr);
        if config.features.action_tokens {
            info!("  POST http://{}/api/v1/authorize-action", local_addr);
        }

        Ok(local_addr)
    }

    /// Stop the server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            info!("API server stop signal sent");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::db::sqlite::SqliteDb;
    use crate::providers::fixture::FixtureProvider;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_start_serve_and_stop() {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let db = Arc::new(SqliteDb::new_in_memory().unwrap());
        let state = Arc::new(AppState::with_parts(config, db, Arc::new(FixtureProvider::new()), None));

        let mut server = ApiServer::new(state);
        assert!(!server.is_running());
        let addr = server.start().await.unwrap();
        assert!(server.is_running());

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));

        server.stop();
        assert!(!server.is_running());
    }
}
