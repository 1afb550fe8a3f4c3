//! HTTP server for the IndieAuth endpoints.

pub mod consent;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;

use crate::engine::Engine;

pub use handlers::{HttpState, create_router};

/// IndieAuth server wrapping a shared [`Engine`].
#[derive(Debug, Clone)]
pub struct AuthServer {
    engine: Arc<Engine>,
}

impl AuthServer {
    /// Create a new server.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self { engine: Arc::new(engine) }
    }

    /// Router with all endpoints mounted.
    #[must_use]
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.engine))
    }

    /// Serve HTTP on `addr` until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound or the server fails.
    pub async fn run_http(self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.router()).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
