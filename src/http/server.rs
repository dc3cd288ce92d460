//! HTTP Server
//!
//! Axum server with CORS, request tracing, and graceful shutdown.

use axum::{
    http::{header, Method},
    Router,
};
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::http::api::api_router;
use crate::http::state::AppState;

/// Agent HTTP server
pub struct AgentServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl AgentServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Build the router with all routes and middleware
    pub fn build_router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]);

        let mut router = api_router(self.state.clone()).layer(cors);

        if self.config.log_requests {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Start the server and run until shutdown signal
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.socket_addr();
        let router = self.build_router();

        if self.config.is_localhost() {
            info!("Starting agent server on {}", addr);
        } else {
            warn!("Agent server bound to {} - /test launches browser sessions for any caller", addr);
        }

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Agent server shut down gracefully");
        Ok(())
    }

    /// Get the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
