//! HTTP server wrapper around the gateway router

use crate::{handlers, AppState};
use aiops_common::{Error, Result};
use axum::Router;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// HTTP server for the incident gateway
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Run the server on the specified address
    pub async fn run(&self, bind_addr: &str) -> Result<()> {
        let app = self.create_app();

        info!(address = bind_addr, "starting gateway server");

        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .map_err(|e| Error::Network(format!("Failed to bind to {bind_addr}: {e}")))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(format!("Server error: {e}")))?;

        Ok(())
    }

    fn create_app(&self) -> Router {
        handlers::create_router(self.state.clone()).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
    }
}
