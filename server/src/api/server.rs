//! API server initialization

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::auth::{AuthState, require_auth};
use super::middleware;
use super::routes::{ReportsApiState, health, reports, schema, values};
use crate::core::ServerConfig;
use crate::core::ShutdownService;
use crate::core::constants::DEFAULT_BODY_LIMIT;

/// Build the full router. Everything except `/api/health` requires a
/// bearer token.
pub fn build_router(state: ReportsApiState, auth: AuthState) -> Router {
    let protected = Router::new()
        .route("/schema", get(schema::list_schema))
        .route("/reports/execute", post(reports::execute))
        .route("/reports/status", get(reports::status))
        .route("/reports/download", get(reports::download))
        .route("/filters/values", post(values::dimension_values))
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(auth, require_auth));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/api", protected)
        .fallback(middleware::handle_404)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::cors())
                .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT)),
        )
}

pub struct ApiServer {
    router: Router,
    addr: SocketAddr,
}

impl ApiServer {
    pub fn new(config: &ServerConfig, router: Router) -> Result<Self> {
        let addr = SocketAddr::new(
            config
                .host
                .parse()
                .with_context(|| format!("Invalid server host: {}", config.host))?,
            config.port,
        );
        Ok(Self { router, addr })
    }

    /// Serve until shutdown is triggered
    pub async fn start(self, shutdown: &ShutdownService) -> Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.addr))?;
        tracing::info!(addr = %self.addr, "API server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;
        Ok(())
    }
}
