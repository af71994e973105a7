// API Server Implementation

use crate::api::{config::ApiConfig, middleware, routes, state::AppState};
use anyhow::Result;
use axum::{
    middleware as axum_middleware,
    routing::{get, post, MethodRouter},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

/// The scan collection is reachable under both prefixes
const SCAN_PREFIXES: [&str; 2] = ["/scans", "/api/scans"];

/// API Server
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    /// Create server with the configured store and the default scan engine
    pub async fn new(config: ApiConfig) -> Result<Self> {
        let state = Arc::new(AppState::from_config(config).await?);
        Ok(Self { state })
    }

    /// Create server around existing state
    pub fn with_state(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Scan routes, each registered with and without the trailing slash
    fn scan_routes() -> Router<Arc<AppState>> {
        let scan_routes: [(&str, MethodRouter<Arc<AppState>>); 6] = [
            (
                "",
                get(routes::history::get_history).post(routes::scans::create_scan),
            ),
            (
                "/:id",
                get(routes::scans::get_scan_status).delete(routes::scans::delete_scan),
            ),
            ("/:id/cancel", post(routes::scans::cancel_scan)),
            ("/:id/report", get(routes::scans::get_scan_report)),
            ("/:id/download", get(routes::scans::download_report)),
            ("/:id/stream", get(routes::scans::stream_scan)),
        ];

        let mut router = Router::new();
        for prefix in SCAN_PREFIXES {
            for (path, handler) in &scan_routes {
                router = router
                    .route(&format!("{}{}", prefix, path), handler.clone())
                    .route(&format!("{}{}/", prefix, path), handler.clone());
            }
        }
        router
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        let config = self.state.config.clone();

        let cors = if config.cors_origins.is_empty() {
            middleware::cors_layer()
        } else {
            middleware::cors_layer_with_origins(&config.cors_origins)
        };

        let mut router = Self::scan_routes();
        for path in middleware::HEALTH_PATHS {
            router = router.route(path, get(routes::health::health_check));
        }

        let router = router
            // Add authentication middleware
            .layer(axum_middleware::from_fn_with_state(
                config.clone(),
                middleware::authenticate,
            ))
            .layer(RequestBodyLimitLayer::new(config.max_body_size));

        let router = if config.enable_cors {
            router.layer(cors)
        } else {
            router
        };

        router
            // Add compression
            .layer(CompressionLayer::new())
            // Add logging
            .layer(middleware::logging_layer())
            // Add shared state
            .with_state(self.state.clone())
    }

    /// Run the server until ctrl-c
    pub async fn run(self) -> Result<()> {
        self.state.start_scheduler().await?;

        let app = self.build_router();

        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!("VulnScan API server listening on {}", addr);
        info!("Health check endpoint: http://{}/health", addr);

        let scheduler = self.state.scheduler.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutdown requested");
            })
            .await?;

        scheduler.shutdown()?;
        Ok(())
    }

    /// Get the application state
    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }
}
