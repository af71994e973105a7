// CORS Middleware

use axum::http::{header, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

const ALLOWED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

/// Any origin, used when no origin list is configured
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION])
}

/// Restrict to the configured origins
pub fn cors_layer_with_origins(origins: &[String]) -> CorsLayer {
    let allow_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allow_origins))
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION])
}
