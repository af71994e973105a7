// Authentication Middleware
//
// Users authenticate in front of this service; the identity proxy forwards
// the user id in a header. Automation clients may instead present a static
// API key from the config, which maps to an owner id.

use crate::api::{config::ApiConfig, models::error::ApiError};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Header carrying a static API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Health check paths, served and exempt from authentication
pub const HEALTH_PATHS: [&str; 4] = ["/health", "/health/", "/api/health", "/api/health/"];

/// Caller identity inserted into request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub owner: String,
}

/// Authentication middleware
pub async fn authenticate(
    State(config): State<Arc<ApiConfig>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if HEALTH_PATHS.contains(&req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let identity = resolve_identity(&config, &req)?;
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

fn header_value<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// An API key wins over the identity header; a present but unknown key is rejected
fn resolve_identity(config: &ApiConfig, req: &Request) -> Result<Identity, ApiError> {
    if let Some(key) = header_value(req, API_KEY_HEADER) {
        let owner = config
            .owner_for_key(key)
            .ok_or_else(|| ApiError::Unauthorized("Invalid API key".to_string()))?;
        return Ok(Identity {
            owner: owner.to_string(),
        });
    }

    header_value(req, &config.identity_header)
        .map(|owner| Identity {
            owner: owner.to_string(),
        })
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))
}
