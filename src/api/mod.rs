// API Module - REST API Server for VulnScan

pub mod config;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;
pub mod ws;

// Re-export commonly used types
pub use config::ApiConfig;
pub use server::ApiServer;
pub use state::AppState;
