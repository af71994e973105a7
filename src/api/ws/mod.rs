// WebSocket Module

pub mod progress;

pub use progress::scan_websocket_handler;
