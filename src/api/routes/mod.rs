// API Routes Module

pub mod health;
pub mod history;
pub mod scans;
