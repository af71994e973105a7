// Repositories Module
// SQL implementations of the store traits

pub mod scan_repository;

pub use scan_repository::SqlScanStore;
