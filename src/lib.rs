pub mod config;
pub mod error;
pub mod exporter;
pub mod package_manager;
pub mod server;
