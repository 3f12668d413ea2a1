//! Metrics query dispatch service.

pub mod backend;
pub mod config;
pub mod datasource;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod query;

pub use config::schema::DispatchConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
