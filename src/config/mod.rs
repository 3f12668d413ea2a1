//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DispatchConfig (validated, immutable)
//!     → shared via ArcSwap with request handlers
//!
//! On file change:
//!     watcher.rs coalesces the burst of file events
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → watcher.rs drops it if identical to the last one sent
//!     → HttpServer reconciles (restart-only settings pinned) and swaps the snapshot
//!     → next request observes new feature toggles and timeouts
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::DispatchConfig;
pub use schema::DatasourceConfig;
pub use schema::FeatureConfig;
pub use schema::ListenerConfig;
pub use schema::LogFormat;
pub use schema::ObservabilityConfig;
pub use schema::TimeoutConfig;
