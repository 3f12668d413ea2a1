//! Data source subsystem.
//!
//! # Data Flow
//! ```text
//! Direct batch (first sub-query's datasourceId)
//!     → resolver.rs (single lookup, failure classification)
//!     → DatasourceCache trait (access control + caching)
//!     → cache.rs (provisioned implementation)
//!     → Arc<ResolvedDatasource> attached to every sub-query
//! ```
//!
//! # Design Decisions
//! - The cache is the only state shared between requests
//! - Other orgs' data sources look missing, not forbidden

pub mod cache;
pub mod resolver;
pub mod types;

pub use cache::ProvisionedDatasourceCache;
pub use resolver::DatasourceResolver;
pub use types::{DatasourceCache, DatasourceError, Principal, ResolvedDatasource};
