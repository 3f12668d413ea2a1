//! Query dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! MetricRequest (raw JSON batch)
//!     → normalize.rs (typed SubQuerySpecs, defaults, required fields)
//!     → router.rs (classify: expression vs direct)
//!         → expression: ExpressionEvaluator::transform
//!         → direct: DatasourceResolver (first sub-query) → QueryExecutor::execute
//!     → aggregate.rs (ResultMap, envelope message, batch status)
//!     → QueryBatchResponse → http::response
//! ```
//!
//! # Design Decisions
//! - Batch-level failures are `DispatchError`; per-sub-query failures stay in the envelope
//! - A direct batch resolves exactly one data source, from its first sub-query
//! - Nothing is shared between requests except the collaborators themselves

pub mod aggregate;
pub mod error;
pub mod model;
pub mod normalize;
pub mod router;
pub mod time_range;

pub use aggregate::aggregate;
pub use error::{DispatchError, ErrorClass};
pub use model::{
    ApiGeneration, BatchStatus, MetricRequest, QueryBatchRequest, QueryBatchResponse, QueryResult,
    ResultMap, SubQueryError, SubQuerySpec, TimeSeries,
};
pub use router::{DispatchContext, DispatchSettings, ExecutionRouter};
pub use time_range::TimeRange;
