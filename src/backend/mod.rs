//! Backend collaborators.
//!
//! # Data Flow
//! ```text
//! Direct batch:
//!     router → QueryExecutor (registry.rs picks by data source type)
//!            → testdata.rs (or any registered executor)
//!
//! Expression batch:
//!     router → ExpressionEvaluator (expression.rs)
//!            → resolves each referenced data source itself
//!            → QueryExecutor for the data sub-queries
//!            → evaluates expression sub-queries over their results
//! ```
//!
//! # Design Decisions
//! - Executors return one QueryResult per sub-query; a failing sub-query is a
//!   result with an error, not an Err
//! - Err is reserved for failures of the whole call
//! - Cancellation is by drop: the router races the call against a deadline

pub mod expression;
pub mod registry;
pub mod testdata;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::datasource::ResolvedDatasource;
use crate::query::model::{QueryBatchRequest, QueryResult};

pub use expression::ExpressionService;
pub use registry::ExecutorRegistry;
pub use testdata::{Scenario, ScenarioRegistry, TestDataExecutor};

/// Failure of an entire backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("could not find executor for data source type: {0}")]
    UnsupportedType(String),

    #[error("backend request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Execution(String),
}

/// Per-sub-query results of one backend call, in sub-query order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendResponse {
    pub results: Vec<QueryResult>,
}

impl BackendResponse {
    pub fn new(results: Vec<QueryResult>) -> Self {
        Self { results }
    }
}

/// Executes a direct batch against one data source.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        datasource: &ResolvedDatasource,
        request: &QueryBatchRequest,
    ) -> Result<BackendResponse, BackendError>;
}

/// Evaluates a batch that contains expression sub-queries.
#[async_trait]
pub trait ExpressionEvaluator: Send + Sync {
    async fn transform(&self, request: &QueryBatchRequest) -> Result<BackendResponse, BackendError>;
}
