//! Executor lookup by data source type.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{BackendError, BackendResponse, QueryExecutor};
use crate::datasource::ResolvedDatasource;
use crate::query::model::QueryBatchRequest;

/// Routes a direct batch to the executor registered for its data source type.
///
/// Built once at startup and immutable afterwards.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn QueryExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `executor` for data sources of `type_name`, replacing any previous one.
    pub fn register(mut self, type_name: impl Into<String>, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executors.insert(type_name.into(), executor);
        self
    }

    pub fn supports(&self, type_name: &str) -> bool {
        self.executors.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl QueryExecutor for ExecutorRegistry {
    async fn execute(
        &self,
        datasource: &ResolvedDatasource,
        request: &QueryBatchRequest,
    ) -> Result<BackendResponse, BackendError> {
        let executor = self
            .executors
            .get(&datasource.type_name)
            .ok_or_else(|| BackendError::UnsupportedType(datasource.type_name.clone()))?;

        tracing::debug!(
            datasource_id = datasource.id,
            type_name = %datasource.type_name,
            queries = request.queries.len(),
            "Executing direct batch"
        );
        executor.execute(datasource, request).await
    }
}
