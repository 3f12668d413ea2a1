//! Data source resolution for direct batches.
//!
//! # Responsibilities
//! - Look up one data source through the cache collaborator
//! - Classify lookup failures into client (403 / 400) and server (500) errors
//!
//! # Design Decisions
//! - The resolver never retries; the cache decides what a transient failure means
//! - The original cause is kept as the error source for logging

use std::sync::Arc;

use crate::datasource::types::{DatasourceCache, DatasourceError, Principal, ResolvedDatasource};
use crate::query::error::DispatchError;
use crate::query::model::ApiGeneration;

/// Resolves data source ids on behalf of a principal.
#[derive(Clone)]
pub struct DatasourceResolver {
    cache: Arc<dyn DatasourceCache>,
}

impl DatasourceResolver {
    pub fn new(cache: Arc<dyn DatasourceCache>) -> Self {
        Self { cache }
    }

    /// Resolve `id`, mapping failures to dispatch errors for the given API generation.
    pub async fn resolve(
        &self,
        id: i64,
        principal: &Principal,
        skip_cache: bool,
        generation: ApiGeneration,
    ) -> Result<Arc<ResolvedDatasource>, DispatchError> {
        self.cache
            .get_datasource(id, principal, skip_cache)
            .await
            .map_err(|err| {
                tracing::debug!(error = %err, id, user_id = principal.user_id, "Encountered error getting data source");
                classify(err, generation)
            })
    }
}

/// Map a cache failure onto the dispatch error taxonomy.
pub fn classify(err: DatasourceError, generation: ApiGeneration) -> DispatchError {
    match err {
        DatasourceError::AccessDenied => DispatchError::AccessDenied {
            message: generation.access_denied_message(),
            source: err,
        },
        DatasourceError::NotFound => DispatchError::DatasourceNotFound {
            message: generation.invalid_datasource_message(),
            source: err,
        },
        DatasourceError::Unavailable(_) => DispatchError::DatasourceUnavailable {
            message: generation.datasource_unavailable_message(),
            source: err,
        },
    }
}
