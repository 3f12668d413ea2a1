//! Data source types and error definitions.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// The caller a batch is executed on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    pub user_id: i64,
    pub org_id: i64,
    pub login: String,
}

impl Principal {
    /// Principal used when no identity headers are present.
    pub fn anonymous() -> Self {
        Self {
            user_id: 0,
            org_id: 1,
            login: "anonymous".to_string(),
        }
    }
}

impl Default for Principal {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// A data source the caller is allowed to query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDatasource {
    pub id: i64,
    pub uid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub org_id: i64,
    pub json_data: serde_json::Value,
}

/// Errors a data source cache can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasourceError {
    /// The data source exists but the principal may not use it.
    #[error("data source access denied")]
    AccessDenied,

    /// No data source with this id is visible to the principal.
    #[error("data source not found")]
    NotFound,

    /// Lookup failed for another reason (store unavailable, corrupt record, ...).
    #[error("data source lookup failed: {0}")]
    Unavailable(String),
}

/// Access-controlled data source lookup.
///
/// Implementations own locking and invalidation; callers only read.
#[async_trait]
pub trait DatasourceCache: Send + Sync {
    async fn get_datasource(
        &self,
        id: i64,
        principal: &Principal,
        skip_cache: bool,
    ) -> Result<Arc<ResolvedDatasource>, DatasourceError>;
}
