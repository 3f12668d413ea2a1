//! Request-scoped query types.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::datasource::{Principal, ResolvedDatasource};
use crate::query::time_range::TimeRange;

/// Reference id assigned when a sub-query omits `refId`.
pub const DEFAULT_REF_ID: &str = "A";
pub const DEFAULT_MAX_DATA_POINTS: i64 = 100;
pub const DEFAULT_INTERVAL_MS: i64 = 1000;

/// Data source name that routes a batch to the expression engine.
pub const EXPRESSION_DATASOURCE_NAME: &str = "__expr__";

/// Which HTTP API generation accepted the batch.
///
/// The generations share dispatch semantics but differ in batching rules and in the
/// wording of their error messages, which existing callers match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiGeneration {
    /// `POST /api/tsdb/query`: direct batches only, buffered response.
    Legacy,
    /// `POST /api/ds/query`: direct or expression batches, streamed response.
    Current,
}

impl ApiGeneration {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiGeneration::Legacy => "legacy",
            ApiGeneration::Current => "current",
        }
    }

    pub fn missing_datasource_message(self) -> &'static str {
        match self {
            ApiGeneration::Legacy => "Query missing datasourceId",
            ApiGeneration::Current => "Query missing data source ID",
        }
    }

    pub fn access_denied_message(self) -> &'static str {
        match self {
            ApiGeneration::Legacy => "Access denied to datasource",
            ApiGeneration::Current => "Access denied to data source",
        }
    }

    pub fn invalid_datasource_message(self) -> &'static str {
        match self {
            ApiGeneration::Legacy => "Invalid datasource ID",
            ApiGeneration::Current => "Invalid data source ID",
        }
    }

    pub fn datasource_unavailable_message(self) -> &'static str {
        match self {
            ApiGeneration::Legacy => "Unable to load datasource meta data",
            ApiGeneration::Current => "Unable to load data source metadata",
        }
    }
}

/// Wire shape of a batch as posted by callers.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRequest {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub queries: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub debug: bool,
}

/// A normalized, typed batch.
#[derive(Debug, Clone)]
pub struct QueryBatchRequest {
    pub time_range: TimeRange,
    pub debug: bool,
    pub principal: Principal,
    pub queries: Vec<SubQuerySpec>,
}

/// One normalized sub-query.
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuerySpec {
    pub ref_id: String,
    pub max_data_points: i64,
    pub interval_ms: i64,
    pub query_type: Option<String>,
    /// Declared data source name, used only to detect expression batches.
    pub datasource_name: Option<String>,
    pub datasource_id: i64,
    /// The raw parameter object, passed through to backends untouched.
    pub model: serde_json::Value,
    /// Attached after resolution on the direct path.
    pub datasource: Option<Arc<ResolvedDatasource>>,
}

impl SubQuerySpec {
    /// True when this sub-query targets the expression engine.
    pub fn is_expression(&self) -> bool {
        self.datasource_name.as_deref() == Some(EXPRESSION_DATASOURCE_NAME)
    }

    /// Read a string field from the opaque model.
    pub fn model_str(&self, field: &str) -> Option<&str> {
        self.model.get(field).and_then(|v| v.as_str())
    }

    /// Read an integer field from the opaque model.
    pub fn model_i64(&self, field: &str) -> Option<i64> {
        self.model.get(field).and_then(|v| v.as_i64())
    }
}

/// One named series of `[value, timestamp_ms]` points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl TimeSeries {
    pub fn new(name: impl Into<String>, points: Vec<[f64; 2]>) -> Self {
        Self {
            name: name.into(),
            points,
            tags: BTreeMap::new(),
        }
    }
}

/// Category of a per-sub-query failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubQueryErrorKind {
    /// The backend rejected or failed this one query.
    Query,
    /// An expression could not be evaluated.
    Expression,
}

/// A failure confined to one sub-query; it never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SubQueryError {
    pub kind: SubQueryErrorKind,
    pub message: String,
}

impl SubQueryError {
    pub fn query(message: impl Into<String>) -> Self {
        Self {
            kind: SubQueryErrorKind::Query,
            message: message.into(),
        }
    }

    pub fn expression(message: impl Into<String>) -> Self {
        Self {
            kind: SubQueryErrorKind::Expression,
            message: message.into(),
        }
    }
}

/// Outcome of one sub-query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub ref_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<TimeSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    #[serde(skip)]
    pub error: Option<SubQueryError>,
    /// Wire form of `error`, filled in by the aggregator.
    #[serde(rename = "error", skip_serializing_if = "Option::is_none")]
    pub error_string: Option<String>,
}

impl QueryResult {
    pub fn new(ref_id: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            series: Vec::new(),
            meta: None,
            error: None,
            error_string: None,
        }
    }

    pub fn with_series(mut self, series: Vec<TimeSeries>) -> Self {
        self.series = series;
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_error(mut self, error: SubQueryError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Reference id → result, in insertion order.
///
/// Inserting an existing ref id replaces the earlier result in its original position,
/// so colliding default ids keep only the last result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultMap {
    entries: Vec<(String, QueryResult)>,
}

impl ResultMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, result: QueryResult) {
        match self.entries.iter_mut().find(|(k, _)| *k == result.ref_id) {
            Some(slot) => slot.1 = result,
            None => self.entries.push((result.ref_id.clone(), result)),
        }
    }

    pub fn get(&self, ref_id: &str) -> Option<&QueryResult> {
        self.entries.iter().find(|(k, _)| k == ref_id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryResult)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl IntoIterator for ResultMap {
    type Item = (String, QueryResult);
    type IntoIter = std::vec::IntoIter<(String, QueryResult)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for ResultMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Overall batch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchStatus {
    #[default]
    Ok,
    /// At least one sub-query failed.
    BadRequest,
}

impl BatchStatus {
    pub fn as_u16(self) -> u16 {
        match self {
            BatchStatus::Ok => 200,
            BatchStatus::BadRequest => 400,
        }
    }
}

/// The response envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryBatchResponse {
    pub results: ResultMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    pub status: BatchStatus,
}
