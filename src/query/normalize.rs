//! Sub-query normalization.
//!
//! # Responsibilities
//! - Turn each raw parameter object into a typed SubQuerySpec
//! - Apply defaults from one field schema table
//! - Reject the whole batch when a required field is missing
//!
//! # Design Decisions
//! - Every field is looked up exactly once, here; nothing downstream reads the raw
//!   object for dispatch decisions
//! - A value of the wrong JSON type counts as absent
//! - Omitted ref ids all default to "A" and are allowed to collide

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::query::error::DispatchError;
use crate::query::model::{
    ApiGeneration, SubQuerySpec, DEFAULT_INTERVAL_MS, DEFAULT_MAX_DATA_POINTS, DEFAULT_REF_ID,
};

/// Expected JSON type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Str,
    Int,
}

/// What to do when a field is absent or mistyped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldDefault {
    Str(&'static str),
    Int(i64),
    /// Leave unset.
    Absent,
    /// Abort the batch.
    Required,
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    kind: FieldKind,
    default: FieldDefault,
}

const REF_ID: &str = "refId";
const MAX_DATA_POINTS: &str = "maxDataPoints";
const INTERVAL_MS: &str = "intervalMs";
const QUERY_TYPE: &str = "queryType";
const DATASOURCE: &str = "datasource";
const DATASOURCE_ID: &str = "datasourceId";

const SUB_QUERY_SCHEMA: &[FieldSpec] = &[
    FieldSpec { name: REF_ID, kind: FieldKind::Str, default: FieldDefault::Str(DEFAULT_REF_ID) },
    FieldSpec { name: MAX_DATA_POINTS, kind: FieldKind::Int, default: FieldDefault::Int(DEFAULT_MAX_DATA_POINTS) },
    FieldSpec { name: INTERVAL_MS, kind: FieldKind::Int, default: FieldDefault::Int(DEFAULT_INTERVAL_MS) },
    FieldSpec { name: QUERY_TYPE, kind: FieldKind::Str, default: FieldDefault::Absent },
    FieldSpec { name: DATASOURCE, kind: FieldKind::Str, default: FieldDefault::Absent },
    FieldSpec { name: DATASOURCE_ID, kind: FieldKind::Int, default: FieldDefault::Required },
];

#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Str(String),
    Int(i64),
}

/// Field values extracted according to the schema.
struct Fields(HashMap<&'static str, FieldValue>);

impl Fields {
    fn extract(raw: &Map<String, Value>) -> Result<Self, &'static str> {
        let mut values = HashMap::with_capacity(SUB_QUERY_SCHEMA.len());
        for field in SUB_QUERY_SCHEMA {
            let found = raw.get(field.name).and_then(|v| match field.kind {
                FieldKind::Str => v.as_str().map(|s| FieldValue::Str(s.to_string())),
                FieldKind::Int => v.as_i64().map(FieldValue::Int),
            });
            let value = match (found, field.default) {
                (Some(v), _) => Some(v),
                (None, FieldDefault::Str(s)) => Some(FieldValue::Str(s.to_string())),
                (None, FieldDefault::Int(i)) => Some(FieldValue::Int(i)),
                (None, FieldDefault::Absent) => None,
                (None, FieldDefault::Required) => return Err(field.name),
            };
            if let Some(value) = value {
                values.insert(field.name, value);
            }
        }
        Ok(Self(values))
    }

    fn take_str(&mut self, name: &str) -> Option<String> {
        match self.0.remove(name) {
            Some(FieldValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    fn take_int(&mut self, name: &str) -> Option<i64> {
        match self.0.remove(name) {
            Some(FieldValue::Int(i)) => Some(i),
            _ => None,
        }
    }
}

/// Normalize one raw sub-query.
pub fn normalize_sub_query(
    raw: &Map<String, Value>,
    index: usize,
    generation: ApiGeneration,
) -> Result<SubQuerySpec, DispatchError> {
    let mut fields = Fields::extract(raw).map_err(|field| {
        tracing::debug!(index, field, "Can't process query since it's missing a required field");
        DispatchError::MissingDatasourceId {
            message: generation.missing_datasource_message(),
            index,
        }
    })?;

    Ok(SubQuerySpec {
        ref_id: fields.take_str(REF_ID).unwrap_or_else(|| DEFAULT_REF_ID.to_string()),
        max_data_points: fields.take_int(MAX_DATA_POINTS).unwrap_or(DEFAULT_MAX_DATA_POINTS),
        interval_ms: fields.take_int(INTERVAL_MS).unwrap_or(DEFAULT_INTERVAL_MS),
        query_type: fields.take_str(QUERY_TYPE).filter(|t| !t.is_empty()),
        datasource_name: fields.take_str(DATASOURCE),
        datasource_id: fields.take_int(DATASOURCE_ID).unwrap_or_default(),
        model: Value::Object(raw.clone()),
        datasource: None,
    })
}

/// Normalize a whole batch, in request order.
///
/// No sub-query is returned unless every one of them is valid.
pub fn normalize_batch(
    raw_queries: &[Map<String, Value>],
    generation: ApiGeneration,
) -> Result<Vec<SubQuerySpec>, DispatchError> {
    if raw_queries.is_empty() {
        return Err(DispatchError::EmptyBatch);
    }

    raw_queries
        .iter()
        .enumerate()
        .map(|(index, raw)| normalize_sub_query(raw, index, generation))
        .collect()
}
