//! Built-in expression evaluator.
//!
//! # Responsibilities
//! - Run the data sub-queries of an expression batch, one backend call per data source
//! - Evaluate `__expr__` sub-queries over the results, in request order
//!
//! # Design Decisions
//! - Data sources are resolved here, per sub-query, because an expression batch may
//!   mix several of them
//! - A bad expression fails only its own sub-query
//! - A data source that cannot be resolved fails the whole call

use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::backend::{BackendError, BackendResponse, ExpressionEvaluator, QueryExecutor};
use crate::datasource::DatasourceCache;
use crate::query::model::{QueryBatchRequest, QueryResult, SubQueryError, SubQuerySpec, TimeSeries};

/// Reduction applied by a `reduce` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Mean,
    Sum,
    Min,
    Max,
    Last,
    Count,
}

impl FromStr for Reducer {
    type Err = SubQueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Reducer::Mean),
            "sum" => Ok(Reducer::Sum),
            "min" => Ok(Reducer::Min),
            "max" => Ok(Reducer::Max),
            "last" => Ok(Reducer::Last),
            "count" => Ok(Reducer::Count),
            other => Err(SubQueryError::expression(format!("unsupported reducer: {other}"))),
        }
    }
}

impl Reducer {
    /// Reduce values; `None` for an empty input except `Count`.
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return (self == Reducer::Count).then_some(0.0);
        }
        let value = match self {
            Reducer::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Reducer::Sum => values.iter().sum(),
            Reducer::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Reducer::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Reducer::Last => values[values.len() - 1],
            Reducer::Count => values.len() as f64,
        };
        Some(value)
    }
}

/// Evaluates expression batches using the shared cache and executors.
#[derive(Clone)]
pub struct ExpressionService {
    datasources: Arc<dyn DatasourceCache>,
    executor: Arc<dyn QueryExecutor>,
}

impl ExpressionService {
    pub fn new(datasources: Arc<dyn DatasourceCache>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { datasources, executor }
    }

    async fn run_data_queries(
        &self,
        request: &QueryBatchRequest,
        computed: &mut HashMap<String, QueryResult>,
    ) -> Result<(), BackendError> {
        // Group by data source, keeping first-appearance order.
        let mut groups: Vec<(i64, Vec<SubQuerySpec>)> = Vec::new();
        for query in request.queries.iter().filter(|q| !q.is_expression()) {
            match groups.iter_mut().find(|(id, _)| *id == query.datasource_id) {
                Some((_, queries)) => queries.push(query.clone()),
                None => groups.push((query.datasource_id, vec![query.clone()])),
            }
        }

        for (id, queries) in groups {
            let datasource = self
                .datasources
                .get_datasource(id, &request.principal, false)
                .await
                .map_err(|e| BackendError::Execution(format!("failed to resolve data source {id}: {e}")))?;

            let sub_request = QueryBatchRequest {
                time_range: request.time_range.clone(),
                debug: request.debug,
                principal: request.principal.clone(),
                queries: queries
                    .into_iter()
                    .map(|mut q| {
                        q.datasource = Some(datasource.clone());
                        q
                    })
                    .collect(),
            };

            let response = self.executor.execute(&datasource, &sub_request).await?;
            for result in response.results {
                computed.insert(result.ref_id.clone(), result);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ExpressionEvaluator for ExpressionService {
    async fn transform(&self, request: &QueryBatchRequest) -> Result<BackendResponse, BackendError> {
        let mut computed = HashMap::new();
        self.run_data_queries(request, &mut computed).await?;

        for query in request.queries.iter().filter(|q| q.is_expression()) {
            let result = evaluate(query, &computed);
            computed.insert(query.ref_id.clone(), result);
        }

        let results = request
            .queries
            .iter()
            .filter_map(|q| computed.remove(&q.ref_id))
            .collect();
        Ok(BackendResponse::new(results))
    }
}

fn evaluate(query: &SubQuerySpec, computed: &HashMap<String, QueryResult>) -> QueryResult {
    let result = QueryResult::new(query.ref_id.clone());
    let outcome = match query.model_str("type").unwrap_or_default() {
        "reduce" => reduce(query, computed),
        other => Err(SubQueryError::expression(format!(
            "unsupported expression type: {other:?}"
        ))),
    };
    match outcome {
        Ok(series) => result.with_series(series),
        Err(e) => result.with_error(e),
    }
}

fn reduce(query: &SubQuerySpec, computed: &HashMap<String, QueryResult>) -> Result<Vec<TimeSeries>, SubQueryError> {
    let input = query
        .model_str("expression")
        .map(|e| e.trim().trim_start_matches('$'))
        .filter(|e| !e.is_empty())
        .ok_or_else(|| SubQueryError::expression("reduce expression requires an input"))?;
    let reducer: Reducer = query.model_str("reducer").unwrap_or("mean").parse()?;

    let source = computed
        .get(input)
        .ok_or_else(|| SubQueryError::expression(format!("expression references unknown query: {input}")))?;
    if let Some(err) = &source.error {
        return Err(SubQueryError::expression(format!("input {input} failed: {err}")));
    }

    Ok(source
        .series
        .iter()
        .map(|series| {
            let values: Vec<f64> = series.points.iter().map(|p| p[0]).collect();
            let timestamp = series.points.last().map(|p| p[1]).unwrap_or_default();
            let points = reducer
                .apply(&values)
                .map(|v| vec![[v, timestamp]])
                .unwrap_or_default();
            TimeSeries {
                name: series.name.clone(),
                points,
                tags: series.tags.clone(),
            }
        })
        .collect())
}
