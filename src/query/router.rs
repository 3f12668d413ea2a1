//! Execution routing.
//!
//! # States
//! - Unclassified: batch received, nothing decided
//! - ExpressionPath: handed to the expression evaluator
//! - DirectPath: data source resolved, handed to the executor
//! - Completed / Failed: terminal
//!
//! # State Transitions
//! ```text
//! Unclassified → ExpressionPath: any sub-query names __expr__ and expressions are enabled
//! Unclassified → DirectPath:     otherwise, after the first sub-query's data source resolves
//! Unclassified → Failed:         validation, disabled feature, or resolution failure
//! *Path → Completed:             backend returned, results aggregated
//! *Path → Failed:                backend call failed or timed out
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{BackendError, BackendResponse, ExpressionEvaluator, QueryExecutor};
use crate::config::DispatchConfig;
use crate::datasource::{DatasourceCache, DatasourceResolver, Principal};
use crate::observability::metrics;
use crate::query::aggregate::aggregate;
use crate::query::error::DispatchError;
use crate::query::model::{ApiGeneration, MetricRequest, QueryBatchRequest, QueryBatchResponse, SubQuerySpec};
use crate::query::normalize::normalize_batch;
use crate::query::time_range::TimeRange;

/// Position of a batch in the routing state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Unclassified,
    ExpressionPath,
    DirectPath,
    Completed,
    Failed,
}

impl RouteState {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteState::Unclassified => "unclassified",
            RouteState::ExpressionPath => "expression",
            RouteState::DirectPath => "direct",
            RouteState::Completed => "completed",
            RouteState::Failed => "failed",
        }
    }

    pub fn can_transition_to(self, next: RouteState) -> bool {
        use RouteState::*;
        matches!(
            (self, next),
            (Unclassified, ExpressionPath | DirectPath | Failed)
                | (ExpressionPath | DirectPath, Completed | Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RouteState::Completed | RouteState::Failed)
    }
}

/// Tracks one batch through the state machine and reports its outcome.
#[derive(Debug)]
pub struct RouteTracker {
    state: RouteState,
    path: RouteState,
}

impl RouteTracker {
    pub fn new() -> Self {
        Self {
            state: RouteState::Unclassified,
            path: RouteState::Unclassified,
        }
    }

    pub fn state(&self) -> RouteState {
        self.state
    }

    /// Move to `next`. Returns false, leaving the state unchanged, if the move is invalid.
    pub fn advance(&mut self, next: RouteState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = ?self.state, to = ?next, "Invalid route transition ignored");
            return false;
        }
        tracing::debug!(from = ?self.state, to = ?next, "Route transition");

        if next.is_terminal() {
            metrics::record_batch(self.path.as_str(), next.as_str());
        } else {
            self.path = next;
        }
        self.state = next;
        true
    }
}

impl Default for RouteTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Which collaborator a batch needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Direct,
    Expression,
}

/// Classify a normalized batch. Legacy batches are always direct.
pub fn classify(queries: &[SubQuerySpec], generation: ApiGeneration) -> BatchKind {
    match generation {
        ApiGeneration::Legacy => BatchKind::Direct,
        ApiGeneration::Current if queries.iter().any(SubQuerySpec::is_expression) => BatchKind::Expression,
        ApiGeneration::Current => BatchKind::Direct,
    }
}

/// Per-request knobs, read from one config snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub expressions_enabled: bool,
    pub backend_timeout: Duration,
}

impl DispatchSettings {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            expressions_enabled: config.features.expressions_enabled,
            backend_timeout: Duration::from_secs(config.timeouts.backend_secs),
        }
    }
}

/// Who the batch runs for.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub principal: Principal,
    pub skip_cache: bool,
    pub generation: ApiGeneration,
}

/// Selects and invokes the backend for a batch, then aggregates its results.
#[derive(Clone)]
pub struct ExecutionRouter {
    resolver: DatasourceResolver,
    executor: Arc<dyn QueryExecutor>,
    expressions: Arc<dyn ExpressionEvaluator>,
}

impl ExecutionRouter {
    pub fn new(
        datasources: Arc<dyn DatasourceCache>,
        executor: Arc<dyn QueryExecutor>,
        expressions: Arc<dyn ExpressionEvaluator>,
    ) -> Self {
        Self {
            resolver: DatasourceResolver::new(datasources),
            executor,
            expressions,
        }
    }

    /// Run one batch end to end.
    ///
    /// Dropping the returned future cancels any in-flight backend call.
    pub async fn dispatch(
        &self,
        request: MetricRequest,
        ctx: DispatchContext,
        settings: DispatchSettings,
    ) -> Result<QueryBatchResponse, DispatchError> {
        let mut tracker = RouteTracker::new();
        let outcome = self.route(&mut tracker, request, ctx, settings).await;
        tracker.advance(match outcome {
            Ok(_) => RouteState::Completed,
            Err(_) => RouteState::Failed,
        });
        outcome
    }

    async fn route(
        &self,
        tracker: &mut RouteTracker,
        dto: MetricRequest,
        ctx: DispatchContext,
        settings: DispatchSettings,
    ) -> Result<QueryBatchResponse, DispatchError> {
        let start = Instant::now();
        let generation = ctx.generation;

        let queries = normalize_batch(&dto.queries, generation)?;
        for query in &queries {
            tracing::debug!(ref_id = %query.ref_id, datasource_id = query.datasource_id, "Processing metrics query");
        }

        let mut request = QueryBatchRequest {
            time_range: TimeRange::new(dto.from, dto.to),
            debug: dto.debug,
            principal: ctx.principal,
            queries,
        };
        let kind = classify(&request.queries, generation);

        let response = match kind {
            BatchKind::Expression => {
                if !settings.expressions_enabled {
                    return Err(DispatchError::ExpressionsDisabled);
                }
                tracker.advance(RouteState::ExpressionPath);
                tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Pre-processed queries");

                with_deadline(settings.backend_timeout, self.expressions.transform(&request))
                    .await
                    .map_err(|source| DispatchError::Backend {
                        message: "Transform request error",
                        source,
                    })?
            }
            BatchKind::Direct => {
                let first_id = request
                    .queries
                    .first()
                    .map(|q| q.datasource_id)
                    .ok_or(DispatchError::EmptyBatch)?;
                let datasource = self
                    .resolver
                    .resolve(first_id, &request.principal, ctx.skip_cache, generation)
                    .await?;
                for query in &mut request.queries {
                    query.datasource = Some(datasource.clone());
                }
                tracker.advance(RouteState::DirectPath);
                tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Pre-processed queries");

                with_deadline(settings.backend_timeout, self.executor.execute(&datasource, &request))
                    .await
                    .map_err(|source| DispatchError::Backend {
                        message: "Metric request error",
                        source,
                    })?
            }
        };

        tracing::debug!(
            kind = ?kind,
            results = response.results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Handled request"
        );
        let envelope = aggregate(response.results);
        metrics::record_sub_query_errors(
            envelope.results.iter().filter(|(_, r)| r.error_string.is_some()).count(),
        );
        Ok(envelope)
    }
}

async fn with_deadline<F>(deadline: Duration, call: F) -> Result<BackendResponse, BackendError>
where
    F: Future<Output = Result<BackendResponse, BackendError>>,
{
    tokio::time::timeout(deadline, call)
        .await
        .unwrap_or(Err(BackendError::Timeout(deadline)))
}
