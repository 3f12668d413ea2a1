//! Endpoint handlers.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::backend::testdata::TESTDATA_TYPE;
use crate::backend::{QueryExecutor, Scenario};
use crate::datasource::{Principal, ResolvedDatasource};
use crate::http::request::RequestContext;
use crate::http::response::{emit, EmitMode};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::query::model::{DEFAULT_MAX_DATA_POINTS, DEFAULT_REF_ID};
use crate::query::{
    aggregate, ApiGeneration, BatchStatus, DispatchContext, DispatchError, DispatchSettings,
    MetricRequest, QueryBatchRequest, SubQuerySpec, TimeRange,
};

/// `POST /api/ds/query`
pub async fn query_metrics_v2(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<MetricRequest>,
) -> Response {
    dispatch(state, ctx, request, ApiGeneration::Current, EmitMode::Streaming).await
}

/// `POST /api/tsdb/query`
pub async fn query_metrics(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<MetricRequest>,
) -> Response {
    dispatch(state, ctx, request, ApiGeneration::Legacy, EmitMode::Buffered).await
}

async fn dispatch(
    state: AppState,
    ctx: RequestContext,
    request: MetricRequest,
    generation: ApiGeneration,
    mode: EmitMode,
) -> Response {
    let start = Instant::now();
    let endpoint = generation.as_str();
    let settings = DispatchSettings::from_config(&state.config.load());

    tracing::debug!(
        generation = endpoint,
        queries = request.queries.len(),
        user_id = ctx.principal.user_id,
        org_id = ctx.principal.org_id,
        skip_cache = ctx.skip_cache,
        "Dispatching batch"
    );

    let dispatch_ctx = DispatchContext {
        principal: ctx.principal,
        skip_cache: ctx.skip_cache,
        generation,
    };
    let response = match state.router.dispatch(request, dispatch_ctx, settings).await {
        Ok(envelope) => emit(envelope, mode),
        Err(err) => err.into_response(),
    };

    metrics::record_request(endpoint, response.status().as_u16(), start);
    response
}

/// `GET /api/tsdb/testdata/scenarios`
pub async fn get_test_data_scenarios(State(state): State<AppState>) -> Json<Vec<Scenario>> {
    Json(state.scenarios.list().cloned().collect())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RandomWalkParams {
    pub from: String,
    pub to: String,
    pub interval_ms: i64,
}

/// `GET /api/tsdb/testdata/random-walk`
///
/// Answers 200 whenever the executor returns, even if the walk itself failed.
pub async fn get_test_data_random_walk(
    State(state): State<AppState>,
    Query(params): Query<RandomWalkParams>,
) -> Response {
    let datasource = ResolvedDatasource {
        id: 0,
        uid: String::new(),
        name: String::new(),
        type_name: TESTDATA_TYPE.to_string(),
        org_id: Principal::anonymous().org_id,
        json_data: serde_json::Value::Null,
    };
    let request = QueryBatchRequest {
        time_range: TimeRange::new(params.from, params.to),
        debug: false,
        principal: Principal::anonymous(),
        queries: vec![SubQuerySpec {
            ref_id: DEFAULT_REF_ID.to_string(),
            max_data_points: DEFAULT_MAX_DATA_POINTS,
            interval_ms: params.interval_ms,
            query_type: None,
            datasource_name: None,
            datasource_id: datasource.id,
            model: serde_json::json!({"scenarioId": "random_walk"}),
            datasource: Some(Arc::new(datasource.clone())),
        }],
    };

    match state.testdata.execute(&datasource, &request).await {
        Ok(backend) => {
            let mut envelope = aggregate(backend.results);
            envelope.status = BatchStatus::Ok;
            emit(envelope, EmitMode::Buffered)
        }
        Err(source) => DispatchError::Backend {
            message: "Metric request error",
            source,
        }
        .into_response(),
    }
}

/// `GET /api/tsdb/testdata/generate-error`
///
/// Deliberately panics with an out-of-bounds index, to exercise panic recovery.
pub async fn generate_error() -> Json<String> {
    let values: Vec<String> = Vec::new();
    let index = 20;
    Json(values[index].clone())
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /api/health`
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
