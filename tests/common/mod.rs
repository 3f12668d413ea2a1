//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use query_dispatch::backend::{
    BackendError, BackendResponse, ExpressionEvaluator, QueryExecutor, ScenarioRegistry,
};
use query_dispatch::config::DispatchConfig;
use query_dispatch::datasource::{DatasourceCache, DatasourceError, Principal, ResolvedDatasource};
use query_dispatch::http::{Components, HttpServer};
use query_dispatch::query::{QueryBatchRequest, QueryResult, SubQueryError};

/// Data source cache that records every lookup.
///
/// Ids listed in `failures` fail with the given error; every other id resolves.
#[derive(Default)]
pub struct MockCache {
    pub requested: Mutex<Vec<i64>>,
    pub failures: HashMap<i64, DatasourceError>,
}

impl MockCache {
    pub fn failing(failures: impl IntoIterator<Item = (i64, DatasourceError)>) -> Self {
        Self {
            requested: Mutex::new(Vec::new()),
            failures: failures.into_iter().collect(),
        }
    }

    pub fn calls(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    pub fn requested(&self) -> Vec<i64> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatasourceCache for MockCache {
    async fn get_datasource(
        &self,
        id: i64,
        principal: &Principal,
        _skip_cache: bool,
    ) -> Result<Arc<ResolvedDatasource>, DatasourceError> {
        self.requested.lock().unwrap().push(id);
        if let Some(err) = self.failures.get(&id) {
            return Err(err.clone());
        }
        Ok(Arc::new(ResolvedDatasource {
            id,
            uid: format!("mock-{id}"),
            name: format!("Mock {id}"),
            type_name: "mock".to_string(),
            org_id: principal.org_id,
            json_data: Value::Null,
        }))
    }
}

/// Executor whose sub-queries fail when their model has an `"error"` string.
///
/// Records the data source id each sub-query carried.
#[derive(Default)]
pub struct MockExecutor {
    pub calls: AtomicUsize,
    pub attached: Mutex<Vec<Option<i64>>>,
}

impl MockExecutor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn execute(
        &self,
        _datasource: &ResolvedDatasource,
        request: &QueryBatchRequest,
    ) -> Result<BackendResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut attached = self.attached.lock().unwrap();
        let results = request
            .queries
            .iter()
            .map(|q| {
                attached.push(q.datasource.as_ref().map(|d| d.id));
                let result = QueryResult::new(q.ref_id.clone());
                match q.model_str("error") {
                    Some(message) => result.with_error(SubQueryError::query(message)),
                    None => result,
                }
            })
            .collect();
        Ok(BackendResponse::new(results))
    }
}

#[derive(Default)]
pub struct MockEvaluator {
    pub calls: AtomicUsize,
}

impl MockEvaluator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExpressionEvaluator for MockEvaluator {
    async fn transform(&self, request: &QueryBatchRequest) -> Result<BackendResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(BackendResponse::new(
            request
                .queries
                .iter()
                .map(|q| QueryResult::new(q.ref_id.clone()))
                .collect(),
        ))
    }
}

/// A router wired to counting mocks.
pub struct Harness {
    pub cache: Arc<MockCache>,
    pub executor: Arc<MockExecutor>,
    pub evaluator: Arc<MockEvaluator>,
    pub app: Router,
}

impl Harness {
    pub fn new(expressions_enabled: bool) -> Self {
        Self::with_cache(expressions_enabled, MockCache::default())
    }

    pub fn with_cache(expressions_enabled: bool, cache: MockCache) -> Self {
        let cache = Arc::new(cache);
        let executor = Arc::new(MockExecutor::default());
        let evaluator = Arc::new(MockEvaluator::default());

        let mut config = DispatchConfig::default();
        config.features.expressions_enabled = expressions_enabled;
        let components = Components {
            datasources: cache.clone(),
            executor: executor.clone(),
            expressions: evaluator.clone(),
            scenarios: Arc::new(ScenarioRegistry::default()),
        };
        let app = HttpServer::with_components(config, components).app();

        Self {
            cache,
            executor,
            evaluator,
            app,
        }
    }

    /// No collaborator was touched.
    pub fn untouched(&self) -> bool {
        self.cache.calls() == 0 && self.executor.calls() == 0 && self.evaluator.calls() == 0
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    TestResponse { status, headers, body }
}

pub async fn post_json(app: &Router, path: &str, body: &Value) -> TestResponse {
    post_json_with(app, path, body, &[]).await
}

pub async fn post_json_with(
    app: &Router,
    path: &str,
    body: &Value,
    headers: &[(&str, &str)],
) -> TestResponse {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    send(app, builder.body(Body::from(body.to_string())).unwrap()).await
}

pub async fn get(app: &Router, path: &str) -> TestResponse {
    send(app, Request::builder().uri(path).body(Body::empty()).unwrap()).await
}
