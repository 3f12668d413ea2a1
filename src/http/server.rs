//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (panic recovery, timeout, body limit, request ID, tracing)
//! - Build default collaborators from config, or accept injected ones
//! - Apply hot-reloaded config to the running server
//! - Serve until shutdown

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::backend::testdata::TESTDATA_TYPE;
use crate::backend::{
    ExecutorRegistry, ExpressionEvaluator, ExpressionService, QueryExecutor, ScenarioRegistry,
    TestDataExecutor,
};
use crate::config::watcher::reconcile;
use crate::config::DispatchConfig;
use crate::datasource::{DatasourceCache, ProvisionedDatasourceCache};
use crate::http::handlers;
use crate::http::request::{UuidRequestId, X_REQUEST_ID};
use crate::http::response::panic_response;
use crate::query::ExecutionRouter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ExecutionRouter>,
    pub config: Arc<ArcSwap<DispatchConfig>>,
    pub scenarios: Arc<ScenarioRegistry>,
    pub testdata: Arc<TestDataExecutor>,
}

/// The collaborators a server dispatches to.
#[derive(Clone)]
pub struct Components {
    pub datasources: Arc<dyn DatasourceCache>,
    pub executor: Arc<dyn QueryExecutor>,
    pub expressions: Arc<dyn ExpressionEvaluator>,
    pub scenarios: Arc<ScenarioRegistry>,
}

impl Components {
    /// Provisioned data sources, the test-data executor and the built-in expression service.
    pub fn from_config(config: &DispatchConfig) -> Self {
        let scenarios = Arc::new(ScenarioRegistry::default());
        let datasources: Arc<dyn DatasourceCache> = Arc::new(ProvisionedDatasourceCache::new(
            &config.datasources,
            Duration::from_secs(config.datasource_cache.ttl_secs),
        ));
        let executor: Arc<dyn QueryExecutor> = Arc::new(
            ExecutorRegistry::new()
                .register(TESTDATA_TYPE, Arc::new(TestDataExecutor::new(scenarios.clone()))),
        );
        let expressions: Arc<dyn ExpressionEvaluator> =
            Arc::new(ExpressionService::new(datasources.clone(), executor.clone()));

        Self {
            datasources,
            executor,
            expressions,
            scenarios,
        }
    }
}

/// HTTP server for the dispatch API.
pub struct HttpServer {
    router: Router,
    config: Arc<ArcSwap<DispatchConfig>>,
}

impl HttpServer {
    /// Create a new HTTP server with default collaborators.
    pub fn new(config: DispatchConfig) -> Self {
        let components = Components::from_config(&config);
        Self::with_components(config, components)
    }

    /// Create a server that dispatches to the given collaborators.
    pub fn with_components(config: DispatchConfig, components: Components) -> Self {
        let shared = Arc::new(ArcSwap::from_pointee(config.clone()));
        let state = AppState {
            router: Arc::new(ExecutionRouter::new(
                components.datasources,
                components.executor,
                components.expressions,
            )),
            config: shared.clone(),
            testdata: Arc::new(TestDataExecutor::new(components.scenarios.clone())),
            scenarios: components.scenarios,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config: shared,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers listed last run first: the request ID is set before tracing sees the request.
    #[allow(deprecated)]
    fn build_router(config: &DispatchConfig, state: AppState) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        Router::new()
            .route("/api/tsdb/query", post(handlers::query_metrics))
            .route("/api/ds/query", post(handlers::query_metrics_v2))
            .route("/api/tsdb/testdata/scenarios", get(handlers::get_test_data_scenarios))
            .route("/api/tsdb/testdata/random-walk", get(handlers::get_test_data_random_walk))
            .route("/api/tsdb/testdata/generate-error", get(handlers::generate_error))
            .route("/api/health", get(handlers::health))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_size))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                let id = req
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!("request", method = %req.method(), uri = %req.uri(), request_id = %id)
            }))
            .layer(SetRequestIdLayer::new(request_id, UuidRequestId))
    }

    /// The router, for driving the server without a socket.
    pub fn app(&self) -> Router {
        self.router.clone()
    }

    /// Current config snapshot.
    pub fn config(&self) -> Arc<DispatchConfig> {
        self.config.load_full()
    }

    /// Serve on `listener` until `shutdown` fires, applying config updates as they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<DispatchConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let config = self.config.clone();
        let reloader = tokio::spawn(async move {
            while let Some(update) = config_updates.recv().await {
                apply_update(&config, update);
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Swap in a reloaded config, keeping the settings that need a restart.
fn apply_update(current: &ArcSwap<DispatchConfig>, update: DispatchConfig) {
    let running = current.load_full();
    let reconciled = reconcile(&running, update);

    for setting in &reconciled.pinned {
        tracing::warn!(setting = *setting, "Setting changed on disk; restart to apply");
    }
    if reconciled.is_noop(&running) {
        tracing::debug!("Reloaded configuration has no hot changes");
        return;
    }

    tracing::info!(
        expressions_enabled = reconciled.config.features.expressions_enabled,
        backend_timeout_secs = reconciled.config.timeouts.backend_secs,
        "Configuration reloaded"
    );
    current.store(Arc::new(reconciled.config));
}
