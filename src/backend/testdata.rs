//! Synthetic test-data backend.
//!
//! # Responsibilities
//! - Serve data sources of type `testdata`
//! - Generate series for named scenarios (random walk, CSV values, ...)
//! - Simulate per-query failures and slow backends
//!
//! # Design Decisions
//! - Scenarios live in an explicit ScenarioRegistry handed in at construction
//! - Random walks are seeded from ref id and range start, so equal requests
//!   produce equal data

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BackendError, BackendResponse, QueryExecutor};
use crate::datasource::ResolvedDatasource;
use crate::query::model::{QueryBatchRequest, QueryResult, SubQueryError, SubQuerySpec, TimeSeries};

/// Data source type served by [`TestDataExecutor`].
pub const TESTDATA_TYPE: &str = "testdata";

/// Scenario used when a query does not name one.
pub const DEFAULT_SCENARIO: &str = "random_walk";

const DEFAULT_CSV_VALUES: &str = "1,20,90,30,5,0";
const DEFAULT_SLOW_QUERY_DELAY: &str = "5s";
const MAX_SERIES_COUNT: i64 = 100;
const MAX_POINTS_PER_SERIES: usize = 10_000;

/// What a scenario does when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    RandomWalk,
    NoDataPoints,
    CsvMetricValues,
    ServerError,
    SlowQuery,
}

/// A named test-data scenario.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub string_input: &'static str,
    #[serde(skip)]
    pub kind: ScenarioKind,
}

/// The set of scenarios a [`TestDataExecutor`] can run.
#[derive(Debug, Clone)]
pub struct ScenarioRegistry {
    scenarios: BTreeMap<&'static str, Scenario>,
}

impl ScenarioRegistry {
    /// A registry with no scenarios.
    pub fn empty() -> Self {
        Self {
            scenarios: BTreeMap::new(),
        }
    }

    /// Add or replace a scenario.
    pub fn register(&mut self, scenario: Scenario) {
        self.scenarios.insert(scenario.id, scenario);
    }

    pub fn get(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.get(id)
    }

    /// All scenarios, sorted by id.
    pub fn list(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.values()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Scenario {
            id: "random_walk",
            name: "Random Walk",
            description: "Random walk series, one point per interval",
            string_input: "",
            kind: ScenarioKind::RandomWalk,
        });
        registry.register(Scenario {
            id: "no_data_points",
            name: "No Data Points",
            description: "Returns a result without series",
            string_input: "",
            kind: ScenarioKind::NoDataPoints,
        });
        registry.register(Scenario {
            id: "csv_metric_values",
            name: "CSV Metric Values",
            description: "Comma separated values spread evenly over the time range",
            string_input: DEFAULT_CSV_VALUES,
            kind: ScenarioKind::CsvMetricValues,
        });
        registry.register(Scenario {
            id: "server_error_500",
            name: "Server Error (500)",
            description: "Fails this query and leaves the others untouched",
            string_input: "",
            kind: ScenarioKind::ServerError,
        });
        registry.register(Scenario {
            id: "slow_query",
            name: "Slow Query",
            description: "Waits for the given duration, then returns a random walk",
            string_input: DEFAULT_SLOW_QUERY_DELAY,
            kind: ScenarioKind::SlowQuery,
        });
        registry
    }
}

/// Executor for `testdata` data sources.
#[derive(Debug, Clone)]
pub struct TestDataExecutor {
    scenarios: Arc<ScenarioRegistry>,
}

impl TestDataExecutor {
    pub fn new(scenarios: Arc<ScenarioRegistry>) -> Self {
        Self { scenarios }
    }

    pub fn scenarios(&self) -> &ScenarioRegistry {
        &self.scenarios
    }

    async fn run_query(&self, query: &SubQuerySpec, from: i64, to: i64) -> QueryResult {
        let scenario_id = query.model_str("scenarioId").unwrap_or(DEFAULT_SCENARIO);
        let result = QueryResult::new(query.ref_id.clone());

        let Some(scenario) = self.scenarios.get(scenario_id) else {
            return result.with_error(SubQueryError::query(format!(
                "scenario not found: {scenario_id}"
            )));
        };

        match scenario.kind {
            ScenarioKind::RandomWalk => result.with_series(random_walk(query, from, to)),
            ScenarioKind::NoDataPoints => result,
            ScenarioKind::CsvMetricValues => {
                let input = query.model_str("stringInput").unwrap_or(scenario.string_input);
                match csv_metric_values(&query.ref_id, input, from, to) {
                    Ok(series) => result.with_series(vec![series]),
                    Err(e) => result.with_error(e),
                }
            }
            ScenarioKind::ServerError => result.with_error(SubQueryError::query(format!(
                "scenario {} returned an internal server error",
                scenario.id
            ))),
            ScenarioKind::SlowQuery => {
                let input = query.model_str("stringInput").unwrap_or(scenario.string_input);
                match parse_delay(input) {
                    Some(delay) => {
                        tokio::time::sleep(delay).await;
                        result.with_series(random_walk(query, from, to))
                    }
                    None => result.with_error(SubQueryError::query(format!(
                        "invalid slow query delay: {input}"
                    ))),
                }
            }
        }
    }
}

#[async_trait]
impl QueryExecutor for TestDataExecutor {
    async fn execute(
        &self,
        _datasource: &ResolvedDatasource,
        request: &QueryBatchRequest,
    ) -> Result<BackendResponse, BackendError> {
        let (from, to) = match request.time_range.bounds_ms() {
            Ok(bounds) => bounds,
            Err(e) => {
                // The range is bad for every query alike, but it is still the caller's input.
                let results = request
                    .queries
                    .iter()
                    .map(|q| QueryResult::new(q.ref_id.clone()).with_error(SubQueryError::query(e.to_string())))
                    .collect();
                return Ok(BackendResponse::new(results));
            }
        };

        let mut results = Vec::with_capacity(request.queries.len());
        for query in &request.queries {
            results.push(self.run_query(query, from, to).await);
        }
        Ok(BackendResponse::new(results))
    }
}

fn series_name(ref_id: &str, index: i64) -> String {
    if index == 0 {
        format!("{ref_id}-series")
    } else {
        format!("{ref_id}-series{index}")
    }
}

fn walk_seed(ref_id: &str, from: i64, index: i64) -> u64 {
    let mut hasher = DefaultHasher::new();
    ref_id.hash(&mut hasher);
    from.hash(&mut hasher);
    index.hash(&mut hasher);
    hasher.finish()
}

fn random_walk(query: &SubQuerySpec, from: i64, to: i64) -> Vec<TimeSeries> {
    let series_count = query.model_i64("seriesCount").unwrap_or(1).clamp(1, MAX_SERIES_COUNT);
    let interval = query.interval_ms.max(1);
    let max_points = usize::try_from(query.max_data_points.max(1))
        .unwrap_or(MAX_POINTS_PER_SERIES)
        .min(MAX_POINTS_PER_SERIES);

    (0..series_count)
        .map(|index| {
            let mut rng = StdRng::seed_from_u64(walk_seed(&query.ref_id, from, index));
            let mut walker = rng.gen::<f64>() * 100.0;
            let mut points = Vec::new();
            let mut ts = from;
            while ts < to && points.len() < max_points {
                points.push([walker, ts as f64]);
                walker += rng.gen::<f64>() - 0.5;
                match ts.checked_add(interval) {
                    Some(next) => ts = next,
                    None => break,
                }
            }
            TimeSeries::new(series_name(&query.ref_id, index), points)
        })
        .collect()
}

fn csv_metric_values(ref_id: &str, input: &str, from: i64, to: i64) -> Result<TimeSeries, SubQueryError> {
    let values = input
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| SubQueryError::query(format!("invalid csv metric value: {v}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let step = if values.len() > 1 {
        (to as f64 - from as f64) / (values.len() - 1) as f64
    } else {
        0.0
    };
    let points = values
        .into_iter()
        .enumerate()
        .map(|(i, v)| [v, from as f64 + step * i as f64])
        .collect();

    Ok(TimeSeries::new(ref_id, points))
}

fn parse_delay(input: &str) -> Option<Duration> {
    let input = input.trim();
    if let Some(ms) = input.strip_suffix("ms") {
        return ms.parse().ok().map(Duration::from_millis);
    }
    if let Some(secs) = input.strip_suffix('s') {
        return secs.parse().ok().map(Duration::from_secs);
    }
    if let Some(mins) = input.strip_suffix('m') {
        return mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::Principal;
    use crate::query::time_range::TimeRange;
    use serde_json::json;

    fn query(ref_id: &str, model: serde_json::Value) -> SubQuerySpec {
        SubQuerySpec {
            ref_id: ref_id.to_string(),
            max_data_points: 100,
            interval_ms: 1000,
            query_type: None,
            datasource_name: None,
            datasource_id: 1,
            model,
            datasource: None,
        }
    }

    fn request(queries: Vec<SubQuerySpec>) -> QueryBatchRequest {
        QueryBatchRequest {
            time_range: TimeRange::new("1700000000000", "1700000060000"),
            debug: false,
            principal: Principal::anonymous(),
            queries,
        }
    }

    fn datasource() -> ResolvedDatasource {
        ResolvedDatasource {
            id: 1,
            uid: "testdata".into(),
            name: "TestData DB".into(),
            type_name: TESTDATA_TYPE.into(),
            org_id: 1,
            json_data: serde_json::Value::Null,
        }
    }

    fn executor() -> TestDataExecutor {
        TestDataExecutor::new(Arc::new(ScenarioRegistry::default()))
    }

    #[test]
    fn test_registry_sorted() {
        let registry = ScenarioRegistry::default();
        let ids: Vec<_> = registry.list().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec!["csv_metric_values", "no_data_points", "random_walk", "server_error_500", "slow_query"]
        );
        assert!(ScenarioRegistry::empty().is_empty());
    }

    #[tokio::test]
    async fn test_random_walk_is_deterministic() {
        let exec = executor();
        let req = request(vec![query("A", json!({"scenarioId": "random_walk", "seriesCount": 2}))]);

        let first = exec.execute(&datasource(), &req).await.unwrap();
        let second = exec.execute(&datasource(), &req).await.unwrap();
        assert_eq!(first, second);

        let series = &first.results[0].series;
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].name, "A-series");
        assert_eq!(series[1].name, "A-series1");
        // 60s range at 1s interval
        assert_eq!(series[0].points.len(), 60);
        assert_eq!(series[0].points[0][1], 1_700_000_000_000.0);
    }

    #[tokio::test]
    async fn test_max_data_points_caps_walk() {
        let mut q = query("A", json!({}));
        q.max_data_points = 10;
        let resp = executor().execute(&datasource(), &request(vec![q])).await.unwrap();
        assert_eq!(resp.results[0].series[0].points.len(), 10);
    }

    #[tokio::test]
    async fn test_walk_points_have_hard_cap() {
        let mut q = query("A", json!({"seriesCount": 3}));
        q.max_data_points = 1_000_000_000_000;
        q.interval_ms = 1;
        let mut req = request(vec![q]);
        req.time_range = TimeRange::new("1700000000000", "1700086400000");

        let resp = executor().execute(&datasource(), &req).await.unwrap();
        let series = &resp.results[0].series;
        assert_eq!(series.len(), 3);
        assert!(series.iter().all(|s| s.points.len() == MAX_POINTS_PER_SERIES));
    }

    #[tokio::test]
    async fn test_range_at_i64_limits() {
        let mut walk = query("A", json!({}));
        walk.interval_ms = 10;
        let mut req = request(vec![
            walk,
            query("B", json!({"scenarioId": "csv_metric_values", "stringInput": "1,2"})),
        ]);
        req.time_range = TimeRange::new(i64::MIN.to_string(), i64::MAX.to_string());

        let resp = executor().execute(&datasource(), &req).await.unwrap();
        assert_eq!(resp.results[0].series[0].points.len(), 100);
        assert_eq!(resp.results[1].series[0].points[0][1], i64::MIN as f64);

        let mut q = query("A", json!({}));
        q.interval_ms = 10;
        let mut req = request(vec![q]);
        req.time_range = TimeRange::new((i64::MAX - 5).to_string(), i64::MAX.to_string());
        let resp = executor().execute(&datasource(), &req).await.unwrap();
        assert_eq!(resp.results[0].series[0].points.len(), 1);
    }

    #[tokio::test]
    async fn test_csv_and_errors() {
        let req = request(vec![
            query("A", json!({"scenarioId": "csv_metric_values", "stringInput": "1, 2,3"})),
            query("B", json!({"scenarioId": "server_error_500"})),
            query("C", json!({"scenarioId": "nope"})),
            query("D", json!({"scenarioId": "csv_metric_values", "stringInput": "1,x"})),
        ]);
        let resp = executor().execute(&datasource(), &req).await.unwrap();

        let csv = &resp.results[0].series[0];
        assert_eq!(csv.points, vec![
            [1.0, 1_700_000_000_000.0],
            [2.0, 1_700_000_030_000.0],
            [3.0, 1_700_000_060_000.0],
        ]);
        assert!(resp.results[1].error.is_some());
        assert_eq!(
            resp.results[2].error.as_ref().unwrap().message,
            "scenario not found: nope"
        );
        assert_eq!(
            resp.results[3].error.as_ref().unwrap().message,
            "invalid csv metric value: x"
        );
    }

    #[tokio::test]
    async fn test_bad_time_range_fails_each_query() {
        let mut req = request(vec![query("A", json!({})), query("B", json!({}))]);
        req.time_range = TimeRange::new("yesterday", "now");
        let resp = executor().execute(&datasource(), &req).await.unwrap();
        assert_eq!(resp.results.len(), 2);
        assert!(resp.results.iter().all(|r| r.error.is_some()));
    }

    #[tokio::test]
    async fn test_slow_query_waits() {
        let req = request(vec![query("A", json!({"scenarioId": "slow_query", "stringInput": "50ms"}))]);
        let start = std::time::Instant::now();
        let resp = executor().execute(&datasource(), &req).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(resp.results[0].series.len(), 1);
    }

    #[test]
    fn test_parse_delay() {
        assert_eq!(parse_delay("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_delay("3s"), Some(Duration::from_secs(3)));
        assert_eq!(parse_delay("1m"), Some(Duration::from_secs(60)));
        assert_eq!(parse_delay("soon"), None);
    }
}
