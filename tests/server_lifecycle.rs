//! Real-socket tests: default collaborators, config reload, graceful shutdown.

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;

use query_dispatch::config::DispatchConfig;
use query_dispatch::http::HttpServer;
use query_dispatch::lifecycle::Shutdown;

struct Running {
    addr: SocketAddr,
    shutdown: Shutdown,
    updates: mpsc::UnboundedSender<DispatchConfig>,
    handle: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

async fn start(config: DispatchConfig) -> Running {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config);
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, config_updates, server_shutdown).await });

    Running {
        addr,
        shutdown,
        updates,
        handle,
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

fn expression_batch() -> Value {
    json!({
        "from": "1700000000000",
        "to": "1700000060000",
        "queries": [
            {"refId": "A", "datasourceId": 1, "scenarioId": "csv_metric_values", "stringInput": "1,2,3"},
            {"refId": "B", "datasource": "__expr__", "datasourceId": -100,
             "type": "reduce", "expression": "$A", "reducer": "sum"},
        ]
    })
}

#[tokio::test]
async fn test_testdata_batch_over_http() {
    let server = start(DispatchConfig::with_testdata()).await;
    let res = client()
        .post(format!("http://{}/api/ds/query", server.addr))
        .json(&json!({
            "from": "now-1h",
            "to": "now",
            "queries": [
                {"refId": "A", "datasourceId": 1, "scenarioId": "random_walk"},
                {"refId": "B", "datasourceId": 1, "scenarioId": "server_error_500"},
            ]
        }))
        .send()
        .await
        .expect("server unreachable");

    assert_eq!(res.status(), 400);
    assert!(res.headers().contains_key("x-request-id"));
    let body: Value = res.json().await.unwrap();
    assert!(!body["results"]["A"]["series"].as_array().unwrap().is_empty());
    assert!(body["results"]["B"]["error"].is_string());
    assert_eq!(body["message"], body["results"]["B"]["error"]);

    server.shutdown.trigger();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reload_enables_expressions() {
    let server = start(DispatchConfig::with_testdata()).await;
    let url = format!("http://{}/api/ds/query", server.addr);
    let client = client();

    let res = client.post(&url).json(&expression_batch()).send().await.unwrap();
    assert_eq!(res.status(), 404);

    let mut update = DispatchConfig::with_testdata();
    update.features.expressions_enabled = true;
    server.updates.send(update).unwrap();

    let mut status = 0;
    for _ in 0..50 {
        let res = client.post(&url).json(&expression_batch()).send().await.unwrap();
        status = res.status().as_u16();
        if status == 200 {
            let body: Value = res.json().await.unwrap();
            assert_eq!(body["results"]["B"]["series"][0]["points"][0][0], json!(6.0));
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, 200, "reload never took effect");

    server.shutdown.trigger();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let server = start(DispatchConfig::default()).await;
    let res = client()
        .get(format!("http://{}/api/health", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    server.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();

    assert!(client()
        .get(format!("http://{}/api/health", server.addr))
        .send()
        .await
        .is_err());
}
