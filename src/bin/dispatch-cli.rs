use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dispatch-cli")]
#[command(about = "Client for the query dispatch service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    /// Sent as x-dispatch-user-id
    #[arg(long)]
    user_id: Option<i64>,

    /// Sent as x-dispatch-org-id
    #[arg(long)]
    org_id: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Post a batch from a JSON file
    Query {
        file: PathBuf,
        /// Use the legacy endpoint
        #[arg(long)]
        legacy: bool,
        /// Bypass the data source cache
        #[arg(long)]
        no_cache: bool,
    },
    /// List test-data scenarios
    Scenarios,
    /// Fetch one random-walk series
    RandomWalk {
        #[arg(long, default_value = "now-1h")]
        from: String,
        #[arg(long, default_value = "now")]
        to: String,
        #[arg(long, default_value_t = 60_000)]
        interval_ms: i64,
    },
    /// Check service health
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let res = match cli.command {
        Commands::Query { file, legacy, no_cache } => {
            let body: Value = serde_json::from_str(&std::fs::read_to_string(file)?)?;
            let path = if legacy { "/api/tsdb/query" } else { "/api/ds/query" };
            let mut req = client.post(format!("{}{}", cli.url, path)).json(&body);
            if let Some(user_id) = cli.user_id {
                req = req.header("x-dispatch-user-id", user_id.to_string());
            }
            if let Some(org_id) = cli.org_id {
                req = req.header("x-dispatch-org-id", org_id.to_string());
            }
            if no_cache {
                req = req.header("x-no-cache", "true");
            }
            req.send().await?
        }
        Commands::Scenarios => {
            client
                .get(format!("{}/api/tsdb/testdata/scenarios", cli.url))
                .send()
                .await?
        }
        Commands::RandomWalk { from, to, interval_ms } => {
            client
                .get(format!("{}/api/tsdb/testdata/random-walk", cli.url))
                .query(&[("from", from), ("to", to), ("intervalMs", interval_ms.to_string())])
                .send()
                .await?
        }
        Commands::Health => client.get(format!("{}/api/health", cli.url)).send().await?,
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let request_id = res
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
    }
    if let Some(id) = request_id {
        eprintln!("Request ID: {}", id);
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
