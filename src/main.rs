//! Metrics query dispatch service.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────┐
//!                          │                  QUERY DISPATCH                  │
//!                          │                                                  │
//!   POST /api/ds/query     │  ┌──────────┐   ┌───────────┐   ┌────────────┐   │
//!   POST /api/tsdb/query ──┼─▶│   http   │──▶│ normalize │──▶│   router   │   │
//!                          │  │ handlers │   └───────────┘   └─────┬──────┘   │
//!                          │  └──────────┘                         │          │
//!                          │        ▲            ┌─────────────────┴───────┐  │
//!                          │        │            ▼                         ▼  │
//!                          │        │     ┌─────────────┐        ┌───────────┐│
//!                          │        │     │ expression  │        │ datasource││
//!                          │        │     │  evaluator  │        │  resolver ││
//!                          │        │     └──────┬──────┘        └─────┬─────┘│
//!                          │        │            │                     ▼      │
//!                          │        │            │              ┌───────────┐ │
//!                          │        │            │              │ executor  │ │
//!                          │        │            │              └─────┬─────┘ │
//!                          │  ┌──────────┐   ┌──┴─────────────────────┴──┐    │
//!   ◀──────────────────────┼──│ response │◀──│        aggregate          │    │
//!                          │  │  emitter │   └───────────────────────────┘    │
//!                          │  └──────────┘                                    │
//!                          │  config · observability · lifecycle              │
//!                          └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use query_dispatch::lifecycle::startup;

#[derive(Parser)]
#[command(name = "query-dispatch")]
#[command(about = "Metrics query dispatch service", long_about = None)]
struct Cli {
    /// TOML config file; watched for changes while running
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    startup::run(cli.config.as_deref()).await?;
    Ok(())
}
