//! vitals-node: ingest vital-sign readings and anchor them to a ledger
//!
//! Readings go into per-metric monthly aggregates stored in a local sled
//! database. Each accepted batch is hashed and, unless it repeats the most
//! recent anchor, submitted to the configured ledger in the background.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use vitals_core::{MetricAggregate, MetricId, SensorReading};
use vitals_node::config::{Config, LedgerKind};
use vitals_node::node::{ingest_lines, Node};
use vitals_pipeline::{AggregateStore, AnchorLog};

#[derive(Parser)]
#[command(name = "vitals-node")]
#[command(about = "Ingest vital-sign readings and anchor them to a ledger")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "vitals-node.toml")]
    config: String,

    /// Data directory
    #[arg(short, long, env = "VITALS_DATA_DIR")]
    data_dir: Option<String>,

    /// Ledger RPC endpoint (switches the ledger to json-rpc)
    #[arg(long, env = "VITALS_LEDGER_URL")]
    ledger_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Provision the three aggregates if absent
    Seed,

    /// Ingest a single reading
    Ingest {
        /// Body temperature (°C)
        #[arg(long, allow_negative_numbers = true)]
        temperature: f64,
        /// Heart rate (BPM)
        #[arg(long, allow_negative_numbers = true)]
        heart_rate: f64,
        /// Oxygen saturation (%)
        #[arg(long, allow_negative_numbers = true)]
        spo2: f64,
    },

    /// Ingest one JSON reading per line from stdin
    Stream,

    /// Print stored aggregates
    Show {
        /// Only this metric (name or id)
        #[arg(short, long)]
        metric: Option<MetricId>,
    },

    /// List recent anchors, newest first
    Anchors {
        /// Number of anchors to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries results
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vitals_node=info".parse()?)
                .add_directive("vitals_pipeline=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("Config file: {}", cli.config);

    if !Path::new(&cli.config).exists() {
        info!("Config file not found, using defaults");
    }
    let mut config = Config::load_or_default(&cli.config)?;

    // Apply CLI overrides
    if let Some(data_dir) = cli.data_dir {
        config.node.data_dir = PathBuf::from(data_dir);
    }
    if let Some(ledger_url) = cli.ledger_url {
        config.ledger.kind = LedgerKind::JsonRpc;
        config.ledger.rpc_url = ledger_url;
    }

    info!("Data dir: {}", config.node.data_dir.display());

    let node = Node::open(&config).await?;
    let outcome = run(&node, cli.command).await;
    node.shutdown().await?;

    let exit_code = outcome?;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Execute a subcommand, returning the process exit code.
async fn run(node: &Node, command: Command) -> anyhow::Result<i32> {
    match command {
        Command::Seed => {
            let created = node.seed().await?;
            if created.is_empty() {
                println!("All aggregates already provisioned");
            } else {
                for metric in created {
                    println!("Provisioned {} ({})", metric.display_name(), metric.doc_id());
                }
            }
            Ok(0)
        }

        Command::Ingest {
            temperature,
            heart_rate,
            spo2,
        } => {
            let result = match SensorReading::new(temperature, heart_rate, spo2) {
                Ok(reading) => node.pipeline().ingest(reading).await,
                Err(e) => vitals_pipeline::IngestResult::rejected(
                    vitals_pipeline::StatusClass::ClientError,
                    e.to_string(),
                ),
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.accepted { 0 } else { 1 })
        }

        Command::Stream => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let summary = ingest_lines(node.pipeline(), stdin, tokio::io::stdout()).await?;
            info!(
                accepted = summary.accepted,
                rejected = summary.rejected,
                "Stream finished"
            );
            Ok(0)
        }

        Command::Show { metric } => {
            let aggregates: Vec<MetricAggregate> = match metric {
                Some(metric) => node.store().get_aggregate(metric).await?.into_iter().collect(),
                None => node.store().list_aggregates().await?,
            };
            if aggregates.is_empty() {
                println!("No aggregates found; run `vitals-node seed` first");
                return Ok(1);
            }
            println!("{}", serde_json::to_string_pretty(&aggregates)?);
            Ok(0)
        }

        Command::Anchors { limit } => {
            let anchors = node.store().recent(limit).await?;
            println!("{}", serde_json::to_string_pretty(&anchors)?);
            Ok(0)
        }
    }
}
