//! aggregation-worker: Stage Consumer on the `aggregation` channel.
//!
//! Persists one interval result per analyzed batch, recomputes the job's
//! running aggregate, and publishes the report to `notification`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use vibesense_analysis::AggregationStage;
use vibesense_core::config::{load_dotenv, Config};
use vibesense_core::pipeline;
use vibesense_queue::{shutdown_channel, trigger_on_signal, PgBus, StageConsumer};
use vibesense_store::{init_pg_pool, PgStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Aggregation stage worker.
#[derive(Parser, Debug)]
#[command(name = "aggregation-worker", version, about)]
struct Cli {
    /// Concurrent handlers (overrides BUS_CONCURRENCY).
    #[arg(long)]
    concurrency: Option<usize>,

    /// Shutdown timeout in seconds.
    #[arg(long, env = "AGGREGATION_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    shutdown_timeout: u64,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    load_dotenv();
    let mut config = Config::from_env();
    if let Some(n) = cli.concurrency {
        config.bus.concurrency = n;
    }
    config.log_summary();

    let pool = init_pg_pool(&config.postgres)
        .await
        .context("failed to initialise PostgreSQL")?;
    let results = Arc::new(PgStore::new(pool.clone()));
    let bus = Arc::new(PgBus::new(pool, config.bus.visibility_timeout()));

    let consumer = Arc::new(
        StageConsumer::builder(pipeline::AGGREGATION)
            .bus_config(&config.bus)
            .shutdown_timeout(Duration::from_secs(cli.shutdown_timeout))
            .build(bus, Arc::new(AggregationStage::new(results))),
    );

    let (shutdown_trigger, shutdown) = shutdown_channel();
    tokio::spawn(trigger_on_signal(shutdown_trigger));

    consumer.run(shutdown).await?;
    info!("aggregation-worker exited cleanly");
    Ok(())
}
