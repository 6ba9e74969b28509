//! analysis-worker: Stage Consumer on the `analysis` channel.
//!
//! Consumes comment batches, calls the model server, and publishes the
//! per-comment results to `aggregation`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use vibesense_analysis::{AnalysisStage, HttpAnalyzer};
use vibesense_core::config::{load_dotenv, Config};
use vibesense_core::pipeline;
use vibesense_queue::{shutdown_channel, trigger_on_signal, PgBus, StageConsumer};
use vibesense_store::init_pg_pool;

// ── CLI ─────────────────────────────────────────────────────────────

/// Analysis stage worker.
#[derive(Parser, Debug)]
#[command(name = "analysis-worker", version, about)]
struct Cli {
    /// Concurrent handlers (overrides BUS_CONCURRENCY).
    #[arg(long)]
    concurrency: Option<usize>,

    /// Shutdown timeout in seconds.
    #[arg(long, env = "ANALYSIS_SHUTDOWN_TIMEOUT", default_value_t = 60)]
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
    let bus = Arc::new(PgBus::new(pool, config.bus.visibility_timeout()));

    let analyzer = Arc::new(HttpAnalyzer::from_config(&config.analysis)?);
    info!(url = %config.analysis.url, batch_size = config.analysis.batch_size, "Model server configured");

    let consumer = Arc::new(
        StageConsumer::builder(pipeline::ANALYSIS)
            .bus_config(&config.bus)
            .shutdown_timeout(Duration::from_secs(cli.shutdown_timeout))
            .build(bus, Arc::new(AnalysisStage::new(analyzer))),
    );

    let (shutdown_trigger, shutdown) = shutdown_channel();
    tokio::spawn(trigger_on_signal(shutdown_trigger));

    consumer.run(shutdown).await?;
    info!("analysis-worker exited cleanly");
    Ok(())
}
