//! ingest-worker: dynamic scheduler plus fetch-and-dispatch.
//!
//! Admits newly created monitoring jobs, fires each at its interval until it
//! expires, and publishes new comments to the `analysis` channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use vibesense_core::config::{load_dotenv, Config};
use vibesense_core::{pipeline, SystemClock};
use vibesense_ingest::{FetchDispatcher, SpawnTrigger, YoutubeFetcher};
use vibesense_queue::{shutdown_channel, trigger_on_signal, Consumer, PgBus};
use vibesense_scheduler::{DynamicScheduler, PgSchedulerStore};
use vibesense_store::{init_pg_pool, PgStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Scheduler and fetch-and-dispatch worker.
#[derive(Parser, Debug)]
#[command(name = "ingest-worker", version, about)]
struct Cli {
    /// Refresh cadence in seconds (overrides SCHEDULER_REFRESH_SECS).
    #[arg(long)]
    refresh_interval: Option<u64>,

    /// Tick cadence in seconds (overrides SCHEDULER_TICK_SECS).
    #[arg(long)]
    tick_interval: Option<u64>,

    /// Shutdown timeout in seconds.
    #[arg(long, env = "INGEST_SHUTDOWN_TIMEOUT", default_value_t = 30)]
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
    if let Some(secs) = cli.refresh_interval {
        config.scheduler.refresh_interval_secs = secs;
    }
    if let Some(secs) = cli.tick_interval {
        config.scheduler.tick_interval_secs = secs;
    }
    config.log_summary();

    let pool = init_pg_pool(&config.postgres)
        .await
        .context("failed to initialise PostgreSQL")?;
    let clock = Arc::new(SystemClock);
    let jobs = Arc::new(PgStore::with_clock(pool.clone(), clock.clone()));
    let timers = Arc::new(PgSchedulerStore::new(pool.clone()));
    let bus = Arc::new(PgBus::new(pool, config.bus.visibility_timeout()));

    match bus.depth(pipeline::ANALYSIS).await {
        Ok(depth) => info!(channel = pipeline::ANALYSIS, depth, "Downstream channel depth"),
        Err(e) => warn!(error = %e, "Could not read channel depth"),
    }

    let fetcher = Arc::new(YoutubeFetcher::from_config(&config.youtube)?);
    let dispatcher = Arc::new(
        FetchDispatcher::new(jobs.clone(), fetcher, bus, clock.clone())
            .with_batch_size(config.scheduler.dispatch_batch_size)
            .with_preprocess(config.youtube.preprocess),
    );
    let trigger = Arc::new(SpawnTrigger::new(
        dispatcher,
        config.scheduler.dispatch_max_concurrency,
    ));

    let scheduler = Arc::new(DynamicScheduler::new(jobs, timers, trigger.clone(), clock));

    let (shutdown_trigger, shutdown) = shutdown_channel();
    tokio::spawn(trigger_on_signal(shutdown_trigger));

    scheduler
        .run(
            config.scheduler.refresh_interval(),
            config.scheduler.tick_interval(),
            shutdown,
        )
        .await;

    let timeout = Duration::from_secs(cli.shutdown_timeout);
    info!(in_flight = trigger.in_flight(), timeout = ?timeout, "Waiting for in-flight dispatches");
    if !trigger.drain(timeout).await {
        warn!("Dispatches still running at shutdown, their comments will be re-fetched");
    }

    info!("ingest-worker shutdown complete");
    Ok(())
}
