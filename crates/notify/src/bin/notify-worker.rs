//! notify-worker: Stage Consumer on the `notification` channel.
//!
//! Renders each aggregate report and emails it to the job's recipient.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use vibesense_core::config::{load_dotenv, Config};
use vibesense_core::pipeline;
use vibesense_notify::{EmailNotifier, NotificationStage};
use vibesense_queue::{shutdown_channel, trigger_on_signal, PgBus, StageConsumer};
use vibesense_store::{init_pg_pool, PgStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Notification stage worker.
#[derive(Parser, Debug)]
#[command(name = "notify-worker", version, about)]
struct Cli {
    /// Concurrent handlers (overrides BUS_CONCURRENCY).
    #[arg(long)]
    concurrency: Option<usize>,

    /// Shutdown timeout in seconds.
    #[arg(long, env = "NOTIFY_SHUTDOWN_TIMEOUT", default_value_t = 10)]
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

    let notifier = Arc::new(
        EmailNotifier::from_config(&config.smtp).context("SMTP is not configured")?,
    );

    let pool = init_pg_pool(&config.postgres)
        .await
        .context("failed to initialise PostgreSQL")?;
    let jobs = Arc::new(PgStore::new(pool.clone()));
    let bus = Arc::new(PgBus::new(pool, config.bus.visibility_timeout()));

    let consumer = Arc::new(
        StageConsumer::builder(pipeline::NOTIFICATION)
            .bus_config(&config.bus)
            .shutdown_timeout(Duration::from_secs(cli.shutdown_timeout))
            .build(bus, Arc::new(NotificationStage::new(jobs, notifier))),
    );

    let (shutdown_trigger, shutdown) = shutdown_channel();
    tokio::spawn(trigger_on_signal(shutdown_trigger));

    consumer.run(shutdown).await?;
    info!("notify-worker exited cleanly");
    Ok(())
}
