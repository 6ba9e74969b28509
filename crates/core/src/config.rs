use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub postgres: PostgresConfig,
    pub scheduler: SchedulerConfig,
    pub bus: BusConfig,
    pub youtube: YoutubeConfig,
    pub analysis: AnalysisConfig,
    pub smtp: SmtpConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `VIBESENSE_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("VIBESENSE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            postgres: PostgresConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
            bus: BusConfig::from_env_profiled(p),
            youtube: YoutubeConfig::from_env_profiled(p),
            analysis: AnalysisConfig::from_env_profiled(p),
            smtp: SmtpConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  postgres:    host={}, db={}", self.postgres.host, self.postgres.database);
        tracing::info!(
            "  scheduler:   refresh={}s, tick={}s, batch={}",
            self.scheduler.refresh_interval_secs,
            self.scheduler.tick_interval_secs,
            self.scheduler.dispatch_batch_size
        );
        tracing::info!(
            "  bus:         visibility={}s, max_attempts={}",
            self.bus.visibility_timeout_secs,
            self.bus
                .max_attempts
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unbounded".to_string())
        );
        tracing::info!(
            "  youtube:     url={}, api_key={}",
            self.youtube.api_url,
            if self.youtube.is_configured() { "set" } else { "(none)" }
        );
        tracing::info!("  analysis:    url={}", self.analysis.url);
        tracing::info!(
            "  smtp:        host={}, port={}, from={}",
            self.smtp.host.as_deref().unwrap_or("(none)"),
            self.smtp.port,
            self.smtp.from.as_deref().unwrap_or("(none)")
        );
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_parse(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "vibesense"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_parse(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cadence of the refresh pass that admits newly created jobs.
    pub refresh_interval_secs: u64,
    /// Cadence of the tick pass that fires due jobs.
    pub tick_interval_secs: u64,
    /// Maximum comments per dispatched pipeline message.
    pub dispatch_batch_size: usize,
    /// Maximum concurrent fetch-and-dispatch runs.
    pub dispatch_max_concurrency: usize,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            refresh_interval_secs: profiled_env_parse(p, "SCHEDULER_REFRESH_SECS", 60),
            tick_interval_secs: profiled_env_parse(p, "SCHEDULER_TICK_SECS", 1),
            dispatch_batch_size: profiled_env_parse(p, "DISPATCH_BATCH_SIZE", 50usize).max(1),
            dispatch_max_concurrency: profiled_env_parse(p, "DISPATCH_MAX_CONCURRENCY", 16usize)
                .max(1),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }
}

// ── Pipeline bus ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// How long a received message stays invisible before redelivery.
    pub visibility_timeout_secs: u64,
    /// Idle sleep between empty polls.
    pub poll_interval_ms: u64,
    /// Transient-failure budget before dead-lettering (`None` = unbounded).
    pub max_attempts: Option<u32>,
    /// Consecutive connection failures tolerated before a consumer exits.
    pub reconnect_attempts: u32,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
    /// Messages handled concurrently per consumer.
    pub concurrency: usize,
}

impl BusConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            visibility_timeout_secs: profiled_env_parse(p, "BUS_VISIBILITY_TIMEOUT_SECS", 300),
            poll_interval_ms: profiled_env_parse(p, "BUS_POLL_INTERVAL_MS", 500),
            max_attempts: profiled_env_opt(p, "BUS_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .filter(|n: &u32| *n > 0),
            reconnect_attempts: profiled_env_parse(p, "BUS_RECONNECT_ATTEMPTS", 5),
            backoff_min_secs: profiled_env_parse(p, "BUS_BACKOFF_MIN_SECS", 4),
            backoff_max_secs: profiled_env_parse(p, "BUS_BACKOFF_MAX_SECS", 60),
            concurrency: profiled_env_parse(p, "BUS_CONCURRENCY", 4usize).max(1),
        }
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ── YouTube Data API ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_url: String,
    /// Normalize comment text before it is sent to analysis.
    pub preprocess: bool,
}

impl YoutubeConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            api_key: profiled_env_opt(p, "YOUTUBE_API_KEY"),
            api_url: profiled_env_or(p, "YOUTUBE_API_URL", "https://www.googleapis.com/youtube/v3"),
            preprocess: profiled_env_bool(p, "INGEST_PREPROCESS", true),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

// ── Analysis model server ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub url: String,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl AnalysisConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "ANALYSIS_URL", "http://localhost:8001"),
            batch_size: profiled_env_parse(p, "ANALYSIS_BATCH_SIZE", 32usize).max(1),
            timeout_secs: profiled_env_parse(p, "ANALYSIS_TIMEOUT_SECS", 60),
        }
    }
}

// ── SMTP ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub tls: bool,
    pub from: Option<String>,
    #[serde(skip_serializing)]
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl SmtpConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_opt(p, "SMTP_HOST"),
            port: profiled_env_parse(p, "SMTP_PORT", 587),
            tls: profiled_env_bool(p, "SMTP_TLS", true),
            from: profiled_env_opt(p, "SMTP_FROM"),
            username: profiled_env_opt(p, "SMTP_USERNAME"),
            password: profiled_env_opt(p, "SMTP_PASSWORD"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.host.is_some() && self.from.is_some()
    }
}
