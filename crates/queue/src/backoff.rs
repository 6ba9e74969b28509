use std::time::Duration;

use vibesense_core::config::BusConfig;

/// Capped exponential backoff for reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub min: Duration,
    pub max: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
}

impl Backoff {
    pub fn from_config(config: &BusConfig) -> Self {
        Self {
            min: Duration::from_secs(config.backoff_min_secs),
            max: Duration::from_secs(config.backoff_max_secs.max(config.backoff_min_secs)),
            max_attempts: config.reconnect_attempts,
        }
    }

    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// budget is spent.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        Some(self.min.saturating_mul(factor).min(self.max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(4),
            max: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}
