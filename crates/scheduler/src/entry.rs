//! [`TimerEntry`]: one live row of the scheduler's timer table.

use chrono::{DateTime, Duration, Utc};
use vibesense_core::{seconds_to_duration, JobId};

#[derive(Debug, Clone, PartialEq)]
pub struct TimerEntry {
    pub job_id: JobId,
    /// Instant at or after which the next fetch is due.
    pub next_fire: DateTime<Utc>,
    pub interval_seconds: f64,
}

impl TimerEntry {
    pub fn new(job_id: JobId, next_fire: DateTime<Utc>, interval_seconds: f64) -> Self {
        Self {
            job_id,
            next_fire,
            interval_seconds,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_fire <= now
    }

    /// The first instant strictly after `now` on this entry's grid.
    ///
    /// Windows missed while the scheduler was down collapse into the fire
    /// that is happening now rather than replaying one by one.
    pub fn following_fire(&self, interval: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
        if interval <= Duration::zero() {
            return now + Duration::seconds(1);
        }
        let mut next = self.next_fire + interval;
        if next <= now {
            let behind = (now - next).num_milliseconds();
            let step = interval.num_milliseconds().max(1);
            let skips = behind / step + 1;
            next += Duration::milliseconds(step * skips);
        }
        next
    }
}
