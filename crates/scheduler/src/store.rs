//! The scheduler's timer table.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use vibesense_core::JobId;

use crate::entry::TimerEntry;
use crate::error::SchedulerError;

/// Live mapping `job_id -> next fire instant`.
///
/// Every mutation is atomic per entry, so two schedulers sharing one table
/// never hold two entries for a job or fire one window twice.
#[async_trait]
pub trait SchedulerStore: Send + Sync {
    /// Insert if absent. Returns `false` when the job already has an entry.
    async fn admit(&self, entry: TimerEntry) -> Result<bool, SchedulerError>;

    /// Remove the job's entry. Returns `false` when there was none.
    async fn evict(&self, job_id: JobId) -> Result<bool, SchedulerError>;

    /// Entries with `next_fire <= now`, earliest first.
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<TimerEntry>, SchedulerError>;

    /// Move `next_fire` from `expected` to `next`. Returns `false` if another
    /// caller already moved it (or the entry is gone).
    async fn claim_fire(
        &self,
        job_id: JobId,
        expected: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<bool, SchedulerError>;

    async fn get(&self, job_id: JobId) -> Result<Option<TimerEntry>, SchedulerError>;

    async fn len(&self) -> Result<usize, SchedulerError>;
}

// ── In-memory table ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySchedulerStore {
    entries: Mutex<HashMap<JobId, TimerEntry>>,
}

impl MemorySchedulerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchedulerStore for MemorySchedulerStore {
    async fn admit(&self, entry: TimerEntry) -> Result<bool, SchedulerError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&entry.job_id) {
            return Ok(false);
        }
        entries.insert(entry.job_id, entry);
        Ok(true)
    }

    async fn evict(&self, job_id: JobId) -> Result<bool, SchedulerError> {
        Ok(self.entries.lock().await.remove(&job_id).is_some())
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<TimerEntry>, SchedulerError> {
        let mut due: Vec<_> = self
            .entries
            .lock()
            .await
            .values()
            .filter(|e| e.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|e| e.next_fire);
        Ok(due)
    }

    async fn claim_fire(
        &self,
        job_id: JobId,
        expected: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&job_id) {
            Some(entry) if entry.next_fire == expected => {
                entry.next_fire = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, job_id: JobId) -> Result<Option<TimerEntry>, SchedulerError> {
        Ok(self.entries.lock().await.get(&job_id).cloned())
    }

    async fn len(&self) -> Result<usize, SchedulerError> {
        Ok(self.entries.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn admit_is_insert_if_absent() {
        let store = MemorySchedulerStore::new();
        let id = Uuid::new_v4();
        assert!(store.admit(TimerEntry::new(id, t0(), 60.0)).await.unwrap());
        assert!(!store
            .admit(TimerEntry::new(id, t0() + Duration::hours(1), 60.0))
            .await
            .unwrap());
        assert_eq!(store.len().await.unwrap(), 1);
        assert_eq!(store.get(id).await.unwrap().unwrap().next_fire, t0());
    }

    #[tokio::test]
    async fn evict_is_idempotent() {
        let store = MemorySchedulerStore::new();
        let id = Uuid::new_v4();
        store.admit(TimerEntry::new(id, t0(), 60.0)).await.unwrap();
        assert!(store.evict(id).await.unwrap());
        assert!(!store.evict(id).await.unwrap());
    }

    #[tokio::test]
    async fn claim_fire_is_compare_and_set() {
        let store = MemorySchedulerStore::new();
        let id = Uuid::new_v4();
        store.admit(TimerEntry::new(id, t0(), 60.0)).await.unwrap();

        let next = t0() + Duration::seconds(60);
        assert!(store.claim_fire(id, t0(), next).await.unwrap());
        assert!(!store.claim_fire(id, t0(), next).await.unwrap());
        assert!(store.due(t0()).await.unwrap().is_empty());
        assert_eq!(store.due(next).await.unwrap().len(), 1);
    }
}
