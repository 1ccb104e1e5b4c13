//! Concurrency & Lifecycle: bounds the number of simultaneously open
//! per-project backends, and describes the maintenance scheduler's fixed
//! cadences as pure, testable due-task logic. See `spec.md` §4.8.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;

use crate::constants::{
    DEFAULT_WORKSPACE_LRU_CAPACITY, IDLE_WORKSPACE_CLEANUP_INTERVAL_SECS, RESOURCE_SAMPLE_INTERVAL_SECS,
};
use crate::error::Result;
use crate::storage::StorageBackend;

/// Bounds the number of simultaneously open per-project long-term
/// backends. The oldest unused context is dropped (closing its connection)
/// when a new one is opened past capacity.
pub struct WorkspaceLru {
    inner: Mutex<LruCache<String, Arc<dyn StorageBackend>>>,
}

impl WorkspaceLru {
    /// Build an LRU with the given capacity (default
    /// `DEFAULT_WORKSPACE_LRU_CAPACITY`).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let cap = std::num::NonZeroUsize::new(capacity.max(1)).unwrap_or(std::num::NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Return the cached backend for `project_slug`, refreshing its
    /// recency, or run `make` to open one and insert it, evicting the
    /// least-recently-used entry if the LRU is full.
    ///
    /// # Errors
    ///
    /// Propagates whatever error `make` returns; nothing is inserted into
    /// the LRU in that case.
    pub fn get_or_open(
        &self,
        project_slug: &str,
        make: impl FnOnce() -> Result<Arc<dyn StorageBackend>>,
    ) -> Result<Arc<dyn StorageBackend>> {
        let mut guard = self.inner.lock();
        if let Some(existing) = guard.get(project_slug) {
            return Ok(Arc::clone(existing));
        }
        let backend = make()?;
        guard.put(project_slug.to_string(), Arc::clone(&backend));
        Ok(backend)
    }

    /// Number of currently open project backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True if no project backends are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Explicitly evict one project's backend (e.g. idle-workspace
    /// cleanup decided it should close).
    pub fn evict(&self, project_slug: &str) {
        self.inner.lock().pop(project_slug);
    }
}

impl Default for WorkspaceLru {
    fn default() -> Self {
        Self::new(DEFAULT_WORKSPACE_LRU_CAPACITY)
    }
}

/// One of the fixed maintenance cadences the scheduler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaintenanceTask {
    /// Sample resource usage (cache bytes, open backend count) — every 30s.
    ResourceSample,
    /// Re-evaluate aging profiles whose `next_evaluation_at` is due.
    AgingSweep,
    /// Close workspace contexts unused for the idle cleanup window —
    /// every 24h.
    IdleWorkspaceCleanup,
}

impl MaintenanceTask {
    /// Fixed interval for this task, except `AgingSweep` which is
    /// per-profile and driven by `StorageBackend::due_aging_profiles`
    /// rather than a single global interval.
    #[must_use]
    pub fn fixed_interval(self) -> Option<std::time::Duration> {
        match self {
            MaintenanceTask::ResourceSample => Some(std::time::Duration::from_secs(RESOURCE_SAMPLE_INTERVAL_SECS)),
            MaintenanceTask::IdleWorkspaceCleanup => {
                Some(std::time::Duration::from_secs(IDLE_WORKSPACE_CLEANUP_INTERVAL_SECS))
            }
            MaintenanceTask::AgingSweep => None,
        }
    }
}

/// A single scheduled entry: a task and when it should next run.
#[derive(Debug, Clone, Copy)]
struct ScheduledTask {
    task: MaintenanceTask,
    next_run: DateTime<Utc>,
}

/// Priority queue of fixed-cadence maintenance tasks. Tasks are pure
/// functions of engine state — this scheduler only decides *when*, not
/// *what*; the mcp server's background loop asks `due(now)` and executes
/// whatever comes back.
pub struct MaintenanceScheduler {
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl MaintenanceScheduler {
    /// Start a scheduler with `ResourceSample` and `IdleWorkspaceCleanup`
    /// both due immediately (their first run establishes the baseline).
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            tasks: Mutex::new(vec![
                ScheduledTask {
                    task: MaintenanceTask::ResourceSample,
                    next_run: now,
                },
                ScheduledTask {
                    task: MaintenanceTask::IdleWorkspaceCleanup,
                    next_run: now,
                },
            ]),
        }
    }

    /// Tasks whose `next_run <= now`, removed from the queue (callers
    /// reschedule via `reschedule` after running them).
    pub fn due(&self, now: DateTime<Utc>) -> Vec<MaintenanceTask> {
        let mut guard = self.tasks.lock();
        let (due, remaining): (Vec<_>, Vec<_>) = guard.drain(..).partition(|t| t.next_run <= now);
        *guard = remaining;
        due.into_iter().map(|t| t.task).collect()
    }

    /// Reschedule `task` to run again after its fixed interval, relative
    /// to `now`. Never holds the lock across an await — maintenance tasks
    /// run entirely outside this call.
    pub fn reschedule(&self, task: MaintenanceTask, now: DateTime<Utc>) {
        let Some(interval) = task.fixed_interval() else {
            return;
        };
        let next_run = now + chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::zero());
        self.tasks.lock().push(ScheduledTask { task, next_run });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::storage::ScanFilter;
    use crate::types::{AgingProfile, Memory, MemoryId, Relationship};
    use async_trait::async_trait;

    struct StubBackend(u32);

    #[async_trait]
    impl StorageBackend for StubBackend {
        async fn put(&self, _memory: &Memory) -> Result<()> {
            Ok(())
        }
        async fn get(&self, _id: MemoryId) -> Result<Option<Memory>> {
            Ok(None)
        }
        async fn delete(&self, _id: MemoryId) -> Result<bool> {
            Ok(false)
        }
        async fn scan(&self, _filter: &ScanFilter) -> Result<Vec<Memory>> {
            Ok(Vec::new())
        }
        async fn term_index_lookup(&self, _terms: &[String]) -> Result<Vec<MemoryId>> {
            Ok(Vec::new())
        }
        async fn tag_index_lookup(&self, _tag: &str) -> Result<Vec<MemoryId>> {
            Ok(Vec::new())
        }
        async fn record_access(&self, _id: MemoryId, _at: DateTime<Utc>) -> Result<()> {
            Ok(())
        }
        async fn put_relationship(&self, _relationship: &Relationship) -> Result<()> {
            Ok(())
        }
        async fn relationships_for(&self, _id: MemoryId) -> Result<Vec<Relationship>> {
            Ok(Vec::new())
        }
        async fn delete_relationships_touching(&self, _id: MemoryId) -> Result<u64> {
            Ok(0)
        }
        async fn put_aging_profile(&self, _profile: &AgingProfile) -> Result<()> {
            Ok(())
        }
        async fn get_aging_profile(&self, _id: MemoryId) -> Result<Option<AgingProfile>> {
            Ok(None)
        }
        async fn due_aging_profiles(&self, _as_of: DateTime<Utc>) -> Result<Vec<AgingProfile>> {
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn lru_reuses_existing_backend() {
        let lru = WorkspaceLru::new(2);
        let mut opens = 0;
        let b1 = lru
            .get_or_open("proj-a", || {
                opens += 1;
                Ok(Arc::new(StubBackend(1)) as Arc<dyn StorageBackend>)
            })
            .unwrap();
        let b2 = lru
            .get_or_open("proj-a", || {
                opens += 1;
                Ok(Arc::new(StubBackend(2)) as Arc<dyn StorageBackend>)
            })
            .unwrap();
        assert!(Arc::ptr_eq(&b1, &b2));
        assert_eq!(opens, 1);
    }

    #[test]
    fn lru_evicts_oldest_past_capacity() {
        let lru = WorkspaceLru::new(1);
        lru.get_or_open("proj-a", || Ok(Arc::new(StubBackend(1)) as Arc<dyn StorageBackend>))
            .unwrap();
        assert_eq!(lru.len(), 1);
        lru.get_or_open("proj-b", || Ok(Arc::new(StubBackend(2)) as Arc<dyn StorageBackend>))
            .unwrap();
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn scheduler_reports_tasks_due_immediately() {
        let now = Utc::now();
        let scheduler = MaintenanceScheduler::new(now);
        let due = scheduler.due(now);
        assert!(due.contains(&MaintenanceTask::ResourceSample));
        assert!(due.contains(&MaintenanceTask::IdleWorkspaceCleanup));
    }

    #[test]
    fn scheduler_does_not_report_tasks_before_they_are_due() {
        let now = Utc::now();
        let scheduler = MaintenanceScheduler::new(now);
        let _ = scheduler.due(now);
        scheduler.reschedule(MaintenanceTask::ResourceSample, now);
        let due_immediately_after = scheduler.due(now);
        assert!(!due_immediately_after.contains(&MaintenanceTask::ResourceSample));
    }
}
