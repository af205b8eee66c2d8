//! Per-report mutual exclusion.
//!
//! Mutations of one `(project, report)` key (create, update, delete, upload, render) are
//! serialised through an async mutex held for the whole operation. Different keys never contend.
//! Entries are dropped from the registry once the last holder or waiter releases them, including
//! waiters whose `lock` future is dropped before it completes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type ReportKey = (String, String);
type Registry = Arc<Mutex<HashMap<ReportKey, Entry>>>;

#[derive(Debug, Default)]
struct Entry {
    mutex: Arc<AsyncMutex<()>>,
    /// Holders plus waiters.
    users: usize,
}

/// Shared registry of per-report locks. Cloning shares the registry.
#[derive(Clone, Debug, Default)]
pub struct ReportLocks {
    registry: Registry,
}

/// Held while an operation on one report is in progress.
#[derive(Debug)]
pub struct ReportGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: ReportKey,
    registry: Registry,
}

impl ReportLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other operation holds `(project, report)` and takes the lock.
    ///
    /// Dropping the returned future while it waits gives up the place in the queue.
    pub async fn lock(&self, project: &str, report: &str) -> ReportGuard {
        let key = (project.to_string(), report.to_string());
        let mutex = {
            let mut registry = self
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let entry = registry.entry(key.clone()).or_default();
            entry.users += 1;
            entry.mutex.clone()
        };

        // Registered before waiting so cancellation still runs the release in `Drop`.
        let mut guard = ReportGuard {
            guard: None,
            key,
            registry: self.registry.clone(),
        };
        guard.guard = Some(mutex.lock_owned().await);
        guard
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for ReportGuard {
    fn drop(&mut self) {
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.guard.take();

        if let Some(entry) = registry.get_mut(&self.key) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                registry.remove(&self.key);
            }
        }
    }
}
