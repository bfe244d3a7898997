//! In-memory index of live simulated sandboxes.
//!
//! Writers are the runtime's request handlers (unbounded concurrency); readers
//! are the housekeeping loops, which only ever work on a [`Snapshot`]. The
//! lock is held just long enough to swap an entry or clone the index, so a
//! slow store call in a loop never delays sandbox creation or removal.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::record::{ResourceList, SandboxConfig, SandboxRecord, TerminationOutcome};

/// Point-in-time copy of the cache. Records are shared read-only, so holding
/// or dropping a snapshot never affects the live cache.
pub type Snapshot = HashMap<String, Arc<SandboxRecord>>;

pub struct SandboxCache {
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, Arc<SandboxRecord>>>,
}

impl Default for SandboxCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Record a newly created sandbox, stamping `started_at` with the current
    /// time. An existing entry under the same id is replaced.
    pub fn insert(
        &self,
        id: impl Into<String>,
        config: SandboxConfig,
        requested: ResourceList,
        simulated_duration: Duration,
        outcome: TerminationOutcome,
    ) -> Arc<SandboxRecord> {
        let id = id.into();
        let record = Arc::new(SandboxRecord::new(
            id.clone(),
            config,
            requested,
            self.clock.now(),
            simulated_duration,
            outcome,
        ));

        let replaced = self.write().insert(id, Arc::clone(&record));
        if replaced.is_some() {
            debug!(sandbox_id = %record.id(), "replaced existing sandbox entry");
        }
        record
    }

    /// Remove a sandbox. Returns `false` when the id was not present.
    pub fn delete(&self, id: &str) -> bool {
        self.write().remove(id).is_some()
    }

    /// Remove `record` only if it is still the live entry for its id, so a
    /// sandbox re-created under the same id is left alone.
    pub fn delete_if_current(&self, record: &Arc<SandboxRecord>) -> bool {
        let mut entries = self.write();
        match entries.get(record.id()) {
            Some(live) if Arc::ptr_eq(live, record) => {
                entries.remove(record.id());
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<SandboxRecord>> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the lock cannot leave the map half-updated
    // (every mutation is a single insert/remove), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<SandboxRecord>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<SandboxRecord>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
