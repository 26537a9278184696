//! In-memory patient cache.
//!
//! Keyed by patient id, shared by every concurrent report request. Entries
//! are immutable after insert (`Arc<PatientRecord>`) and never expire:
//! [`PatientCache::invalidate`] is the only removal path and is reserved for
//! the administrative cache-busting endpoint, not the request path.
//!
//! The cache owns its synchronization; callers never take external locks.
//! Reads and writes are linearizable per key, and concurrent `put`s for the
//! same id leave the map holding one of them intact.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::patient::PatientRecord;

/// Process-wide patient cache, constructed once and injected into the
/// resolver (no static singleton). Teardown follows the owning `Arc`.
#[derive(Debug, Default)]
pub struct PatientCache {
    entries: RwLock<HashMap<String, Arc<PatientRecord>>>,
}

impl PatientCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Looks up a record by patient id.
    pub fn get(&self, id: &str) -> Option<Arc<PatientRecord>> {
        self.read_entries().get(id).cloned()
    }

    /// Stores a record under the given id, replacing any previous entry
    /// (last writer wins). Returns the shared handle that was stored.
    pub fn put(&self, id: &str, record: PatientRecord) -> Arc<PatientRecord> {
        let shared = Arc::new(record);
        self.write_entries().insert(id.to_owned(), shared.clone());
        shared
    }

    /// Removes the entry for the given id. Returns whether an entry existed.
    pub fn invalidate(&self, id: &str) -> bool {
        let removed = self.write_entries().remove(id).is_some();
        if removed {
            tracing::info!(patient_id = id, "patient evicted from cache");
        }
        removed
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    /// Whether the cache holds no records.
    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    // No code path panics while holding the lock, so a poisoned lock still
    // guards a consistent map; recover it instead of surfacing an error.
    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<PatientRecord>>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<PatientRecord>>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
