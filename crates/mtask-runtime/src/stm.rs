//! Software transactional memory over a keyed value store
//!
//! A [`Store`] maps string keys to versioned cells. Readers and writers work
//! through a [`Transaction`]: `using` snapshots the named keys (values plus
//! versions), `get`/`set` operate on the snapshot and a local write set, and
//! `commit` applies the write set atomically. If any written key's live
//! version moved since the snapshot the whole commit is refused with
//! `ConcurrentUpdate` and the store is left untouched.
//!
//! The store is `Send` and cheap to clone (handles share one `Arc`); the lock
//! is held only inside `using`, `commit` and the non-transactional helpers,
//! never across user code.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;

use mtask_core::error::StmError;
use mtask_core::ktrace;

struct VersionedCell<T> {
    value: T,
    version: u64,
}

struct Counters {
    commits: AtomicU64,
    conflicts: AtomicU64,
}

/// Commit/conflict counters for one store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub commits: u64,
    pub conflicts: u64,
}

/// Keyed, versioned, thread-safe value store
pub struct Store<T> {
    cells: Arc<Mutex<HashMap<String, VersionedCell<T>>>>,
    counters: Arc<Counters>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            cells: Arc::clone(&self.cells),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<T: Clone + Send> Store<T> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            cells: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(Counters {
                commits: AtomicU64::new(0),
                conflicts: AtomicU64::new(0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VersionedCell<T>>> {
        // Cells hold plain data; a poisoned lock only means a panic elsewhere
        match self.cells.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Write a key outside any transaction
    ///
    /// Behaves like a committed single-key write: the version still advances
    /// by one, so open transactions that snapshotted the key will conflict.
    pub fn insert(&self, key: impl Into<String>, value: T) {
        let mut cells = self.lock();
        match cells.entry(key.into()) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                let cell = e.get_mut();
                cell.value = value;
                cell.version += 1;
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(VersionedCell { value, version: 1 });
            }
        }
    }

    /// Read a key's current value outside any transaction
    pub fn get(&self, key: &str) -> Option<T> {
        self.lock().get(key).map(|c| c.value.clone())
    }

    /// Current version of a key, `None` if it does not exist
    pub fn version(&self, key: &str) -> Option<u64> {
        self.lock().get(key).map(|c| c.version)
    }

    /// Open a transaction tracking the given keys
    ///
    /// Values and versions are snapshotted under the lock; everything after
    /// that runs lock-free until `commit`.
    pub fn using(&self, keys: &[&str]) -> Transaction<T> {
        let cells = self.lock();
        let snapshot = keys
            .iter()
            .map(|&k| {
                let seen = cells.get(k).map(|c| (c.value.clone(), c.version));
                (k.to_string(), seen)
            })
            .collect();
        Transaction {
            store: self.clone(),
            snapshot,
            writes: HashMap::new(),
        }
    }

    /// Counter snapshot
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            commits: self.counters.commits.load(Ordering::Relaxed),
            conflicts: self.counters.conflicts.load(Ordering::Relaxed),
        }
    }

    /// Number of keys in the store
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T: Clone + Send> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// In-flight transaction over a set of tracked keys
///
/// Reads see the snapshot overlaid with local writes; nothing is visible to
/// other handles until `commit` succeeds.
pub struct Transaction<T> {
    store: Store<T>,
    /// Tracked key -> (value, version) at snapshot time, `None` if absent
    snapshot: HashMap<String, Option<(T, u64)>>,
    writes: HashMap<String, T>,
}

impl<T: Clone + Send> Transaction<T> {
    /// Read a tracked key
    ///
    /// `UnknownKey` covers both untracked keys and keys that did not exist
    /// at snapshot time; create the latter with `set` before reading.
    pub fn get(&self, key: &str) -> Result<T, StmError> {
        if let Some(value) = self.writes.get(key) {
            return Ok(value.clone());
        }
        match self.snapshot.get(key) {
            Some(Some((value, _))) => Ok(value.clone()),
            _ => Err(StmError::UnknownKey),
        }
    }

    /// Stage a write to a tracked key
    pub fn set(&mut self, key: &str, value: T) -> Result<(), StmError> {
        if !self.snapshot.contains_key(key) {
            return Err(StmError::UnknownKey);
        }
        self.writes.insert(key.to_string(), value);
        Ok(())
    }

    /// Check whether any writes are staged
    pub fn is_dirty(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Atomically apply the write set
    ///
    /// All-or-nothing: every written key's live version must still match the
    /// snapshot, otherwise nothing is applied and `ConcurrentUpdate` is
    /// returned. Each applied key's version advances by exactly one. A
    /// read-only transaction commits trivially.
    pub fn commit(self) -> Result<(), StmError> {
        if self.writes.is_empty() {
            return Ok(());
        }
        let mut cells = self.store.lock();

        for key in self.writes.keys() {
            let snap_version = match self.snapshot.get(key) {
                Some(seen) => seen.as_ref().map(|(_, v)| *v),
                None => return Err(StmError::UnknownKey),
            };
            let live_version = cells.get(key).map(|c| c.version);
            if snap_version != live_version {
                self.store.counters.conflicts.fetch_add(1, Ordering::Relaxed);
                ktrace!("stm: conflict on '{}'", key);
                return Err(StmError::ConcurrentUpdate);
            }
        }

        for (key, value) in self.writes {
            match cells.entry(key) {
                std::collections::hash_map::Entry::Occupied(mut e) => {
                    let cell = e.get_mut();
                    cell.value = value;
                    cell.version += 1;
                }
                std::collections::hash_map::Entry::Vacant(e) => {
                    e.insert(VersionedCell { value, version: 1 });
                }
            }
        }
        self.store.counters.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Run a read-modify-write cycle until it commits
///
/// Re-snapshots and re-runs `body` on every `ConcurrentUpdate`, sleeping a
/// small random jitter between attempts so contending threads desynchronize.
/// Gives up after `max_attempts`.
pub fn retry<T, R, F>(
    store: &Store<T>,
    keys: &[&str],
    max_attempts: usize,
    mut body: F,
) -> Result<R, StmError>
where
    T: Clone + Send,
    F: FnMut(&mut Transaction<T>) -> Result<R, StmError>,
{
    let mut rng = rand::rng();
    for attempt in 1..=max_attempts {
        let mut tx = store.using(keys);
        let out = body(&mut tx)?;
        match tx.commit() {
            Ok(()) => return Ok(out),
            Err(StmError::ConcurrentUpdate) if attempt < max_attempts => {
                let jitter = rng.random_range(10..=100u64) * attempt as u64;
                std::thread::sleep(Duration::from_micros(jitter));
            }
            Err(e) => return Err(e),
        }
    }
    Err(StmError::ConcurrentUpdate)
}
