//! Keyed entity storage with one lock per entity.
//!
//! The outer `RwLock` is held only long enough to find or insert an entry;
//! all mutation goes through the entity's own `Mutex`, so unrelated players
//! and spots never contend.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Locks a mutex, recovering the guard if a previous holder panicked.
/// Every mutation leaves entities valid between statements, so the data
/// behind a poisoned lock is still usable.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub type Handle<T> = Arc<Mutex<T>>;

#[derive(Debug)]
pub struct EntityTable<T> {
    entries: RwLock<BTreeMap<String, Handle<T>>>,
}

impl<T> Default for EntityTable<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T: Clone> EntityTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, T)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(id, value)| (id, Arc::new(Mutex::new(value))))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Inserts `value` unless `id` is taken. Returns whether it was inserted.
    pub fn insert_new(&self, id: String, value: T) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&id) {
            return false;
        }
        entries.insert(id, Arc::new(Mutex::new(value)));
        true
    }

    pub fn handle(&self, id: &str) -> Option<Handle<T>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn get_cloned(&self, id: &str) -> Option<T> {
        let handle = self.handle(id)?;
        let value = lock(&handle).clone();
        Some(value)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Handles in id order, taken under a single read of the index.
    pub fn handles(&self) -> Vec<Handle<T>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Clones every entity, locking each one in turn.
    pub fn values(&self) -> Vec<T> {
        self.handles().iter().map(|handle| lock(handle).clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
