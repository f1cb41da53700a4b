//! Concurrent find-or-create tables.
//!
//! Every memoization point in the type system goes through a
//! [`FindOrCreateTable`]: interned generic instantiations, async variants,
//! task-returning wrappers, resumption stubs and continuation layouts.
//!
//! # Guarantees
//!
//! - For a given key the `create` closure runs at most once over the life of
//!   the table, even when many threads miss at the same time.
//! - All readers observe the same value for a key.
//!
//! Creation happens while the key's shard is write-locked, so a `create`
//! closure must never touch the table it is populating. Touching other
//! tables is fine.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rustc_hash::FxBuildHasher;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// A concurrent map that creates each value at most once.
pub struct FindOrCreateTable<K, V> {
    entries: DashMap<K, V, FxBuildHasher>,
    /// Number of values constructed by `create` closures.
    created: AtomicU64,
}

impl<K, V> FindOrCreateTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_hasher(FxBuildHasher),
            created: AtomicU64::new(0),
        }
    }

    /// Look up a value without creating it.
    #[inline]
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Look up a value, creating it with `create` on a miss.
    pub fn get_or_create_with<F>(&self, key: K, create: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        // Fast path: shared lock only
        if let Some(entry) = self.entries.get(&key) {
            return entry.value().clone();
        }

        match self.entries.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let value = create(entry.key());
                self.created.fetch_add(1, Ordering::Relaxed);
                entry.insert(value.clone());
                value
            }
        }
    }

    /// Fallible variant of [`get_or_create_with`](Self::get_or_create_with).
    ///
    /// Nothing is inserted when `create` fails.
    pub fn try_get_or_create_with<F, E>(&self, key: K, create: F) -> Result<V, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.value().clone());
        }

        match self.entries.entry(key) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let value = create(entry.key())?;
                self.created.fetch_add(1, Ordering::Relaxed);
                entry.insert(value.clone());
                Ok(value)
            }
        }
    }

    /// Publish a value built outside the table.
    ///
    /// The first writer wins: if the key is already present, `value` is
    /// dropped and the existing value is returned.
    pub fn insert_if_absent(&self, key: K, value: V) -> V {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                self.created.fetch_add(1, Ordering::Relaxed);
                entry.insert(value.clone());
                value
            }
        }
    }

    /// Check whether a key is present.
    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of values that were actually constructed.
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Snapshot of all values, in no particular order.
    pub fn values(&self) -> Vec<V> {
        self.entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl<K, V> Default for FindOrCreateTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for FindOrCreateTable<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindOrCreateTable")
            .field("len", &self.entries.len())
            .field("created", &self.created.load(Ordering::Relaxed))
            .finish()
    }
}
