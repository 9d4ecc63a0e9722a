//! Deduplication of runtime objects built from structurally equal configs.
//!
//! Every distinct key owns at most one value. Construction is lazy and runs
//! once per key even under concurrent first access; callers racing on the
//! same key wait for the winner's result. Values are reference counted and
//! stopped when the last holder releases them.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;
use tracing::warn;

use crate::Result;

/// A runtime object owning background work that must be shut down on eviction
pub trait Stoppable: Send + Sync + 'static {
    /// Signals background work to stop. Must not block.
    fn stop(&self);
}

struct Slot<V> {
    value: OnceCell<Arc<V>>,
    refs: AtomicUsize,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self {
            value: OnceCell::new(),
            refs: AtomicUsize::new(0),
        }
    }
}

pub struct ConfigMap<K, V> {
    // refcount changes happen under the shard lock of the key
    entries: DashMap<K, Arc<Slot<V>>>,
}

struct RefGuard<'a, K, V>
where
    K: Hash + Eq + Clone,
    V: Stoppable,
{
    map: &'a ConfigMap<K, V>,
    key: &'a K,
    slot: Arc<Slot<V>>,
    armed: bool,
}

impl<K, V> Drop for RefGuard<'_, K, V>
where
    K: Hash + Eq + Clone,
    V: Stoppable,
{
    fn drop(&mut self) {
        if self.armed {
            self.map.release_slot(self.key, Some(&self.slot));
        }
    }
}

impl<K, V> Default for ConfigMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Stoppable,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ConfigMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Stoppable,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the value for `key`, building it with `ctor` if absent.
    ///
    /// Each successful call takes a reference that must be given back with
    /// [`ConfigMap::release`]. A failed or cancelled call takes no reference
    /// and a failed construction is not cached.
    pub async fn get<F, Fut>(
        &self,
        key: &K,
        ctor: F,
    ) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let slot = {
            let entry = self.entries.entry(key.clone()).or_insert_with(|| Arc::new(Slot::new()));
            entry.refs.fetch_add(1, Ordering::SeqCst);
            entry.value().clone()
        };
        // gives the reference back on error or if this future is dropped
        let mut guard = RefGuard {
            map: self,
            key,
            slot: slot.clone(),
            armed: true,
        };

        let value = slot
            .value
            .get_or_try_init(move || async move {
                debug!("constructing new shared config");
                ctor().await.map(Arc::new)
            })
            .await?
            .clone();

        guard.armed = false;
        Ok(value)
    }

    /// Returns the live value for `key` without taking a reference
    pub fn peek(
        &self,
        key: &K,
    ) -> Option<Arc<V>> {
        self.entries.get(key).and_then(|slot| slot.value.get().cloned())
    }

    /// Gives back one reference. The last release evicts the entry and
    /// stops its value; returns `true` in that case.
    pub fn release(
        &self,
        key: &K,
    ) -> bool {
        self.release_slot(key, None)
    }

    // `expected` skips the release if the entry was replaced after a stop_all
    fn release_slot(
        &self,
        key: &K,
        expected: Option<&Arc<Slot<V>>>,
    ) -> bool {
        let evicted = match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) if expected.is_some_and(|slot| !Arc::ptr_eq(slot, entry.get())) => None,
            Entry::Occupied(entry) => {
                if entry.get().refs.fetch_sub(1, Ordering::SeqCst) == 1 {
                    Some(entry.remove())
                } else {
                    None
                }
            }
            Entry::Vacant(_) => {
                warn!("release called for a config that is not registered");
                None
            }
        };

        match evicted.and_then(|slot| slot.value.get().cloned()) {
            Some(value) => {
                debug!("last reference released; stopping shared config");
                value.stop();
                true
            }
            None => false,
        }
    }

    /// Evicts and stops every entry regardless of outstanding references
    pub fn stop_all(&self) {
        let keys: Vec<K> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, slot)) = self.entries.remove(&key) {
                if let Some(value) = slot.value.get() {
                    value.stop();
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
