// Copyright 2026 The pathkit authors.

//! Shared-cache reader (spec.md C9 / §4.6): multiple concurrent readers
//! over the same object share one block cache, keyed on
//! `(bucket, key, share_key)`, with reference-counted eviction.
//!
//! Grounded in [`crate::concurrency::ClientCache`]'s pattern of a
//! process-wide `Mutex<HashMap<Key, Arc<...>>>`, specialized here to cache
//! bytes rather than client handles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

/// Identity a shared block cache is keyed on.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ShareKey {
    pub bucket: String,
    pub key: String,
    pub share_key: String,
}

struct CacheEntry {
    blocks: HashMap<u64, Bytes>,
    /// Number of open readers consulting this entry; the entry is dropped
    /// from the registry when this reaches zero (spec.md §4.6 "Closing the
    /// last reader releases the cache").
    refcount: usize,
}

/// Process-wide registry of per-object block caches.
#[derive(Default)]
pub struct SharedCacheRegistry {
    entries: Mutex<HashMap<ShareKey, CacheEntry>>,
}

impl SharedCacheRegistry {
    pub fn new() -> Self {
        SharedCacheRegistry::default()
    }

    /// Register a new reader against `key`, returning a handle that must be
    /// released via [`SharedCacheHandle::drop`] (automatic) when the reader
    /// closes.
    pub fn acquire(self: &Arc<Self>, key: ShareKey) -> SharedCacheHandle {
        let mut entries = self.entries.lock().expect("shared cache lock poisoned");
        entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry { blocks: HashMap::new(), refcount: 0 })
            .refcount += 1;
        SharedCacheHandle { registry: self.clone(), key }
    }

    fn get(&self, key: &ShareKey, block_index: u64) -> Option<Bytes> {
        self.entries
            .lock()
            .expect("shared cache lock poisoned")
            .get(key)
            .and_then(|e| e.blocks.get(&block_index).cloned())
    }

    fn put(&self, key: &ShareKey, block_index: u64, bytes: Bytes) {
        if let Some(entry) = self.entries.lock().expect("shared cache lock poisoned").get_mut(key) {
            entry.blocks.insert(block_index, bytes);
        }
    }

    fn release(&self, key: &ShareKey) {
        let mut entries = self.entries.lock().expect("shared cache lock poisoned");
        if let Some(entry) = entries.get_mut(key) {
            entry.refcount -= 1;
            if entry.refcount == 0 {
                entries.remove(key);
            }
        }
    }
}

/// One reader's claim on a shared cache entry; consult [`Self::get`] /
/// [`Self::put`] before issuing a fetch of your own.
pub struct SharedCacheHandle {
    registry: Arc<SharedCacheRegistry>,
    key: ShareKey,
}

impl SharedCacheHandle {
    pub fn get(&self, block_index: u64) -> Option<Bytes> {
        self.registry.get(&self.key, block_index)
    }

    pub fn put(&self, block_index: u64, bytes: Bytes) {
        self.registry.put(&self.key, block_index, bytes);
    }
}

impl Drop for SharedCacheHandle {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ShareKey {
        ShareKey {
            bucket: "b".into(),
            key: "k".into(),
            share_key: "default".into(),
        }
    }

    #[test]
    fn readers_share_cached_blocks() {
        let registry = Arc::new(SharedCacheRegistry::new());
        let a = registry.acquire(key());
        let b = registry.acquire(key());
        a.put(0, Bytes::from_static(b"hello"));
        assert_eq!(b.get(0), Some(Bytes::from_static(b"hello")));
    }

    #[test]
    fn entry_is_dropped_after_last_reader_closes() {
        let registry = Arc::new(SharedCacheRegistry::new());
        {
            let a = registry.acquire(key());
            a.put(0, Bytes::from_static(b"x"));
        }
        let b = registry.acquire(key());
        assert_eq!(b.get(0), None);
    }

    #[test]
    fn cache_survives_while_any_reader_holds_it() {
        let registry = Arc::new(SharedCacheRegistry::new());
        let a = registry.acquire(key());
        let b = registry.acquire(key());
        a.put(0, Bytes::from_static(b"x"));
        drop(a);
        assert_eq!(b.get(0), Some(Bytes::from_static(b"x")));
    }
}
