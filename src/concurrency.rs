// Copyright 2026 The pathkit authors.

//! Shared resource management (spec.md C19 / §5 "Shared resources").
//!
//! Backend-client objects (S3 SDK clients, SSH sessions, HTTP clients) are
//! expensive to construct — an SSH handshake, a bucket-region lookup — so
//! they're cached and keyed the way spec.md §3 "Lifecycle" specifies:
//! `(scheme, authority, user, port, profile)`.
//!
//! The teacher keys its S3/SFTP clients implicitly through `Arc` sharing
//! inside a single `Transport` value (`S3Transport::sub_transport` clones an
//! `Arc<Client>`); this module generalizes that into an explicit
//! process-wide cache so independent calls to the registry's
//! [`crate::registry::BackendFactory::open`] reuse one client per identity
//! instead of reconnecting every time (spec.md §9, "Thread-local client
//! caches").

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Identity a cached client is keyed on.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ClientKey {
    pub scheme: String,
    pub authority: String,
    pub user: String,
    pub port: u16,
    pub profile: String,
}

impl ClientKey {
    pub fn new(
        scheme: impl Into<String>,
        authority: impl Into<String>,
        user: impl Into<String>,
        port: u16,
        profile: impl Into<String>,
    ) -> Self {
        ClientKey {
            scheme: scheme.into(),
            authority: authority.into(),
            user: user.into(),
            port,
            profile: profile.into(),
        }
    }
}

/// Process-wide cache of constructed backend clients, keyed by
/// [`ClientKey`]. Destroyed at process exit along with everything else
/// (spec.md §3 "Backend-client handles ... destroyed at process exit").
#[derive(Default)]
pub struct ClientCache {
    entries: Mutex<HashMap<ClientKey, Arc<dyn Any + Send + Sync>>>,
}

impl fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.entries.lock().expect("client cache lock poisoned").len();
        f.debug_struct("ClientCache").field("len", &n).finish()
    }
}

impl ClientCache {
    pub fn new() -> Self {
        ClientCache::default()
    }

    /// Return the cached client for `key`, or build and cache one with
    /// `build` if there isn't one yet.
    pub fn get_or_create<T, E>(
        &self,
        key: &ClientKey,
        build: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E>
    where
        T: Send + Sync + 'static,
    {
        let mut entries = self.entries.lock().expect("client cache lock poisoned");
        if let Some(existing) = entries.get(key) {
            if let Ok(typed) = existing.clone().downcast::<T>() {
                return Ok(typed);
            }
        }
        let built = Arc::new(build()?);
        entries.insert(key.clone(), built.clone());
        Ok(built)
    }

    pub fn evict(&self, key: &ClientKey) {
        self.entries
            .lock()
            .expect("client cache lock poisoned")
            .remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("client cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A bounded worker pool: at most `capacity` units of work run at once,
/// backing the prefetch reader's forward-fetch window (C8) and the
/// multipart writer's part-upload concurrency (C10).
///
/// Implemented with a counting semaphore rather than a fixed thread count,
/// so it composes with whichever executor (a blocking thread, a tokio
/// task) actually performs the work.
pub struct BoundedPool {
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl BoundedPool {
    pub fn new(capacity: usize) -> Self {
        BoundedPool {
            semaphore: Arc::new(tokio::sync::Semaphore::new(capacity.max(1))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire a permit, blocking (synchronously) until one is free.
    ///
    /// Used from backend code that isn't itself async (the SFTP session
    /// pool, the local-FS parallel copy) but still wants to cap fan-out.
    pub fn acquire_blocking(&self) -> tokio::sync::OwnedSemaphorePermit {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .unwrap_or_else(|_| {
                futures::executor::block_on(Arc::clone(&self.semaphore).acquire_owned())
                    .expect("semaphore never closed")
            })
    }

    pub async fn acquire(&self) -> tokio::sync::OwnedSemaphorePermit {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("semaphore never closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_by_key() {
        let cache = ClientCache::new();
        let key = ClientKey::new("s3", "bucket", "", 0, "default");
        let calls = Mutex::new(0);
        let build = || -> Result<u32, ()> {
            *calls.lock().unwrap() += 1;
            Ok(42)
        };
        let a = cache.get_or_create(&key, build).unwrap();
        let b = cache.get_or_create(&key, build).unwrap();
        assert_eq!(*a, 42);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn distinct_keys_build_independently() {
        let cache = ClientCache::new();
        let a = cache
            .get_or_create(&ClientKey::new("s3", "bucket-a", "", 0, ""), || {
                Ok::<_, ()>(1)
            })
            .unwrap();
        let b = cache
            .get_or_create(&ClientKey::new("s3", "bucket-b", "", 0, ""), || {
                Ok::<_, ()>(2)
            })
            .unwrap();
        assert_eq!((*a, *b), (1, 2));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn bounded_pool_limits_concurrency() {
        let pool = BoundedPool::new(2);
        let _p1 = pool.acquire().await;
        let _p2 = pool.acquire().await;
        assert_eq!(pool.capacity(), 0);
        drop(_p1);
        assert_eq!(pool.capacity(), 1);
    }
}
