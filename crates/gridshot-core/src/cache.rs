//! Shared content-addressable resource cache.
//!
//! One mapping from resource id (URL while pending, hash hex once
//! resolved) to a resolved-or-in-flight slot. The cache is process-wide
//! by default so identical assets across unrelated checks in one process
//! are fetched, hashed and uploaded at most once, but it is a plain
//! injectable value: pass a fresh one to isolate a client.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, OnceLock};

use tokio::sync::OnceCell;
use tracing::trace;

use crate::domain::{Resource, ResourceHandle};

type Slot = std::sync::Arc<OnceCell<ResourceHandle>>;

/// Mapping from resource id to resource or in-flight resolution.
///
/// Cloning is cheap and shares the underlying map.
#[derive(Clone, Default)]
pub struct ResourceCache {
    slots: std::sync::Arc<Mutex<HashMap<String, Slot>>>,
}

impl ResourceCache {
    /// An empty, isolated cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default cache.
    pub fn shared() -> Self {
        static SHARED: OnceLock<ResourceCache> = OnceLock::new();
        SHARED.get_or_init(ResourceCache::new).clone()
    }

    fn slot(&self, id: &str) -> Slot {
        let mut slots = self.slots.lock().expect("resource cache poisoned");
        slots.entry(id.to_string()).or_default().clone()
    }

    /// Resolve `id` through `init`, sharing one in-flight resolution
    /// among concurrent callers: the first caller runs `init`, everyone
    /// else awaits the same settlement.
    pub async fn resolve_with<F, Fut>(&self, id: &str, init: F) -> ResourceHandle
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Resource>,
    {
        let slot = self.slot(id);
        slot.get_or_init(|| async {
            trace!(id, "resolving resource");
            std::sync::Arc::new(init().await)
        })
        .await
        .clone()
    }

    /// Insert an already-resolved resource. A second insert with the same
    /// id is a no-op; identical ids imply identical content.
    pub fn insert(&self, resource: Resource) -> ResourceHandle {
        let id = resource.id();
        let slot = self.slot(&id);
        let handle = std::sync::Arc::new(resource);
        let _ = slot.set(handle.clone());
        slot.get().cloned().unwrap_or(handle)
    }

    /// Look up a settled resource without triggering resolution.
    pub fn get(&self, id: &str) -> Option<ResourceHandle> {
        let slots = self.slots.lock().expect("resource cache poisoned");
        slots.get(id).and_then(|slot| slot.get().cloned())
    }

    /// Number of ids known to the cache, settled or in flight.
    pub fn len(&self) -> usize {
        self.slots.lock().expect("resource cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Mainly for tests and long-lived processes that
    /// want to release memory between suites.
    pub fn clear(&self) {
        self.slots.lock().expect("resource cache poisoned").clear();
    }
}
