// Preview handles - revocable references to in-memory image bytes

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// URL-like name of a preview. Resolves only while its handle is alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviewRef(String);

impl PreviewRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry of live preview handles
#[derive(Debug, Default)]
pub struct PreviewStore {
    entries: Mutex<HashMap<u64, Arc<[u8]>>>,
    next_id: AtomicU64,
}

impl PreviewStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register bytes and hand out the only handle that can revoke them
    pub fn create(self: &Arc<Self>, bytes: &[u8]) -> PreviewHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.lock().insert(id, Arc::from(bytes));

        tracing::trace!(id, "preview handle created");

        PreviewHandle {
            id,
            url: PreviewRef(format!("blob:wardrobe/{}", id)),
            store: Arc::clone(self),
        }
    }

    /// Look up the bytes behind a preview, if it has not been revoked
    pub fn resolve(&self, preview: &PreviewRef) -> Option<Arc<[u8]>> {
        let id = preview.0.strip_prefix("blob:wardrobe/")?.parse::<u64>().ok()?;
        self.lock().get(&id).cloned()
    }

    /// Number of handles not yet released
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    fn revoke(&self, id: u64) {
        if self.lock().remove(&id).is_some() {
            tracing::trace!(id, "preview handle revoked");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<[u8]>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Owning handle for a preview. Revoked on `release` or drop.
#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    url: PreviewRef,
    store: Arc<PreviewStore>,
}

impl PreviewHandle {
    pub fn url(&self) -> &PreviewRef {
        &self.url
    }

    pub fn release(self) {
        // Drop does the revoke
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.store.revoke(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_lifecycle() {
        let store = PreviewStore::new();
        let handle = store.create(b"abc");
        let url = handle.url().clone();

        assert_eq!(store.live_count(), 1);
        assert_eq!(store.resolve(&url).as_deref(), Some(&b"abc"[..]));

        handle.release();
        assert_eq!(store.live_count(), 0);
        assert!(store.resolve(&url).is_none());
    }

    #[test]
    fn test_handles_are_distinct() {
        let store = PreviewStore::new();
        let a = store.create(b"a");
        let b = store.create(b"b");
        assert_ne!(a.url(), b.url());

        drop(a);
        assert_eq!(store.live_count(), 1);
        assert!(store.resolve(b.url()).is_some());
    }

    #[test]
    fn test_foreign_refs_do_not_resolve() {
        let store = PreviewStore::new();
        let _handle = store.create(b"x");
        assert!(store.resolve(&PreviewRef("blob:elsewhere/1".into())).is_none());
    }
}
