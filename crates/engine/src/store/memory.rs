//! In-memory local store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cart_sync_core::{CartSnapshot, UserId};

use super::{LocalStore, StoreError, StoredCart};

/// Local store that keeps the snapshot in process memory.
///
/// Cheaply cloneable; clones share the same slot. Failure switches let tests
/// exercise the degraded-persistence paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    slot: Mutex<Option<StoredCart>>,
    fail_saves: AtomicBool,
    corrupt: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `snapshot`, owned by `owner`.
    #[must_use]
    pub fn with_snapshot(owner: Option<UserId>, snapshot: CartSnapshot) -> Self {
        let store = Self::new();
        *store.slot() = Some(StoredCart { owner, snapshot });
        store
    }

    /// The last successfully saved snapshot, if any.
    #[must_use]
    pub fn stored(&self) -> Option<CartSnapshot> {
        self.slot().as_ref().map(|stored| stored.snapshot.clone())
    }

    /// Owner recorded with the last successfully saved snapshot.
    #[must_use]
    pub fn stored_owner(&self) -> Option<UserId> {
        self.slot().as_ref().and_then(|stored| stored.owner)
    }

    /// Make subsequent saves fail until switched off again.
    pub fn set_fail_saves(&self, fail: bool) {
        self.inner.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent loads report undecodable data.
    pub fn set_corrupt(&self, corrupt: bool) {
        self.inner.corrupt.store(corrupt, Ordering::SeqCst);
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<StoredCart>> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocalStore for MemoryStore {
    fn load(&self) -> Result<StoredCart, StoreError> {
        if self.inner.corrupt.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("stored cart is corrupt".to_string()));
        }
        Ok(self.slot().clone().unwrap_or_default())
    }

    fn save(&self, owner: Option<UserId>, snapshot: &CartSnapshot) -> Result<(), StoreError> {
        if self.inner.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("save rejected".to_string()));
        }
        *self.slot() = Some(StoredCart {
            owner,
            snapshot: snapshot.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_slot() {
        let store = MemoryStore::new();
        let other = store.clone();
        store
            .save(Some(UserId::new(3)), &CartSnapshot::empty().with_version(2))
            .unwrap();
        assert_eq!(other.stored().map(|s| s.version()), Some(2));
        assert_eq!(other.stored_owner(), Some(UserId::new(3)));
        assert_eq!(other.load().unwrap().owner, Some(UserId::new(3)));
    }

    #[test]
    fn test_failure_switches() {
        let store = MemoryStore::new();
        store.set_fail_saves(true);
        assert!(store.save(None, &CartSnapshot::empty()).is_err());
        assert!(store.stored().is_none());

        store.set_corrupt(true);
        assert!(store.load().is_err());
        assert_eq!(store.load_or_empty(), StoredCart::default());
    }
}
