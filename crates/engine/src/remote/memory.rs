//! In-memory remote cart store.
//!
//! Used by tests and local demos. Besides storing snapshots per identity it can
//! fail on demand and hold `replace` calls until released, which makes slow or
//! overlapping network completions reproducible.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cart_sync_core::{CartSnapshot, UserId};
use tokio::sync::{Semaphore, watch};

use super::{RemoteCartStore, RemoteError};

/// Remote cart store that keeps snapshots in process memory.
///
/// Cheaply cloneable; clones share state.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    inner: Arc<MemoryRemoteInner>,
}

#[derive(Debug)]
struct MemoryRemoteInner {
    carts: Mutex<HashMap<UserId, CartSnapshot>>,
    applied: Mutex<Vec<(UserId, u64)>>,
    failing: AtomicBool,
    held: AtomicBool,
    gate: Semaphore,
    replace_calls: watch::Sender<usize>,
    fetch_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        let (replace_calls, _) = watch::channel(0);
        Self {
            inner: Arc::new(MemoryRemoteInner {
                carts: Mutex::new(HashMap::new()),
                applied: Mutex::new(Vec::new()),
                failing: AtomicBool::new(false),
                held: AtomicBool::new(false),
                gate: Semaphore::new(0),
                replace_calls,
                fetch_calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Seed the stored snapshot for an identity without counting a call.
    pub fn seed(&self, identity: UserId, snapshot: CartSnapshot) {
        self.carts().insert(identity, snapshot);
    }

    /// The stored snapshot for an identity, if any.
    #[must_use]
    pub fn stored(&self, identity: UserId) -> Option<CartSnapshot> {
        self.carts().get(&identity).cloned()
    }

    /// Make every call fail until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Hold `replace` calls until [`MemoryRemote::release`] lets them through.
    pub fn hold_replaces(&self, held: bool) {
        self.inner.held.store(held, Ordering::SeqCst);
        if !held {
            self.release(self.inner.in_flight.load(Ordering::SeqCst));
        }
    }

    /// Let `count` held `replace` calls complete.
    pub fn release(&self, count: usize) {
        self.inner.gate.add_permits(count);
    }

    /// Number of `replace` calls started so far.
    #[must_use]
    pub fn replace_calls(&self) -> usize {
        *self.inner.replace_calls.borrow()
    }

    /// Wait until at least `count` `replace` calls have started.
    pub async fn wait_for_replace_calls(&self, count: usize) {
        let mut rx = self.inner.replace_calls.subscribe();
        let _ = rx.wait_for(|started| *started >= count).await;
    }

    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.inner.fetch_calls.load(Ordering::SeqCst)
    }

    /// Highest number of `replace` calls observed running at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every applied `replace`, in completion order, as `(identity, version)`.
    #[must_use]
    pub fn applied(&self) -> Vec<(UserId, u64)> {
        self.inner
            .applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn carts(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, CartSnapshot>> {
        self.inner.carts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_failing(&self) -> Result<(), RemoteError> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("remote cart store is down".to_string()));
        }
        Ok(())
    }
}

impl RemoteCartStore for MemoryRemote {
    async fn fetch(&self, identity: UserId) -> Result<CartSnapshot, RemoteError> {
        self.inner.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        Ok(self.stored(identity).unwrap_or_default())
    }

    async fn replace(&self, identity: UserId, snapshot: &CartSnapshot) -> Result<(), RemoteError> {
        let running = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(running, Ordering::SeqCst);
        self.inner.replace_calls.send_modify(|started| *started += 1);

        if self.inner.held.load(Ordering::SeqCst)
            && let Ok(permit) = self.inner.gate.acquire().await
        {
            permit.forget();
        }

        let result = self.check_failing().map(|()| {
            self.carts().insert(identity, snapshot.clone());
            self.inner
                .applied
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((identity, snapshot.version()));
        });

        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
