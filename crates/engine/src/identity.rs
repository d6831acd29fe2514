//! Identity signal consumed by the cart engine.
//!
//! The authentication flow lives elsewhere; the engine only needs to know
//! the current identity and be told when it changes.

use cart_sync_core::UserId;
use tokio::sync::watch;

/// Source of "no identity" / "identity X" transitions.
pub trait IdentitySignal: Send + Sync {
    /// The identity right now, `None` when nobody is signed in.
    fn current_identity(&self) -> Option<UserId>;

    /// Receiver that observes every subsequent identity change.
    fn subscribe(&self) -> watch::Receiver<Option<UserId>>;
}

/// Identity signal backed by a `watch` channel.
///
/// The authentication layer calls [`IdentityChannel::sign_in`] and
/// [`IdentityChannel::sign_out`]; the engine subscribes.
#[derive(Debug)]
pub struct IdentityChannel {
    tx: watch::Sender<Option<UserId>>,
}

impl Default for IdentityChannel {
    fn default() -> Self {
        Self::new(None)
    }
}

impl IdentityChannel {
    #[must_use]
    pub fn new(initial: Option<UserId>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn sign_in(&self, identity: UserId) {
        self.tx.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(None);
    }
}

impl IdentitySignal for IdentityChannel {
    fn current_identity(&self) -> Option<UserId> {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }
}
