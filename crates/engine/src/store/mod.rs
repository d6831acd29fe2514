//! Persistent local store for the device's cart snapshot.
//!
//! The local store holds exactly one snapshot per device. It must never make
//! the cart unusable: [`LocalStore::load_or_empty`] turns every failure into
//! an empty snapshot, and save failures are reported to the engine, which
//! keeps operating in memory and retries on the next mutation.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use cart_sync_core::{CartSnapshot, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Errors from the local snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing storage failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// The device's cart as held by the local store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCart {
    /// Identity whose session wrote the snapshot; `None` for a guest cart.
    #[serde(default)]
    pub owner: Option<UserId>,
    pub snapshot: CartSnapshot,
}

/// Durable storage for the current device's cart snapshot.
///
/// Both operations are synchronous: the engine calls them while it holds the
/// snapshot, so saves are applied in mutation order.
pub trait LocalStore: Send + Sync + 'static {
    /// Load the stored cart. Missing data is an empty guest cart, not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the stored data cannot be read or decoded.
    fn load(&self) -> Result<StoredCart, StoreError>;

    /// Replace the stored cart with `snapshot`, owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the snapshot cannot be written.
    fn save(&self, owner: Option<UserId>, snapshot: &CartSnapshot) -> Result<(), StoreError>;

    /// Load the stored cart, falling back to an empty guest cart on any failure.
    fn load_or_empty(&self) -> StoredCart {
        self.load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load local cart, starting empty");
            StoredCart::default()
        })
    }
}
