//! Remote cart store: one authoritative snapshot per authenticated identity.
//!
//! # Contract
//!
//! - `fetch(identity)` returns the stored snapshot, or an empty snapshot when
//!   the identity has none.
//! - `replace(identity, snapshot)` overwrites the stored snapshot entirely.
//!
//! A single `replace` is idempotent, but a sequence of them is only safe when
//! issued in order. The engine's sync queue guarantees that; implementations
//! do not need to.

mod memory;
mod postgres;

pub use memory::MemoryRemote;
pub use postgres::PgRemoteStore;

use std::future::Future;

use cart_sync_core::{CartSnapshot, UserId};
use thiserror::Error;

/// Errors from the remote cart store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored snapshot could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store could not be reached or refused the request.
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
}

/// Per-identity cart storage supporting full fetch and full replace.
pub trait RemoteCartStore: Send + Sync + 'static {
    /// Fetch the snapshot for `identity`.
    fn fetch(
        &self,
        identity: UserId,
    ) -> impl Future<Output = Result<CartSnapshot, RemoteError>> + Send;

    /// Overwrite the snapshot for `identity`.
    fn replace(
        &self,
        identity: UserId,
        snapshot: &CartSnapshot,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}
