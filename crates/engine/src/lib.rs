//! Cart state synchronization engine.
//!
//! Keeps a shopper's cart consistent across the device-local store, the
//! in-memory view, and the remote cart of an authenticated identity. The
//! engine clamps every quantity to the live stock ceiling, merges the
//! anonymous cart into the identity's remote cart at login, and pushes
//! changes to the remote store in order without blocking the caller.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod merge;
pub mod remote;
pub mod stock;
pub mod store;
pub mod sync;

pub use config::{ConfigError, EngineConfig, StockConfig};
pub use engine::{CartEngine, MutationOutcome, ProductRef, StockRefresh, VariantRef};
pub use error::{CartError, Result};
pub use identity::{IdentityChannel, IdentitySignal};
pub use merge::{CeilingTable, MergeReport, Merged, merge, merge_with_report};
pub use remote::{MemoryRemote, PgRemoteStore, RemoteCartStore, RemoteError};
pub use stock::{
    CachedStockOracle, FixedStockOracle, HttpStockOracle, StockEntry, StockError, StockOracle,
};
pub use store::{FileStore, LocalStore, MemoryStore, StoreError, StoredCart};
pub use sync::{SyncStatus, SyncTicket, VersionGate};
