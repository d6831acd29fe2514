//! Cart Sync Core - Shared cart types.
//!
//! This crate provides the data model shared by the cart engine, its
//! collaborators, and the CLI:
//! - `cart-sync` - Cart engine, merge resolver, local/remote stores
//! - `cart-sync-cli` - Command-line driver and migrations
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices, cart lines, snapshots and cart context

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
