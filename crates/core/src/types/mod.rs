//! Core types for the cart sync engine.
//!
//! This module provides type-safe wrappers for cart domain concepts.

pub mod cart;
pub mod id;
pub mod price;

pub use cart::{CartContext, CartLine, CartSnapshot, LineKey, clamp_quantity};
pub use id::*;
pub use price::{CurrencyCode, Price};
