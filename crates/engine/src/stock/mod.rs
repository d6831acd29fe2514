//! Stock oracle: the current purchasable ceiling for a product or variant.
//!
//! Implementations:
//! - [`HttpStockOracle`] - queries the stock lookup service over HTTP
//! - [`CachedStockOracle`] - wraps any oracle with a short-lived `moka` cache
//! - [`FixedStockOracle`] - in-memory table, loadable from YAML

mod cached;
mod fixed;
mod http;

pub use cached::CachedStockOracle;
pub use fixed::{FixedStockOracle, StockEntry};
pub use http::HttpStockOracle;

use std::future::Future;

use cart_sync_core::LineKey;
use thiserror::Error;

/// Errors that can occur when looking up stock.
#[derive(Debug, Error)]
pub enum StockError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response or stock file could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by the stock service.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The oracle has no record of the product/variant.
    #[error("Unknown product: {0}")]
    UnknownProduct(LineKey),
}

/// Answers "what is the current purchasable ceiling for this line key?".
pub trait StockOracle: Send + Sync + 'static {
    /// Current ceiling for `key`; zero means not purchasable.
    fn current_ceiling(&self, key: LineKey)
    -> impl Future<Output = Result<u32, StockError>> + Send;
}
