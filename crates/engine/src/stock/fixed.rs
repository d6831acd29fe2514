//! In-memory stock table.
//!
//! Useful for tests and for running the engine without a stock service. The
//! table can be loaded from YAML:
//!
//! ```yaml
//! - product: 1
//!   available: 5
//! - product: 1
//!   variant: 2
//!   available: 0
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use cart_sync_core::{LineKey, ProductId, VariantId};
use serde::{Deserialize, Serialize};

use super::{StockError, StockOracle};

/// One row of a stock table file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub product: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<VariantId>,
    pub available: u32,
}

/// Stock oracle backed by a fixed table.
///
/// Cheaply cloneable; clones share the table, so tests can change stock
/// underneath an engine. Unknown keys are an error, not zero stock.
#[derive(Debug, Clone, Default)]
pub struct FixedStockOracle {
    table: Arc<RwLock<HashMap<LineKey, u32>>>,
}

impl FixedStockOracle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(key, ceiling)` pairs.
    #[must_use]
    pub fn with_ceilings(entries: impl IntoIterator<Item = (LineKey, u32)>) -> Self {
        let oracle = Self::new();
        for (key, ceiling) in entries {
            oracle.set(key, ceiling);
        }
        oracle
    }

    /// Parse a YAML stock table.
    ///
    /// # Errors
    ///
    /// Returns `StockError::Parse` if the document is not a list of entries.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, StockError> {
        let entries: Vec<StockEntry> =
            serde_yaml::from_str(yaml).map_err(|e| StockError::Parse(e.to_string()))?;
        Ok(Self::with_ceilings(entries.into_iter().map(|entry| {
            (LineKey::new(entry.product, entry.variant), entry.available)
        })))
    }

    /// Load a YAML stock table from disk.
    ///
    /// # Errors
    ///
    /// Returns `StockError::Parse` if the file cannot be read or parsed.
    pub fn from_yaml_file(path: &Path) -> Result<Self, StockError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StockError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&content)
    }

    /// Set the ceiling for a key.
    pub fn set(&self, key: LineKey, ceiling: u32) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, ceiling);
    }

    fn lookup(&self, key: LineKey) -> Result<u32, StockError> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
            .ok_or(StockError::UnknownProduct(key))
    }
}

impl StockOracle for FixedStockOracle {
    async fn current_ceiling(&self, key: LineKey) -> Result<u32, StockError> {
        self.lookup(key)
    }
}
