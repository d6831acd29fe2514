//! Integration tests for the cart sync engine.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cart-sync-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_scenarios` - End-to-end shopper flows across login and logout
//! - `sync_ordering` - Coalescing and ordering of remote pushes
//! - `persistence` - Local store restarts, corruption and write failures
//! - `merge_properties` - Algebraic properties of the merge resolver
//!
//! Everything runs against the in-memory remote store and a fixed stock
//! table, so no database or network is needed.

use std::time::Duration;

use cart_sync::{CartEngine, FixedStockOracle, LocalStore, MemoryRemote, MemoryStore, ProductRef};
use cart_sync_core::{CartLine, CartSnapshot, CurrencyCode, LineKey, Price, ProductId, UserId};

/// Engine wired to in-memory collaborators.
pub type MemoryEngine<L = MemoryStore> = CartEngine<L, MemoryRemote, FixedStockOracle>;

/// An engine plus handles on every collaborator it was built with.
pub struct TestCart<L = MemoryStore> {
    pub engine: MemoryEngine<L>,
    pub local: L,
    pub remote: MemoryRemote,
    pub stock: FixedStockOracle,
}

impl TestCart<MemoryStore> {
    /// Fresh engine with the given `(product, ceiling)` stock table.
    #[must_use]
    pub fn new(ceilings: &[(i32, u32)]) -> Self {
        Self::with_store(MemoryStore::new(), MemoryRemote::new(), ceilings)
    }
}

impl<L: LocalStore + Clone> TestCart<L> {
    /// Engine over `local` and `remote`, initialized from `local`.
    #[must_use]
    pub fn with_store(local: L, remote: MemoryRemote, ceilings: &[(i32, u32)]) -> Self {
        let stock = FixedStockOracle::with_ceilings(ceilings.iter().map(|&(id, c)| (key(id), c)));
        let engine = CartEngine::new(local.clone(), remote.clone(), stock.clone());
        engine.init();
        Self {
            engine,
            local,
            remote,
            stock,
        }
    }

    /// Add `quantity` of product `id`, panicking on a stock error.
    ///
    /// # Panics
    ///
    /// Panics if the product has no stock entry.
    pub async fn add(&self, id: i32, quantity: u32) -> cart_sync::MutationOutcome {
        match self.engine.add_item(&product(id), None, quantity).await {
            Ok(outcome) => outcome,
            Err(e) => panic!("add_item({id}) failed: {e}"),
        }
    }

    /// Quantity of product `id` in the engine's cart.
    #[must_use]
    pub fn quantity(&self, id: i32) -> Option<u32> {
        self.engine.snapshot().get(&key(id)).map(|line| line.quantity)
    }
}

/// Catalog entry for product `id` priced at `id` dollars.
#[must_use]
pub fn product(id: i32) -> ProductRef {
    ProductRef {
        product_id: ProductId::new(id),
        name: format!("Product {id}"),
        sku: format!("SKU-{id}"),
        unit_price_base: Price::from_cents(i64::from(id) * 100, CurrencyCode::USD),
        unit_price_sale: None,
        image: None,
    }
}

#[must_use]
pub const fn key(id: i32) -> LineKey {
    LineKey::new(ProductId::new(id), None)
}

#[must_use]
pub const fn user(id: i32) -> UserId {
    UserId::new(id)
}

/// Cart line for product `id`, as a remote store would hold it.
#[must_use]
pub fn line(id: i32, quantity: u32, max_quantity: u32) -> CartLine {
    let product = product(id);
    CartLine {
        product_id: product.product_id,
        variant_id: None,
        name: product.name,
        variant_name: None,
        sku: product.sku,
        unit_price_base: product.unit_price_base,
        unit_price_sale: None,
        image: None,
        quantity,
        max_quantity,
    }
}

/// Snapshot of `(product, quantity, ceiling)` lines.
#[must_use]
pub fn snapshot(lines: &[(i32, u32, u32)], version: u64) -> CartSnapshot {
    CartSnapshot::from_lines(lines.iter().map(|&(id, q, max)| line(id, q, max)), version)
}

/// Poll `condition` until it holds.
///
/// # Panics
///
/// Panics if it does not hold within two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
