//! Short-lived cache in front of a stock oracle.

use std::time::Duration;

use cart_sync_core::LineKey;
use moka::future::Cache;
use tracing::debug;

use super::{StockError, StockOracle};
use crate::config::StockConfig;

/// Caches ceilings from the wrapped oracle for a configurable TTL.
///
/// Errors are not cached.
#[derive(Clone)]
pub struct CachedStockOracle<O> {
    inner: O,
    cache: Cache<LineKey, u32>,
}

impl<O: StockOracle> CachedStockOracle<O> {
    #[must_use]
    pub fn new(inner: O, ttl: Duration, capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }

    #[must_use]
    pub fn from_config(inner: O, config: &StockConfig) -> Self {
        Self::new(inner, config.cache_ttl, config.cache_capacity)
    }

    /// Drop every cached ceiling so the next lookups hit the wrapped oracle.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

impl<O: StockOracle> StockOracle for CachedStockOracle<O> {
    async fn current_ceiling(&self, key: LineKey) -> Result<u32, StockError> {
        if let Some(ceiling) = self.cache.get(&key).await {
            debug!(key = %key, ceiling, "Stock cache hit");
            return Ok(ceiling);
        }

        let ceiling = self.inner.current_ceiling(key).await?;
        self.cache.insert(key, ceiling).await;
        Ok(ceiling)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cart_sync_core::ProductId;

    use super::*;
    use crate::stock::FixedStockOracle;

    #[tokio::test]
    async fn test_cached_value_survives_source_change() {
        let source = FixedStockOracle::new();
        let key = LineKey::new(ProductId::new(1), None);
        source.set(key, 5);

        let cached = CachedStockOracle::new(source.clone(), Duration::from_secs(60), 100);
        assert_eq!(cached.current_ceiling(key).await.unwrap(), 5);

        source.set(key, 2);
        assert_eq!(cached.current_ceiling(key).await.unwrap(), 5);

        cached.invalidate_all();
        assert_eq!(cached.current_ceiling(key).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let source = FixedStockOracle::new();
        let key = LineKey::new(ProductId::new(1), None);
        let cached = CachedStockOracle::new(source.clone(), Duration::from_secs(60), 100);

        assert!(cached.current_ceiling(key).await.is_err());

        source.set(key, 3);
        assert_eq!(cached.current_ceiling(key).await.unwrap(), 3);
    }
}
