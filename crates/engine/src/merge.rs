//! Merge resolver: reconcile the device-local cart with an identity's remote cart.
//!
//! For the union of keys in both snapshots:
//! - key only in `local` or only in `remote` - kept unchanged
//! - key in both - `quantity = min(max(local, remote), ceiling)`, where the
//!   ceiling is the stock ceiling refreshed at merge time; display and price
//!   fields come from the remote line, which carries the fresher catalog data
//!
//! The result restarts the logical clock at version 0. Merging is idempotent
//! and the empty snapshot is its identity element.

use std::collections::HashMap;

use cart_sync_core::{CartSnapshot, LineKey};

/// Stock ceilings refreshed for the keys shared by both inputs.
///
/// A shared key missing from the table falls back to the remote line's
/// stored ceiling.
pub type CeilingTable = HashMap<LineKey, u32>;

/// What the merge had to adjust.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Shared keys whose combined quantity exceeded the fresh ceiling.
    pub clamped: Vec<LineKey>,
    /// Shared keys whose fresh ceiling is zero; kept but unpurchasable.
    pub unavailable: Vec<LineKey>,
}

impl MergeReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.clamped.is_empty() && self.unavailable.is_empty()
    }
}

/// Merged snapshot together with its report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub snapshot: CartSnapshot,
    pub report: MergeReport,
}

/// Merge `local` and `remote` into a new snapshot at version 0.
#[must_use]
pub fn merge(local: &CartSnapshot, remote: &CartSnapshot, ceilings: &CeilingTable) -> CartSnapshot {
    merge_with_report(local, remote, ceilings).snapshot
}

/// Like [`merge`], also reporting clamped and unavailable keys.
#[must_use]
pub fn merge_with_report(
    local: &CartSnapshot,
    remote: &CartSnapshot,
    ceilings: &CeilingTable,
) -> Merged {
    let mut report = MergeReport::default();
    let mut merged = remote.clone().with_version(0);

    for local_line in local.lines() {
        let key = local_line.key();
        let Some(line) = merged.get_mut(&key) else {
            merged.insert(local_line.clone());
            continue;
        };

        let ceiling = ceilings.get(&key).copied().unwrap_or(line.max_quantity);
        let wanted = local_line.quantity.max(line.quantity);
        line.max_quantity = ceiling;

        if ceiling == 0 {
            // Keep the line so it surfaces as unavailable instead of vanishing.
            line.quantity = wanted;
            report.unavailable.push(key);
        } else {
            line.quantity = wanted.min(ceiling);
            if line.quantity < wanted {
                report.clamped.push(key);
            }
        }
    }

    Merged {
        snapshot: merged,
        report,
    }
}

/// Keys present in both snapshots; the ones that need a fresh ceiling.
#[must_use]
pub fn shared_keys(local: &CartSnapshot, remote: &CartSnapshot) -> Vec<LineKey> {
    local
        .keys()
        .filter(|key| remote.contains(key))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use cart_sync_core::{CartLine, CurrencyCode, Price, ProductId, VariantId};

    use super::*;

    fn line(product: i32, quantity: u32, max_quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(product),
            variant_id: None,
            name: format!("Product {product}"),
            variant_name: None,
            sku: format!("SKU-{product}"),
            unit_price_base: Price::from_cents(1000, CurrencyCode::USD),
            unit_price_sale: None,
            image: None,
            quantity,
            max_quantity,
        }
    }

    fn key(product: i32) -> LineKey {
        LineKey::new(ProductId::new(product), None)
    }

    fn quantity(snapshot: &CartSnapshot, product: i32) -> Option<u32> {
        snapshot.get(&key(product)).map(|l| l.quantity)
    }

    #[test]
    fn test_empty_is_identity_element() {
        let s = CartSnapshot::from_lines([line(1, 2, 5), line(2, 1, 3)], 7);
        let empty = CartSnapshot::empty();
        let ceilings = CeilingTable::new();

        let left = merge(&s, &empty, &ceilings);
        let right = merge(&empty, &s, &ceilings);

        assert!(left.same_lines(&s));
        assert!(right.same_lines(&s));
        assert_eq!(left.version(), 0);
        assert_eq!(right.version(), 0);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let s = CartSnapshot::from_lines([line(1, 2, 5), line(2, 3, 3)], 4);
        let ceilings = CeilingTable::from([(key(1), 5), (key(2), 3)]);

        let once = merge(&s, &s, &ceilings);
        assert!(once.same_lines(&s));
        assert!(merge(&once, &once, &ceilings).same_lines(&once));
    }

    #[test]
    fn test_shared_key_takes_max_then_clamps() {
        let local = CartSnapshot::from_lines([line(1, 4, 10)], 3);
        let remote = CartSnapshot::from_lines([line(1, 6, 10)], 9);

        let roomy = merge(&local, &remote, &CeilingTable::from([(key(1), 10)]));
        assert_eq!(quantity(&roomy, 1), Some(6));

        let merged = merge_with_report(&local, &remote, &CeilingTable::from([(key(1), 5)]));
        assert_eq!(quantity(&merged.snapshot, 1), Some(5));
        assert_eq!(merged.snapshot.get(&key(1)).map(|l| l.max_quantity), Some(5));
        assert_eq!(merged.report.clamped, vec![key(1)]);
    }

    #[test]
    fn test_disjoint_and_shared_keys() {
        // local {A: 3}, remote {A: 1, B: 2}, both ceilings 10
        let local = CartSnapshot::from_lines([line(1, 3, 10)], 2);
        let remote = CartSnapshot::from_lines([line(1, 1, 10), line(2, 2, 10)], 5);
        let ceilings = CeilingTable::from([(key(1), 10)]);

        let merged = merge(&local, &remote, &ceilings);

        assert_eq!(merged.len(), 2);
        assert_eq!(quantity(&merged, 1), Some(3));
        assert_eq!(quantity(&merged, 2), Some(2));
    }

    #[test]
    fn test_display_fields_come_from_remote() {
        let mut local_line = line(1, 2, 5);
        local_line.name = "Old name".to_string();
        local_line.unit_price_base = Price::from_cents(900, CurrencyCode::USD);
        let mut remote_line = line(1, 1, 5);
        remote_line.name = "New name".to_string();

        let merged = merge(
            &CartSnapshot::from_lines([local_line], 1),
            &CartSnapshot::from_lines([remote_line.clone()], 1),
            &CeilingTable::new(),
        );

        let merged_line = merged.get(&key(1)).cloned();
        assert_eq!(merged_line.as_ref().map(|l| l.name.as_str()), Some("New name"));
        assert_eq!(
            merged_line.map(|l| l.unit_price_base),
            Some(remote_line.unit_price_base)
        );
    }

    #[test]
    fn test_missing_ceiling_falls_back_to_remote_line() {
        let local = CartSnapshot::from_lines([line(1, 8, 10)], 1);
        let remote = CartSnapshot::from_lines([line(1, 1, 4)], 1);

        let merged = merge(&local, &remote, &CeilingTable::new());
        assert_eq!(quantity(&merged, 1), Some(4));
    }

    #[test]
    fn test_zero_ceiling_keeps_line_as_unavailable() {
        let local = CartSnapshot::from_lines([line(1, 2, 5)], 1);
        let remote = CartSnapshot::from_lines([line(1, 3, 5)], 1);

        let merged = merge_with_report(&local, &remote, &CeilingTable::from([(key(1), 0)]));

        let merged_line = merged.snapshot.get(&key(1)).cloned();
        assert_eq!(merged_line.as_ref().map(CartLine::is_available), Some(false));
        assert_eq!(merged_line.map(|l| l.quantity), Some(3));
        assert_eq!(merged.report.unavailable, vec![key(1)]);
        assert_eq!(merged.snapshot.item_count(), 0);
    }

    #[test]
    fn test_variants_are_distinct_keys() {
        let mut variant_line = line(1, 2, 5);
        variant_line.variant_id = Some(VariantId::new(7));
        let local = CartSnapshot::from_lines([variant_line], 1);
        let remote = CartSnapshot::from_lines([line(1, 1, 5)], 1);

        let merged = merge(&local, &remote, &CeilingTable::new());
        assert_eq!(merged.len(), 2);
        assert!(shared_keys(&local, &remote).is_empty());
    }
}
