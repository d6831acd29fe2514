//! Cart data model: lines, snapshots and the identity context.
//!
//! A [`CartSnapshot`] is the full set of lines at one instant plus a logical
//! `version`. Lines are keyed by [`LineKey`] so a key appears at most once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::id::{ProductId, UserId, VariantId};
use super::price::{CurrencyCode, Price};

/// Unique key of a cart line: a product and an optional variant.
///
/// `variant_id = None` means the base product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl LineKey {
    #[must_use]
    pub const fn new(product_id: ProductId, variant_id: Option<VariantId>) -> Self {
        Self {
            product_id,
            variant_id,
        }
    }
}

impl std::fmt::Display for LineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.variant_id {
            Some(variant) => write!(f, "{}/{}", self.product_id, variant),
            None => write!(f, "{}", self.product_id),
        }
    }
}

/// One purchasable line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_name: Option<String>,
    pub sku: String,
    pub unit_price_base: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price_sale: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Always at least 1 for a line held in a snapshot.
    pub quantity: u32,
    /// Stock ceiling known at the last refresh. Zero means unpurchasable.
    pub max_quantity: u32,
}

impl CartLine {
    #[must_use]
    pub const fn key(&self) -> LineKey {
        LineKey::new(self.product_id, self.variant_id)
    }

    /// Effective unit price: the sale price when present, else the base price.
    #[must_use]
    pub fn unit_price(&self) -> Price {
        self.unit_price_sale.unwrap_or(self.unit_price_base)
    }

    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price().times(self.quantity)
    }

    /// Whether the line can currently be purchased.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.max_quantity > 0
    }
}

/// Clamp a requested quantity to `[1, ceiling]`.
///
/// Returns the clamped value and whether clamping changed the request.
/// A zero ceiling has no valid quantity; callers must check
/// [`CartLine::is_available`] semantics before using the result.
#[must_use]
pub fn clamp_quantity(requested: u64, ceiling: u32) -> (u32, bool) {
    let upper = u64::from(ceiling.max(1));
    let clamped = requested.clamp(1, upper);
    // `upper` came from a u32 so this cannot truncate.
    let value = u32::try_from(clamped).unwrap_or(u32::MAX);
    (value, clamped != requested)
}

/// The full set of cart lines at one instant, paired with a logical version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SnapshotRepr", into = "SnapshotRepr")]
pub struct CartSnapshot {
    lines: BTreeMap<LineKey, CartLine>,
    version: u64,
}

/// Wire representation: lines as a list, canonically ordered by key.
#[derive(Serialize, Deserialize)]
struct SnapshotRepr {
    #[serde(default)]
    version: u64,
    #[serde(default)]
    lines: Vec<CartLine>,
}

impl From<SnapshotRepr> for CartSnapshot {
    fn from(repr: SnapshotRepr) -> Self {
        Self::from_lines(repr.lines, repr.version)
    }
}

impl From<CartSnapshot> for SnapshotRepr {
    fn from(snapshot: CartSnapshot) -> Self {
        Self {
            version: snapshot.version,
            lines: snapshot.lines.into_values().collect(),
        }
    }
}

impl CartSnapshot {
    /// An empty snapshot at version 0.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from lines. A repeated key keeps the last line.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>, version: u64) -> Self {
        Self {
            lines: lines.into_iter().map(|line| (line.key(), line)).collect(),
            version,
        }
    }

    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Replace the logical clock value.
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Advance the logical clock by one and return the new value.
    pub fn bump_version(&mut self) -> u64 {
        self.version = self.version.saturating_add(1);
        self.version
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of distinct lines (not units).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &LineKey> {
        self.lines.keys()
    }

    #[must_use]
    pub fn get(&self, key: &LineKey) -> Option<&CartLine> {
        self.lines.get(key)
    }

    pub fn get_mut(&mut self, key: &LineKey) -> Option<&mut CartLine> {
        self.lines.get_mut(key)
    }

    #[must_use]
    pub fn contains(&self, key: &LineKey) -> bool {
        self.lines.contains_key(key)
    }

    /// Insert or replace the line under its key.
    pub fn insert(&mut self, line: CartLine) -> Option<CartLine> {
        self.lines.insert(line.key(), line)
    }

    pub fn remove(&mut self, key: &LineKey) -> Option<CartLine> {
        self.lines.remove(key)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Lines whose stock ceiling dropped to zero.
    pub fn unavailable_lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values().filter(|line| !line.is_available())
    }

    /// Total units across purchasable lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines
            .values()
            .filter(|line| line.is_available())
            .map(|line| u64::from(line.quantity))
            .sum()
    }

    /// Sum of effective unit price × quantity across purchasable lines.
    ///
    /// The currency is taken from the first purchasable line; an empty cart
    /// reports zero in the default currency.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        let mut available = self.lines.values().filter(|line| line.is_available());
        let Some(first) = available.next() else {
            return Price::zero(CurrencyCode::default());
        };
        let mut total = first.line_total();
        for line in available {
            total.amount += line.line_total().amount;
        }
        total
    }

    /// Lines equal ignoring the version.
    #[must_use]
    pub fn same_lines(&self, other: &Self) -> bool {
        self.lines == other.lines
    }
}

/// Who the cart currently belongs to.
///
/// Transitions are driven exclusively by the identity signal, never by cart
/// mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "user_id", rename_all = "snake_case")]
pub enum CartContext {
    #[default]
    Anonymous,
    Authenticated(UserId),
}

impl CartContext {
    #[must_use]
    pub const fn from_identity(identity: Option<UserId>) -> Self {
        match identity {
            Some(id) => Self::Authenticated(id),
            None => Self::Anonymous,
        }
    }

    #[must_use]
    pub const fn identity(self) -> Option<UserId> {
        match self {
            Self::Authenticated(id) => Some(id),
            Self::Anonymous => None,
        }
    }
}
