//! Cart lines, the line collection, and derived totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use petstore_core::{ItemId, Price};

/// Quantity rule violations, raised before any state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    /// A line must hold at least one unit.
    #[error("quantity must be at least 1")]
    ZeroQuantity,

    /// The requested quantity is above the known stock level.
    #[error("only {available} of {item_id} in stock (requested {requested})")]
    ExceedsStock {
        /// Item being changed.
        item_id: ItemId,
        /// Quantity the line would end up with.
        requested: u64,
        /// Units in stock.
        available: u32,
    },

    /// The resulting quantity does not fit in a line.
    #[error("quantity {0} is too large")]
    TooLarge(i64),
}

/// A catalog item as handed to the cart by a product or breed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    /// Catalog identifier.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Image URL.
    pub image: Option<String>,
    /// Current price, snapshotted onto the line when added.
    pub price: Price,
    /// Units in stock, when the catalog reports it.
    pub count_in_stock: Option<u32>,
}

/// One catalog item plus quantity within a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Canonical catalog identifier.
    pub item_id: ItemId,
    /// Display name (denormalized for guest rendering).
    pub name: String,
    /// Image URL (denormalized for guest rendering).
    pub image: Option<String>,
    /// Unit price at the time the line was created.
    pub unit_price: Price,
    /// Units in the cart, always >= 1.
    pub quantity: u32,
    /// Units in stock when known.
    pub count_in_stock: Option<u32>,
}

impl CartLine {
    /// Build a new line for `item`.
    #[must_use]
    pub fn from_item(item: &CatalogItem, quantity: u32) -> Self {
        Self {
            item_id: item.id.clone(),
            name: item.name.clone(),
            image: item.image.clone(),
            unit_price: item.price,
            quantity,
            count_in_stock: item.count_in_stock,
        }
    }

    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price.times(self.quantity)
    }
}

fn check_stock(item_id: &ItemId, requested: u64, stock: Option<u32>) -> Result<(), LineError> {
    match stock {
        Some(available) if requested > u64::from(available) => Err(LineError::ExceedsStock {
            item_id: item_id.clone(),
            requested,
            available,
        }),
        _ => Ok(()),
    }
}

/// Insertion-ordered lines, unique by `item_id`.
///
/// Every line present has `quantity >= 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CartLines(Vec<CartLine>);

impl CartLines {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Build from arbitrary lines, dropping empty ones and merging duplicate
    /// identities by summing their quantities (saturating).
    #[must_use]
    pub fn merged(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut out = Self::new();
        for line in lines {
            if line.quantity == 0 {
                continue;
            }
            match out.position(&line.item_id) {
                Some(idx) => {
                    if let Some(existing) = out.0.get_mut(idx) {
                        existing.quantity = existing.quantity.saturating_add(line.quantity);
                    }
                }
                None => out.0.push(line),
            }
        }
        out
    }

    fn position(&self, item_id: &ItemId) -> Option<usize> {
        self.0.iter().position(|line| &line.item_id == item_id)
    }

    /// Look up a line.
    #[must_use]
    pub fn get(&self, item_id: &ItemId) -> Option<&CartLine> {
        self.0.iter().find(|line| &line.item_id == item_id)
    }

    /// Quantity currently held for `item_id` (0 when absent).
    #[must_use]
    pub fn quantity_of(&self, item_id: &ItemId) -> u32 {
        self.get(item_id).map_or(0, |line| line.quantity)
    }

    /// Iterate lines in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, CartLine> {
        self.0.iter()
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add `quantity` units of `item`, incrementing an existing line in place
    /// or appending a new one.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero quantity, a total that overflows, or a
    /// total above the known stock level. The cart is unchanged on error.
    pub fn add(&mut self, item: &CatalogItem, quantity: u32) -> Result<(), LineError> {
        if quantity == 0 {
            return Err(LineError::ZeroQuantity);
        }

        let existing = self.get(&item.id);
        let current = existing.map_or(0, |line| line.quantity);
        let stock = item
            .count_in_stock
            .or_else(|| existing.and_then(|line| line.count_in_stock));
        let requested = u64::from(current) + u64::from(quantity);
        check_stock(&item.id, requested, stock)?;
        let new_quantity =
            u32::try_from(requested).map_err(|_| LineError::TooLarge(i64::from(u32::MAX)))?;

        match self.position(&item.id) {
            Some(idx) => {
                if let Some(line) = self.0.get_mut(idx) {
                    line.quantity = new_quantity;
                }
            }
            None => self.0.push(CartLine::from_item(item, new_quantity)),
        }
        Ok(())
    }

    /// Remove the line for `item_id`. Returns whether a line was removed.
    pub fn remove(&mut self, item_id: &ItemId) -> bool {
        let before = self.0.len();
        self.0.retain(|line| &line.item_id != item_id);
        self.0.len() != before
    }

    /// Set the quantity of an existing line; `quantity <= 0` removes it.
    ///
    /// Returns whether a line matched. Lines other than `item_id` are
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the quantity does not fit or exceeds the line's
    /// known stock. The cart is unchanged on error.
    pub fn set_quantity(&mut self, item_id: &ItemId, quantity: i64) -> Result<bool, LineError> {
        if quantity <= 0 {
            return Ok(self.remove(item_id));
        }
        let new_quantity = u32::try_from(quantity).map_err(|_| LineError::TooLarge(quantity))?;

        let Some(idx) = self.position(item_id) else {
            return Ok(false);
        };
        let Some(line) = self.0.get_mut(idx) else {
            return Ok(false);
        };
        check_stock(item_id, u64::from(new_quantity), line.count_in_stock)?;
        line.quantity = new_quantity;
        Ok(true)
    }

    /// Drop every line.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Recompute totals with a full pass over the lines.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        CartTotals::from_lines(self)
    }
}

impl<'a> IntoIterator for &'a CartLines {
    type Item = &'a CartLine;
    type IntoIter = std::slice::Iter<'a, CartLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for CartLines {
    type Item = CartLine;
    type IntoIter = std::vec::IntoIter<CartLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Totals derived from a set of lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    /// Sum of quantities.
    pub total_items: u64,
    /// Sum of `quantity * unit_price`.
    pub total_price: Decimal,
}

impl CartTotals {
    /// Full recomputation over `lines`.
    #[must_use]
    pub fn from_lines(lines: &CartLines) -> Self {
        lines.iter().fold(Self::default(), |acc, line| Self {
            total_items: acc.total_items + u64::from(line.quantity),
            total_price: acc.total_price + line.line_total(),
        })
    }
}
