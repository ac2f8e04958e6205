//! Guest cart mirror encoding.
//!
//! The guest cart is stored as a JSON array of lines under [`GUEST_CART_KEY`].
//! Older mirrors keyed a line by the catalog item's `_id` or `id`, or, for
//! lines that came back from the server, by a `product` reference (a bare id
//! or a populated document). Decoding folds these into the single canonical
//! `item_id`, in the order `product`, `itemId`, `_id`, `id`.
//!
//! Each line is decoded on its own; one bad line never costs the rest of the
//! cart.

use serde::{Deserialize, Serialize};
use tracing::warn;

use petstore_core::{ItemId, Price};

use super::line::{CartLine, CartLines};
use crate::api::ProductRef;

/// Local store key holding the guest cart.
pub const GUEST_CART_KEY: &str = "cart";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    item_id: Option<String>,
    #[serde(rename = "_id", default, skip_serializing)]
    legacy_id: Option<String>,
    #[serde(default, skip_serializing)]
    id: Option<String>,
    #[serde(default, skip_serializing)]
    product: Option<ProductRef>,
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit_price: Option<Price>,
    #[serde(default, skip_serializing)]
    price: Option<Price>,
    quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    count_in_stock: Option<u32>,
}

impl StoredLine {
    fn identity(&self) -> Option<&str> {
        self.product
            .as_ref()
            .map(ProductRef::as_str)
            .or(self.item_id.as_deref())
            .or(self.legacy_id.as_deref())
            .or(self.id.as_deref())
    }

    fn into_line(self) -> Option<CartLine> {
        let Some(raw_id) = self.identity() else {
            warn!(name = %self.name, "Dropping guest cart line without an id");
            return None;
        };
        let item_id = match ItemId::parse(raw_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(id = %raw_id, error = %e, "Dropping guest cart line with invalid id");
                return None;
            }
        };
        let Some(unit_price) = self.unit_price.or(self.price) else {
            warn!(id = %item_id, "Dropping guest cart line without a price");
            return None;
        };
        let quantity = u32::try_from(self.quantity).ok().filter(|q| *q > 0)?;

        Some(CartLine {
            item_id,
            name: self.name,
            image: self.image,
            unit_price,
            quantity,
            count_in_stock: self.count_in_stock,
        })
    }
}

impl From<&CartLine> for StoredLine {
    fn from(line: &CartLine) -> Self {
        Self {
            item_id: Some(line.item_id.to_string()),
            legacy_id: None,
            id: None,
            product: None,
            name: line.name.clone(),
            image: line.image.clone(),
            unit_price: Some(line.unit_price),
            price: None,
            quantity: i64::from(line.quantity),
            count_in_stock: line.count_in_stock,
        }
    }
}

/// Decode one stored line, dropping it if it does not parse.
fn decode_line(index: usize, value: serde_json::Value) -> Option<CartLine> {
    match serde_json::from_value::<StoredLine>(value) {
        Ok(stored) => stored.into_line(),
        Err(e) => {
            warn!(index, error = %e, "Dropping unreadable guest cart line");
            None
        }
    }
}

/// Decode a guest cart payload.
///
/// A missing payload, or one that is not a JSON array, decodes to an empty
/// cart. Lines that do not parse, lack a usable identity or price, or have a
/// quantity below one are dropped, and duplicate identities are merged.
#[must_use]
pub fn decode_guest_cart(raw: Option<&str>) -> CartLines {
    let Some(raw) = raw else {
        return CartLines::new();
    };

    match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        Ok(values) => CartLines::merged(
            values
                .into_iter()
                .enumerate()
                .filter_map(|(index, value)| decode_line(index, value)),
        ),
        Err(e) => {
            warn!(error = %e, "Guest cart payload is unreadable, starting empty");
            CartLines::new()
        }
    }
}

/// Encode lines for the guest cart mirror.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_guest_cart(lines: &CartLines) -> Result<String, serde_json::Error> {
    let stored: Vec<StoredLine> = lines.iter().map(StoredLine::from).collect();
    serde_json::to_string(&stored)
}
