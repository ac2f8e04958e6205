//! Wire types for the storefront REST cart endpoints.

use serde::{Deserialize, Serialize};
use tracing::warn;

use petstore_core::{ItemId, Price};

use crate::cart::CartLine;

/// Product reference on a server cart line: either a bare id or a populated
/// product document.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProductRef {
    /// Unpopulated reference.
    Id(String),
    /// Populated document; only its id is used.
    Document {
        /// Product id.
        #[serde(rename = "_id")]
        id: String,
    },
}

impl ProductRef {
    pub(crate) fn as_str(&self) -> &str {
        match self {
            Self::Id(id) | Self::Document { id } => id,
        }
    }
}

/// A cart line as returned by `GET /cart`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLine {
    /// Server-side line id. Never used as the item identity.
    #[serde(rename = "_id", default)]
    pub line_id: Option<String>,
    /// Product the line refers to.
    pub product: ProductRef,
    /// Product name.
    #[serde(default)]
    pub name: String,
    /// Product image.
    #[serde(default)]
    pub image: Option<String>,
    /// Unit price.
    pub price: Price,
    /// Quantity.
    pub quantity: i64,
    /// Units in stock.
    #[serde(default)]
    pub count_in_stock: Option<u32>,
}

impl RemoteLine {
    /// Normalise to a [`CartLine`] keyed by the product reference.
    ///
    /// Returns `None` for lines with an unusable product id or a quantity
    /// below one.
    #[must_use]
    pub fn into_cart_line(self) -> Option<CartLine> {
        let item_id = match ItemId::parse(self.product.as_str()) {
            Ok(id) => id,
            Err(e) => {
                warn!(line_id = ?self.line_id, error = %e, "Skipping server cart line with invalid product id");
                return None;
            }
        };
        let quantity = u32::try_from(self.quantity).ok().filter(|q| *q > 0)?;

        Some(CartLine {
            item_id,
            name: self.name,
            image: self.image,
            unit_price: self.price,
            quantity,
            count_in_stock: self.count_in_stock,
        })
    }
}

/// Body of `GET /cart`: a bare array, or an object wrapping `items`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CartResponse {
    /// `[...]`
    Lines(Vec<RemoteLine>),
    /// `{"items": [...]}`
    Wrapped {
        /// Lines.
        items: Vec<RemoteLine>,
    },
}

impl CartResponse {
    /// Normalised lines, skipping unusable entries.
    #[must_use]
    pub fn into_cart_lines(self) -> Vec<CartLine> {
        let (Self::Lines(lines) | Self::Wrapped { items: lines }) = self;
        lines
            .into_iter()
            .filter_map(RemoteLine::into_cart_line)
            .collect()
    }
}

/// Body of `POST /cart`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineUpsertRequest<'a> {
    /// Product to set.
    pub product_id: &'a str,
    /// Absolute quantity.
    pub quantity: u32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_bare_array_with_string_product() {
        let body = r#"[{"_id":"ln1","product":"p1","name":"Collar","image":"/c.jpg","price":15.5,"quantity":2,"countInStock":4}]"#;
        let lines = serde_json::from_str::<CartResponse>(body)
            .unwrap()
            .into_cart_lines();

        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.item_id.as_str(), "p1");
        assert_eq!(line.quantity, 2);
        assert_eq!(line.unit_price.amount(), Decimal::new(155, 1));
        assert_eq!(line.count_in_stock, Some(4));
    }

    #[test]
    fn test_wrapped_items_with_populated_product() {
        let body = r#"{"items":[{"_id":"ln1","product":{"_id":"p9","name":"Kibble"},"name":"Kibble","price":"30.00","quantity":1}]}"#;
        let lines = serde_json::from_str::<CartResponse>(body)
            .unwrap()
            .into_cart_lines();

        assert_eq!(lines[0].item_id.as_str(), "p9");
    }

    #[test]
    fn test_invalid_lines_skipped() {
        let body = r#"[
            {"product":"","price":1,"quantity":1},
            {"product":"p2","price":1,"quantity":0},
            {"product":"p3","price":1,"quantity":5}
        ]"#;
        let lines = serde_json::from_str::<CartResponse>(body)
            .unwrap()
            .into_cart_lines();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].item_id.as_str(), "p3");
    }

    #[test]
    fn test_upsert_request_shape() {
        let body = serde_json::to_value(LineUpsertRequest {
            product_id: "p1",
            quantity: 3,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"productId": "p1", "quantity": 3}));
    }
}
