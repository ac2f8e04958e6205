//! Cart commands.

use rust_decimal::Decimal;

use petstore_core::{ItemId, Price};
use petstore_storefront::cart::{CartSnapshot, CartSource, CatalogItem};

use super::{CliError, Context};

/// A cart operation requested on the command line.
#[derive(Debug)]
pub enum CartAction {
    /// Only print the cart.
    Show,
    /// Add units of an item.
    Add {
        /// Item to add.
        item: CatalogItem,
        /// Units to add.
        quantity: u32,
    },
    /// Remove a line.
    Remove {
        /// Line to remove.
        item_id: ItemId,
    },
    /// Set a line's quantity.
    Update {
        /// Line to change.
        item_id: ItemId,
        /// New quantity; zero or less removes the line.
        quantity: i64,
    },
    /// Empty the cart.
    Clear,
}

/// Parse an item id argument.
///
/// # Errors
///
/// Returns an error if the id is empty or malformed.
pub fn item_id(raw: &str) -> Result<ItemId, CliError> {
    ItemId::parse(raw).map_err(|e| CliError::InvalidArgument("ITEM_ID", e.to_string()))
}

/// Build the catalog item handed to `cart add`.
///
/// # Errors
///
/// Returns an error if the id or price is invalid.
pub fn catalog_item(
    id: &str,
    name: String,
    price: Decimal,
    image: Option<String>,
    count_in_stock: Option<u32>,
) -> Result<CatalogItem, CliError> {
    Ok(CatalogItem {
        id: item_id(id)?,
        name,
        image,
        price: Price::new(price).map_err(|e| CliError::InvalidArgument("--price", e.to_string()))?,
        count_in_stock,
    })
}

/// Apply `action` to the sourced cart.
///
/// # Errors
///
/// Returns an error if the cart operation fails; the cart is unchanged.
pub async fn run(ctx: &Context, action: CartAction) -> Result<(), CliError> {
    let engine = &ctx.engine;
    match action {
        CartAction::Show => {}
        CartAction::Add { item, quantity } => engine.add_item(&item, quantity).await?,
        CartAction::Remove { item_id } => engine.remove_item(&item_id).await?,
        CartAction::Update { item_id, quantity } => {
            engine.update_quantity(&item_id, quantity).await?;
        }
        CartAction::Clear => engine.clear_cart().await?,
    }
    Ok(())
}

/// Render a snapshot as text.
#[must_use]
pub fn render(snapshot: &CartSnapshot) -> String {
    let owner = match &snapshot.source {
        CartSource::Local => "guest".to_string(),
        CartSource::Remote(user) => format!("user {user}"),
    };

    let mut out = format!("Cart ({owner})\n");
    if snapshot.lines.is_empty() {
        out.push_str("  (empty)\n");
    }
    for line in &snapshot.lines {
        out.push_str(&format!(
            "  {:<24} {:>4} x {:>9} = {:>10}\n",
            line.item_id.as_str(),
            line.quantity,
            line.unit_price.to_string(),
            format!("{:.2}", line.line_total())
        ));
    }
    out.push_str(&format!(
        "Items: {}  Total: {:.2}\n",
        snapshot.totals.total_items, snapshot.totals.total_price
    ));
    if let Some(notice) = &snapshot.last_error {
        out.push_str(&format!("! {}\n", notice.message));
    }
    out
}

/// Print a snapshot.
///
/// # Errors
///
/// Returns an error if JSON output cannot be encoded.
#[allow(clippy::print_stdout)]
pub fn print(snapshot: &CartSnapshot, json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
    } else {
        print!("{}", render(snapshot));
    }
    Ok(())
}
