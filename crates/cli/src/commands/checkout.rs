//! Checkout commands.

use petstore_storefront::checkout::{CheckoutSummary, require_checkout};

use super::{CliError, Context};

/// Print the order summary for the signed-in cart.
///
/// # Errors
///
/// Returns an error if nobody is signed in, the cart is empty, or JSON
/// output cannot be encoded.
#[allow(clippy::print_stdout)]
pub async fn summary(ctx: &Context, json: bool) -> Result<(), CliError> {
    let snapshot = ctx.engine.snapshot().await;
    let summary = require_checkout(&ctx.auth.current(), &snapshot)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render(&summary));
    }
    Ok(())
}

fn render(summary: &CheckoutSummary) -> String {
    [
        ("Items:", summary.items_price),
        ("Shipping:", summary.shipping_price),
        ("Tax:", summary.tax_price),
        ("Total:", summary.total_price),
    ]
    .iter()
    .map(|(label, amount)| format!("{label:<10}{:>10}\n", format!("{amount:.2}")))
    .collect()
}
