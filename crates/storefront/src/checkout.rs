//! Checkout pricing.
//!
//! Order prices are derived from the cart totals: a flat 15% tax and free
//! shipping above 100.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

use crate::cart::{CartSnapshot, CartSource, CartTotals};
use crate::models::AuthState;

/// Tax rate applied to the items price.
const TAX_RATE: Decimal = Decimal::from_parts(15, 0, 0, false, 2);
/// Items price above which shipping is free.
const FREE_SHIPPING_OVER: Decimal = Decimal::from_parts(100, 0, 0, false, 0);
/// Flat shipping price below the threshold.
const SHIPPING_PRICE: Decimal = Decimal::from_parts(10, 0, 0, false, 0);

/// Reasons checkout cannot start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// Orders are placed by signed-in users only.
    #[error("please sign in to check out")]
    LoginRequired,

    /// Nothing to order.
    #[error("your cart is empty")]
    EmptyCart,

    /// The cart has not finished loading.
    #[error("your cart is still loading")]
    CartLoading,

    /// The cart belongs to a different identity than the signed-in user.
    #[error("your cart is out of date, please retry")]
    StaleCart,
}

/// Prices shown on the order summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckoutSummary {
    /// Sum of line totals.
    pub items_price: Decimal,
    /// Tax on the items price.
    pub tax_price: Decimal,
    /// Shipping charge.
    pub shipping_price: Decimal,
    /// Amount to pay.
    pub total_price: Decimal,
}

impl CheckoutSummary {
    /// Price an order from cart totals.
    #[must_use]
    pub fn from_totals(totals: &CartTotals) -> Self {
        let items_price = totals.total_price;
        let tax_price = (items_price * TAX_RATE)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let shipping_price = if items_price > FREE_SHIPPING_OVER {
            Decimal::ZERO
        } else {
            SHIPPING_PRICE
        };

        Self {
            items_price,
            tax_price,
            shipping_price,
            total_price: items_price + tax_price + shipping_price,
        }
    }
}

/// Price the cart for checkout.
///
/// # Errors
///
/// Returns an error if nobody is signed in, the cart is still loading or was
/// sourced for someone else, or the cart is empty.
pub fn require_checkout(
    auth: &AuthState,
    cart: &CartSnapshot,
) -> Result<CheckoutSummary, CheckoutError> {
    let Some(user) = auth.user_id() else {
        return Err(CheckoutError::LoginRequired);
    };
    if cart.is_loading {
        return Err(CheckoutError::CartLoading);
    }
    if !matches!(&cart.source, CartSource::Remote(owner) if owner == user) {
        return Err(CheckoutError::StaleCart);
    }
    if cart.lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    Ok(CheckoutSummary::from_totals(&cart.totals))
}
