//! Shopping cart.
//!
//! # Modules
//!
//! - `line` - Cart lines, quantity rules and totals
//! - `codec` - Guest cart mirror format
//! - `state` - Epoch-checked shared state and snapshots
//! - `backend` - Guest and signed-in storage strategies
//! - `engine` - Reconciliation engine following the auth session

mod backend;
mod codec;
mod engine;
pub(crate) mod line;
mod state;

pub use codec::{GUEST_CART_KEY, decode_guest_cart, encode_guest_cart};
pub use engine::CartEngine;
pub use line::{CartLine, CartLines, CartTotals, CatalogItem, LineError};
pub use state::{CartSnapshot, CartSource};
