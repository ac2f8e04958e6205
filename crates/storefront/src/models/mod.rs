//! Domain models for storefront.

pub mod session;

pub use session::{AuthState, UserSession};
