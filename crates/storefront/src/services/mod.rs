//! Business logic services for storefront.
//!
//! # Services
//!
//! - `auth` - Signed-in session provider (persistence, transition events)

pub mod auth;
