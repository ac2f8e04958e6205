//! Petstore Core - Shared types library.
//!
//! This crate provides common types used across all Petstore components:
//! - `storefront` - Cart reconciliation engine, auth session, REST client
//! - `cli` - Command-line driver over the storefront library
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no storage.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, and emails

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
