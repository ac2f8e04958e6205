//! Petstore storefront library.
//!
//! Holds the cart reconciliation engine and the collaborators it works
//! with: the signed-in session, the local persistent store and the remote
//! cart service. Presentation code only reads [`cart::CartSnapshot`]s and
//! calls the engine's operations.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
