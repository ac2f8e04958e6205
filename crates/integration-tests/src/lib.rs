//! Integration tests for Petstore.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p petstore-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_scenarios` - Guest and signed-in cart behaviour end to end
//! - `auth_transitions` - Sourcing across login, logout and user switches
//! - `guest_mirror` - Guest cart persistence in a profile directory
//!
//! Every test drives the public storefront API: a [`Shop`] wires an auth
//! session, a local store and a scriptable remote cart service to one cart
//! engine that follows the session.

use std::sync::Arc;

use petstore_core::{ItemId, Price, UserId};
use petstore_storefront::cart::{CartEngine, CatalogItem};
use petstore_storefront::services::auth::AuthSession;
use petstore_storefront::storage::{LocalStore, MemoryStore};
use petstore_storefront::testing::{self, FakeCartService};
use rust_decimal::Decimal;
use tokio::task::JoinHandle;

/// One browser tab: session, store, remote service and a listening engine.
pub struct Shop {
    /// Profile store shared with other tabs of the same profile.
    pub store: Arc<dyn LocalStore>,
    /// Signed-in session.
    pub auth: AuthSession,
    /// Remote cart service.
    pub remote: Arc<FakeCartService>,
    /// Cart engine following `auth`.
    pub engine: Arc<CartEngine>,
    listener: JoinHandle<()>,
}

impl Shop {
    /// A guest tab on a fresh in-memory profile.
    pub async fn open() -> Self {
        Self::open_with(Arc::new(MemoryStore::new())).await
    }

    /// A tab on `store`, restoring whatever session it holds.
    ///
    /// # Panics
    ///
    /// Panics if the stored session cannot be read or the cart does not
    /// finish sourcing.
    #[allow(clippy::unwrap_used)]
    pub async fn open_with(store: Arc<dyn LocalStore>) -> Self {
        let auth = AuthSession::restore(Arc::clone(&store)).unwrap();
        let remote = Arc::new(FakeCartService::new(auth.subscribe()));
        let engine = Arc::new(CartEngine::new(
            Arc::clone(&store),
            testing::shared(&remote),
        ));
        let listener = engine.spawn_auth_listener(auth.subscribe());
        let shop = Self {
            store,
            auth,
            remote,
            engine,
            listener,
        };
        shop.settle().await;
        shop
    }

    /// Sign in as `user_id` and wait for the cart to follow.
    ///
    /// # Panics
    ///
    /// Panics if the session cannot be stored or the cart does not settle.
    #[allow(clippy::unwrap_used)]
    pub async fn sign_in(&self, user_id: &str) {
        self.auth.login(testing::session(user_id)).unwrap();
        self.settle().await;
    }

    /// Sign out and wait for the cart to follow.
    ///
    /// # Panics
    ///
    /// Panics if the session cannot be removed or the cart does not settle.
    #[allow(clippy::unwrap_used)]
    pub async fn sign_out(&self) {
        self.auth.logout().unwrap();
        self.settle().await;
    }

    /// Let the listener pick up pending transitions and finish sourcing.
    ///
    /// # Panics
    ///
    /// Panics if the cart is still loading after a bounded wait.
    pub async fn settle(&self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(
            testing::wait_until_loaded(&self.engine).await,
            "cart did not finish loading"
        );
    }

    /// Stop following the session.
    pub fn close(self) {
        self.listener.abort();
    }
}

/// Catalog item priced in cents with unknown stock.
///
/// # Panics
///
/// Panics if `id` is not a valid item id.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn item(id: &str, cents: i64) -> CatalogItem {
    CatalogItem {
        id: item_id(id),
        name: format!("Item {id}"),
        image: None,
        price: Price::new(Decimal::new(cents, 2)).unwrap(),
        count_in_stock: None,
    }
}

/// Parse an item id.
///
/// # Panics
///
/// Panics if `raw` is not a valid item id.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn item_id(raw: &str) -> ItemId {
    ItemId::parse(raw).unwrap()
}

/// Parse a user id.
///
/// # Panics
///
/// Panics if `raw` is not a valid user id.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn user_id(raw: &str) -> UserId {
    UserId::parse(raw).unwrap()
}
