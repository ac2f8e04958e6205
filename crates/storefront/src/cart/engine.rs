//! Cart reconciliation engine.
//!
//! [`CartEngine`] is the single owner of the in-memory cart. It follows the
//! auth session: every identity transition picks a new backend, empties the
//! cart and sources it again. Each sourcing gets a fresh epoch, and anything
//! that completes for an older epoch is discarded.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use petstore_core::ItemId;

use super::backend::{CartBackend, LocalBackend, RemoteBackend};
use super::line::{CatalogItem, LineError};
use super::state::{CartCell, CartSnapshot, CartSource};
use crate::api::RemoteCartService;
use crate::error::{CartError, CartNotice, Result, add_breadcrumb, report};
use crate::models::AuthState;
use crate::storage::LocalStore;

const ADD_ITEM: &str = "add item to cart";
const REMOVE_ITEM: &str = "remove item from cart";
const UPDATE_QUANTITY: &str = "update cart";
const CLEAR_CART: &str = "clear cart";
const LOAD_CART: &str = "load cart";

/// Authoritative owner of the cart for one session.
///
/// Operations never panic; a failure is returned to the caller and also
/// recorded as [`CartSnapshot::last_error`].
pub struct CartEngine {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteCartService>,
    cell: CartCell,
}

impl CartEngine {
    /// Create an engine that has not been sourced yet.
    ///
    /// The cart reports `is_loading` and rejects mutations until
    /// [`Self::attach`] or [`Self::spawn_auth_listener`] sources it.
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>, remote: Arc<dyn RemoteCartService>) -> Self {
        let initial: Arc<dyn CartBackend> = Arc::new(LocalBackend::new(Arc::clone(&store), 0));
        Self {
            store,
            remote,
            cell: CartCell::new(initial),
        }
    }

    // =========================================================================
    // Sourcing
    // =========================================================================

    /// Source the cart for `auth` and wait for the result.
    ///
    /// Announcing the identity that is already attached does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the guest mirror or the remote cart cannot be
    /// read; the cart is left empty in that case.
    pub async fn attach(&self, auth: &AuthState) -> Result<()> {
        match self.begin_sourcing(&auth_source(auth), false).await {
            Some(backend) => self.finish_sourcing(backend).await,
            None => Ok(()),
        }
    }

    /// Source the current identity again.
    ///
    /// # Errors
    ///
    /// Same as [`Self::attach`].
    pub async fn reload(&self) -> Result<()> {
        let source = self.cell.lock().await.source.clone();
        match self.begin_sourcing(&source, true).await {
            Some(backend) => self.finish_sourcing(backend).await,
            None => Ok(()),
        }
    }

    /// Follow `auth` on a background task until its sender is dropped.
    ///
    /// The current value is sourced first. Transitions are picked up in
    /// order; loads run concurrently and only the latest one is applied.
    pub fn spawn_auth_listener(
        self: &Arc<Self>,
        mut auth: watch::Receiver<AuthState>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let source = auth_source(&auth.borrow_and_update());
                if let Some(backend) = engine.begin_sourcing(&source, false).await {
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        // Failures are recorded on the snapshot.
                        let _ = engine.finish_sourcing(backend).await;
                    });
                }

                if auth.changed().await.is_err() {
                    debug!("Auth channel closed, cart listener stopping");
                    break;
                }
            }
        })
    }

    /// Switch to a backend for `source`, unless it is already attached.
    ///
    /// The cart is emptied and marked loading before this returns.
    pub(crate) async fn begin_sourcing(
        &self,
        source: &CartSource,
        force: bool,
    ) -> Option<Arc<dyn CartBackend>> {
        let mut state = self.cell.lock().await;
        if !force && state.sourced && &state.source == source {
            debug!(?source, "Identity unchanged, keeping cart");
            return None;
        }

        let epoch = state.epoch + 1;
        let backend: Arc<dyn CartBackend> = match source {
            CartSource::Local => Arc::new(LocalBackend::new(Arc::clone(&self.store), epoch)),
            CartSource::Remote(user) => Arc::new(RemoteBackend::new(
                Arc::clone(&self.remote),
                user.clone(),
                epoch,
            )),
        };
        state.switch_to(Arc::clone(&backend));

        info!(?source, epoch, "Sourcing cart");
        Some(backend)
    }

    /// Load through `backend` and apply the result if its epoch is current.
    pub(crate) async fn finish_sourcing(&self, backend: Arc<dyn CartBackend>) -> Result<()> {
        let loaded = backend.load().await;
        let notice = loaded
            .as_ref()
            .err()
            .map(|err| CartNotice::from_error(err, LOAD_CART));

        if !self
            .cell
            .finish(backend.epoch(), loaded.as_ref().ok(), notice)
            .await
        {
            warn!(
                epoch = backend.epoch(),
                source = ?backend.source(),
                "Discarding cart sourced for a previous identity"
            );
            return Ok(());
        }

        match loaded {
            Ok(lines) => {
                debug!(lines = lines.len(), "Cart sourced");
                Ok(())
            }
            Err(err) => {
                report(&err, LOAD_CART);
                Err(err)
            }
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Add `quantity` units of `item`.
    ///
    /// # Errors
    ///
    /// Returns an error if the quantity is zero or above known stock, or if
    /// the backend fails. The cart is unchanged on error.
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn add_item(&self, item: &CatalogItem, quantity: u32) -> Result<()> {
        add_breadcrumb("cart", "Add item", Some(&[("item_id", item.id.as_str())]));
        let backend = self.cell.backend().await;
        let result = backend.add_item(&self.cell, item, quantity).await;
        self.settle(backend.epoch(), result, ADD_ITEM).await
    }

    /// Remove the line for `item_id`. Removing an absent item is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails. The cart is unchanged on error.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, item_id: &ItemId) -> Result<()> {
        add_breadcrumb("cart", "Remove item", Some(&[("item_id", item_id.as_str())]));
        let backend = self.cell.backend().await;
        let result = backend.remove_item(&self.cell, item_id).await;
        self.settle(backend.epoch(), result, REMOVE_ITEM).await
    }

    /// Set the quantity of the line for `item_id`; `quantity <= 0` removes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the quantity is above known stock or does not fit,
    /// or if the backend fails. The cart is unchanged on error.
    #[instrument(skip(self))]
    pub async fn update_quantity(&self, item_id: &ItemId, quantity: i64) -> Result<()> {
        add_breadcrumb("cart", "Update quantity", Some(&[("item_id", item_id.as_str())]));
        let backend = self.cell.backend().await;
        let result = if quantity <= 0 {
            backend.remove_item(&self.cell, item_id).await
        } else {
            match u32::try_from(quantity) {
                Ok(quantity) => backend.update_quantity(&self.cell, item_id, quantity).await,
                Err(_) => Err(LineError::TooLarge(quantity).into()),
            }
        };
        self.settle(backend.epoch(), result, UPDATE_QUANTITY).await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails. The cart is unchanged on error.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<()> {
        add_breadcrumb("cart", "Clear cart", None);
        let backend = self.cell.backend().await;
        let result = backend.clear(&self.cell).await;
        self.settle(backend.epoch(), result, CLEAR_CART).await
    }

    /// Current lines, totals and status.
    pub async fn snapshot(&self) -> CartSnapshot {
        self.cell.snapshot().await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Record the outcome of an operation issued at `epoch`.
    async fn settle(&self, epoch: u64, result: Result<()>, action: &str) -> Result<()> {
        match result {
            Ok(()) => {
                let mut state = self.cell.lock().await;
                if state.epoch == epoch {
                    state.last_error = None;
                }
                Ok(())
            }
            Err(err) => {
                report(&err, action);
                self.record(epoch, &err, action).await;
                Err(err)
            }
        }
    }

    /// Store a notice for `err` unless the cart has moved to a newer epoch
    /// whose notices would be misleading.
    async fn record(&self, epoch: u64, err: &CartError, action: &str) {
        let mut state = self.cell.lock().await;
        if state.epoch == epoch || matches!(err, CartError::StaleSource) {
            state.last_error = Some(CartNotice::from_error(err, action));
        }
    }
}

/// Backend selection for an auth state.
fn auth_source(auth: &AuthState) -> CartSource {
    auth.user_id()
        .map_or(CartSource::Local, |user| CartSource::Remote(user.clone()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::ServiceError;
    use crate::cart::codec::{GUEST_CART_KEY, decode_guest_cart, encode_guest_cart};
    use crate::cart::line::CartLines;
    use crate::cart::line::tests::item;
    use crate::error::ErrorKind;
    use crate::storage::{MemoryStore, StoreError};
    use crate::testing::{FakeCall, FakeCartService, shared, signed_in, wait_until_loaded};
    use petstore_core::UserId;
    use rust_decimal::Decimal;

    fn id(raw: &str) -> ItemId {
        ItemId::parse(raw).unwrap()
    }

    fn user(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    struct Harness {
        store: MemoryStore,
        fake: Arc<FakeCartService>,
        auth: watch::Sender<AuthState>,
        engine: Arc<CartEngine>,
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        let (auth, rx) = watch::channel(AuthState::Guest);
        let fake = Arc::new(FakeCartService::new(rx));
        let engine = Arc::new(CartEngine::new(Arc::new(store.clone()), shared(&fake)));
        Harness {
            store,
            fake,
            auth,
            engine,
        }
    }

    impl Harness {
        async fn sign_in(&self, raw: &str) {
            let state = signed_in(raw);
            self.auth.send_replace(state.clone());
            self.engine.attach(&state).await.unwrap();
        }

        fn mirror(&self) -> Option<CartLines> {
            self.store
                .read(GUEST_CART_KEY)
                .unwrap()
                .map(|raw| decode_guest_cart(Some(&raw)))
        }
    }

    #[tokio::test]
    async fn test_unsourced_engine_rejects_mutations() {
        let h = harness();

        let snapshot = h.engine.snapshot().await;
        assert!(snapshot.is_loading);

        let err = h.engine.add_item(&item("a", 1000), 1).await.unwrap_err();
        assert!(matches!(err, CartError::Loading));
        assert_eq!(h.mirror(), None);
    }

    #[tokio::test]
    async fn test_guest_add_increment_remove_scenario() {
        let h = harness();
        h.engine.attach(&AuthState::Guest).await.unwrap();

        h.engine.add_item(&item("a", 1000), 2).await.unwrap();
        let snap = h.engine.snapshot().await;
        assert_eq!(snap.totals.total_items, 2);
        assert_eq!(snap.totals.total_price, Decimal::new(2000, 2));

        h.engine.add_item(&item("a", 1000), 1).await.unwrap();
        let snap = h.engine.snapshot().await;
        assert_eq!(snap.totals.total_items, 3);
        assert_eq!(snap.totals.total_price, Decimal::new(3000, 2));

        h.engine.remove_item(&id("a")).await.unwrap();
        let snap = h.engine.snapshot().await;
        assert_eq!(snap.totals.total_items, 0);
        assert_eq!(snap.totals.total_price, Decimal::ZERO);
        assert_eq!(h.mirror(), Some(CartLines::new()));
    }

    #[tokio::test]
    async fn test_guest_cart_restored_from_mirror() {
        let h = harness();
        let mut lines = CartLines::new();
        lines.add(&item("a", 500), 4).unwrap();
        h.store
            .write(GUEST_CART_KEY, &encode_guest_cart(&lines).unwrap())
            .unwrap();

        h.engine.attach(&AuthState::Guest).await.unwrap();

        let snap = h.engine.snapshot().await;
        assert_eq!(snap.lines, lines);
        assert_eq!(snap.totals.total_items, 4);
        assert!(!snap.is_loading);
    }

    #[tokio::test]
    async fn test_update_quantity_non_positive_removes() {
        let h = harness();
        h.engine.attach(&AuthState::Guest).await.unwrap();
        h.engine.add_item(&item("a", 100), 2).await.unwrap();
        h.engine.add_item(&item("b", 100), 2).await.unwrap();

        h.engine.update_quantity(&id("a"), 0).await.unwrap();
        h.engine.update_quantity(&id("b"), -5).await.unwrap();

        assert!(h.engine.snapshot().await.lines.is_empty());
    }

    #[tokio::test]
    async fn test_update_quantity_too_large_is_validation() {
        let h = harness();
        h.engine.attach(&AuthState::Guest).await.unwrap();
        h.engine.add_item(&item("a", 100), 1).await.unwrap();

        let err = h
            .engine
            .update_quantity(&id("a"), i64::from(u32::MAX) + 1)
            .await
            .unwrap_err();

        assert!(matches!(err, CartError::Validation(_)));
        assert_eq!(h.engine.snapshot().await.lines.quantity_of(&id("a")), 1);
    }

    #[tokio::test]
    async fn test_login_replaces_guest_lines() {
        let h = harness();
        h.fake.stock(item("b", 500));
        h.fake.seed_line(&user("u1"), &id("b"), 1);
        h.engine.attach(&AuthState::Guest).await.unwrap();
        h.engine.add_item(&item("a", 1000), 2).await.unwrap();

        h.sign_in("u1").await;

        let snap = h.engine.snapshot().await;
        assert_eq!(snap.source, CartSource::Remote(user("u1")));
        assert_eq!(snap.lines.len(), 1);
        assert_eq!(snap.lines.quantity_of(&id("b")), 1);
        assert!(snap.lines.get(&id("a")).is_none());
    }

    #[tokio::test]
    async fn test_logout_does_not_write_mirror() {
        let h = harness();
        h.fake.stock(item("b", 500));
        h.fake.seed_line(&user("u1"), &id("b"), 3);
        h.sign_in("u1").await;
        assert_eq!(h.mirror(), None);

        h.auth.send_replace(AuthState::Guest);
        h.engine.attach(&AuthState::Guest).await.unwrap();

        let snap = h.engine.snapshot().await;
        assert_eq!(snap.source, CartSource::Local);
        assert!(snap.lines.is_empty());
        assert_eq!(h.mirror(), None);
    }

    #[tokio::test]
    async fn test_same_identity_does_not_resource() {
        let h = harness();
        h.sign_in("u1").await;
        h.engine.attach(&signed_in("u1")).await.unwrap();

        let fetches = h
            .fake
            .calls()
            .iter()
            .filter(|call| matches!(call, FakeCall::GetCart(_)))
            .count();
        assert_eq!(fetches, 1);
    }

    #[tokio::test]
    async fn test_remote_add_computes_total_and_matches_refetch() {
        let h = harness();
        h.fake.stock(item("b", 500));
        h.fake.seed_line(&user("u1"), &id("b"), 1);
        h.sign_in("u1").await;

        h.engine.add_item(&item("b", 500), 2).await.unwrap();

        assert!(h.fake.calls().contains(&FakeCall::AddOrUpdate(user("u1"), id("b"), 3)));
        let expected = CartLines::merged(h.fake.lines_for(&user("u1")));
        assert_eq!(h.engine.snapshot().await.lines, expected);
    }

    #[tokio::test]
    async fn test_remote_transport_failure_keeps_lines_and_reports() {
        let h = harness();
        h.fake.stock(item("b", 500));
        h.fake.seed_line(&user("u1"), &id("b"), 1);
        h.sign_in("u1").await;
        let before = h.engine.snapshot().await;

        h.fake.fail_next(ServiceError::Transport("timeout".into()));
        let err = h.engine.add_item(&item("b", 500), 1).await.unwrap_err();

        assert!(matches!(err, CartError::Transport(_)));
        let after = h.engine.snapshot().await;
        assert_eq!(after.lines, before.lines);
        assert_eq!(after.totals, before.totals);
        let notice = after.last_error.unwrap();
        assert_eq!(notice.kind, ErrorKind::Transport);
        assert_eq!(notice.message, "Failed to add item to cart");
    }

    #[tokio::test]
    async fn test_success_clears_last_error() {
        let h = harness();
        h.fake.stock(item("b", 500));
        h.sign_in("u1").await;

        h.fake.fail_next(ServiceError::Transport("timeout".into()));
        assert!(h.engine.add_item(&item("b", 500), 1).await.is_err());
        assert!(h.engine.snapshot().await.last_error.is_some());

        h.engine.add_item(&item("b", 500), 1).await.unwrap();
        assert!(h.engine.snapshot().await.last_error.is_none());
    }

    #[tokio::test]
    async fn test_remote_rejection_surfaces_server_message() {
        let h = harness();
        let mut stocked = item("b", 500);
        stocked.count_in_stock = Some(2);
        h.fake.stock(stocked);
        h.sign_in("u1").await;

        // The catalog item handed in does not know the stock level.
        let err = h.engine.add_item(&item("b", 500), 5).await.unwrap_err();

        assert!(matches!(err, CartError::Validation(ref msg) if msg == "Insufficient stock"));
        assert!(h.engine.snapshot().await.lines.is_empty());
    }

    #[tokio::test]
    async fn test_remote_clear() {
        let h = harness();
        h.fake.stock(item("b", 500));
        h.fake.seed_line(&user("u1"), &id("b"), 2);
        h.sign_in("u1").await;

        h.engine.clear_cart().await.unwrap();

        assert!(h.engine.snapshot().await.lines.is_empty());
        assert!(h.fake.lines_for(&user("u1")).is_empty());
        assert_eq!(h.mirror(), None);
    }

    #[tokio::test]
    async fn test_failed_remote_sourcing_leaves_empty_cart_with_error() {
        let h = harness();
        h.fake.stock(item("b", 500));
        h.fake.seed_line(&user("u1"), &id("b"), 2);
        h.engine.attach(&AuthState::Guest).await.unwrap();
        h.engine.add_item(&item("a", 100), 1).await.unwrap();

        h.fake.fail_next(ServiceError::Transport("down".into()));
        let state = signed_in("u1");
        h.auth.send_replace(state.clone());
        assert!(h.engine.attach(&state).await.is_err());

        let snap = h.engine.snapshot().await;
        assert!(snap.lines.is_empty());
        assert!(!snap.is_loading);
        assert_eq!(snap.source, CartSource::Remote(user("u1")));
        assert_eq!(snap.last_error.unwrap().message, "Failed to load cart");

        h.engine.reload().await.unwrap();
        assert_eq!(h.engine.snapshot().await.lines.quantity_of(&id("b")), 2);
    }

    #[tokio::test]
    async fn test_unreadable_store_fails_guest_sourcing() {
        #[derive(Debug)]
        struct BrokenStore;

        impl LocalStore for BrokenStore {
            fn read(&self, _key: &str) -> std::result::Result<Option<String>, StoreError> {
                Err(StoreError::Unavailable)
            }
            fn write(&self, _key: &str, _value: &str) -> std::result::Result<(), StoreError> {
                Err(StoreError::Unavailable)
            }
            fn remove(&self, _key: &str) -> std::result::Result<(), StoreError> {
                Err(StoreError::Unavailable)
            }
        }

        let fake = Arc::new(FakeCartService::for_user("u1"));
        let engine = CartEngine::new(Arc::new(BrokenStore), shared(&fake));

        let err = engine.attach(&AuthState::Guest).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(engine.snapshot().await.lines.is_empty());
    }

    #[tokio::test]
    async fn test_stale_sourcing_result_is_discarded() {
        let h = harness();
        h.fake.stock(item("b", 500));
        h.fake.seed_line(&user("u1"), &id("b"), 2);
        h.auth.send_replace(signed_in("u1"));

        let first = h
            .engine
            .begin_sourcing(&CartSource::Remote(user("u1")), false)
            .await
            .unwrap();
        let second = h
            .engine
            .begin_sourcing(&CartSource::Local, false)
            .await
            .unwrap();

        h.engine.finish_sourcing(second).await.unwrap();
        // The remote fetch resolves last but belongs to the old identity.
        h.engine.finish_sourcing(first).await.unwrap();

        let snap = h.engine.snapshot().await;
        assert_eq!(snap.source, CartSource::Local);
        assert!(snap.lines.is_empty());
    }

    #[tokio::test]
    async fn test_listener_discards_out_of_order_fetch() {
        let h = harness();
        h.fake.stock(item("b", 500));
        h.fake.stock(item("c", 700));
        h.fake.seed_line(&user("u1"), &id("b"), 1);
        h.fake.seed_line(&user("u2"), &id("c"), 5);
        h.fake.hold_fetches(true);

        let listener = h.engine.spawn_auth_listener(h.auth.subscribe());
        assert!(wait_until_loaded(&h.engine).await);

        h.auth.send_replace(signed_in("u1"));
        assert!(h.fake.wait_for_pending(1).await);
        h.auth.send_replace(signed_in("u2"));
        assert!(h.fake.wait_for_pending(2).await);

        // u2's fetch answers first, then u1's stale one.
        assert!(h.fake.release_fetch(1));
        assert!(wait_until_loaded(&h.engine).await);
        assert!(h.fake.release_fetch(0));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let snap = h.engine.snapshot().await;
        assert_eq!(snap.source, CartSource::Remote(user("u2")));
        assert_eq!(snap.lines.quantity_of(&id("c")), 5);
        assert!(snap.lines.get(&id("b")).is_none());

        drop(h.auth);
        listener.await.unwrap();
    }

    #[tokio::test]
    async fn test_mutation_before_resourcing_stays_with_its_user() {
        let h = harness();
        h.fake.stock(item("b", 500));
        h.fake.seed_line(&user("u1"), &id("b"), 5);
        h.sign_in("u1").await;

        // u2 is signed in but the cart has not been re-sourced yet.
        h.auth.send_replace(signed_in("u2"));

        let err = h.engine.add_item(&item("b", 500), 1).await.unwrap_err();
        assert!(matches!(err, CartError::StaleSource));
        let err = h.engine.remove_item(&id("b")).await.unwrap_err();
        assert!(matches!(err, CartError::StaleSource));
        let err = h.engine.clear_cart().await.unwrap_err();
        assert!(matches!(err, CartError::StaleSource));

        assert!(h.fake.lines_for(&user("u2")).is_empty());
        assert_eq!(h.fake.lines_for(&user("u1")).first().unwrap().quantity, 5);
        assert!(h.fake.calls().iter().all(|call| call.user() == &user("u1")));

        let snap = h.engine.snapshot().await;
        assert_eq!(snap.source, CartSource::Remote(user("u1")));
        assert_eq!(snap.lines.quantity_of(&id("b")), 5);
        assert_eq!(snap.last_error.unwrap().kind, ErrorKind::Stale);
    }

    #[tokio::test]
    async fn test_mutation_during_identity_change_is_stale() {
        let h = harness();
        h.fake.stock(item("b", 500));
        h.fake.seed_line(&user("u1"), &id("b"), 1);
        h.sign_in("u1").await;

        let backend = h.engine.cell.backend().await;
        h.auth.send_replace(AuthState::Guest);
        h.engine.attach(&AuthState::Guest).await.unwrap();

        let result = backend.add_item(&h.engine.cell, &item("b", 500), 1).await;
        let err = h.engine.settle(backend.epoch(), result, ADD_ITEM).await.unwrap_err();

        assert!(matches!(err, CartError::StaleSource));
        let snap = h.engine.snapshot().await;
        assert_eq!(snap.source, CartSource::Local);
        assert!(snap.lines.is_empty());
    }
}
