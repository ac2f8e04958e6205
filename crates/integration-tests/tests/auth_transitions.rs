//! Cart sourcing across identity transitions.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use petstore_integration_tests::{Shop, item, item_id, user_id};
use petstore_storefront::api::ServiceError;
use petstore_storefront::cart::{CartSource, GUEST_CART_KEY};
use petstore_storefront::error::ErrorKind;
use petstore_storefront::storage::{LocalStore, MemoryStore};
use petstore_storefront::testing::FakeCall;

#[tokio::test]
async fn test_login_replaces_guest_lines() {
    let shop = Shop::open().await;
    shop.remote.stock(item("b", 500));
    shop.remote.seed_line(&user_id("u1"), &item_id("b"), 2);
    shop.engine.add_item(&item("a", 100), 5).await.unwrap();

    shop.sign_in("u1").await;

    let snap = shop.engine.snapshot().await;
    assert_eq!(snap.source, CartSource::Remote(user_id("u1")));
    assert_eq!(snap.lines.len(), 1);
    assert_eq!(snap.lines.quantity_of(&item_id("b")), 2);
    assert_eq!(snap.totals.total_items, 2);
    shop.close();
}

#[tokio::test]
async fn test_logout_keeps_guest_mirror_untouched() {
    let shop = Shop::open().await;
    shop.engine.add_item(&item("a", 100), 1).await.unwrap();
    let guest_mirror = shop.store.read(GUEST_CART_KEY).unwrap();

    shop.remote.stock(item("b", 500));
    shop.remote.seed_line(&user_id("u1"), &item_id("b"), 2);
    shop.sign_in("u1").await;
    shop.engine.add_item(&item("b", 500), 1).await.unwrap();
    shop.sign_out().await;

    assert_eq!(shop.store.read(GUEST_CART_KEY).unwrap(), guest_mirror);
    let snap = shop.engine.snapshot().await;
    assert_eq!(snap.source, CartSource::Local);
    assert_eq!(snap.lines.quantity_of(&item_id("a")), 1);
    assert!(snap.lines.get(&item_id("b")).is_none());
    shop.close();
}

#[tokio::test]
async fn test_token_refresh_does_not_resource() {
    let shop = Shop::open().await;
    shop.sign_in("u1").await;
    shop.sign_in("u1").await;

    let fetches = shop
        .remote
        .calls()
        .iter()
        .filter(|call| matches!(call, FakeCall::GetCart(_)))
        .count();
    assert_eq!(fetches, 1);
    shop.close();
}

#[tokio::test]
async fn test_user_switch_shows_only_new_users_cart() {
    let shop = Shop::open().await;
    shop.remote.stock(item("b", 500));
    shop.remote.stock(item("c", 700));
    shop.remote.seed_line(&user_id("u1"), &item_id("b"), 1);
    shop.remote.seed_line(&user_id("u2"), &item_id("c"), 4);

    shop.sign_in("u1").await;
    shop.sign_in("u2").await;

    let snap = shop.engine.snapshot().await;
    assert_eq!(snap.source, CartSource::Remote(user_id("u2")));
    assert_eq!(snap.lines.quantity_of(&item_id("c")), 4);
    assert!(snap.lines.get(&item_id("b")).is_none());
    shop.close();
}

#[tokio::test]
async fn test_slow_fetch_for_previous_user_is_discarded() {
    let shop = Shop::open().await;
    shop.remote.stock(item("b", 500));
    shop.remote.seed_line(&user_id("u1"), &item_id("b"), 1);
    shop.remote.hold_fetches(true);

    shop.auth
        .login(petstore_storefront::testing::session("u1"))
        .unwrap();
    assert!(shop.remote.wait_for_pending(1).await);
    assert!(shop.engine.snapshot().await.is_loading);

    // Logging out while u1's cart is still loading.
    shop.sign_out().await;
    assert!(shop.remote.release_fetch(0));
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let snap = shop.engine.snapshot().await;
    assert_eq!(snap.source, CartSource::Local);
    assert!(snap.lines.is_empty());
    assert!(!snap.is_loading);
    shop.close();
}

#[tokio::test]
async fn test_failed_sourcing_reports_and_recovers_on_reload() {
    let shop = Shop::open().await;
    shop.remote.stock(item("b", 500));
    shop.remote.seed_line(&user_id("u1"), &item_id("b"), 2);

    shop.remote.fail_next(ServiceError::Transport("503".into()));
    shop.sign_in("u1").await;

    let snap = shop.engine.snapshot().await;
    assert!(snap.lines.is_empty());
    assert_eq!(snap.last_error.unwrap().kind, ErrorKind::Transport);

    shop.engine.reload().await.unwrap();
    let snap = shop.engine.snapshot().await;
    assert_eq!(snap.lines.quantity_of(&item_id("b")), 2);
    assert!(snap.last_error.is_none());
    shop.close();
}

#[tokio::test]
async fn test_restored_session_sources_remote_cart() {
    let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
    let first = Shop::open_with(Arc::clone(&store)).await;
    first.sign_in("u1").await;
    first.close();

    let second = Shop::open_with(store).await;
    assert_eq!(
        second.engine.snapshot().await.source,
        CartSource::Remote(user_id("u1"))
    );
    second.close();
}

#[tokio::test]
async fn test_switch_user_before_resourcing_leaves_both_carts_alone() {
    let shop = Shop::open().await;
    shop.remote.stock(item("b", 500));
    shop.remote.seed_line(&user_id("u1"), &item_id("b"), 5);
    shop.sign_in("u1").await;

    // The listener has not run yet, so the engine still holds u1's cart.
    shop.auth.login(petstore_storefront::testing::session("u2")).unwrap();
    let err = shop.engine.add_item(&item("b", 500), 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Stale);

    assert!(shop.remote.lines_for(&user_id("u2")).is_empty());
    assert_eq!(shop.remote.lines_for(&user_id("u1")).first().unwrap().quantity, 5);
    assert!(
        !shop
            .remote
            .calls()
            .iter()
            .any(|call| matches!(call, FakeCall::AddOrUpdate(..)))
    );

    shop.settle().await;
    let snap = shop.engine.snapshot().await;
    assert_eq!(snap.source, CartSource::Remote(user_id("u2")));
    assert!(snap.lines.is_empty());
    shop.close();
}
