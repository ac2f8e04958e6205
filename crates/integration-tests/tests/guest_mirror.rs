//! Guest cart persistence in a profile directory.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use petstore_integration_tests::{Shop, item, item_id};
use petstore_storefront::cart::GUEST_CART_KEY;
use petstore_storefront::storage::{FileStore, LocalStore, MemoryStore};
use rust_decimal::Decimal;

#[tokio::test]
async fn test_guest_cart_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = Shop::open_with(Arc::new(FileStore::new(dir.path()))).await;
    first.engine.add_item(&item("a", 1250), 2).await.unwrap();
    first.close();

    let second = Shop::open_with(Arc::new(FileStore::new(dir.path()))).await;
    let snap = second.engine.snapshot().await;
    assert_eq!(snap.lines.quantity_of(&item_id("a")), 2);
    assert_eq!(snap.totals.total_price, Decimal::new(2500, 2));
    second.close();
}

#[tokio::test]
async fn test_legacy_mirror_is_normalised() {
    let store = MemoryStore::new();
    let legacy = serde_json::json!([
        {"_id": "collar", "name": "Collar", "price": 9.5, "quantity": 1},
        {"_id": "line-9", "product": "collar", "name": "Collar", "price": 9.5, "quantity": 2},
        {"_id": "toy", "name": "Toy", "price": 3, "quantity": 0}
    ]);
    store.write(GUEST_CART_KEY, &legacy.to_string()).unwrap();

    let shop = Shop::open_with(Arc::new(store)).await;
    let snap = shop.engine.snapshot().await;
    assert_eq!(snap.lines.len(), 1);
    assert_eq!(snap.lines.quantity_of(&item_id("collar")), 3);

    // Updating by the canonical id works whichever way the line entered.
    shop.engine.update_quantity(&item_id("collar"), 1).await.unwrap();
    assert_eq!(shop.engine.snapshot().await.totals.total_items, 1);
    shop.close();
}

#[tokio::test]
async fn test_corrupt_mirror_starts_empty() {
    let store = MemoryStore::new();
    store.write(GUEST_CART_KEY, "[{\"_id\":").unwrap();

    let shop = Shop::open_with(Arc::new(store)).await;
    let snap = shop.engine.snapshot().await;
    assert!(snap.lines.is_empty());
    assert!(snap.last_error.is_none());

    shop.engine.add_item(&item("a", 100), 1).await.unwrap();
    assert_eq!(shop.engine.snapshot().await.lines.len(), 1);
    shop.close();
}

#[tokio::test]
async fn test_tabs_sharing_a_profile_last_writer_wins() {
    let store = MemoryStore::new();
    let tab_one = Shop::open_with(Arc::new(store.clone())).await;
    let tab_two = Shop::open_with(Arc::new(store.clone())).await;

    tab_one.engine.add_item(&item("a", 100), 1).await.unwrap();
    tab_two.engine.add_item(&item("b", 100), 1).await.unwrap();

    let tab_three = Shop::open_with(Arc::new(store)).await;
    let snap = tab_three.engine.snapshot().await;
    assert!(snap.lines.get(&item_id("a")).is_none());
    assert_eq!(snap.lines.quantity_of(&item_id("b")), 1);

    tab_one.close();
    tab_two.close();
    tab_three.close();
}
