//! Storage strategies behind the cart engine.
//!
//! A backend is created for one identity and one epoch. [`LocalBackend`]
//! edits the lines under the cart lock and mirrors every change to the local
//! store. [`RemoteBackend`] validates against a copy of the lines, calls the
//! remote service on behalf of its own user, and replaces the lines with a
//! fresh fetch; it never writes to the local store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use petstore_core::{ItemId, UserId};

use super::codec::{GUEST_CART_KEY, decode_guest_cart, encode_guest_cart};
use super::line::{CartLines, CatalogItem};
use super::state::{CartCell, CartSource};
use crate::api::RemoteCartService;
use crate::error::{CartError, Result};
use crate::storage::LocalStore;

/// One operation contract shared by the guest and signed-in carts.
#[async_trait]
pub(crate) trait CartBackend: Send + Sync {
    /// Which source this backend writes to.
    fn source(&self) -> CartSource;

    /// Sourcing epoch this backend was created for.
    fn epoch(&self) -> u64;

    /// Read the full line set from the backing store.
    async fn load(&self) -> Result<CartLines>;

    /// Add `quantity` units of `item`.
    async fn add_item(&self, cell: &CartCell, item: &CatalogItem, quantity: u32) -> Result<()>;

    /// Remove the line for `item_id`; absent lines are a no-op.
    async fn remove_item(&self, cell: &CartCell, item_id: &ItemId) -> Result<()>;

    /// Set the quantity of an existing line; absent lines are a no-op.
    async fn update_quantity(&self, cell: &CartCell, item_id: &ItemId, quantity: u32)
    -> Result<()>;

    /// Remove every line.
    async fn clear(&self, cell: &CartCell) -> Result<()>;
}

// =============================================================================
// Guest cart
// =============================================================================

/// Guest cart mirrored under [`GUEST_CART_KEY`].
pub(crate) struct LocalBackend {
    store: Arc<dyn LocalStore>,
    epoch: u64,
}

impl LocalBackend {
    pub(crate) fn new(store: Arc<dyn LocalStore>, epoch: u64) -> Self {
        Self { store, epoch }
    }

    fn persist(&self, lines: &CartLines) -> Result<()> {
        let payload = encode_guest_cart(lines)?;
        self.store.write(GUEST_CART_KEY, &payload)?;
        debug!(lines = lines.len(), "Guest cart mirrored");
        Ok(())
    }
}

#[async_trait]
impl CartBackend for LocalBackend {
    fn source(&self) -> CartSource {
        CartSource::Local
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }

    async fn load(&self) -> Result<CartLines> {
        let raw = self.store.read(GUEST_CART_KEY)?;
        Ok(decode_guest_cart(raw.as_deref()))
    }

    async fn add_item(&self, cell: &CartCell, item: &CatalogItem, quantity: u32) -> Result<()> {
        cell.apply(
            self.epoch,
            |lines| {
                lines.add(item, quantity)?;
                Ok(true)
            },
            |lines| self.persist(lines),
        )
        .await
    }

    async fn remove_item(&self, cell: &CartCell, item_id: &ItemId) -> Result<()> {
        cell.apply(
            self.epoch,
            |lines| Ok(lines.remove(item_id)),
            |lines| self.persist(lines),
        )
        .await
    }

    async fn update_quantity(
        &self,
        cell: &CartCell,
        item_id: &ItemId,
        quantity: u32,
    ) -> Result<()> {
        cell.apply(
            self.epoch,
            |lines| Ok(lines.set_quantity(item_id, i64::from(quantity))?),
            |lines| self.persist(lines),
        )
        .await
    }

    async fn clear(&self, cell: &CartCell) -> Result<()> {
        cell.apply(
            self.epoch,
            |lines| {
                let had_lines = !lines.is_empty();
                lines.clear();
                Ok(had_lines)
            },
            |lines| self.persist(lines),
        )
        .await
    }
}

// =============================================================================
// Signed-in cart
// =============================================================================

/// Server-side cart of one user.
pub(crate) struct RemoteBackend {
    service: Arc<dyn RemoteCartService>,
    user: UserId,
    epoch: u64,
}

impl RemoteBackend {
    pub(crate) fn new(service: Arc<dyn RemoteCartService>, user: UserId, epoch: u64) -> Self {
        Self {
            service,
            user,
            epoch,
        }
    }

    async fn fetch(&self) -> Result<CartLines> {
        let lines = self.service.get_cart(&self.user).await?;
        Ok(CartLines::merged(lines))
    }

    /// Replace the lines with the service's view.
    async fn refresh(&self, cell: &CartCell) -> Result<()> {
        let lines = self.guard(cell, self.fetch().await).await?;
        cell.commit(self.epoch, lines).await
    }

    /// Failures that land after the identity moved on are reported as stale.
    async fn guard<T, E>(&self, cell: &CartCell, result: std::result::Result<T, E>) -> Result<T>
    where
        E: Into<CartError> + Send,
        T: Send,
    {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                if cell.is_current(self.epoch).await {
                    Err(err.into())
                } else {
                    Err(CartError::StaleSource)
                }
            }
        }
    }
}

#[async_trait]
impl CartBackend for RemoteBackend {
    fn source(&self) -> CartSource {
        CartSource::Remote(self.user.clone())
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }

    async fn load(&self) -> Result<CartLines> {
        self.fetch().await
    }

    async fn add_item(&self, cell: &CartCell, item: &CatalogItem, quantity: u32) -> Result<()> {
        // Validate against a copy; the service only learns the new total.
        let mut scratch = cell.lines_at(self.epoch).await?;
        scratch.add(item, quantity)?;
        let total = scratch.quantity_of(&item.id);

        debug!(item_id = %item.id, total, "Setting remote line quantity");
        let sent = self.service.add_or_update_line(&self.user, &item.id, total).await;
        self.guard(cell, sent).await?;
        self.refresh(cell).await
    }

    async fn remove_item(&self, cell: &CartCell, item_id: &ItemId) -> Result<()> {
        let lines = cell.lines_at(self.epoch).await?;
        if lines.get(item_id).is_none() {
            return Ok(());
        }

        let sent = self.service.remove_line(&self.user, item_id).await;
        self.guard(cell, sent).await?;
        self.refresh(cell).await
    }

    async fn update_quantity(
        &self,
        cell: &CartCell,
        item_id: &ItemId,
        quantity: u32,
    ) -> Result<()> {
        let mut scratch = cell.lines_at(self.epoch).await?;
        if !scratch.set_quantity(item_id, i64::from(quantity))? {
            return Ok(());
        }

        let sent = self.service.add_or_update_line(&self.user, item_id, quantity).await;
        self.guard(cell, sent).await?;
        self.refresh(cell).await
    }

    async fn clear(&self, cell: &CartCell) -> Result<()> {
        cell.lines_at(self.epoch).await?;
        let sent = self.service.clear(&self.user).await;
        self.guard(cell, sent).await?;
        cell.commit(self.epoch, CartLines::new()).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::ServiceError;
    use crate::cart::line::tests::item;
    use crate::storage::MemoryStore;
    use crate::testing::{FakeCall, FakeCartService};

    fn id(raw: &str) -> ItemId {
        ItemId::parse(raw).unwrap()
    }

    /// A cell already sourced by `backend`.
    async fn sourced(backend: Arc<dyn CartBackend>) -> CartCell {
        let cell = CartCell::new(Arc::clone(&backend));
        let loaded = backend.load().await.unwrap();
        assert!(cell.finish(backend.epoch(), Some(&loaded), None).await);
        cell
    }

    fn remote(fake: &Arc<FakeCartService>, user: &str, epoch: u64) -> Arc<dyn CartBackend> {
        let service: Arc<dyn RemoteCartService> = fake.clone();
        Arc::new(RemoteBackend::new(service, id_user(user), epoch))
    }

    fn id_user(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_local_add_writes_mirror() {
        let store = MemoryStore::new();
        let backend: Arc<dyn CartBackend> = Arc::new(LocalBackend::new(Arc::new(store.clone()), 0));
        let cell = sourced(Arc::clone(&backend)).await;

        backend.add_item(&cell, &item("a", 1000), 2).await.unwrap();

        let mirrored = decode_guest_cart(store.read(GUEST_CART_KEY).unwrap().as_deref());
        assert_eq!(mirrored.quantity_of(&id("a")), 2);
    }

    #[tokio::test]
    async fn test_local_noop_does_not_write() {
        let store = MemoryStore::new();
        let backend: Arc<dyn CartBackend> = Arc::new(LocalBackend::new(Arc::new(store.clone()), 0));
        let cell = sourced(Arc::clone(&backend)).await;

        backend.remove_item(&cell, &id("ghost")).await.unwrap();
        backend.clear(&cell).await.unwrap();

        assert_eq!(store.read(GUEST_CART_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_local_validation_leaves_mirror_alone() {
        let store = MemoryStore::new();
        let backend: Arc<dyn CartBackend> = Arc::new(LocalBackend::new(Arc::new(store.clone()), 0));
        let cell = sourced(Arc::clone(&backend)).await;

        let err = backend.add_item(&cell, &item("a", 1000), 0).await.unwrap_err();

        assert!(matches!(err, CartError::Validation(_)));
        assert_eq!(store.read(GUEST_CART_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_remote_add_sends_new_total_then_refetches() {
        let fake = Arc::new(FakeCartService::for_user("u1"));
        fake.stock(item("b", 500));
        fake.seed_line(&id_user("u1"), &id("b"), 1);
        let backend = remote(&fake, "u1", 1);
        let cell = sourced(Arc::clone(&backend)).await;

        backend.add_item(&cell, &item("b", 500), 2).await.unwrap();

        assert!(fake.calls().contains(&FakeCall::AddOrUpdate(id_user("u1"), id("b"), 3)));
        assert_eq!(cell.snapshot().await.lines.quantity_of(&id("b")), 3);
    }

    #[tokio::test]
    async fn test_remote_failure_leaves_lines() {
        let fake = Arc::new(FakeCartService::for_user("u1"));
        fake.stock(item("b", 500));
        fake.seed_line(&id_user("u1"), &id("b"), 1);
        let backend = remote(&fake, "u1", 1);
        let cell = sourced(Arc::clone(&backend)).await;
        let before = cell.snapshot().await;

        fake.fail_next(ServiceError::Transport("connection reset".into()));
        let err = backend.add_item(&cell, &item("b", 500), 1).await.unwrap_err();

        assert!(matches!(err, CartError::Transport(_)));
        assert_eq!(cell.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_remote_remove_missing_skips_service() {
        let fake = Arc::new(FakeCartService::for_user("u1"));
        let backend = remote(&fake, "u1", 1);
        let cell = sourced(Arc::clone(&backend)).await;

        backend.remove_item(&cell, &id("ghost")).await.unwrap();
        backend.update_quantity(&cell, &id("ghost"), 4).await.unwrap();

        assert!(
            fake.calls()
                .iter()
                .all(|call| matches!(call, FakeCall::GetCart(_)))
        );
    }

    #[tokio::test]
    async fn test_remote_calls_act_for_backend_user_only() {
        let fake = Arc::new(FakeCartService::for_user("u2"));
        fake.stock(item("b", 500));
        fake.seed_line(&id_user("u1"), &id("b"), 5);
        let backend = remote(&fake, "u1", 1);
        let cell = CartCell::new(Arc::clone(&backend));
        let mut lines = CartLines::new();
        lines.add(&item("b", 500), 5).unwrap();
        assert!(cell.finish(1, Some(&lines), None).await);

        let err = backend.add_item(&cell, &item("b", 500), 1).await.unwrap_err();

        assert!(matches!(err, CartError::StaleSource));
        assert!(fake.calls().is_empty());
        assert!(fake.lines_for(&id_user("u2")).is_empty());
        assert_eq!(cell.snapshot().await.lines.quantity_of(&id("b")), 5);
    }

    #[tokio::test]
    async fn test_stale_epoch_is_rejected() {
        let fake = Arc::new(FakeCartService::for_user("u1"));
        fake.stock(item("b", 500));
        let cell = sourced(remote(&fake, "u1", 1)).await;
        let old = remote(&fake, "u1", 0);

        let err = old.add_item(&cell, &item("b", 500), 1).await.unwrap_err();
        assert!(matches!(err, CartError::StaleSource));
    }
}
