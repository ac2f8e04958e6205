//! In-memory stand-ins for the remote cart service.
//!
//! Enabled for this crate's unit tests and, through the `test-support`
//! feature, for downstream integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::{oneshot, watch};

use petstore_core::{ItemId, UserId};

use crate::api::{RemoteCartService, ServiceError, token_for};
use crate::cart::{CartEngine, CartLine, CatalogItem};
use crate::models::{AuthState, UserSession};

/// A call received by [`FakeCartService`], with the user it acted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    /// `get_cart`
    GetCart(UserId),
    /// `add_or_update_line`
    AddOrUpdate(UserId, ItemId, u32),
    /// `remove_line`
    Remove(UserId, ItemId),
    /// `clear`
    Clear(UserId),
}

impl FakeCall {
    /// User the call acted for.
    #[must_use]
    pub const fn user(&self) -> &UserId {
        match self {
            Self::GetCart(user)
            | Self::AddOrUpdate(user, _, _)
            | Self::Remove(user, _)
            | Self::Clear(user) => user,
        }
    }
}

#[derive(Default)]
struct FakeState {
    catalog: HashMap<ItemId, CatalogItem>,
    carts: HashMap<UserId, Vec<(ItemId, u32)>>,
    failures: VecDeque<ServiceError>,
    calls: Vec<FakeCall>,
    hold_fetches: bool,
    pending: Vec<oneshot::Sender<()>>,
}

/// Scriptable [`RemoteCartService`] keeping one cart per user.
///
/// Like the real client, a call is only accepted when the user it is made
/// for is the one signed in on the watched auth channel; refused calls are
/// not recorded. Fetches can be held back to stage out-of-order responses.
pub struct FakeCartService {
    auth: watch::Receiver<AuthState>,
    state: Mutex<FakeState>,
}

impl FakeCartService {
    /// A service following `auth`.
    #[must_use]
    pub fn new(auth: watch::Receiver<AuthState>) -> Self {
        Self {
            auth,
            state: Mutex::new(FakeState::default()),
        }
    }

    /// A service permanently signed in as `user_id`.
    #[must_use]
    pub fn for_user(user_id: &str) -> Self {
        let (_tx, rx) = watch::channel(signed_in(user_id));
        Self::new(rx)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Make `item` known to the service.
    pub fn stock(&self, item: CatalogItem) {
        self.with_state(|state| {
            state.catalog.insert(item.id.clone(), item);
        });
    }

    /// Put a line straight into `user`'s cart.
    pub fn seed_line(&self, user: &UserId, item_id: &ItemId, quantity: u32) {
        self.with_state(|state| upsert(state.carts.entry(user.clone()).or_default(), item_id, quantity));
    }

    /// Lines currently stored for `user`.
    #[must_use]
    pub fn lines_for(&self, user: &UserId) -> Vec<CartLine> {
        self.with_state(|state| render(state, user))
    }

    /// Fail the next call with `err`. Queued failures apply in order.
    pub fn fail_next(&self, err: ServiceError) {
        self.with_state(|state| state.failures.push_back(err));
    }

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<FakeCall> {
        self.with_state(|state| state.calls.clone())
    }

    /// Hold `get_cart` responses until released with [`Self::release_fetch`].
    pub fn hold_fetches(&self, hold: bool) {
        self.with_state(|state| state.hold_fetches = hold);
    }

    /// Number of held fetches.
    #[must_use]
    pub fn pending_fetches(&self) -> usize {
        self.with_state(|state| state.pending.len())
    }

    /// Let the `index`-th held fetch (oldest first) respond.
    ///
    /// Returns `false` if there is no such fetch.
    pub fn release_fetch(&self, index: usize) -> bool {
        self.with_state(|state| {
            if index >= state.pending.len() {
                return false;
            }
            let gate = state.pending.remove(index);
            gate.send(()).is_ok()
        })
    }

    /// Yield until `count` fetches are held. Returns `false` if that does not
    /// happen within a bounded number of scheduler turns.
    pub async fn wait_for_pending(&self, count: usize) -> bool {
        for _ in 0..1_000 {
            if self.pending_fetches() >= count {
                return true;
            }
            tokio::task::yield_now().await;
        }
        false
    }

    /// Check that `call` is made for the signed-in user, then record it.
    fn begin(&self, call: FakeCall) -> Result<(), ServiceError> {
        token_for(&self.auth.borrow(), call.user())?;

        self.with_state(|state| {
            state.calls.push(call);
            state.failures.pop_front().map_or(Ok(()), Err)
        })
    }
}

fn upsert(lines: &mut Vec<(ItemId, u32)>, item_id: &ItemId, quantity: u32) {
    match lines.iter_mut().find(|(id, _)| id == item_id) {
        Some(line) => line.1 = quantity,
        None => lines.push((item_id.clone(), quantity)),
    }
}

fn render(state: &FakeState, user: &UserId) -> Vec<CartLine> {
    state
        .carts
        .get(user)
        .into_iter()
        .flatten()
        .filter_map(|(id, quantity)| {
            state
                .catalog
                .get(id)
                .map(|item| CartLine::from_item(item, *quantity))
        })
        .collect()
}

#[async_trait]
impl RemoteCartService for FakeCartService {
    async fn get_cart(&self, user: &UserId) -> Result<Vec<CartLine>, ServiceError> {
        self.begin(FakeCall::GetCart(user.clone()))?;
        let lines = self.with_state(|state| render(state, user));

        let gate = self.with_state(|state| {
            state.hold_fetches.then(|| {
                let (tx, rx) = oneshot::channel();
                state.pending.push(tx);
                rx
            })
        });
        if let Some(gate) = gate {
            gate.await
                .map_err(|_| ServiceError::Transport("fetch abandoned".to_string()))?;
        }
        Ok(lines)
    }

    async fn add_or_update_line(
        &self,
        user: &UserId,
        product_id: &ItemId,
        quantity: u32,
    ) -> Result<(), ServiceError> {
        self.begin(FakeCall::AddOrUpdate(user.clone(), product_id.clone(), quantity))?;

        self.with_state(|state| {
            let item = state
                .catalog
                .get(product_id)
                .ok_or_else(|| rejected(404, "Product not found"))?;
            if quantity == 0 {
                return Err(rejected(400, "Invalid quantity"));
            }
            if item.count_in_stock.is_some_and(|stock| quantity > stock) {
                return Err(rejected(400, "Insufficient stock"));
            }
            upsert(state.carts.entry(user.clone()).or_default(), product_id, quantity);
            Ok(())
        })
    }

    async fn remove_line(&self, user: &UserId, product_id: &ItemId) -> Result<(), ServiceError> {
        self.begin(FakeCall::Remove(user.clone(), product_id.clone()))?;
        self.with_state(|state| {
            if let Some(lines) = state.carts.get_mut(user) {
                lines.retain(|(id, _)| id != product_id);
            }
        });
        Ok(())
    }

    async fn clear(&self, user: &UserId) -> Result<(), ServiceError> {
        self.begin(FakeCall::Clear(user.clone()))?;
        self.with_state(|state| state.carts.remove(user));
        Ok(())
    }
}

fn rejected(status: u16, message: &str) -> ServiceError {
    ServiceError::Rejected {
        status,
        message: message.to_string(),
    }
}

/// A signed-in session for `user_id` with a throwaway token.
///
/// # Panics
///
/// Panics if `user_id` is not a valid identifier.
#[must_use]
#[allow(clippy::expect_used)]
pub fn session(user_id: &str) -> UserSession {
    UserSession {
        id: UserId::parse(user_id).expect("test user id"),
        name: format!("User {user_id}"),
        email: None,
        is_admin: false,
        token: SecretString::from(format!("token-{user_id}")),
    }
}

/// [`AuthState`] signed in as `user_id`.
#[must_use]
pub fn signed_in(user_id: &str) -> AuthState {
    AuthState::Authenticated(session(user_id))
}

/// Yield until `engine` has finished sourcing. Returns `false` if it is
/// still loading after a bounded number of scheduler turns.
pub async fn wait_until_loaded(engine: &CartEngine) -> bool {
    for _ in 0..1_000 {
        if !engine.snapshot().await.is_loading {
            return true;
        }
        tokio::task::yield_now().await;
    }
    false
}

/// Shared handle, for call sites that need `Arc<dyn RemoteCartService>`.
#[must_use]
pub fn shared(fake: &Arc<FakeCartService>) -> Arc<dyn RemoteCartService> {
    Arc::clone(fake) as Arc<dyn RemoteCartService>
}
