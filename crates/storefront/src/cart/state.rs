//! Shared cart state and the epoch-checked cell guarding it.
//!
//! Every write goes through [`CartCell`], which rejects results produced for
//! an epoch other than the current one. An epoch is bumped on each sourcing,
//! so work started for a previous identity can never land in the new cart.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use petstore_core::UserId;

use super::backend::CartBackend;
use super::line::{CartLines, CartTotals};
use crate::error::{CartError, CartNotice, Result};

/// Which backend is authoritative for writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "user_id", rename_all = "snake_case")]
pub enum CartSource {
    /// Guest cart mirrored in the local store.
    Local,
    /// Server-side cart of the given user.
    Remote(UserId),
}

/// Read-only view of the cart handed to presentation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSnapshot {
    /// Lines in insertion order.
    pub lines: CartLines,
    /// Totals computed from `lines`.
    pub totals: CartTotals,
    /// Active backend.
    pub source: CartSource,
    /// Whether sourcing for the current identity is still in flight.
    pub is_loading: bool,
    /// Failure of the most recent operation, cleared on the next success.
    pub last_error: Option<CartNotice>,
}

pub(crate) struct CartState {
    pub(crate) lines: CartLines,
    pub(crate) totals: CartTotals,
    pub(crate) source: CartSource,
    pub(crate) backend: Arc<dyn CartBackend>,
    pub(crate) epoch: u64,
    /// False until the first sourcing has begun.
    pub(crate) sourced: bool,
    pub(crate) is_loading: bool,
    pub(crate) last_error: Option<CartNotice>,
}

impl CartState {
    /// Replace the lines and recompute totals.
    fn set_lines(&mut self, lines: CartLines) {
        self.totals = lines.totals();
        self.lines = lines;
    }

    /// Switch to `backend`, emptying the cart until it has been sourced.
    pub(crate) fn switch_to(&mut self, backend: Arc<dyn CartBackend>) {
        self.epoch = backend.epoch();
        self.source = backend.source();
        self.backend = backend;
        self.sourced = true;
        self.is_loading = true;
        self.last_error = None;
        self.set_lines(CartLines::new());
    }

    /// Fail unless `epoch` is current and sourcing has finished.
    fn check(&self, epoch: u64) -> Result<()> {
        if epoch != self.epoch {
            return Err(CartError::StaleSource);
        }
        if self.is_loading {
            return Err(CartError::Loading);
        }
        Ok(())
    }
}

/// Mutex-guarded [`CartState`].
///
/// The lock is never held across a remote call.
pub(crate) struct CartCell {
    state: Mutex<CartState>,
}

impl CartCell {
    /// A cart that has not been sourced yet; it reports `is_loading` and
    /// rejects mutations until the first sourcing completes.
    pub(crate) fn new(backend: Arc<dyn CartBackend>) -> Self {
        Self {
            state: Mutex::new(CartState {
                lines: CartLines::new(),
                totals: CartTotals::default(),
                source: backend.source(),
                epoch: backend.epoch(),
                backend,
                sourced: false,
                is_loading: true,
                last_error: None,
            }),
        }
    }

    /// Direct access for sourcing and settlement.
    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, CartState> {
        self.state.lock().await
    }

    /// Backend for the current identity.
    pub(crate) async fn backend(&self) -> Arc<dyn CartBackend> {
        Arc::clone(&self.state.lock().await.backend)
    }

    /// Whether `epoch` is still the current sourcing epoch.
    pub(crate) async fn is_current(&self, epoch: u64) -> bool {
        self.state.lock().await.epoch == epoch
    }

    /// Copy of the lines, provided `epoch` is still current.
    pub(crate) async fn lines_at(&self, epoch: u64) -> Result<CartLines> {
        let state = self.state.lock().await;
        state.check(epoch)?;
        Ok(state.lines.clone())
    }

    /// Replace the lines wholesale, provided `epoch` is still current.
    pub(crate) async fn commit(&self, epoch: u64, lines: CartLines) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check(epoch)?;
        state.set_lines(lines);
        Ok(())
    }

    /// Edit the lines in place under the lock.
    ///
    /// `edit` works on a copy and reports whether anything changed. A
    /// change is handed to `persist` before it becomes visible; if either
    /// step fails the cart is left as it was.
    pub(crate) async fn apply<E, P>(&self, epoch: u64, edit: E, persist: P) -> Result<()>
    where
        E: FnOnce(&mut CartLines) -> Result<bool> + Send,
        P: FnOnce(&CartLines) -> Result<()> + Send,
    {
        let mut state = self.state.lock().await;
        state.check(epoch)?;

        let mut lines = state.lines.clone();
        if !edit(&mut lines)? {
            return Ok(());
        }
        persist(&lines)?;
        state.set_lines(lines);
        Ok(())
    }

    /// Finish sourcing for `epoch` with the loaded lines, or with `notice`
    /// when loading failed.
    ///
    /// Returns `false` when a newer sourcing has started, in which case the
    /// state is untouched.
    pub(crate) async fn finish(
        &self,
        epoch: u64,
        loaded: Option<&CartLines>,
        notice: Option<CartNotice>,
    ) -> bool {
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return false;
        }
        state.is_loading = false;
        if let Some(lines) = loaded {
            state.set_lines(lines.clone());
        }
        state.last_error = notice;
        true
    }

    /// Current snapshot.
    pub(crate) async fn snapshot(&self) -> CartSnapshot {
        let state = self.state.lock().await;
        CartSnapshot {
            lines: state.lines.clone(),
            totals: state.totals,
            source: state.source.clone(),
            is_loading: state.is_loading,
            last_error: state.last_error.clone(),
        }
    }
}

