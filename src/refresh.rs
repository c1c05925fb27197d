//! Guard against late responses overwriting a view.
//!
//! Every refresh takes a generation-stamped ticket. A result is applied only
//! if its ticket is still the newest one and the view is still mounted.
//!
//! The HTTP surface is stateless and answers each request directly, so no
//! route holds a slot. `ViewSlot` is for long-lived consumers that keep a
//! view on screen, such as a dashboard that re-polls
//! `ClinicService::dashboard` while the user navigates away and back.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

/// What a view currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loading,
    Ready(T),
    Failed(String),
}

/// Proof that a refresh was started; redeemed by `ViewSlot::complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    generation: u64,
}

struct Slot<T> {
    generation: u64,
    mounted: bool,
    state: ViewState<T>,
}

/// Latest state of one mounted view.
pub struct ViewSlot<T> {
    inner: Mutex<Slot<T>>,
}

impl<T: Clone> Default for ViewSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ViewSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Slot {
                generation: 0,
                mounted: true,
                state: ViewState::Loading,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        // State is replaced wholesale, so a poisoned slot is still consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a refresh. Any ticket handed out earlier becomes stale.
    pub fn begin(&self) -> RefreshTicket {
        let mut slot = self.lock();
        slot.generation += 1;
        slot.state = ViewState::Loading;
        RefreshTicket {
            generation: slot.generation,
        }
    }

    /// Apply a result. Returns `false` if it was discarded as stale.
    pub fn complete<E: Display>(&self, ticket: RefreshTicket, result: Result<T, E>) -> bool {
        let mut slot = self.lock();
        if !slot.mounted || ticket.generation != slot.generation {
            tracing::debug!(
                ticket = ticket.generation,
                current = slot.generation,
                mounted = slot.mounted,
                "Discarding stale view refresh"
            );
            return false;
        }
        slot.state = match result {
            Ok(value) => ViewState::Ready(value),
            Err(e) => {
                tracing::warn!(error = %e, "View refresh failed");
                ViewState::Failed(e.to_string())
            }
        };
        true
    }

    /// Begin, await `load`, and apply its result.
    pub async fn refresh<F, Fut, E>(&self, load: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let ticket = self.begin();
        let result = load().await;
        self.complete(ticket, result)
    }

    /// Tear the view down. Results still in flight are dropped.
    pub fn unmount(&self) {
        self.lock().mounted = false;
    }

    pub fn state(&self) -> ViewState<T> {
        self.lock().state.clone()
    }
}
