// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight cell for the refresh call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

type Pending = Shared<BoxFuture<'static, bool>>;

/// Holds the refresh that is currently running, if any.
///
/// The lock is only taken to check or install the pending future and is
/// never held across an await.
#[derive(Clone, Default)]
pub(crate) struct RefreshCell {
    current: Arc<Mutex<Option<(u64, Pending)>>>,
    next_id: Arc<AtomicU64>,
}

impl RefreshCell {
    /// Join the in-flight refresh, or start one with `start`.
    pub(crate) async fn run<F>(&self, start: F) -> bool
    where
        F: FnOnce() -> BoxFuture<'static, bool>,
    {
        let pending = {
            let mut current = self.current.lock();
            match current.as_ref() {
                Some((id, pending)) => {
                    debug!(refresh = id, "joining in-flight refresh");
                    pending.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let reset = ResetOnSettle { cell: Arc::clone(&self.current), id };
                    let fut = start();
                    let pending = async move {
                        let _reset = reset;
                        fut.await
                    }
                    .boxed()
                    .shared();
                    *current = Some((id, pending.clone()));
                    pending
                }
            }
        };
        pending.await
    }

    #[cfg(test)]
    pub(crate) fn is_idle(&self) -> bool {
        self.current.lock().is_none()
    }
}

/// Empties the cell when the refresh future completes or panics.
///
/// The cell keeps its own `Shared` clone, so a refresh whose waiters all went
/// away is not dropped; the next caller joins it and drives it to completion.
struct ResetOnSettle {
    cell: Arc<Mutex<Option<(u64, Pending)>>>,
    id: u64,
}

impl Drop for ResetOnSettle {
    fn drop(&mut self) {
        let mut current = self.cell.lock();
        if current.as_ref().is_some_and(|(id, _)| *id == self.id) {
            *current = None;
        }
    }
}

#[cfg(test)]
#[path = "inflight_tests.rs"]
mod tests;
