// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-interval polling with a hard attempt bound.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    /// Wall-clock budget of a poll that never completes.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    Pending,
    Done(T),
}

#[derive(Debug, thiserror::Error)]
#[error("gave up after {attempts} attempts")]
pub struct PollTimeout {
    pub attempts: u32,
}

/// Call `probe` until it returns [`PollStep::Done`], sleeping `interval`
/// after every pending answer.
///
/// Probe errors end the poll immediately. After `max_attempts` pending
/// answers the result is a [`PollTimeout`].
pub async fn bounded_poll<T, F, Fut>(policy: PollPolicy, mut probe: F) -> anyhow::Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<PollStep<T>>>,
{
    for attempt in 0..policy.max_attempts {
        match probe(attempt).await? {
            PollStep::Done(value) => return Ok(value),
            PollStep::Pending => {
                debug!(attempt, "still pending");
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
    Err(PollTimeout { attempts: policy.max_attempts }.into())
}

#[cfg(test)]
#[path = "poll_tests.rs"]
mod tests;
