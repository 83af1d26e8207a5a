// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer-driven credential refresh.
//!
//! Schedules a single-shot timer against a [`CredentialsContainer`]'s
//! observable expiration; the gap between "now" and the advisory threshold
//! is halved on every tick so that the timer fires more often the closer
//! expiration gets, without a fixed poll interval.

use std::sync::Arc;
use std::time::Duration;

use rfw_core::Classification;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::CredentialsContainer;
use crate::error::AgentError;

#[derive(Debug, Clone, Copy)]
pub struct RefresherConfig {
    pub advisory_timeout: Duration,
    pub mandatory_timeout: Duration,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            advisory_timeout: Duration::from_secs(15 * 60),
            mandatory_timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// What the refresher reports to its owner when a refresh attempt, or the
/// approach of the mandatory window itself, needs attention.
#[derive(Debug)]
pub enum RefreshFailure {
    /// Time remaining fell inside the mandatory window before any refresh
    /// attempt succeeded; no further timer is scheduled.
    Timeout { expiration_epoch_ms: i64 },
    /// A refresh attempt failed with the given classified error.
    Request(AgentError),
}

/// Owns the background timer task for one credential container. Dropping
/// this value cancels the task; call [`CredentialsRefresher::stop`] to wait
/// for it to actually exit.
pub struct CredentialsRefresher {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CredentialsRefresher {
    /// Start the background timer. `on_failure` runs on the task for every
    /// `Timeout` or classified refresh error; it must not block.
    pub fn start<C, F>(
        container: Arc<C>,
        clock: impl rfw_core::Clock,
        config: RefresherConfig,
        on_failure: F,
    ) -> Self
    where
        C: CredentialsContainer + 'static,
        F: Fn(RefreshFailure) + Send + Sync + 'static,
    {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            run(container, clock, config, task_cancel, on_failure).await;
        });
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Cancel the timer and wait for the background task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for CredentialsRefresher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<C, F>(
    container: Arc<C>,
    clock: impl rfw_core::Clock,
    config: RefresherConfig,
    cancel: CancellationToken,
    on_failure: F,
) where
    C: CredentialsContainer,
    F: Fn(RefreshFailure) + Send + Sync + 'static,
{
    loop {
        let expiration = container.current_expiration_epoch_ms();
        let remaining_ms = expiration - clock.epoch_ms() as i64;

        let sleep_for = match next_fire_delay(remaining_ms, config) {
            Some(delay) => delay,
            None => {
                on_failure(RefreshFailure::Timeout {
                    expiration_epoch_ms: expiration,
                });
                return;
            }
        };

        debug!(?sleep_for, "credentials refresher sleeping");
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = cancel.cancelled() => return,
        }

        match container.refresh(&cancel).await {
            Ok(_new_expiration) => continue,
            Err(AgentError::RequestInterrupted) => return,
            Err(err) => {
                let reschedule = err.classification() == Some(Classification::ConditionallyRecoverable);
                warn!(error = %err, reschedule, "credential refresh failed");
                on_failure(RefreshFailure::Request(err));
                if !reschedule {
                    return;
                }
            }
        }
    }
}

/// Pure timer-math: given time remaining until expiration, how long until
/// the next fire, or `None` if we've entered the mandatory window and must
/// stop scheduling.
fn next_fire_delay(remaining_ms: i64, config: RefresherConfig) -> Option<Duration> {
    let advisory_ms = config.advisory_timeout.as_millis() as i64;
    let mandatory_ms = config.mandatory_timeout.as_millis() as i64;

    if remaining_ms > advisory_ms {
        let halfway = (remaining_ms - advisory_ms) / 2;
        Some(Duration::from_millis(halfway.max(0) as u64))
    } else if remaining_ms > mandatory_ms {
        Some(Duration::from_secs(60))
    } else {
        None
    }
}

#[cfg(test)]
#[path = "refresher_tests.rs"]
mod tests;
