// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use rfw_core::FakeClock;

use super::*;

#[test]
fn far_from_expiry_halves_the_gap_to_advisory() {
    let config = RefresherConfig::default();
    // 20 minutes remaining, advisory at 15 minutes: gap is 5 minutes, halved is 2.5 minutes.
    let remaining = Duration::from_secs(20 * 60).as_millis() as i64;
    let delay = next_fire_delay(remaining, config).expect("should schedule");
    assert_eq!(delay, Duration::from_secs(150));
}

#[test]
fn inside_advisory_but_above_mandatory_uses_one_minute() {
    let config = RefresherConfig::default();
    let remaining = Duration::from_secs(12 * 60).as_millis() as i64;
    let delay = next_fire_delay(remaining, config).expect("should schedule");
    assert_eq!(delay, Duration::from_secs(60));
}

#[test]
fn inside_mandatory_window_stops_scheduling() {
    let config = RefresherConfig::default();
    let remaining = Duration::from_secs(5 * 60).as_millis() as i64;
    assert!(next_fire_delay(remaining, config).is_none());
}

struct FakeContainer {
    expiration_ms: AtomicI64,
    refresh_calls: AtomicI64,
    fail_with: Mutex<Option<AgentError>>,
}

#[async_trait::async_trait]
impl CredentialsContainer for FakeContainer {
    fn current_expiration_epoch_ms(&self) -> i64 {
        self.expiration_ms.load(Ordering::SeqCst)
    }

    async fn refresh(&self, _interrupt: &CancellationToken) -> crate::error::AgentResult<i64> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_with.lock().expect("lock").take() {
            return Err(err);
        }
        let new_expiration = self.expiration_ms.load(Ordering::SeqCst) + Duration::from_secs(3600).as_millis() as i64;
        self.expiration_ms.store(new_expiration, Ordering::SeqCst);
        Ok(new_expiration)
    }
}

#[tokio::test(start_paused = true)]
async fn reaching_mandatory_window_invokes_timeout_without_refreshing() {
    let clock = FakeClock::new();
    let expiration = clock.epoch_ms() as i64 + Duration::from_secs(5 * 60).as_millis() as i64;
    let container = Arc::new(FakeContainer {
        expiration_ms: AtomicI64::new(expiration),
        refresh_calls: AtomicI64::new(0),
        fail_with: Mutex::new(None),
    });
    let fired = Arc::new(AtomicBool::new(false));
    let fired_clone = fired.clone();

    let refresher = CredentialsRefresher::start(
        container.clone(),
        clock,
        RefresherConfig::default(),
        move |failure| {
            assert!(matches!(failure, RefreshFailure::Timeout { .. }));
            fired_clone.store(true, Ordering::SeqCst);
        },
    );

    tokio::time::advance(Duration::from_millis(10)).await;
    refresher.stop().await;

    assert!(fired.load(Ordering::SeqCst));
    assert_eq!(container.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn unrecoverable_refresh_failure_stops_the_timer() {
    let clock = FakeClock::new();
    // 20 minutes out: first fire is 2.5 minutes away (halfway to the 15-minute
    // advisory threshold), well before the mandatory window is ever reached.
    let expiration = clock.epoch_ms() as i64 + Duration::from_secs(20 * 60).as_millis() as i64;
    let container = Arc::new(FakeContainer {
        expiration_ms: AtomicI64::new(expiration),
        refresh_calls: AtomicI64::new(0),
        fail_with: Mutex::new(Some(AgentError::RequestUnrecoverable("nope".to_string()))),
    });
    let failures = Arc::new(AtomicI64::new(0));
    let failures_clone = failures.clone();

    let refresher = CredentialsRefresher::start(
        container.clone(),
        clock,
        RefresherConfig::default(),
        move |_| {
            failures_clone.fetch_add(1, Ordering::SeqCst);
        },
    );

    tokio::time::advance(Duration::from_secs(3 * 60)).await;
    refresher.stop().await;

    assert_eq!(container.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}
