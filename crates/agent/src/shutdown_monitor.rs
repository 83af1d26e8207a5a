// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! EC2 shutdown monitor: polls host metadata at 1 Hz for a
//! target-lifecycle-state change or a spot interruption notice, and
//! latches the scheduler's [`ShutdownSignal`] the first time either fires.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::scheduler::ShutdownSignal;

const DEFAULT_IMDS_BASE: &str = "http://169.254.169.254/latest";
const TOKEN_TTL_SECONDS: &str = "10";
const TERMINATION_GRACE: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct SpotInterruptionNotice {
    action: String,
    time: DateTime<Utc>,
}

/// Thin IMDSv2 wrapper: obtains a short-lived token, then attaches it to
/// every metadata query. The base URL is injectable so tests can point it
/// at a mock server instead of the real link-local address.
struct ImdsClient {
    http: Client,
    base: String,
}

impl ImdsClient {
    fn new(base: impl Into<String>) -> Self {
        Self { http: Client::new(), base: base.into() }
    }

    async fn fetch_token(&self) -> Option<String> {
        let response = self
            .http
            .put(format!("{}/api/token", self.base))
            .header("X-aws-ec2-metadata-token-ttl-seconds", TOKEN_TTL_SECONDS)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.text().await.ok()
    }

    async fn get(&self, token: &str, path: &str) -> Option<String> {
        let response = self
            .http
            .get(format!("{}{path}", self.base))
            .header("X-aws-ec2-metadata-token", token)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            debug!(%path, status = %response.status(), "metadata query returned non-success");
            return None;
        }
        response.text().await.ok()
    }
}

/// Owns the background polling task; dropping this stops the monitor.
pub struct ShutdownMonitor {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ShutdownMonitor {
    pub fn start(shutdown: std::sync::Arc<ShutdownSignal>) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let imds = ImdsClient::new(DEFAULT_IMDS_BASE);
        let handle = tokio::spawn(run(imds, shutdown, task_cancel));
        Self { cancel, handle: Some(handle) }
    }

    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn run(imds: ImdsClient, shutdown: std::sync::Arc<ShutdownSignal>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        if shutdown.is_set() {
            // A single emitted notice is enough; keep polling so
            // the task can still be cleanly stopped, but do no more work.
            continue;
        }

        let Some(token) = imds.fetch_token().await else {
            continue;
        };

        if target_lifecycle_terminated(&imds, &token).await {
            warn!("auto-scaling target lifecycle state is Terminated; shutting down");
            shutdown.notify(TERMINATION_GRACE);
            continue;
        }

        if let Some(grace) = spot_interruption_grace(&imds, &token).await {
            warn!(?grace, "spot interruption notice received; shutting down");
            shutdown.notify(grace);
        }
    }
}

async fn target_lifecycle_terminated(imds: &ImdsClient, token: &str) -> bool {
    let Some(body) = imds.get(token, "/meta-data/autoscaling/target-lifecycle-state").await else {
        return false;
    };
    body.trim() == "Terminated"
}

async fn spot_interruption_grace(imds: &ImdsClient, token: &str) -> Option<Duration> {
    let body = imds.get(token, "/meta-data/spot/instance-action").await?;
    let notice: SpotInterruptionNotice = serde_json::from_str(&body).ok()?;
    if notice.action != "terminate" && notice.action != "stop" {
        return None;
    }
    let now = Utc::now();
    let remaining = notice.time.signed_duration_since(now);
    Some(Duration::from_secs(remaining.num_seconds().max(0) as u64))
}

/// A one-shot check at bootstrap time for whether an instance profile is
/// attached, independent of the polling loop above.
pub async fn instance_profile_attached() -> bool {
    let imds = ImdsClient::new(DEFAULT_IMDS_BASE);
    let Some(token) = imds.fetch_token().await else {
        return false;
    };
    imds.get(&token, "/meta-data/iam/security-credentials/").await.is_some()
}

#[cfg(test)]
#[path = "shutdown_monitor_tests.rs"]
mod tests;
