// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet-level credentials: the worker's process-wide identity
//! credentials, cached on disk and refreshed via `AssumeFleetRoleForWorker`.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use rfw_core::{AwsCredentials, CachedCredentialsFile, Clock, FarmId, FleetId, WorkerId};
use rfw_wire::AssumeFleetRoleForWorkerRequest;
use tokio_util::sync::CancellationToken;

use super::{aws_credentials_from_wire, CredentialsContainer};
use crate::control_plane::ControlPlaneClient;
use crate::error::AgentResult;
use crate::fsutil;

const CACHE_MODE: u32 = 0o600;

pub struct FleetCredentials<C: Clock> {
    control_plane: ControlPlaneClient,
    clock: C,
    cache_path: PathBuf,
    request: AssumeFleetRoleForWorkerRequest,
    current: RwLock<AwsCredentials>,
}

impl<C: Clock> FleetCredentials<C> {
    /// Load cached credentials from disk if present and still fresh;
    /// otherwise calls `AssumeFleetRoleForWorker` immediately and caches
    /// the result. The ambient HTTP client is assumed to already carry
    /// whatever bootstrap identity (instance profile, ambient AWS
    /// credentials) authenticates the call to the dispatch service itself.
    pub async fn load_or_bootstrap(
        control_plane: ControlPlaneClient,
        clock: C,
        cache_path: PathBuf,
        farm_id: FarmId,
        fleet_id: FleetId,
        worker_id: WorkerId,
        interrupt: &CancellationToken,
    ) -> AgentResult<Arc<Self>> {
        let request = AssumeFleetRoleForWorkerRequest {
            farm_id,
            fleet_id,
            worker_id,
        };

        let cached = read_cache(&cache_path).filter(|creds| !creds.is_expired(&clock));

        let this = Arc::new(Self {
            control_plane,
            clock,
            cache_path,
            request,
            current: RwLock::new(cached.clone().unwrap_or_else(expired_placeholder)),
        });

        if cached.is_none() {
            this.refresh(interrupt).await?;
        }

        Ok(this)
    }

    pub fn current(&self) -> AwsCredentials {
        self.current.read().clone()
    }

    async fn assume_role(&self, interrupt: &CancellationToken) -> AgentResult<AwsCredentials> {
        let response = self
            .control_plane
            .assume_fleet_role_for_worker(&self.request, interrupt)
            .await?;
        let fresh = aws_credentials_from_wire(response.credentials)?;
        fsutil::atomic_write(
            &self.cache_path,
            serde_json::to_vec_pretty(&CachedCredentialsFile::from_credentials(&fresh))?.as_slice(),
            CACHE_MODE,
        )?;
        Ok(fresh)
    }
}

#[async_trait::async_trait]
impl<C: Clock> CredentialsContainer for FleetCredentials<C> {
    fn current_expiration_epoch_ms(&self) -> i64 {
        self.current.read().expiration_epoch_ms
    }

    async fn refresh(&self, interrupt: &CancellationToken) -> AgentResult<i64> {
        // Only the bootstrap path is taken when our own credentials are
        // already expired; a still-valid container is its own refresh.
        if !self.current.read().is_expired(&self.clock) {
            return Ok(self.current.read().expiration_epoch_ms);
        }
        let fresh = self.assume_role(interrupt).await?;
        let expiration = fresh.expiration_epoch_ms;
        *self.current.write() = fresh;
        Ok(expiration)
    }
}

fn read_cache(path: &std::path::Path) -> Option<AwsCredentials> {
    let bytes = std::fs::read(path).ok()?;
    let cached: CachedCredentialsFile = serde_json::from_slice(&bytes).ok()?;
    let expiration_epoch_ms = chrono::DateTime::parse_from_rfc3339(&cached.expiration_rfc3339)
        .ok()?
        .timestamp_millis();
    Some(AwsCredentials {
        access_key_id: cached.access_key_id,
        secret_access_key: cached.secret_access_key,
        session_token: cached.session_token,
        expiration_epoch_ms,
    })
}

fn expired_placeholder() -> AwsCredentials {
    AwsCredentials {
        access_key_id: String::new(),
        secret_access_key: String::new(),
        session_token: String::new(),
        expiration_epoch_ms: 0,
    }
}

#[cfg(test)]
#[path = "fleet_tests.rs"]
mod tests;
