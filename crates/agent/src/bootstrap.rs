// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bootstrap: establish a persisted worker identity, obtain fleet
//! credentials, and report `STARTED` before handing off to the scheduler.

use std::path::Path;
use std::sync::Arc;

use rfw_core::{Capabilities, Clock, HostProperties, WorkerId, WorkerIdentity};
use rfw_wire::{CreateWorkerRequest, UpdateWorkerRequest, WorkerStatus};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::control_plane::ControlPlaneClient;
use crate::credentials::FleetCredentials;
use crate::error::{AgentError, AgentResult};
use crate::fsutil;
use crate::shutdown_monitor;

/// Terminal outcome of bootstrapping: either the worker is ready to run,
/// or it must exit immediately without ever reaching the scheduler loop.
pub enum BootstrapOutcome<C: Clock> {
    Ready {
        identity: WorkerIdentity,
        fleet_credentials: Arc<FleetCredentials<C>>,
    },
    /// Instance profile attached but disallowed; the worker has already
    /// reported itself `STOPPED`.
    InstanceProfileDisallowed,
}

/// Run the full bootstrap sequence, retrying from `CreateWorker` whenever a
/// persisted identity turns out to be stale (`ResourceNotFound` on either
/// the credentials or `UpdateWorker` call).
pub async fn bootstrap<C: Clock>(
    config: &WorkerConfig,
    control_plane: &ControlPlaneClient,
    clock: C,
    capabilities: &Capabilities,
    host_properties: &HostProperties,
    interrupt: &CancellationToken,
) -> AgentResult<BootstrapOutcome<C>> {
    loop {
        let identity = load_or_create_identity(config, control_plane, host_properties, interrupt).await?;

        let fleet_credentials = match FleetCredentials::load_or_bootstrap(
            control_plane.clone(),
            clock.clone(),
            config.fleet_credentials_path(),
            identity.farm_id,
            identity.fleet_id,
            identity.worker_id,
            interrupt,
        )
        .await
        {
            Ok(credentials) => credentials,
            Err(err) if err.classification() == Some(rfw_core::Classification::ConditionallyRecoverable) => {
                warn!(error = %err, "fleet credentials stale, discarding persisted identity and re-bootstrapping");
                discard_identity(config);
                continue;
            }
            Err(err) => return Err(err),
        };

        let request = UpdateWorkerRequest {
            farm_id: identity.farm_id,
            fleet_id: identity.fleet_id,
            worker_id: identity.worker_id,
            status: WorkerStatus::Started,
            capabilities: Some(capabilities.clone()),
            host_properties: Some(host_properties.clone()),
        };

        let mut restart_bootstrap = false;
        loop {
            match control_plane.update_worker(&request, interrupt).await {
                Ok(_) => break,
                Err(AgentError::RequestWorkerMustStopFirst) => {
                    warn!("worker is STOPPING or NOT_COMPATIBLE; transitioning to STOPPED before retrying STARTED");
                    let stop_request = UpdateWorkerRequest {
                        farm_id: identity.farm_id,
                        fleet_id: identity.fleet_id,
                        worker_id: identity.worker_id,
                        status: WorkerStatus::Stopped,
                        capabilities: None,
                        host_properties: None,
                    };
                    control_plane.update_worker(&stop_request, interrupt).await?;
                    continue;
                }
                Err(err) if err.classification() == Some(rfw_core::Classification::ConditionallyRecoverable) => {
                    warn!(error = %err, "worker record gone, discarding persisted identity and re-bootstrapping");
                    discard_identity(config);
                    restart_bootstrap = true;
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        if restart_bootstrap {
            continue;
        }

        if !config.allow_instance_profile && shutdown_monitor::instance_profile_attached().await {
            warn!("instance profile attached but disallowed by configuration; stopping");
            let stop_request = UpdateWorkerRequest {
                farm_id: identity.farm_id,
                fleet_id: identity.fleet_id,
                worker_id: identity.worker_id,
                status: WorkerStatus::Stopped,
                capabilities: None,
                host_properties: None,
            };
            let _ = control_plane.update_worker(&stop_request, interrupt).await;
            return Ok(BootstrapOutcome::InstanceProfileDisallowed);
        }

        info!(worker_id = %identity.worker_id, "worker started");
        return Ok(BootstrapOutcome::Ready { identity, fleet_credentials });
    }
}

async fn load_or_create_identity(
    config: &WorkerConfig,
    control_plane: &ControlPlaneClient,
    host_properties: &HostProperties,
    interrupt: &CancellationToken,
) -> AgentResult<WorkerIdentity> {
    if let Some(identity) = read_persisted_identity(&config.worker_identity_path(), config) {
        return Ok(identity);
    }

    let request = CreateWorkerRequest {
        farm_id: config.farm_id,
        fleet_id: config.fleet_id,
        host_properties: host_properties.clone(),
    };
    let response = control_plane.create_worker(&request, interrupt).await?;
    let identity = WorkerIdentity::new(response.worker_id, config.farm_id, config.fleet_id);
    persist_identity(&config.worker_identity_path(), &identity)?;
    Ok(identity)
}

#[derive(serde::Serialize, serde::Deserialize)]
struct PersistedIdentity {
    worker_id: WorkerId,
}

/// Farm/fleet are config-derived, not persisted: a worker moved to a
/// different farm/fleet config is a different worker, not a resume.
fn read_persisted_identity(path: &Path, config: &WorkerConfig) -> Option<WorkerIdentity> {
    let raw = std::fs::read(path).ok()?;
    let persisted: PersistedIdentity = serde_json::from_slice(&raw).ok()?;
    Some(WorkerIdentity::new(persisted.worker_id, config.farm_id, config.fleet_id))
}

fn persist_identity(path: &Path, identity: &WorkerIdentity) -> AgentResult<()> {
    let persisted = PersistedIdentity { worker_id: identity.worker_id };
    fsutil::atomic_write(path, serde_json::to_vec_pretty(&persisted)?.as_slice(), 0o600)?;
    Ok(())
}

fn discard_identity(config: &WorkerConfig) {
    let _ = std::fs::remove_file(config.worker_identity_path());
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
