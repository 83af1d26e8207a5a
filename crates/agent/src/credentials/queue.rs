// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-queue credentials: a credentials container that is
//! also an on-disk artefact manufacturer — it writes a credential-process
//! script plus an AWS profile entry referencing it, so that job processes
//! launched under the queue's OS-user can resolve AWS credentials through
//! the standard credential-process mechanism without ever seeing the
//! literal keys cross a process boundary the worker doesn't control.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rfw_core::{AwsCredentials, CachedCredentialsFile, FarmId, FleetId, QueueId, WorkerId};
use rfw_wire::AssumeQueueRoleForWorkerRequest;
use tokio_util::sync::CancellationToken;

use super::{aws_credentials_from_wire, CredentialsContainer};
use crate::control_plane::ControlPlaneClient;
use crate::error::AgentResult;
use crate::fsutil;

const CACHE_MODE: u32 = 0o640;
const QUEUE_DIR_MODE: u32 = 0o750;
const SCRIPT_MODE: u32 = 0o750;

/// Where on disk a queue's credential artefacts live, and the AWS config
/// file its profile entry is installed into. Kept separate from
/// [`QueueCredentials`] so tests can exercise layout without a live client.
pub struct QueueCredentialLayout {
    pub queue_dir: PathBuf,
    pub aws_config_path: PathBuf,
    pub profile_name: String,
}

impl QueueCredentialLayout {
    pub fn new(persistence_dir: &Path, aws_config_path: PathBuf, queue_id: &QueueId) -> Self {
        Self {
            queue_dir: persistence_dir.join("queues").join(queue_id.as_str()),
            aws_config_path,
            profile_name: format!("rfw-queue-{}", queue_id.as_str()),
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.queue_dir.join(format!("{}.json", self.profile_name))
    }

    #[cfg(unix)]
    pub fn script_path(&self) -> PathBuf {
        self.queue_dir.join("get_aws_credentials.sh")
    }

    #[cfg(windows)]
    pub fn script_path(&self) -> PathBuf {
        self.queue_dir.join("get_aws_credentials.cmd")
    }
}

pub struct QueueCredentials {
    control_plane: ControlPlaneClient,
    request: AssumeQueueRoleForWorkerRequest,
    layout: QueueCredentialLayout,
    current: RwLock<AwsCredentials>,
}

impl QueueCredentials {
    /// Lifecycle step 1: provision the directory, write the script,
    /// install the profile entry, then perform the initial refresh.
    pub async fn create(
        control_plane: ControlPlaneClient,
        layout: QueueCredentialLayout,
        farm_id: FarmId,
        fleet_id: FleetId,
        worker_id: WorkerId,
        queue_id: QueueId,
        interrupt: &CancellationToken,
    ) -> AgentResult<Arc<Self>> {
        fsutil::create_dir_with_mode(&layout.queue_dir, QUEUE_DIR_MODE)?;
        write_script(&layout)?;
        install_profile(&layout.aws_config_path, &layout.profile_name, &layout.script_path())?;

        let request = AssumeQueueRoleForWorkerRequest {
            farm_id,
            fleet_id,
            worker_id,
            queue_id,
        };

        let this = Arc::new(Self {
            control_plane,
            request,
            layout,
            current: RwLock::new(expired_placeholder()),
        });
        this.refresh(interrupt).await?;
        Ok(this)
    }

    pub fn current(&self) -> AwsCredentials {
        self.current.read().clone()
    }

    pub fn profile_name(&self) -> &str {
        &self.layout.profile_name
    }

    /// Lifecycle step 3: remove the profile entry and delete the
    /// queue directory. Idempotent — a second call is a no-op.
    pub fn cleanup(&self) -> std::io::Result<()> {
        remove_profile(&self.layout.aws_config_path, &self.layout.profile_name)?;
        match std::fs::remove_dir_all(&self.layout.queue_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl CredentialsContainer for QueueCredentials {
    fn current_expiration_epoch_ms(&self) -> i64 {
        self.current.read().expiration_epoch_ms
    }

    async fn refresh(&self, interrupt: &CancellationToken) -> AgentResult<i64> {
        let response = self
            .control_plane
            .assume_queue_role_for_worker(&self.request, interrupt)
            .await?;
        let fresh = aws_credentials_from_wire(response.credentials)?;
        fsutil::atomic_write(
            &self.layout.cache_path(),
            serde_json::to_vec_pretty(&CachedCredentialsFile::from_credentials(&fresh))?.as_slice(),
            CACHE_MODE,
        )?;
        let expiration = fresh.expiration_epoch_ms;
        *self.current.write() = fresh;
        Ok(expiration)
    }
}

fn expired_placeholder() -> AwsCredentials {
    AwsCredentials {
        access_key_id: String::new(),
        secret_access_key: String::new(),
        session_token: String::new(),
        expiration_epoch_ms: 0,
    }
}

#[cfg(unix)]
fn script_contents(layout: &QueueCredentialLayout) -> String {
    format!("#!/bin/sh\ncat \"{}\"\n", layout.cache_path().display())
}

#[cfg(windows)]
fn script_contents(layout: &QueueCredentialLayout) -> String {
    format!("@echo off\r\ntype \"{}\"\r\n", layout.cache_path().display())
}

fn write_script(layout: &QueueCredentialLayout) -> std::io::Result<()> {
    fsutil::atomic_write(
        &layout.script_path(),
        script_contents(layout).as_bytes(),
        SCRIPT_MODE,
    )
}

fn profile_header(name: &str) -> String {
    format!("[profile {name}]")
}

/// Append a `credential_process` profile entry if one with this name isn't
/// already present; a no-op otherwise (install is idempotent, matching
/// cleanup's idempotence requirement).
fn install_profile(config_path: &Path, profile_name: &str, script_path: &Path) -> std::io::Result<()> {
    let existing = std::fs::read_to_string(config_path).unwrap_or_default();
    let header = profile_header(profile_name);
    if existing.lines().any(|line| line.trim() == header) {
        return Ok(());
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&header);
    updated.push('\n');
    updated.push_str(&format!("credential_process = {}\n", script_path.display()));

    fsutil::atomic_write(config_path, updated.as_bytes(), 0o600)
}

/// Remove the named profile's section (from its `[profile ...]` header up
/// to, but not including, the next section header or EOF).
fn remove_profile(config_path: &Path, profile_name: &str) -> std::io::Result<()> {
    let Ok(existing) = std::fs::read_to_string(config_path) else {
        return Ok(());
    };
    let header = profile_header(profile_name);

    let mut kept = Vec::new();
    let mut skipping = false;
    for line in existing.lines() {
        if line.trim() == header {
            skipping = true;
            continue;
        }
        if skipping && line.trim_start().starts_with('[') {
            skipping = false;
        }
        if !skipping {
            kept.push(line);
        }
    }

    let mut updated = kept.join("\n");
    if !updated.is_empty() {
        updated.push('\n');
    }
    fsutil::atomic_write(config_path, updated.as_bytes(), 0o600)
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
