// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The credentials subsystem: a generic timer-driven refresher plus the
//! two concrete containers it drives — fleet-level and per-queue role
//! credentials.

pub mod fleet;
pub mod queue;
pub mod refresher;

pub use fleet::FleetCredentials;
pub use queue::QueueCredentials;
pub use refresher::{CredentialsRefresher, RefreshFailure, RefresherConfig};

use rfw_core::AwsCredentials;
use rfw_wire::WireCredentials;

use crate::error::{AgentError, AgentResult};

/// Convert the wire form (RFC 3339 expiration) to the domain form (epoch
/// milliseconds), the only lossy step in an otherwise 1:1 mapping.
pub fn aws_credentials_from_wire(wire: WireCredentials) -> AgentResult<AwsCredentials> {
    let expiration_epoch_ms = chrono::DateTime::parse_from_rfc3339(&wire.expiration)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| AgentError::RequestUnrecoverable(format!("invalid expiration: {e}")))?;
    Ok(AwsCredentials {
        access_key_id: wire.access_key_id,
        secret_access_key: wire.secret_access_key,
        session_token: wire.session_token,
        expiration_epoch_ms,
    })
}

/// A credential container the refresher can drive: it knows its current
/// expiration, can produce a fresh credential set, and can absorb a fresh
/// one once obtained. Implemented by [`fleet::FleetCredentials`] and
/// [`queue::QueueCredentials`].
#[async_trait::async_trait]
pub trait CredentialsContainer: Send + Sync {
    fn current_expiration_epoch_ms(&self) -> i64;

    /// Obtain and store a fresh credential set, returning its new
    /// expiration. Implementations call the appropriate `AssumeRole`
    /// operation and persist the on-disk artefact(s) themselves.
    async fn refresh(&self, interrupt: &tokio_util::sync::CancellationToken) -> AgentResult<i64>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
