// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AWS-shaped credential bundle shared by fleet and queue credentials.

use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// A short-lived set of AWS-style credentials with an explicit expiration.
///
/// Never `Display`/`Debug`-printed in full; see [`AwsCredentials::redacted`]
/// for the form safe to put in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    /// Milliseconds since the Unix epoch.
    pub expiration_epoch_ms: i64,
}

impl AwsCredentials {
    pub fn is_expired(&self, clock: &impl Clock) -> bool {
        clock.epoch_ms() as i64 >= self.expiration_epoch_ms
    }

    /// True once within `within_ms` of expiration; used to trigger proactive refresh.
    pub fn expires_within(&self, clock: &impl Clock, within_ms: i64) -> bool {
        clock.epoch_ms() as i64 + within_ms >= self.expiration_epoch_ms
    }

    /// Safe-for-logs view: access key id only, everything else redacted.
    pub fn redacted(&self) -> RedactedCredentials<'_> {
        RedactedCredentials {
            access_key_id: &self.access_key_id,
            expiration_epoch_ms: self.expiration_epoch_ms,
        }
    }
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration_epoch_ms", &self.expiration_epoch_ms)
            .finish()
    }
}

pub struct RedactedCredentials<'a> {
    access_key_id: &'a str,
    expiration_epoch_ms: i64,
}

impl std::fmt::Display for RedactedCredentials<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (expires {})",
            self.access_key_id, self.expiration_epoch_ms
        )
    }
}

/// The "cached" on-disk JSON form consumed by `credential_process` scripts:
/// literal credentials plus the fixed `Version` discriminant AWS tooling
/// expects.
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedCredentialsFile {
    #[serde(rename = "Version")]
    pub version: u8,
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,
    #[serde(rename = "SessionToken")]
    pub session_token: String,
    #[serde(rename = "Expiration")]
    pub expiration_rfc3339: String,
}

impl CachedCredentialsFile {
    pub const VERSION: u8 = 1;

    pub fn from_credentials(creds: &AwsCredentials) -> Self {
        Self {
            version: Self::VERSION,
            access_key_id: creds.access_key_id.clone(),
            secret_access_key: creds.secret_access_key.clone(),
            session_token: creds.session_token.clone(),
            expiration_rfc3339: epoch_ms_to_rfc3339(creds.expiration_epoch_ms),
        }
    }
}

fn epoch_ms_to_rfc3339(epoch_ms: i64) -> String {
    let dt = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(epoch_ms)
        .unwrap_or(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH);
    dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
