// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frozen worker configuration: a single immutable struct built once from
//! environment variables at process start. No CLI flag parser and no
//! on-disk config-file format live here.

use std::path::PathBuf;
use std::time::Duration;

use rfw_core::{FarmId, FleetId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for environment variable {0}: {1}")]
    InvalidVar(&'static str, String),
}

/// Everything the agent needs to run, resolved once at startup and never
/// mutated afterward.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub farm_id: FarmId,
    pub fleet_id: FleetId,
    pub endpoint: String,
    /// Root directory for `worker.json`, `credentials/`, `queues/`.
    pub persistence_dir: PathBuf,
    /// Root directory for per-session local log files.
    pub log_dir: PathBuf,
    /// AWS config file queue profile entries are installed into and
    /// removed from.
    pub aws_config_path: PathBuf,
    pub allow_instance_profile: bool,
    pub shutdown_grace: Duration,
    pub update_interval_default: Duration,
}

impl WorkerConfig {
    /// Build from environment variables, failing fast on anything required
    /// and missing. Mirrors the shape of a CLI->env->file->default builder
    /// but only implements the env/default tiers.
    pub fn from_env() -> Result<Self, ConfigError> {
        let farm_id = FarmId::from_string(require_var("RFW_FARM_ID")?);
        let fleet_id = FleetId::from_string(require_var("RFW_FLEET_ID")?);
        let endpoint = require_var("RFW_ENDPOINT")?;

        let persistence_dir = optional_var("RFW_STATE_DIR")
            .map(PathBuf::from)
            .map(Ok)
            .unwrap_or_else(default_persistence_dir)?;

        let log_dir = optional_var("RFW_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| persistence_dir.join("logs"));

        let aws_config_path = optional_var("RFW_AWS_CONFIG_PATH")
            .map(PathBuf::from)
            .map(Ok)
            .unwrap_or_else(default_aws_config_path)?;

        let allow_instance_profile = optional_var("RFW_ALLOW_INSTANCE_PROFILE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let shutdown_grace = parse_duration_secs("RFW_SHUTDOWN_GRACE_SECONDS", 120)?;
        let update_interval_default = parse_duration_secs("RFW_UPDATE_INTERVAL_SECONDS", 15)?;

        Ok(Self {
            farm_id,
            fleet_id,
            endpoint,
            persistence_dir,
            log_dir,
            aws_config_path,
            allow_instance_profile,
            shutdown_grace,
            update_interval_default,
        })
    }

    pub fn worker_identity_path(&self) -> PathBuf {
        self.persistence_dir.join("worker.json")
    }

    pub fn fleet_credentials_path(&self) -> PathBuf {
        self.persistence_dir.join("credentials").join("fleet.json")
    }

    pub fn queue_dir(&self, queue_id: &str) -> PathBuf {
        self.persistence_dir.join("queues").join(queue_id)
    }
}

fn require_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    match optional_var(name) {
        None => Ok(Duration::from_secs(default_secs)),
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidVar(name, raw)),
    }
}

fn default_persistence_dir() -> Result<PathBuf, ConfigError> {
    if let Some(xdg) = optional_var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("rfw-agent"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::MissingVar("HOME"))?;
    Ok(PathBuf::from(home).join(".local/state/rfw-agent"))
}

fn default_aws_config_path() -> Result<PathBuf, ConfigError> {
    let home = std::env::var("HOME").map_err(|_| ConfigError::MissingVar("HOME"))?;
    Ok(PathBuf::from(home).join(".aws").join("config"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_var_fails_fast() {
        let err = require_var("RFW_TEST_DEFINITELY_UNSET_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(_)));
    }

    #[test]
    fn duration_parsing_falls_back_to_default() {
        let d = parse_duration_secs("RFW_TEST_UNSET_DURATION", 15).expect("default duration");
        assert_eq!(d, Duration::from_secs(15));
    }
}
