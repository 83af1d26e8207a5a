// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rfw_core::{JobId, QueueId, SessionActionId, SessionId, WorkerId};
use serde::{Deserialize, Serialize};

use crate::entities::JobEntity;
use crate::requests::{SessionActionUpdate, WorkerStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkerResponse {
    pub worker_id: WorkerId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkerResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogConfiguration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfiguration {
    pub log_group_name: String,
    pub log_stream_name: String,
}

/// One session's worth of assigned actions, appended to the tail of the
/// worker's local view: the server's assignment for a session is
/// append-only during the session's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedSession {
    pub session_id: SessionId,
    pub queue_id: QueueId,
    pub job_id: JobId,
    pub os_user: String,
    pub log: LogConfiguration,
    pub session_actions: Vec<AssignedSessionAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedSessionAction {
    pub session_action_id: SessionActionId,
    #[serde(flatten)]
    pub kind: rfw_core::SessionActionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkerScheduleResponse {
    pub assigned_sessions: Vec<AssignedSession>,
    #[serde(default)]
    pub cancel_session_actions: std::collections::HashMap<SessionId, Vec<SessionActionId>>,
    pub update_interval_seconds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_worker_status: Option<WorkerStatus>,
    /// Echo of what the worker reported, kept for diagnostics only.
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub acknowledged_session_actions: std::collections::HashMap<SessionActionId, SessionActionUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    /// RFC 3339 timestamp.
    pub expiration: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssumeRoleResponse {
    pub credentials: WireCredentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGetJobEntityResponse {
    pub entities: Vec<JobEntity>,
    #[serde(default)]
    pub errors: Vec<crate::entities::EntityError>,
}
