// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use rfw_core::{
    ActionState, Capabilities, CompletedStatus, FarmId, FleetId, HostProperties, QueueId,
    SessionActionId, WorkerId,
};
use serde::{Deserialize, Serialize};

use crate::entities::EntityIdentifier;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkerRequest {
    pub farm_id: FarmId,
    pub fleet_id: FleetId,
    pub host_properties: HostProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteWorkerRequest {
    pub farm_id: FarmId,
    pub fleet_id: FleetId,
    pub worker_id: WorkerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Started,
    Stopping,
    Stopped,
}

rfw_core::simple_display! {
    WorkerStatus {
        Started => "STARTED",
        Stopping => "STOPPING",
        Stopped => "STOPPED",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkerRequest {
    pub farm_id: FarmId,
    pub fleet_id: FleetId,
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_properties: Option<HostProperties>,
}

/// Per-action progress the worker reports back on each schedule tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionActionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_status: Option<CompletedStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at_epoch_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at_epoch_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at_epoch_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<ActionState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkerScheduleRequest {
    pub farm_id: FarmId,
    pub fleet_id: FleetId,
    pub worker_id: WorkerId,
    pub updated_session_actions: HashMap<SessionActionId, SessionActionUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssumeFleetRoleForWorkerRequest {
    pub farm_id: FarmId,
    pub fleet_id: FleetId,
    pub worker_id: WorkerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssumeQueueRoleForWorkerRequest {
    pub farm_id: FarmId,
    pub fleet_id: FleetId,
    pub worker_id: WorkerId,
    pub queue_id: QueueId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGetJobEntityRequest {
    pub farm_id: FarmId,
    pub queue_id: QueueId,
    pub identifiers: Vec<EntityIdentifier>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfw_core::FleetId;

    #[test]
    fn create_worker_request_serializes_with_camel_case_fields() {
        let request = CreateWorkerRequest {
            farm_id: FarmId::new(),
            fleet_id: FleetId::new(),
            host_properties: HostProperties::from_addresses("render01", [], []),
        };
        let json = serde_json::to_value(&request).expect("serialize request");
        assert!(json.get("farmId").is_some());
        assert!(json.get("fleetId").is_some());
        assert!(json.get("hostProperties").is_some());
    }

    #[test]
    fn worker_status_round_trips_through_screaming_snake_case() {
        let json = serde_json::to_string(&WorkerStatus::Stopping).expect("serialize status");
        assert_eq!(json, "\"STOPPING\"");
        let parsed: WorkerStatus = serde_json::from_str(&json).expect("deserialize status");
        assert_eq!(parsed, WorkerStatus::Stopping);
    }
}
