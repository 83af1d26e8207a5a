// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rfw_core::{FarmId, FleetId};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::*;

fn config(endpoint: &str, persistence_dir: &std::path::Path) -> WorkerConfig {
    WorkerConfig {
        farm_id: FarmId::from_string("farm-00000000000000000000000000000001"),
        fleet_id: FleetId::from_string("fleet-00000000000000000000000000000001"),
        endpoint: endpoint.to_string(),
        persistence_dir: persistence_dir.to_path_buf(),
        log_dir: persistence_dir.join("logs"),
        aws_config_path: persistence_dir.join("aws-config"),
        allow_instance_profile: true,
        shutdown_grace: std::time::Duration::from_secs(120),
        update_interval_default: std::time::Duration::from_secs(15),
    }
}

#[tokio::test]
async fn create_worker_is_called_when_no_identity_is_persisted() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(&server.url(), dir.path());
    let control_plane = ControlPlaneClient::new(server.url());

    let mock = server
        .mock("POST", "/CreateWorker")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "workerId": "worker-00000000000000000000000000000099" }).to_string())
        .expect(1)
        .create_async()
        .await;

    let host_properties = HostProperties::from_addresses("render01", [], []);
    let identity = load_or_create_identity(&config, &control_plane, &host_properties, &CancellationToken::new())
        .await
        .expect("create worker");

    assert_eq!(identity.worker_id.to_string(), "worker-00000000000000000000000000000099");
    assert_eq!(identity.farm_id, config.farm_id);
    mock.assert_async().await;

    let persisted = std::fs::read(config.worker_identity_path()).expect("identity persisted");
    let round_tripped: PersistedIdentity = serde_json::from_slice(&persisted).expect("valid json");
    assert_eq!(round_tripped.worker_id, identity.worker_id);
}

#[tokio::test]
async fn a_persisted_identity_is_reused_without_calling_create_worker() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(&server.url(), dir.path());
    let control_plane = ControlPlaneClient::new(server.url());

    let mock = server.mock("POST", "/CreateWorker").expect(0).create_async().await;

    persist_identity(
        &config.worker_identity_path(),
        &WorkerIdentity::new(
            rfw_core::WorkerId::from_string("worker-00000000000000000000000000000042"),
            config.farm_id,
            config.fleet_id,
        ),
    )
    .expect("persist");

    let host_properties = HostProperties::from_addresses("render01", [], []);
    let identity = load_or_create_identity(&config, &control_plane, &host_properties, &CancellationToken::new())
        .await
        .expect("reuse persisted identity");

    assert_eq!(identity.worker_id.to_string(), "worker-00000000000000000000000000000042");
    mock.assert_async().await;
}

#[tokio::test]
async fn update_worker_reports_must_stop_first_when_server_says_stopping() {
    let mut server = mockito::Server::new_async().await;
    let control_plane = ControlPlaneClient::new(server.url());

    let mock = server
        .mock("POST", "/UpdateWorker")
        .with_status(409)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "code": "ConflictException",
                "reason": "STATUS_CONFLICT",
                "resource_type": "worker",
                "resource_status": "STOPPING",
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let request = UpdateWorkerRequest {
        farm_id: FarmId::from_string("farm-00000000000000000000000000000001"),
        fleet_id: FleetId::from_string("fleet-00000000000000000000000000000001"),
        worker_id: rfw_core::WorkerId::new(),
        status: WorkerStatus::Started,
        capabilities: None,
        host_properties: None,
    };

    let result = control_plane.update_worker(&request, &CancellationToken::new()).await;
    assert!(matches!(result, Err(AgentError::RequestWorkerMustStopFirst)));
    mock.assert_async().await;
}

#[tokio::test]
async fn update_worker_reports_must_stop_first_when_server_says_not_compatible() {
    let mut server = mockito::Server::new_async().await;
    let control_plane = ControlPlaneClient::new(server.url());

    let mock = server
        .mock("POST", "/UpdateWorker")
        .with_status(409)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "code": "ConflictException",
                "reason": "STATUS_CONFLICT",
                "resource_type": "worker",
                "resource_status": "NOT_COMPATIBLE",
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let request = UpdateWorkerRequest {
        farm_id: FarmId::from_string("farm-00000000000000000000000000000001"),
        fleet_id: FleetId::from_string("fleet-00000000000000000000000000000001"),
        worker_id: rfw_core::WorkerId::new(),
        status: WorkerStatus::Started,
        capabilities: None,
        host_properties: None,
    };

    let result = control_plane.update_worker(&request, &CancellationToken::new()).await;
    assert!(matches!(result, Err(AgentError::RequestWorkerMustStopFirst)));
    mock.assert_async().await;
}

#[tokio::test]
async fn update_worker_schedule_reports_worker_not_found_on_resource_not_found() {
    let mut server = mockito::Server::new_async().await;
    let control_plane = ControlPlaneClient::new(server.url());

    let mock = server
        .mock("POST", "/UpdateWorkerSchedule")
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(json!({ "code": "ResourceNotFoundException" }).to_string())
        .expect(1)
        .create_async()
        .await;

    let request = rfw_wire::UpdateWorkerScheduleRequest {
        farm_id: FarmId::from_string("farm-00000000000000000000000000000001"),
        fleet_id: FleetId::from_string("fleet-00000000000000000000000000000001"),
        worker_id: rfw_core::WorkerId::new(),
        updated_session_actions: Default::default(),
    };

    let result = control_plane.update_worker_schedule(&request, &CancellationToken::new()).await;
    assert!(matches!(result, Err(AgentError::RequestWorkerNotFound)));
    mock.assert_async().await;
}

#[test]
fn discard_identity_removes_the_persisted_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config("https://dispatch.example.invalid", dir.path());
    persist_identity(
        &config.worker_identity_path(),
        &WorkerIdentity::new(rfw_core::WorkerId::new(), config.farm_id, config.fleet_id),
    )
    .expect("persist");
    assert!(config.worker_identity_path().exists());

    discard_identity(&config);
    assert!(!config.worker_identity_path().exists());
}
