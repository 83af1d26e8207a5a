// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rfw_core::{FakeClock, FarmId, FleetId, WorkerId};

use super::*;

#[test]
fn read_cache_returns_none_for_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(read_cache(&dir.path().join("nope.json")).is_none());
}

#[test]
fn read_cache_round_trips_a_written_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fleet.json");
    let creds = AwsCredentials {
        access_key_id: "AKIAEXAMPLE".to_string(),
        secret_access_key: "shh".to_string(),
        session_token: "tok".to_string(),
        expiration_epoch_ms: 1_700_000_000_000,
    };
    let bytes = serde_json::to_vec(&CachedCredentialsFile::from_credentials(&creds)).expect("serialize");
    std::fs::write(&path, bytes).expect("write");

    let read_back = read_cache(&path).expect("read cache");
    assert_eq!(read_back.access_key_id, "AKIAEXAMPLE");
    assert_eq!(read_back.secret_access_key, "shh");
}

#[tokio::test]
async fn refresh_is_a_no_op_when_current_credentials_are_still_valid() {
    let clock = FakeClock::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let fresh = AwsCredentials {
        access_key_id: "AKIAEXAMPLE".to_string(),
        secret_access_key: "shh".to_string(),
        session_token: "tok".to_string(),
        expiration_epoch_ms: clock.epoch_ms() as i64 + 3_600_000,
    };

    let fleet = FleetCredentials {
        control_plane: ControlPlaneClient::new("https://dispatch.example.invalid"),
        clock: clock.clone(),
        cache_path: dir.path().join("fleet.json"),
        request: AssumeFleetRoleForWorkerRequest {
            farm_id: FarmId::new(),
            fleet_id: FleetId::new(),
            worker_id: WorkerId::new(),
        },
        current: RwLock::new(fresh.clone()),
    };

    let interrupt = CancellationToken::new();
    let expiration = fleet.refresh(&interrupt).await.expect("refresh");
    assert_eq!(expiration, fresh.expiration_epoch_ms);
    assert_eq!(fleet.current().access_key_id, "AKIAEXAMPLE");
}
