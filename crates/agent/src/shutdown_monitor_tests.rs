// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use super::*;

async fn mock_token(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("PUT", "/api/token")
        .with_status(200)
        .with_body("test-token")
        .create_async()
        .await
}

#[tokio::test]
async fn target_lifecycle_terminated_true_when_state_is_terminated() {
    let mut server = mockito::Server::new_async().await;
    let _token_mock = mock_token(&mut server).await;
    let _state_mock = server
        .mock("GET", "/meta-data/autoscaling/target-lifecycle-state")
        .with_status(200)
        .with_body("Terminated")
        .create_async()
        .await;

    let imds = ImdsClient::new(server.url());
    let token = imds.fetch_token().await.expect("token");
    assert!(target_lifecycle_terminated(&imds, &token).await);
}

#[tokio::test]
async fn target_lifecycle_in_service_is_not_terminated() {
    let mut server = mockito::Server::new_async().await;
    let _token_mock = mock_token(&mut server).await;
    let _state_mock = server
        .mock("GET", "/meta-data/autoscaling/target-lifecycle-state")
        .with_status(200)
        .with_body("InService")
        .create_async()
        .await;

    let imds = ImdsClient::new(server.url());
    let token = imds.fetch_token().await.expect("token");
    assert!(!target_lifecycle_terminated(&imds, &token).await);
}

#[tokio::test]
async fn spot_interruption_in_the_future_yields_the_remaining_grace() {
    let mut server = mockito::Server::new_async().await;
    let _token_mock = mock_token(&mut server).await;
    let notice_time = Utc::now() + ChronoDuration::seconds(90);
    let _notice_mock = server
        .mock("GET", "/meta-data/spot/instance-action")
        .with_status(200)
        .with_body(json!({ "action": "terminate", "time": notice_time.to_rfc3339() }).to_string())
        .create_async()
        .await;

    let imds = ImdsClient::new(server.url());
    let token = imds.fetch_token().await.expect("token");
    let grace = spot_interruption_grace(&imds, &token).await.expect("notice present");
    assert!(grace.as_secs() <= 90 && grace.as_secs() >= 85, "grace was {grace:?}");
}

#[tokio::test]
async fn spot_interruption_notice_in_the_past_clamps_grace_to_zero() {
    let mut server = mockito::Server::new_async().await;
    let _token_mock = mock_token(&mut server).await;
    let notice_time = Utc::now() - ChronoDuration::seconds(30);
    let _notice_mock = server
        .mock("GET", "/meta-data/spot/instance-action")
        .with_status(200)
        .with_body(json!({ "action": "stop", "time": notice_time.to_rfc3339() }).to_string())
        .create_async()
        .await;

    let imds = ImdsClient::new(server.url());
    let token = imds.fetch_token().await.expect("token");
    let grace = spot_interruption_grace(&imds, &token).await.expect("notice present");
    assert_eq!(grace, Duration::from_secs(0));
}

#[tokio::test]
async fn spot_interruption_hibernate_action_is_ignored() {
    let mut server = mockito::Server::new_async().await;
    let _token_mock = mock_token(&mut server).await;
    let _notice_mock = server
        .mock("GET", "/meta-data/spot/instance-action")
        .with_status(200)
        .with_body(json!({ "action": "hibernate", "time": Utc::now().to_rfc3339() }).to_string())
        .create_async()
        .await;

    let imds = ImdsClient::new(server.url());
    let token = imds.fetch_token().await.expect("token");
    assert!(spot_interruption_grace(&imds, &token).await.is_none());
}

#[tokio::test]
async fn unreachable_token_endpoint_disables_the_monitor_for_that_tick() {
    let imds = ImdsClient::new("http://127.0.0.1:1");
    assert!(imds.fetch_token().await.is_none());
}
