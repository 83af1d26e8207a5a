// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rfw_core::{FarmId, JobId, QueueId, StepId};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::*;

fn cache(endpoint: &str) -> EntityCache {
    EntityCache::new(
        ControlPlaneClient::new(endpoint.to_string()),
        FarmId::new(),
        QueueId::new(),
    )
}

#[tokio::test]
async fn duplicate_identifiers_in_one_request_issue_a_single_entry() {
    let mut server = mockito::Server::new_async().await;
    let job_id = JobId::new();
    let mock = server
        .mock("POST", "/BatchGetJobEntity")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "entities": [{
                    "identifierType": "JobDetails",
                    "jobId": job_id.to_string(),
                    "parameters": {},
                    "jobStem": "render",
                }],
                "errors": [],
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let cache = cache(&server.url());
    let identifiers = vec![
        EntityIdentifier::JobDetails { job_id },
        EntityIdentifier::JobDetails { job_id },
    ];
    let resolved = cache
        .resolve(&identifiers, &CancellationToken::new())
        .await
        .expect("resolve");

    assert_eq!(resolved.len(), 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn cached_identifier_is_served_without_a_second_call() {
    let mut server = mockito::Server::new_async().await;
    let job_id = JobId::new();
    let mock = server
        .mock("POST", "/BatchGetJobEntity")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "entities": [{
                    "identifierType": "JobDetails",
                    "jobId": job_id.to_string(),
                    "parameters": {},
                    "jobStem": "render",
                }],
                "errors": [],
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let cache = cache(&server.url());
    let identifier = EntityIdentifier::JobDetails { job_id };
    cache
        .resolve(std::slice::from_ref(&identifier), &CancellationToken::new())
        .await
        .expect("first resolve warms the cache");
    cache
        .resolve(std::slice::from_ref(&identifier), &CancellationToken::new())
        .await
        .expect("second resolve is served from cache");

    mock.assert_async().await;
}

#[tokio::test]
async fn requests_larger_than_the_batch_limit_are_chunked() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/BatchGetJobEntity")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"entities": [], "errors": []}).to_string())
        .expect(2)
        .create_async()
        .await;

    let cache = cache(&server.url());
    let identifiers: Vec<_> = (0..150)
        .map(|_| EntityIdentifier::JobDetails { job_id: JobId::new() })
        .collect();
    cache
        .resolve(&identifiers, &CancellationToken::new())
        .await
        .expect("resolve across two chunks");

    mock.assert_async().await;
}

#[tokio::test]
async fn a_service_reported_entity_error_surfaces_as_unsupported_schema() {
    let mut server = mockito::Server::new_async().await;
    let job_id = JobId::new();
    let _mock = server
        .mock("POST", "/BatchGetJobEntity")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "entities": [],
                "errors": [{
                    "identifier": {"identifierType": "JobDetails", "jobId": job_id.to_string()},
                    "code": "ValidationException",
                    "message": "unknown job stem",
                }],
            })
            .to_string(),
        )
        .create_async()
        .await;

    let cache = cache(&server.url());
    let err = cache
        .job_details(
            EntityIdentifier::JobDetails { job_id },
            &CancellationToken::new(),
        )
        .await
        .expect_err("service-reported error must surface");
    assert!(matches!(err, AgentError::JobEntityUnsupportedSchema(msg) if msg.contains("ValidationException")));
}

#[tokio::test]
async fn wrong_entity_kind_for_the_request_is_a_typed_details_error() {
    let mut server = mockito::Server::new_async().await;
    let job_id = JobId::new();
    let step_id = StepId::new();
    let _mock = server
        .mock("POST", "/BatchGetJobEntity")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "entities": [{
                    "identifierType": "StepDetails",
                    "jobId": job_id.to_string(),
                    "stepId": step_id.to_string(),
                    "dependencies": [],
                    "taskRunCommand": "",
                }],
                "errors": [],
            })
            .to_string(),
        )
        .create_async()
        .await;

    let cache = cache(&server.url());
    let err = cache
        .job_details(
            EntityIdentifier::StepDetails { job_id, step_id },
            &CancellationToken::new(),
        )
        .await
        .expect_err("a StepDetails entity is not a JobDetails");
    assert!(matches!(err, AgentError::JobDetailsError(_)));
}
