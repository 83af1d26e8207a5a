// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote-API wrappers: one async function per dispatch-service operation,
//! all going through [`retrying_call`] so that retry, backoff, and failure
//! classification are implemented exactly once.

mod redact;

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use reqwest::{Client, StatusCode};
use rfw_core::Classification;
use rfw_wire::{
    ApiErrorBody, AssumeFleetRoleForWorkerRequest, AssumeQueueRoleForWorkerRequest,
    AssumeRoleResponse, BatchGetJobEntityRequest, BatchGetJobEntityResponse, CreateWorkerRequest,
    CreateWorkerResponse, DeleteWorkerRequest, UpdateWorkerRequest, UpdateWorkerResponse,
    UpdateWorkerScheduleRequest, UpdateWorkerScheduleResponse,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AgentError, AgentResult};

pub use redact::redact_body;

/// What to do with a non-2xx response once the generic throttle/internal-
/// server check has already said "don't retry automatically". Some
/// endpoints retry specific conflict reasons too, or need a distinct error
/// variant that carries its own handling at the call site rather than a
/// generic classification.
enum Outcome {
    RetryInPlace,
    Classify(Classification),
    WorkerNotFound,
    WorkerMustStopFirst,
}

/// Maximum number of identifiers the service accepts per `BatchGetJobEntity`
/// call; distinct from the wire crate's conservative default.
pub const MAX_IDENTIFIERS_PER_BATCH: usize = rfw_wire::MAX_IDENTIFIERS_PER_BATCH;

#[derive(Clone)]
pub struct ControlPlaneClient {
    http: Client,
    endpoint: String,
}

impl ControlPlaneClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Classifies failures the same way for every operation that has no
    /// special-cased conflict handling: throttle/internal-server retry,
    /// resource-not-found is conditionally recoverable, everything else
    /// unrecoverable.
    fn default_classify(body: &ApiErrorBody) -> Outcome {
        if body.is_resource_not_found() {
            Outcome::Classify(Classification::ConditionallyRecoverable)
        } else {
            Outcome::Classify(Classification::Unrecoverable)
        }
    }

    pub async fn create_worker(
        &self,
        request: &CreateWorkerRequest,
        interrupt: &CancellationToken,
    ) -> AgentResult<CreateWorkerResponse> {
        retrying_call(
            &self.http,
            &self.endpoint,
            "CreateWorker",
            request,
            interrupt,
            |body| {
                if body.is_status_conflict_on("fleet")
                    && body.reason.as_deref() == Some("CREATE_IN_PROGRESS")
                {
                    Outcome::RetryInPlace
                } else {
                    Outcome::Classify(Classification::Unrecoverable)
                }
            },
        )
        .await
    }

    pub async fn delete_worker(
        &self,
        request: &DeleteWorkerRequest,
        interrupt: &CancellationToken,
    ) -> AgentResult<()> {
        let recoverable_statuses = [
            "STARTED",
            "STOPPING",
            "NOT_RESPONDING",
            "NOT_COMPATIBLE",
            "RUNNING",
            "IDLE",
        ];
        retrying_call::<serde_json::Value, _>(
            &self.http,
            &self.endpoint,
            "DeleteWorker",
            request,
            interrupt,
            move |body| {
                if body.is_conflict()
                    && body.resource_type.as_deref() == Some("worker")
                    && body
                        .resource_status
                        .as_deref()
                        .map(|s| recoverable_statuses.contains(&s))
                        .unwrap_or(false)
                {
                    Outcome::Classify(Classification::ConditionallyRecoverable)
                } else {
                    Outcome::Classify(Classification::Unrecoverable)
                }
            },
        )
        .await
        .map(|_| ())
    }

    pub async fn update_worker(
        &self,
        request: &UpdateWorkerRequest,
        interrupt: &CancellationToken,
    ) -> AgentResult<UpdateWorkerResponse> {
        retrying_call(
            &self.http,
            &self.endpoint,
            "UpdateWorker",
            request,
            interrupt,
            |body| {
                if body.is_conflict()
                    && body.resource_type.as_deref() == Some("worker")
                    && body.is_status_conflict_on("worker")
                    && matches!(body.resource_status.as_deref(), Some("STOPPING") | Some("NOT_COMPATIBLE"))
                {
                    Outcome::WorkerMustStopFirst
                } else if body.is_conflict()
                    && ((body.resource_type.as_deref() == Some("worker")
                        && body.is_status_conflict_on("worker")
                        && body.resource_status.as_deref() == Some("ASSOCIATED"))
                        || body.reason.as_deref() == Some("CONCURRENT_MODIFICATION"))
                {
                    Outcome::RetryInPlace
                } else if body.is_resource_not_found() {
                    Outcome::Classify(Classification::ConditionallyRecoverable)
                } else {
                    Outcome::Classify(Classification::Unrecoverable)
                }
            },
        )
        .await
    }

    pub async fn update_worker_schedule(
        &self,
        request: &UpdateWorkerScheduleRequest,
        interrupt: &CancellationToken,
    ) -> AgentResult<UpdateWorkerScheduleResponse> {
        retrying_call(
            &self.http,
            &self.endpoint,
            "UpdateWorkerSchedule",
            request,
            interrupt,
            |body| {
                if body.is_resource_not_found() {
                    Outcome::WorkerNotFound
                } else if body.is_status_conflict_on("worker") {
                    Outcome::Classify(Classification::WorkerOffline)
                } else {
                    Outcome::Classify(Classification::Unrecoverable)
                }
            },
        )
        .await
    }

    pub async fn assume_fleet_role_for_worker(
        &self,
        request: &AssumeFleetRoleForWorkerRequest,
        interrupt: &CancellationToken,
    ) -> AgentResult<AssumeRoleResponse> {
        retrying_call(
            &self.http,
            &self.endpoint,
            "AssumeFleetRoleForWorker",
            request,
            interrupt,
            Self::default_classify,
        )
        .await
    }

    /// Retries a `Conflict{STATUS_CONFLICT, queue}` response within a
    /// 10-second wall-clock budget measured from the first attempt;
    /// exceeding the budget downgrades to `ConditionallyRecoverable`.
    pub async fn assume_queue_role_for_worker(
        &self,
        request: &AssumeQueueRoleForWorkerRequest,
        interrupt: &CancellationToken,
    ) -> AgentResult<AssumeRoleResponse> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let outcome = retrying_call(
                &self.http,
                &self.endpoint,
                "AssumeQueueRoleForWorker",
                request,
                interrupt,
                |body| {
                    if body.is_status_conflict_on("worker") {
                        Outcome::Classify(Classification::WorkerOffline)
                    } else if body.is_status_conflict_on("queue") {
                        Outcome::Classify(Classification::ConditionallyRecoverable)
                    } else {
                        Outcome::Classify(Classification::Unrecoverable)
                    }
                },
            )
            .await;

            match outcome {
                Ok(response) => return Ok(response),
                Err(AgentError::RequestConditionallyRecoverable(msg)) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(AgentError::RequestConditionallyRecoverable(msg));
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(250)) => continue,
                        _ = interrupt.cancelled() => return Err(AgentError::RequestInterrupted),
                    }
                }
                other => return other,
            }
        }
    }

    pub async fn batch_get_job_entity(
        &self,
        request: &BatchGetJobEntityRequest,
        interrupt: &CancellationToken,
    ) -> AgentResult<BatchGetJobEntityResponse> {
        retrying_call(
            &self.http,
            &self.endpoint,
            "BatchGetJobEntity",
            request,
            interrupt,
            Self::default_classify,
        )
        .await
    }
}

/// Shared retry loop: attempt the call; classify failures; retry
/// throttle/internal-server with exponential backoff honoring
/// `retryAfterSeconds`, observing `interrupt` during the sleep; otherwise
/// return the classified error.
async fn retrying_call<T, C>(
    http: &Client,
    endpoint: &str,
    operation: &'static str,
    body: &impl serde::Serialize,
    interrupt: &CancellationToken,
    classify: C,
) -> AgentResult<T>
where
    T: serde::de::DeserializeOwned,
    C: Fn(&ApiErrorBody) -> Outcome,
{
    let mut attempt: u32 = 0;
    loop {
        if interrupt.is_cancelled() {
            return Err(AgentError::RequestInterrupted);
        }

        let url = format!("{}/{}", endpoint.trim_end_matches('/'), operation);
        debug!(operation, attempt, "calling dispatch service");

        let result = send_once::<T>(http, &url, body).await;

        match result {
            Ok(value) => return Ok(value),
            Err(CallFailure::Transport(err)) => {
                if !wait_for_retry(interrupt, attempt, None).await {
                    return Err(AgentError::RequestInterrupted);
                }
                attempt += 1;
                warn!(operation, error = %err, "transport error, retrying");
                continue;
            }
            Err(CallFailure::Api { status, body: api_body }) => {
                let auto_retry = status == StatusCode::TOO_MANY_REQUESTS
                    || api_body.is_throttling()
                    || api_body.is_internal_server();

                let outcome = if auto_retry {
                    Outcome::RetryInPlace
                } else {
                    classify(&api_body)
                };

                match outcome {
                    Outcome::RetryInPlace => {
                        if !wait_for_retry(interrupt, attempt, api_body.retry_after_seconds).await
                        {
                            return Err(AgentError::RequestInterrupted);
                        }
                        attempt += 1;
                        continue;
                    }
                    Outcome::Classify(classification) => {
                        return Err(classification_to_error(classification, api_body.message));
                    }
                    Outcome::WorkerNotFound => return Err(AgentError::RequestWorkerNotFound),
                    Outcome::WorkerMustStopFirst => return Err(AgentError::RequestWorkerMustStopFirst),
                }
            }
        }
    }
}

enum CallFailure {
    Transport(reqwest::Error),
    Api { status: StatusCode, body: ApiErrorBody },
}

async fn send_once<T: serde::de::DeserializeOwned>(
    http: &Client,
    url: &str,
    body: &impl serde::Serialize,
) -> Result<T, CallFailure> {
    let response = http
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(CallFailure::Transport)?;

    let status = response.status();
    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(CallFailure::Transport)
    } else {
        let api_body: ApiErrorBody = response.json().await.unwrap_or(ApiErrorBody {
            code: status.to_string(),
            message: String::new(),
            retry_after_seconds: None,
            reason: None,
            resource_type: None,
            resource_status: None,
        });
        Err(CallFailure::Api { status, body: api_body })
    }
}

fn classification_to_error(classification: Classification, message: String) -> AgentError {
    match classification {
        Classification::Interrupted => AgentError::RequestInterrupted,
        Classification::ConditionallyRecoverable => {
            AgentError::RequestConditionallyRecoverable(message)
        }
        Classification::WorkerOffline => AgentError::RequestWorkerOffline,
        Classification::Unrecoverable => AgentError::RequestUnrecoverable(message),
    }
}

/// Sleep for an exponentially-increasing backoff with jitter, honoring
/// `retry_after_seconds` as a floor, observing `interrupt`. Returns `false`
/// if the interrupt fired instead of the sleep completing.
async fn wait_for_retry(
    interrupt: &CancellationToken,
    attempt: u32,
    retry_after_seconds: Option<u64>,
) -> bool {
    let base_ms = 200u64.saturating_mul(1u64 << attempt.min(8));
    let jitter_ms = rand::rng().random_range(0..=base_ms / 2 + 1);
    let backoff = Duration::from_millis(base_ms + jitter_ms);
    let floor = retry_after_seconds.map(Duration::from_secs).unwrap_or_default();
    let sleep_for = backoff.max(floor);

    tokio::select! {
        _ = tokio::time::sleep(sleep_for) => true,
        _ = interrupt.cancelled() => false,
    }
}
