// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-level error kinds. Every one of these is strictly distinct;
//! callers branch on the variant, not on the message text.

use rfw_core::Classification;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("request interrupted")]
    RequestInterrupted,

    #[error("request recoverable: {0}")]
    RequestRecoverable(String),

    #[error("request conditionally recoverable: {0}")]
    RequestConditionallyRecoverable(String),

    #[error("request unrecoverable: {0}")]
    RequestUnrecoverable(String),

    #[error("worker reported offline by the service")]
    RequestWorkerOffline,

    /// `UpdateWorkerSchedule` reports the worker resource itself no longer
    /// exists server-side; the persisted identity is stale and must be
    /// discarded before the worker exits.
    #[error("worker not found")]
    RequestWorkerNotFound,

    /// `UpdateWorker(STARTED)` conflicts because the worker is currently
    /// `STOPPING` or `NOT_COMPATIBLE`; it must be transitioned to `STOPPED`
    /// before `STARTED` can be retried.
    #[error("worker must be stopped before it can be started again")]
    RequestWorkerMustStopFirst,

    #[error("job entity schema unsupported: {0}")]
    JobEntityUnsupportedSchema(String),

    #[error("job details error: {0}")]
    JobDetailsError(String),

    #[error("step details error: {0}")]
    StepDetailsError(String),

    #[error("environment details error: {0}")]
    EnvironmentDetailsError(String),

    #[error("job attachment details error: {0}")]
    JobAttachmentDetailsError(String),

    #[error("OS-user credential reset required")]
    PasswordResetException,

    #[error("OS-user acquisition failed: bad credentials")]
    BadCredentials,

    #[error("service requested worker shutdown")]
    ServiceShutdown,

    #[error("instance profile attached but not permitted by configuration")]
    InstanceProfileAttached,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Classify an API-call outcome per the endpoint-specific retry table.
    /// A few variants (`RequestWorkerNotFound`, `RequestWorkerMustStopFirst`)
    /// carry their own handling at the call site and intentionally have no
    /// generic classification.
    pub fn classification(&self) -> Option<Classification> {
        match self {
            AgentError::RequestInterrupted => Some(Classification::Interrupted),
            AgentError::RequestConditionallyRecoverable(_) => {
                Some(Classification::ConditionallyRecoverable)
            }
            AgentError::RequestWorkerOffline => Some(Classification::WorkerOffline),
            AgentError::RequestUnrecoverable(_) | AgentError::RequestRecoverable(_) => {
                Some(Classification::Unrecoverable)
            }
            _ => None,
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
