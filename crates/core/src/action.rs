// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session actions: the tagged union the server schedules onto a
//! session's action queue, and the lifecycle state each one moves through.

use serde::{Deserialize, Serialize};

use crate::ids::{EnvironmentId, SessionActionId, StepId, TaskId};

/// One of the four operations a session can be asked to perform.
///
/// Ordering constraints (enforced by [`crate::define_id`]'s callers, not by
/// this type): all `EnvEnter`s precede any `TaskRun`; an `EnvExit` is LIFO
/// with its matching `EnvEnter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SessionActionKind {
    EnvEnter {
        environment_id: EnvironmentId,
    },
    EnvExit {
        environment_id: EnvironmentId,
    },
    SyncInputJobAttachments {
        #[serde(skip_serializing_if = "Option::is_none")]
        step_id: Option<StepId>,
    },
    TaskRun {
        step_id: StepId,
        task_id: TaskId,
        parameters: std::collections::BTreeMap<String, String>,
    },
}

impl SessionActionKind {
    pub fn is_env_enter(&self) -> bool {
        matches!(self, SessionActionKind::EnvEnter { .. })
    }

    pub fn is_task_run(&self) -> bool {
        matches!(self, SessionActionKind::TaskRun { .. })
    }

    pub fn environment_id(&self) -> Option<&EnvironmentId> {
        match self {
            SessionActionKind::EnvEnter { environment_id }
            | SessionActionKind::EnvExit { environment_id } => Some(environment_id),
            _ => None,
        }
    }
}

/// Lifecycle state of one queued or executing action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionState {
    Queued,
    Running,
    Completed,
}

/// Terminal outcome recorded once an action reaches [`ActionState::Completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletedStatus {
    Succeeded,
    Failed,
    Interrupted,
    Canceled,
    NeverAttempted,
}

crate::simple_display! {
    CompletedStatus {
        Succeeded => "SUCCEEDED",
        Failed => "FAILED",
        Interrupted => "INTERRUPTED",
        Canceled => "CANCELED",
        NeverAttempted => "NEVER_ATTEMPTED",
    }
}

impl CompletedStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, CompletedStatus::Succeeded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAction {
    pub id: SessionActionId,
    pub kind: SessionActionKind,
    pub state: ActionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_status: Option<CompletedStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time_epoch_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time_epoch_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl SessionAction {
    pub fn queued(kind: SessionActionKind) -> Self {
        Self {
            id: SessionActionId::new(),
            kind,
            state: ActionState::Queued,
            completed_status: None,
            start_time_epoch_ms: None,
            end_time_epoch_ms: None,
            progress_percent: None,
            status_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ActionState::Completed)
    }
}
