// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session action queue: an ordered FIFO of actions with cancel
//! semantics distinguishing a currently-running action (cooperative signal)
//! from queued-but-not-started actions (immediate completion).

use std::collections::VecDeque;

use rfw_core::{CompletedStatus, JobId, SessionAction, SessionActionId, SessionActionKind};
use rfw_wire::EntityIdentifier;
use tokio_util::sync::CancellationToken;

/// One action currently being executed, paired with its cancel signal.
pub struct RunningAction {
    pub action: SessionAction,
    pub cancel: CancellationToken,
}

/// Outcome of a `cancel`/`cancel_all` call: queued actions complete
/// synchronously; the running action (if targeted) is only signaled — its
/// final state is recorded later by whoever is driving it.
#[derive(Debug)]
pub enum CancelOutcome {
    /// A queued action was removed and completed without ever running.
    Completed(SessionAction),
    /// The currently-running action's cancel token was signaled.
    SignaledRunning,
    /// No action with that id is present (already completed, or unknown).
    NotFound,
}

/// Ordered queue of actions belonging to one session.
pub struct ActionQueue {
    job_id: JobId,
    queued: VecDeque<SessionAction>,
    running: Option<RunningAction>,
}

impl ActionQueue {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            queued: VecDeque::new(),
            running: None,
        }
    }

    pub fn enqueue(&mut self, kind: SessionActionKind) {
        self.queued.push_back(SessionAction::queued(kind));
    }

    /// Enqueue an action under a server-assigned id, rather than minting a
    /// fresh random one (the scheduler's assignment path: the id the
    /// service reports back against must match the id it handed out).
    pub fn enqueue_with_id(&mut self, id: SessionActionId, kind: SessionActionKind) {
        let mut action = SessionAction::queued(kind);
        action.id = id;
        self.queued.push_back(action);
    }

    /// Move the head of the queue into the running slot, starting its
    /// cancel token fresh. Returns `None` if the queue is empty or an
    /// action is already running.
    pub fn dequeue(&mut self, now_epoch_ms: i64) -> Option<&RunningAction> {
        if self.running.is_some() {
            return None;
        }
        let mut action = self.queued.pop_front()?;
        action.state = rfw_core::ActionState::Running;
        action.start_time_epoch_ms = Some(now_epoch_ms);
        self.running = Some(RunningAction {
            action,
            cancel: CancellationToken::new(),
        });
        self.running.as_ref()
    }

    pub fn running(&self) -> Option<&RunningAction> {
        self.running.as_ref()
    }

    /// Record the outcome of the currently-running action and clear the
    /// running slot, returning the finished action for reporting.
    pub fn complete_running(
        &mut self,
        status: CompletedStatus,
        message: Option<String>,
        progress_percent: Option<f32>,
        now_epoch_ms: i64,
    ) -> Option<SessionAction> {
        let mut running = self.running.take()?;
        running.action.state = rfw_core::ActionState::Completed;
        running.action.completed_status = Some(status);
        running.action.status_message = message;
        running.action.progress_percent = progress_percent;
        running.action.end_time_epoch_ms = Some(now_epoch_ms);
        Some(running.action)
    }

    /// Cancel one action by id.
    pub fn cancel(
        &mut self,
        id: SessionActionId,
        message: String,
        outcome: CompletedStatus,
        now_epoch_ms: i64,
    ) -> CancelOutcome {
        if let Some(running) = &self.running {
            if running.action.id == id {
                running.cancel.cancel();
                return CancelOutcome::SignaledRunning;
            }
        }
        if let Some(pos) = self.queued.iter().position(|a| a.id == id) {
            let mut action = self.queued.remove(pos).expect("position just found");
            action.state = rfw_core::ActionState::Completed;
            action.completed_status = Some(outcome);
            action.status_message = Some(message);
            action.end_time_epoch_ms = Some(now_epoch_ms);
            return CancelOutcome::Completed(action);
        }
        CancelOutcome::NotFound
    }

    /// Cancel every action for draining: queued actions
    /// complete immediately with `outcome`, unless they are an `EnvExit`
    /// and `ignore_env_exits` is set (left in place so teardown still
    /// runs); the running action, if any, is only signaled.
    pub fn cancel_all(
        &mut self,
        message: String,
        outcome: CompletedStatus,
        ignore_env_exits: bool,
        now_epoch_ms: i64,
    ) -> Vec<SessionAction> {
        let mut completed = Vec::new();
        let mut retained = VecDeque::new();
        for mut action in self.queued.drain(..) {
            if ignore_env_exits && matches!(action.kind, SessionActionKind::EnvExit { .. }) {
                retained.push_back(action);
                continue;
            }
            action.state = rfw_core::ActionState::Completed;
            action.completed_status = Some(outcome);
            action.status_message = Some(message.clone());
            action.end_time_epoch_ms = Some(now_epoch_ms);
            completed.push(action);
        }
        self.queued = retained;

        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
        completed
    }

    /// Enumerate the entity identifiers that resolving every currently
    /// queued action will require, so the scheduler can pre-warm the
    /// entity cache.
    pub fn list_identifiers(&self) -> Vec<EntityIdentifier> {
        let mut identifiers: Vec<EntityIdentifier> =
            self.running.iter().map(|r| &r.action.kind).chain(self.queued.iter().map(|a| &a.kind))
                .flat_map(|kind| self.identifiers_for(kind))
                .collect();
        identifiers.dedup_by_key(|i| i.cache_key());
        identifiers
    }

    fn identifiers_for(&self, kind: &SessionActionKind) -> Vec<EntityIdentifier> {
        match kind {
            SessionActionKind::EnvEnter { environment_id } | SessionActionKind::EnvExit { environment_id } => {
                vec![EntityIdentifier::EnvironmentDetails {
                    job_id: self.job_id,
                    environment_id: *environment_id,
                }]
            }
            SessionActionKind::SyncInputJobAttachments { step_id } => {
                let mut ids = vec![EntityIdentifier::JobAttachmentDetails { job_id: self.job_id }];
                if let Some(step_id) = step_id {
                    ids.push(EntityIdentifier::StepDetails {
                        job_id: self.job_id,
                        step_id: *step_id,
                    });
                }
                ids
            }
            SessionActionKind::TaskRun { step_id, .. } => {
                vec![EntityIdentifier::StepDetails {
                    job_id: self.job_id,
                    step_id: *step_id,
                }]
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_none() && self.queued.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queued.len() + self.running.is_some() as usize
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
