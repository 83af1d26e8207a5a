// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session runtime: executes one session's actions serially, dispatching
//! to the job-template interpreter and attachment syncer — both external
//! collaborators specified only by the capability set this module
//! consumes, since the actual template language and transfer protocol are
//! out of scope here.

use rfw_core::{Clock, CompletedStatus, JobId, SessionActionKind, SessionIdentity};
use rfw_wire::{EntityIdentifier, EnvironmentDetails, JobAttachmentDetails, LogConfiguration, StepDetails};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::queue::{ActionQueue, RunningAction};
use crate::entities::EntityCache;
use crate::error::AgentResult;
use crate::fsutil;
use crate::logs::{LogSink, LogStreamUploader};

/// Terminal outcome of dispatching one action to its external collaborator.
pub struct ActionResult {
    pub completed_status: CompletedStatus,
    pub process_exit_code: Option<i32>,
    pub message: Option<String>,
    pub progress_percent: Option<f32>,
}

impl ActionResult {
    pub fn succeeded() -> Self {
        Self {
            completed_status: CompletedStatus::Succeeded,
            process_exit_code: Some(0),
            message: None,
            progress_percent: Some(100.0),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            completed_status: CompletedStatus::Failed,
            process_exit_code: None,
            message: Some(message.into()),
            progress_percent: None,
        }
    }
}

/// The job-template interpreter's capability surface, out of scope to
/// implement here — only its contract.
#[async_trait::async_trait]
pub trait JobTemplateInterpreter: Send + Sync {
    async fn enter_environment(
        &self,
        env: &EnvironmentDetails,
        os_user: &str,
        cancel: &CancellationToken,
    ) -> AgentResult<ActionResult>;

    async fn exit_environment(
        &self,
        env: &EnvironmentDetails,
        os_user: &str,
        cancel: &CancellationToken,
    ) -> AgentResult<ActionResult>;

    async fn run_task(
        &self,
        step: &StepDetails,
        parameters: &std::collections::BTreeMap<String, String>,
        os_user: &str,
        cancel: &CancellationToken,
    ) -> AgentResult<ActionResult>;
}

/// The attachment syncer's capability surface.
#[async_trait::async_trait]
pub trait AttachmentSyncer: Send + Sync {
    async fn sync_inputs(
        &self,
        attachments: &JobAttachmentDetails,
        dependencies: &[StepDetails],
        os_user: &str,
        cancel: &CancellationToken,
        progress: &(dyn Fn(f32) + Send + Sync),
    ) -> AgentResult<ActionResult>;
}

/// Failure provisioning a session before it can dequeue its first action.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StartFailure(pub String);

impl StartFailure {
    /// Server-side log provisioning carries its own error field, reported
    /// with this fixed prefix.
    pub fn from_server_log_error(error: String) -> Self {
        Self(format!("Log provisioning error: {error}"))
    }
}

/// Owns one session's action queue, log uploader, and dispatch loop.
pub struct SessionRuntime<S: LogSink, C: Clock> {
    pub identity: SessionIdentity,
    pub queue: ActionQueue,
    uploader: LogStreamUploader,
    clock: C,
    _sink: std::marker::PhantomData<S>,
}

impl<S: LogSink, C: Clock> SessionRuntime<S, C> {
    /// Session-start provisioning: create the queue-scoped log directory
    /// (mode 700) and the session log file (mode 600), then bind an
    /// uploader to the server-provided remote destination.
    pub fn provision(
        identity: SessionIdentity,
        log_root: &std::path::Path,
        log_config: Option<&LogConfiguration>,
        sink: S,
        clock: C,
    ) -> Result<Self, StartFailure> {
        let log_config = match log_config {
            Some(config) if !config.log_group_name.is_empty() => config,
            Some(_) => {
                return Err(StartFailure::from_server_log_error(
                    "empty log group name".to_string(),
                ))
            }
            None => {
                return Err(StartFailure::from_server_log_error(
                    "no log configuration provided".to_string(),
                ))
            }
        };

        let queue_dir = log_root.join(identity.queue_id.to_string());
        fsutil::create_dir_with_mode(&queue_dir, 0o700).map_err(|e| StartFailure(e.to_string()))?;

        let session_log_path = queue_dir.join(format!("{}.log", identity.session_id));
        fsutil::atomic_write(&session_log_path, b"", 0o600).map_err(|e| StartFailure(e.to_string()))?;

        let uploader = LogStreamUploader::start(
            sink,
            log_config.log_group_name.clone(),
            log_config.log_stream_name.clone(),
            clock.clone(),
        );

        let job_id = identity.job_id;
        Ok(Self {
            identity,
            queue: ActionQueue::new(job_id),
            uploader,
            clock,
            _sink: std::marker::PhantomData,
        })
    }

    pub fn job_id(&self) -> JobId {
        self.identity.job_id
    }

    pub fn emit_log(&self, message: &str) {
        self.uploader.enqueue(self.clock.epoch_ms() as i64, message);
    }

    /// Dispatch the currently-running action: resolve its definition via
    /// the entity cache, invoke the matching collaborator, await
    /// completion or cancellation, and record the outcome.
    pub async fn dispatch_running(
        &mut self,
        entities: &EntityCache,
        interpreter: &dyn JobTemplateInterpreter,
        syncer: &dyn AttachmentSyncer,
        os_user: &str,
        interrupt: &CancellationToken,
    ) -> Option<rfw_core::SessionAction> {
        let now = self.clock.epoch_ms() as i64;
        let job_id = self.job_id();
        let running: &RunningAction = self.queue.running()?;
        let action_id = running.action.id;
        let kind = running.action.kind.clone();
        let cancel = running.cancel.clone();

        let result = run_one(job_id, &kind, entities, interpreter, syncer, os_user, &cancel, interrupt)
            .await
            .unwrap_or_else(|err| ActionResult::failed(err.to_string()));

        if cancel.is_cancelled() {
            info!(action = %action_id, "action observed cancellation signal");
        }

        self.queue.complete_running(
            result.completed_status,
            result.message,
            result.progress_percent,
            now,
        )
    }

    pub async fn close(self) {
        self.uploader.close().await;
    }
}

/// Run one action's collaborator call to completion. Takes no borrow of a
/// [`SessionRuntime`]; callers (the single-session test harness via
/// [`SessionRuntime::dispatch_running`], or the scheduler's per-session
/// worker-pool task) bracket this with brief locked reads of the action
/// queue rather than holding a lock for the call's duration.
pub(crate) async fn run_one(
    job_id: JobId,
    kind: &SessionActionKind,
    entities: &EntityCache,
    interpreter: &dyn JobTemplateInterpreter,
    syncer: &dyn AttachmentSyncer,
    os_user: &str,
    cancel: &CancellationToken,
    interrupt: &CancellationToken,
) -> AgentResult<ActionResult> {
    match kind {
        SessionActionKind::EnvEnter { environment_id } => {
            let details = entities
                .environment_details(
                    EntityIdentifier::EnvironmentDetails { job_id, environment_id: *environment_id },
                    interrupt,
                )
                .await?;
            interpreter.enter_environment(&details, os_user, cancel).await
        }
        SessionActionKind::EnvExit { environment_id } => {
            let details = entities
                .environment_details(
                    EntityIdentifier::EnvironmentDetails { job_id, environment_id: *environment_id },
                    interrupt,
                )
                .await?;
            interpreter.exit_environment(&details, os_user, cancel).await
        }
        SessionActionKind::SyncInputJobAttachments { step_id } => {
            let attachments = entities
                .job_attachment_details(EntityIdentifier::JobAttachmentDetails { job_id }, interrupt)
                .await?;
            let mut dependencies = Vec::new();
            if let Some(step_id) = step_id {
                let step = entities
                    .step_details(
                        EntityIdentifier::StepDetails { job_id, step_id: *step_id },
                        interrupt,
                    )
                    .await?;
                dependencies.push(step);
            }
            syncer
                .sync_inputs(&attachments, &dependencies, os_user, cancel, &|_percent| {})
                .await
        }
        SessionActionKind::TaskRun { step_id, task_id: _, parameters } => {
            let step = entities
                .step_details(EntityIdentifier::StepDetails { job_id, step_id: *step_id }, interrupt)
                .await?;
            interpreter.run_task(&step, parameters, os_user, cancel).await
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
