// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-based implementations of the job-template interpreter and
//! attachment syncer: both are external collaborators whose actual
//! template language and transfer protocol are out of scope here, so these
//! adapters do the one thing the scheduler needs of them — run the
//! entity's command string under the session's OS-user and report the
//! outcome — and nothing more.

use std::collections::BTreeMap;
use std::process::Stdio;

use rfw_wire::{EnvironmentDetails, JobAttachmentDetails, StepDetails};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, AgentResult};
use crate::sessions::runtime::{ActionResult, AttachmentSyncer, JobTemplateInterpreter};

/// Runs `enter_command` / `exit_command` / `task_run_command` as the
/// session's OS-user, cancelling the child process if `cancel` fires first.
pub struct ProcessJobTemplateInterpreter;

#[async_trait::async_trait]
impl JobTemplateInterpreter for ProcessJobTemplateInterpreter {
    async fn enter_environment(
        &self,
        env: &EnvironmentDetails,
        os_user: &str,
        cancel: &CancellationToken,
    ) -> AgentResult<ActionResult> {
        run_shell(&env.enter_command, &BTreeMap::new(), os_user, cancel).await
    }

    async fn exit_environment(
        &self,
        env: &EnvironmentDetails,
        os_user: &str,
        cancel: &CancellationToken,
    ) -> AgentResult<ActionResult> {
        run_shell(&env.exit_command, &BTreeMap::new(), os_user, cancel).await
    }

    async fn run_task(
        &self,
        step: &StepDetails,
        parameters: &BTreeMap<String, String>,
        os_user: &str,
        cancel: &CancellationToken,
    ) -> AgentResult<ActionResult> {
        run_shell(&step.task_run_command, parameters, os_user, cancel).await
    }
}

/// Downloads each manifest with an external sync tool, one at a time,
/// reporting progress as a fraction of manifests completed. The actual
/// content-addressed transfer protocol lives in that external tool.
pub struct ProcessAttachmentSyncer {
    pub sync_command: String,
}

#[async_trait::async_trait]
impl AttachmentSyncer for ProcessAttachmentSyncer {
    async fn sync_inputs(
        &self,
        attachments: &JobAttachmentDetails,
        _dependencies: &[StepDetails],
        os_user: &str,
        cancel: &CancellationToken,
        progress: &(dyn Fn(f32) + Send + Sync),
    ) -> AgentResult<ActionResult> {
        if attachments.manifests.is_empty() {
            return Ok(ActionResult::succeeded());
        }

        let total = attachments.manifests.len();
        for (index, manifest) in attachments.manifests.iter().enumerate() {
            let mut parameters = BTreeMap::new();
            parameters.insert("manifest".to_string(), manifest.clone());
            let command = format!("{} \"$manifest\"", self.sync_command);
            let result = run_shell(&command, &parameters, os_user, cancel).await?;
            if !matches!(result.completed_status, rfw_core::CompletedStatus::Succeeded) {
                return Ok(result);
            }
            progress((index + 1) as f32 / total as f32 * 100.0);
        }
        Ok(ActionResult::succeeded())
    }
}

async fn run_shell(
    command: &str,
    parameters: &BTreeMap<String, String>,
    os_user: &str,
    cancel: &CancellationToken,
) -> AgentResult<ActionResult> {
    if command.trim().is_empty() {
        return Ok(ActionResult::succeeded());
    }

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .envs(parameters.iter().map(|(k, v)| (k.to_uppercase(), v.clone())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // If the dispatching task is ever aborted (a force-stop past the
        // shutdown grace) rather than running its cancellation branch to
        // completion, the child must not outlive it as an orphan.
        .kill_on_drop(true);

    run_as_user(&mut cmd, os_user)?;

    let mut child = cmd.spawn().map_err(AgentError::Io)?;

    tokio::select! {
        _ = cancel.cancelled() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            Ok(ActionResult {
                completed_status: rfw_core::CompletedStatus::Interrupted,
                process_exit_code: None,
                message: Some("canceled".to_string()),
                progress_percent: None,
            })
        }
        output = child.wait_with_output() => {
            let output = output.map_err(AgentError::Io)?;
            if output.status.success() {
                Ok(ActionResult::succeeded())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Ok(ActionResult {
                    completed_status: rfw_core::CompletedStatus::Failed,
                    process_exit_code: output.status.code(),
                    message: Some(stderr.trim().to_string()),
                    progress_percent: None,
                })
            }
        }
    }
}

#[cfg(unix)]
fn run_as_user(cmd: &mut Command, os_user: &str) -> AgentResult<()> {
    use std::os::unix::process::CommandExt as _;

    let uid = nix::unistd::User::from_name(os_user)
        .map_err(|e| AgentError::Io(std::io::Error::other(e)))?
        .ok_or_else(|| {
            AgentError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such OS user: {os_user}"),
            ))
        })?
        .uid;
    cmd.uid(uid.as_raw());
    Ok(())
}

#[cfg(windows)]
fn run_as_user(_cmd: &mut Command, _os_user: &str) -> AgentResult<()> {
    // Windows session impersonation is handled by the OS-user's own logon
    // session rather than a per-process uid switch; left to the deployment
    // that installs the worker as that user's scheduled task.
    Ok(())
}
