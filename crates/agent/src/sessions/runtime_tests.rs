// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rfw_core::{EnvironmentId, FakeClock, FarmId, JobId, QueueId, SessionId};
use rfw_wire::PutLogEventsResponse;
use serde_json::json;

use super::*;
use crate::control_plane::ControlPlaneClient;

#[derive(Clone, Default)]
struct NullSink;

#[async_trait::async_trait]
impl LogSink for NullSink {
    async fn put_log_events(
        &self,
        _request: &rfw_wire::PutLogEventsRequest,
    ) -> AgentResult<PutLogEventsResponse> {
        Ok(PutLogEventsResponse::default())
    }
}

struct FakeInterpreter {
    entered: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl JobTemplateInterpreter for FakeInterpreter {
    async fn enter_environment(
        &self,
        _env: &EnvironmentDetails,
        _os_user: &str,
        _cancel: &tokio_util::sync::CancellationToken,
    ) -> AgentResult<ActionResult> {
        self.entered.store(true, Ordering::SeqCst);
        Ok(ActionResult::succeeded())
    }

    async fn exit_environment(
        &self,
        _env: &EnvironmentDetails,
        _os_user: &str,
        _cancel: &tokio_util::sync::CancellationToken,
    ) -> AgentResult<ActionResult> {
        Ok(ActionResult::succeeded())
    }

    async fn run_task(
        &self,
        _step: &StepDetails,
        _parameters: &std::collections::BTreeMap<String, String>,
        _os_user: &str,
        _cancel: &tokio_util::sync::CancellationToken,
    ) -> AgentResult<ActionResult> {
        Ok(ActionResult::succeeded())
    }
}

struct UnusedSyncer;

#[async_trait::async_trait]
impl AttachmentSyncer for UnusedSyncer {
    async fn sync_inputs(
        &self,
        _attachments: &JobAttachmentDetails,
        _dependencies: &[StepDetails],
        _os_user: &str,
        _cancel: &tokio_util::sync::CancellationToken,
        _progress: &(dyn Fn(f32) + Send + Sync),
    ) -> AgentResult<ActionResult> {
        Ok(ActionResult::succeeded())
    }
}

fn identity(job_id: JobId) -> SessionIdentity {
    SessionIdentity {
        session_id: SessionId::new(),
        queue_id: QueueId::new(),
        job_id,
        os_user: "render-job-user".to_string(),
    }
}

#[test]
fn provisioning_without_server_log_configuration_fails_with_the_fixed_prefix() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = SessionRuntime::<NullSink, FakeClock>::provision(
        identity(JobId::new()),
        dir.path(),
        None,
        NullSink,
        FakeClock::new(),
    )
    .expect_err("missing log configuration must fail provisioning");
    assert!(err.0.starts_with("Log provisioning error: "));
}

#[test]
fn provisioning_creates_the_queue_log_directory_and_session_log_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let session_identity = identity(JobId::new());
    let config = LogConfiguration {
        log_group_name: "group".to_string(),
        log_stream_name: "stream".to_string(),
    };
    let runtime = SessionRuntime::provision(
        session_identity.clone(),
        dir.path(),
        Some(&config),
        NullSink,
        FakeClock::new(),
    )
    .expect("provisioning succeeds");

    let queue_dir = dir.path().join(session_identity.queue_id.to_string());
    assert!(queue_dir.is_dir());
    let log_file = queue_dir.join(format!("{}.log", session_identity.session_id));
    assert!(log_file.is_file());
    drop(runtime);
}

#[tokio::test]
async fn dispatching_an_env_enter_invokes_the_interpreter_and_completes_the_action() {
    let job_id = JobId::new();
    let environment_id = EnvironmentId::new();

    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/BatchGetJobEntity")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "entities": [{
                    "identifierType": "EnvironmentDetails",
                    "jobId": job_id.to_string(),
                    "environmentId": environment_id.to_string(),
                    "enterCommand": "enter.sh",
                    "exitCommand": "exit.sh",
                }],
                "errors": [],
            })
            .to_string(),
        )
        .create_async()
        .await;
    let entities = EntityCache::new(
        ControlPlaneClient::new(server.url()),
        FarmId::new(),
        QueueId::new(),
    );

    let dir = tempfile::tempdir().expect("tempdir");
    let config = LogConfiguration {
        log_group_name: "group".to_string(),
        log_stream_name: "stream".to_string(),
    };
    let mut runtime = SessionRuntime::provision(
        identity(job_id),
        dir.path(),
        Some(&config),
        NullSink,
        FakeClock::new(),
    )
    .expect("provisioning succeeds");
    runtime.queue.enqueue(SessionActionKind::EnvEnter { environment_id });
    runtime.queue.dequeue(0);

    let entered = Arc::new(AtomicBool::new(false));
    let interpreter = FakeInterpreter { entered: entered.clone() };
    let syncer = UnusedSyncer;
    let interrupt = tokio_util::sync::CancellationToken::new();

    let finished = runtime
        .dispatch_running(&entities, &interpreter, &syncer, "render-job-user", &interrupt)
        .await
        .expect("an action was running");

    assert!(entered.load(Ordering::SeqCst));
    assert_eq!(finished.completed_status, Some(CompletedStatus::Succeeded));
    runtime.close().await;
}

#[tokio::test]
async fn dispatching_with_nothing_running_returns_none() {
    let entities = EntityCache::new(
        ControlPlaneClient::new("http://127.0.0.1:1".to_string()),
        FarmId::new(),
        QueueId::new(),
    );
    let dir = tempfile::tempdir().expect("tempdir");
    let config = LogConfiguration {
        log_group_name: "group".to_string(),
        log_stream_name: "stream".to_string(),
    };
    let mut runtime = SessionRuntime::provision(
        identity(JobId::new()),
        dir.path(),
        Some(&config),
        NullSink,
        FakeClock::new(),
    )
    .expect("provisioning succeeds");

    let interpreter = FakeInterpreter { entered: Arc::new(AtomicBool::new(false)) };
    let syncer = UnusedSyncer;
    let interrupt = tokio_util::sync::CancellationToken::new();

    let finished = runtime
        .dispatch_running(&entities, &interpreter, &syncer, "render-job-user", &interrupt)
        .await;
    assert!(finished.is_none());
    runtime.close().await;
}
