// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker scheduler: the top-level reconciliation loop. Owns the sessions
//! map, the queue-credential cache, and the action-updates map; drives
//! `UpdateWorkerSchedule` ticks and the drain protocol.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use rfw_core::{Capabilities, Classification, Clock, CompletedStatus, HostProperties, QueueId, SessionActionId, SessionId, WorkerIdentity};
use rfw_wire::{AssignedSession, SessionActionUpdate, UpdateWorkerScheduleRequest, WorkerStatus};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::control_plane::ControlPlaneClient;
use crate::credentials::{
    CredentialsRefresher, FleetCredentials, QueueCredentialLayout, QueueCredentials, RefreshFailure,
    RefresherConfig,
};
use crate::entities::EntityCache;
use crate::error::{AgentError, AgentResult};
use crate::logs::LogSink;
use crate::sessions::runtime::{run_one, ActionResult, AttachmentSyncer, JobTemplateInterpreter, SessionRuntime};
use crate::sessions::{cleanup_session_user, CancelOutcome};

/// Longest a `progressMessage` may be before it is truncated, counted in
/// Unicode scalar values since downstream UIs render it as text.
pub const MAX_PROGRESS_MESSAGE_CHARS: usize = 4096;

pub fn truncate_progress_message(message: String) -> String {
    if message.chars().count() <= MAX_PROGRESS_MESSAGE_CHARS {
        return message;
    }
    message.chars().take(MAX_PROGRESS_MESSAGE_CHARS).collect()
}

/// Outcome of one reconciliation tick: a plain return value rather than an
/// exception raised mid-tick for control flow.
#[derive(Debug, Clone)]
pub enum Tick {
    Continue,
    Shutdown(ShutdownReason),
}

#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Host { grace: Duration },
    Service,
}

/// Latches a single host-initiated shutdown notice from the EC2 monitor:
/// the first emitted notice sets this signal; further monitor results are
/// ignored.
#[derive(Default)]
pub struct ShutdownSignal {
    set: AtomicBool,
    grace: SyncMutex<Option<Duration>>,
}

impl ShutdownSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notify(&self, grace: Duration) {
        if self.set.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.grace.lock() = Some(grace);
    }

    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::SeqCst)
    }

    pub fn grace(&self) -> Option<Duration> {
        *self.grace.lock()
    }
}

/// A credential-refresh incident observed since the previous tick, tagged
/// with the scope it applies to.
enum CredentialIncident {
    Fleet(AgentError),
    FleetTimeout,
    Queue(QueueId, AgentError),
    QueueTimeout(QueueId),
}

struct QueueCredentialEntry {
    credentials: Arc<QueueCredentials>,
    refresher: CredentialsRefresher,
}

/// A session guarded by its own lock so a long-running action dispatch
/// never blocks a cancel issued against the same session.
type SharedSession<S, C> = Arc<AsyncMutex<SessionRuntime<S, C>>>;

pub struct Scheduler<S: LogSink + Clone, C: Clock> {
    identity: WorkerIdentity,
    control_plane: ControlPlaneClient,
    clock: C,
    sink: S,
    #[allow(dead_code)]
    capabilities: Capabilities,
    #[allow(dead_code)]
    host_properties: HostProperties,
    log_dir: PathBuf,
    persistence_dir: PathBuf,
    aws_config_path: PathBuf,
    /// The OS account the agent process itself runs as; a session whose
    /// `os_user` matches this one is skipped by post-session cleanup, which
    /// only ever targets a *different* account.
    agent_os_user: String,

    #[allow(dead_code)]
    fleet_credentials: Arc<FleetCredentials<C>>,
    #[allow(dead_code)]
    fleet_refresher: CredentialsRefresher,

    sessions: HashMap<SessionId, SharedSession<S, C>>,
    entity_caches: HashMap<QueueId, Arc<EntityCache>>,
    queue_credentials: HashMap<QueueId, QueueCredentialEntry>,
    /// The dispatch task currently in flight for each session, if any, kept
    /// so drain can wait for (or, past the shutdown grace, abort) it rather
    /// than losing track of it after `tokio::spawn`.
    action_tasks: HashMap<SessionId, JoinHandle<()>>,

    action_updates: Arc<SyncMutex<HashMap<SessionActionId, SessionActionUpdate>>>,
    incidents: Arc<SyncMutex<Vec<CredentialIncident>>>,
    wakeup: Arc<Notify>,
    shutdown: Arc<ShutdownSignal>,
    update_interval: Duration,
}

impl<S: LogSink + Clone, C: Clock> Scheduler<S, C> {
    /// Construct a scheduler around an already-bootstrapped worker identity
    /// and fleet credentials, handed off once `UpdateWorker` has
    /// transitioned the worker to `STARTED`.
    pub fn new(
        identity: WorkerIdentity,
        control_plane: ControlPlaneClient,
        clock: C,
        sink: S,
        capabilities: Capabilities,
        host_properties: HostProperties,
        persistence_dir: PathBuf,
        log_dir: PathBuf,
        aws_config_path: PathBuf,
        agent_os_user: String,
        fleet_credentials: Arc<FleetCredentials<C>>,
    ) -> Self {
        let incidents = Arc::new(SyncMutex::new(Vec::new()));
        let wakeup = Arc::new(Notify::new());
        let action_updates = Arc::new(SyncMutex::new(HashMap::new()));

        let fleet_incidents = incidents.clone();
        let fleet_wakeup = wakeup.clone();
        let fleet_refresher = CredentialsRefresher::start(
            fleet_credentials.clone(),
            clock.clone(),
            RefresherConfig::default(),
            move |failure| {
                fleet_incidents.lock().push(match failure {
                    RefreshFailure::Timeout { .. } => CredentialIncident::FleetTimeout,
                    RefreshFailure::Request(err) => CredentialIncident::Fleet(err),
                });
                fleet_wakeup.notify_one();
            },
        );

        Self {
            identity,
            control_plane,
            clock,
            sink,
            capabilities,
            host_properties,
            log_dir,
            persistence_dir,
            aws_config_path,
            agent_os_user,
            fleet_credentials,
            fleet_refresher,
            sessions: HashMap::new(),
            entity_caches: HashMap::new(),
            queue_credentials: HashMap::new(),
            action_tasks: HashMap::new(),
            action_updates,
            incidents,
            wakeup,
            shutdown: ShutdownSignal::new(),
            update_interval: Duration::from_secs(15),
        }
    }

    /// Shared handle the EC2 shutdown monitor notifies from its own thread.
    pub fn shutdown_signal(&self) -> Arc<ShutdownSignal> {
        self.shutdown.clone()
    }

    /// Create-or-return this queue's credential container, starting its
    /// refresher on first use.
    async fn queue_credentials_for(
        &mut self,
        queue_id: QueueId,
        interrupt: &CancellationToken,
    ) -> AgentResult<Arc<QueueCredentials>> {
        if let Some(entry) = self.queue_credentials.get(&queue_id) {
            return Ok(entry.credentials.clone());
        }

        let layout = QueueCredentialLayout::new(&self.persistence_dir, self.aws_config_path.clone(), &queue_id);
        let credentials = QueueCredentials::create(
            self.control_plane.clone(),
            layout,
            self.identity.farm_id,
            self.identity.fleet_id,
            self.identity.worker_id,
            queue_id,
            interrupt,
        )
        .await?;

        let incidents = self.incidents.clone();
        let wakeup = self.wakeup.clone();
        let refresher = CredentialsRefresher::start(
            credentials.clone(),
            self.clock.clone(),
            RefresherConfig::default(),
            move |failure| {
                incidents.lock().push(match failure {
                    RefreshFailure::Timeout { .. } => CredentialIncident::QueueTimeout(queue_id),
                    RefreshFailure::Request(err) => CredentialIncident::Queue(queue_id, err),
                });
                wakeup.notify_one();
            },
        );

        self.queue_credentials.insert(queue_id, QueueCredentialEntry { credentials: credentials.clone(), refresher });
        Ok(credentials)
    }

    /// Retain every queue still present in `live_queues`; release every
    /// other entry's credentials.
    fn cleanup_stale_queue_credentials(&mut self, live_queues: &std::collections::HashSet<QueueId>) {
        let stale: Vec<QueueId> = self
            .queue_credentials
            .keys()
            .filter(|q| !live_queues.contains(q))
            .copied()
            .collect();
        for queue_id in stale {
            if let Some(entry) = self.queue_credentials.remove(&queue_id) {
                if let Err(err) = entry.credentials.cleanup() {
                    warn!(%queue_id, error = %err, "failed to clean up queue credential artefacts");
                }
            }
            self.entity_caches.remove(&queue_id);
        }
    }

    /// Materialize newly-assigned sessions and enqueue their initial
    /// actions, failing fast on provisioning errors.
    async fn admit_assigned_sessions(
        &mut self,
        assigned: Vec<AssignedSession>,
        failed_actions: &mut Vec<(SessionActionId, String)>,
        interrupt: &CancellationToken,
    ) {
        for assignment in assigned {
            if self.sessions.contains_key(&assignment.session_id) {
                continue;
            }

            if let Err(err) = self.queue_credentials_for(assignment.queue_id, interrupt).await {
                let (first, rest) = match assignment.session_actions.split_first() {
                    Some(split) => split,
                    None => continue,
                };
                failed_actions.push((first.session_action_id, err.to_string()));
                for action in rest {
                    failed_actions.push((action.session_action_id, "NEVER_ATTEMPTED: queue credentials unavailable".to_string()));
                }
                continue;
            }

            let identity = rfw_core::SessionIdentity {
                session_id: assignment.session_id,
                queue_id: assignment.queue_id,
                job_id: assignment.job_id,
                os_user: assignment.os_user,
            };

            let runtime = match SessionRuntime::provision(
                identity,
                &self.log_dir,
                Some(&assignment.log),
                self.sink.clone(),
                self.clock.clone(),
            ) {
                Ok(runtime) => runtime,
                Err(failure) => {
                    let (first, rest) = match assignment.session_actions.split_first() {
                        Some(split) => split,
                        None => continue,
                    };
                    failed_actions.push((first.session_action_id, failure.0.clone()));
                    for action in rest {
                        failed_actions.push((action.session_action_id, "NEVER_ATTEMPTED: session failed to provision".to_string()));
                    }
                    continue;
                }
            };

            let session = Arc::new(AsyncMutex::new(runtime));
            {
                let mut guard = session.lock().await;
                for action in assignment.session_actions {
                    guard.queue.enqueue_with_id(action.session_action_id, action.kind);
                }
            }
            self.sessions.insert(assignment.session_id, session);
        }
    }

    /// Apply the service's `cancelSessionActions` entries for this tick.
    fn apply_cancellations(&self, cancellations: HashMap<SessionId, Vec<SessionActionId>>, now_epoch_ms: i64) {
        for (session_id, action_ids) in cancellations {
            let Some(session) = self.sessions.get(&session_id) else {
                continue;
            };
            let session = session.clone();
            let updates = self.action_updates.clone();
            tokio::spawn(async move {
                let mut guard = session.lock().await;
                for action_id in action_ids {
                    if let CancelOutcome::Completed(action) = guard.queue.cancel(
                        action_id,
                        "cancelled by service".to_string(),
                        CompletedStatus::Canceled,
                        now_epoch_ms,
                    ) {
                        updates.lock().insert(action_id, update_from_action(&action));
                    }
                }
            });
        }
    }

    /// Dispatch the currently-ready action (if any) for every session that
    /// isn't already running one. Sessions run concurrently; each session's
    /// own single-flight queue is the bound, and tokio's own thread pool
    /// bounds true parallelism.
    fn dispatch_ready_sessions(
        &mut self,
        interpreter: Arc<dyn JobTemplateInterpreter>,
        syncer: Arc<dyn AttachmentSyncer>,
        interrupt: &CancellationToken,
    ) {
        let now = self.clock.epoch_ms() as i64;
        for (session_id, session) in self.sessions.clone() {
            if let Some(existing) = self.action_tasks.get(&session_id) {
                if !existing.is_finished() {
                    continue;
                }
            }

            let entity_caches = &mut self.entity_caches;
            let control_plane = self.control_plane.clone();
            let farm_id = self.identity.farm_id;
            let session = session.clone();
            let updates = self.action_updates.clone();
            let wakeup = self.wakeup.clone();
            let interpreter = interpreter.clone();
            let syncer = syncer.clone();
            let interrupt = interrupt.clone();

            // Resolve (or lazily create) this session's queue-scoped entity
            // cache up front; it needs `&mut self`, so it can't move inside
            // the spawned task.
            let queue_id_probe = {
                // A session's queue id is fixed at creation, so a blocking
                // peek here (no lock contention with a long-running action,
                // which never touches `identity`) is cheap and safe.
                match session.try_lock() {
                    Ok(guard) => Some(guard.identity.queue_id),
                    Err(_) => None,
                }
            };
            let Some(queue_id) = queue_id_probe else {
                continue;
            };
            let entities = entity_caches
                .entry(queue_id)
                .or_insert_with(|| Arc::new(EntityCache::new(control_plane, farm_id, queue_id)))
                .clone();

            let handle = tokio::spawn(async move {
                let (action_id, job_id, kind, os_user, cancel) = {
                    let mut guard = session.lock().await;
                    if guard.queue.running().is_none() {
                        guard.queue.dequeue(now);
                    }
                    let Some(running) = guard.queue.running() else {
                        return;
                    };
                    (
                        running.action.id,
                        guard.job_id(),
                        running.action.kind.clone(),
                        guard.identity.os_user.clone(),
                        running.cancel.clone(),
                    )
                };

                let result = run_one(
                    job_id,
                    &kind,
                    &entities,
                    interpreter.as_ref(),
                    syncer.as_ref(),
                    &os_user,
                    &cancel,
                    &interrupt,
                )
                .await
                .unwrap_or_else(|err| ActionResult::failed(err.to_string()));

                let mut guard = session.lock().await;
                if let Some(action) =
                    guard.queue.complete_running(result.completed_status, result.message, result.progress_percent, now)
                {
                    updates.lock().insert(action_id, update_from_action(&action));
                    wakeup.notify_one();
                }
            });
            self.action_tasks.insert(session_id, handle);
        }
    }

    /// One reconciliation tick. Returns what the caller should do next; the
    /// caller loops on `Tick::Continue` and runs the drain protocol on
    /// `Tick::Shutdown`.
    pub async fn tick(
        &mut self,
        interpreter: Arc<dyn JobTemplateInterpreter>,
        syncer: Arc<dyn AttachmentSyncer>,
        interrupt: &CancellationToken,
    ) -> AgentResult<Tick> {
        tokio::select! {
            _ = tokio::time::sleep(self.update_interval) => {}
            _ = self.wakeup.notified() => {}
        }

        if self.shutdown.is_set() {
            let grace = self.shutdown.grace().unwrap_or(Duration::from_secs(0));
            return Ok(Tick::Shutdown(ShutdownReason::Host { grace }));
        }

        let now = self.clock.epoch_ms() as i64;

        let mut updates: HashMap<SessionActionId, SessionActionUpdate> = std::mem::take(&mut *self.action_updates.lock());
        for update in updates.values_mut() {
            if let Some(message) = update.progress_message.take() {
                update.progress_message = Some(truncate_progress_message(message));
            }
        }

        let request = UpdateWorkerScheduleRequest {
            farm_id: self.identity.farm_id,
            fleet_id: self.identity.fleet_id,
            worker_id: self.identity.worker_id,
            updated_session_actions: updates,
        };

        let response = match self.control_plane.update_worker_schedule(&request, interrupt).await {
            Ok(response) => response,
            Err(AgentError::RequestWorkerOffline) => return Ok(Tick::Shutdown(ShutdownReason::Service)),
            Err(AgentError::RequestWorkerNotFound) => {
                warn!("worker resource no longer exists server-side; discarding persisted identity and shutting down");
                let _ = std::fs::remove_file(self.persistence_dir.join("worker.json"));
                return Ok(Tick::Shutdown(ShutdownReason::Service));
            }
            Err(err) => return Err(err),
        };

        if response.desired_worker_status == Some(WorkerStatus::Stopped) {
            return Ok(Tick::Shutdown(ShutdownReason::Service));
        }

        self.update_interval = Duration::from_secs(response.update_interval_seconds as u64);

        let mut failed_actions = Vec::new();
        self.admit_assigned_sessions(response.assigned_sessions, &mut failed_actions, interrupt).await;
        {
            let mut updates = self.action_updates.lock();
            for (action_id, message) in failed_actions {
                updates.insert(
                    action_id,
                    SessionActionUpdate {
                        completed_status: Some(CompletedStatus::Failed),
                        progress_message: Some(message),
                        ended_at_epoch_ms: Some(now),
                        ..Default::default()
                    },
                );
            }
        }

        let live_queues: std::collections::HashSet<QueueId> =
            self.sessions_queue_ids();
        self.cleanup_stale_queue_credentials(&live_queues);

        self.apply_cancellations(response.cancel_session_actions, now);
        self.process_credential_incidents(now);
        self.dispatch_ready_sessions(interpreter, syncer, interrupt);

        Ok(Tick::Continue)
    }

    fn sessions_queue_ids(&self) -> std::collections::HashSet<QueueId> {
        // Only a lower bound is available synchronously (each session's
        // queue id is fixed at creation, so a best-effort peek is enough
        // here); sessions currently mid-action simply keep their entry.
        self.sessions
            .values()
            .filter_map(|s| s.try_lock().ok().map(|g| g.identity.queue_id))
            .collect()
    }

    /// Fail queued actions for queues whose credentials went terminally
    /// bad; let conditionally-recoverable failures retry.
    fn process_credential_incidents(&mut self, now_epoch_ms: i64) {
        let incidents = std::mem::take(&mut *self.incidents.lock());
        for incident in incidents {
            match &incident {
                CredentialIncident::Fleet(err) | CredentialIncident::Queue(_, err)
                    if err.classification() == Some(Classification::ConditionallyRecoverable) =>
                {
                    continue;
                }
                _ => {}
            }
            match incident {
                CredentialIncident::Fleet(_) | CredentialIncident::FleetTimeout => {
                    self.shutdown.notify(Duration::from_secs(0));
                }
                CredentialIncident::Queue(queue_id, _) | CredentialIncident::QueueTimeout(queue_id) => {
                    self.fail_queued_actions_for_queue(queue_id, now_epoch_ms);
                    if let Some(entry) = self.queue_credentials.remove(&queue_id) {
                        let _ = entry.credentials.cleanup();
                        drop(entry.refresher);
                    }
                    self.entity_caches.remove(&queue_id);
                }
            }
        }
    }

    fn fail_queued_actions_for_queue(&self, queue_id: QueueId, now_epoch_ms: i64) {
        for session in self.sessions.values() {
            let session = session.clone();
            let updates = self.action_updates.clone();
            tokio::spawn(async move {
                let mut guard = session.lock().await;
                if guard.identity.queue_id != queue_id {
                    return;
                }
                let completed =
                    guard.queue.cancel_all("queue credentials unavailable".to_string(), CompletedStatus::NeverAttempted, true, now_epoch_ms);
                let mut updates = updates.lock();
                for action in completed {
                    updates.insert(action.id, update_from_action(&action));
                }
            });
        }
    }

    /// Drain protocol: cancel everything, wait for in-flight session
    /// actions to finish (or, on a host-initiated shutdown, force-stop
    /// whatever is left once the grace expires), sync one last batch of
    /// updates, and release every queue credential.
    pub async fn drain(&mut self, reason: ShutdownReason, interrupt: &CancellationToken) -> AgentResult<()> {
        let now = self.clock.epoch_ms() as i64;
        for session in self.sessions.values() {
            let completed = {
                let mut guard = session.lock().await;
                guard.queue.cancel_all("worker draining".to_string(), CompletedStatus::Canceled, true, now)
            };
            let mut updates = self.action_updates.lock();
            for action in completed {
                updates.insert(action.id, update_from_action(&action));
            }
        }

        let tasks: Vec<(SessionId, JoinHandle<()>)> = self.action_tasks.drain().collect();
        match reason {
            ShutdownReason::Host { grace } => {
                let budget = Duration::from_secs(3);
                let deadline = tokio::time::Instant::now() + grace.saturating_sub(budget);
                for (session_id, handle) in tasks {
                    let abort = handle.abort_handle();
                    let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                    if tokio::time::timeout(remaining, handle).await.is_err() {
                        warn!(%session_id, "session action did not finish within the shutdown grace; force-stopping it");
                        abort.abort();
                        self.force_interrupt_running_action(session_id, now).await;
                    }
                }
            }
            ShutdownReason::Service => {
                // A service-initiated drain waits indefinitely for in-flight
                // actions to report their own completion.
                for (_, handle) in tasks {
                    let _ = handle.await;
                }
            }
        }

        let final_updates = std::mem::take(&mut *self.action_updates.lock());
        if !final_updates.is_empty() {
            let request = UpdateWorkerScheduleRequest {
                farm_id: self.identity.farm_id,
                fleet_id: self.identity.fleet_id,
                worker_id: self.identity.worker_id,
                updated_session_actions: final_updates,
            };
            let _ = self.control_plane.update_worker_schedule(&request, interrupt).await;
        }

        for (queue_id, entry) in self.queue_credentials.drain() {
            if let Err(err) = entry.credentials.cleanup() {
                warn!(%queue_id, error = %err, "queue credential cleanup failed during drain");
            }
            drop(entry.refresher);
        }

        for session in self.sessions.values() {
            let os_user = session.lock().await.identity.os_user.clone();
            if let Err(err) = cleanup_session_user(&os_user, &self.agent_os_user) {
                warn!(error = %err, "session-user cleanup failed during drain");
            }
        }

        info!("drain complete");
        Ok(())
    }

    /// Record a still-running action as `Interrupted` after its dispatch
    /// task has been aborted past the shutdown grace — the task that would
    /// have reported its own completion no longer will.
    async fn force_interrupt_running_action(&self, session_id: SessionId, now_epoch_ms: i64) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };
        let mut guard = session.lock().await;
        if let Some(action) = guard.queue.complete_running(
            CompletedStatus::Interrupted,
            Some("force-stopped at shutdown grace expiry".to_string()),
            None,
            now_epoch_ms,
        ) {
            self.action_updates.lock().insert(action.id, update_from_action(&action));
        }
    }
}

fn update_from_action(action: &rfw_core::SessionAction) -> SessionActionUpdate {
    SessionActionUpdate {
        completed_status: action.completed_status,
        process_exit_code: None,
        started_at_epoch_ms: action.start_time_epoch_ms,
        ended_at_epoch_ms: action.end_time_epoch_ms,
        updated_at_epoch_ms: action.end_time_epoch_ms,
        progress_percent: action.progress_percent,
        progress_message: action.status_message.clone(),
        state: Some(action.state),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
