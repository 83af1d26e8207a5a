// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rfw_core::{ActionState, EnvironmentId, StepId, TaskId};

use super::*;

fn env_enter(env: EnvironmentId) -> SessionActionKind {
    SessionActionKind::EnvEnter { environment_id: env }
}

#[test]
fn dequeue_moves_the_head_into_the_running_slot() {
    let mut queue = ActionQueue::new(JobId::new());
    let env = EnvironmentId::new();
    queue.enqueue(env_enter(env));
    queue.enqueue(SessionActionKind::EnvExit { environment_id: env });

    let running = queue.dequeue(1000).expect("one action queued");
    assert_eq!(running.action.kind, env_enter(env));
    assert_eq!(running.action.state, ActionState::Running);
    assert_eq!(running.action.start_time_epoch_ms, Some(1000));
    assert_eq!(queue.len(), 2);

    assert!(queue.dequeue(1001).is_none(), "cannot dequeue while one is running");
}

#[test]
fn complete_running_clears_the_slot_and_records_the_outcome() {
    let mut queue = ActionQueue::new(JobId::new());
    queue.enqueue(env_enter(EnvironmentId::new()));
    queue.dequeue(0);

    let finished = queue
        .complete_running(CompletedStatus::Succeeded, None, Some(100.0), 50)
        .expect("an action was running");
    assert_eq!(finished.state, ActionState::Completed);
    assert_eq!(finished.completed_status, Some(CompletedStatus::Succeeded));
    assert_eq!(finished.end_time_epoch_ms, Some(50));
    assert!(queue.running().is_none());
}

#[test]
fn cancel_on_a_queued_action_completes_it_without_running() {
    let mut queue = ActionQueue::new(JobId::new());
    queue.enqueue(env_enter(EnvironmentId::new()));
    queue.enqueue(SessionActionKind::TaskRun {
        step_id: StepId::new(),
        task_id: TaskId::new(),
        parameters: Default::default(),
    });
    let target = queue.queued[1].id;

    match queue.cancel(target, "cancelled before start".to_string(), CompletedStatus::NeverAttempted, 10) {
        CancelOutcome::Completed(action) => {
            assert_eq!(action.completed_status, Some(CompletedStatus::NeverAttempted));
            assert_eq!(action.state, ActionState::Completed);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
    assert_eq!(queue.len(), 1);
}

#[test]
fn cancel_on_the_running_action_only_signals_it() {
    let mut queue = ActionQueue::new(JobId::new());
    queue.enqueue(env_enter(EnvironmentId::new()));
    let id = queue.dequeue(0).expect("running").action.id;

    match queue.cancel(id, "stop".to_string(), CompletedStatus::Canceled, 5) {
        CancelOutcome::SignaledRunning => {}
        other => panic!("expected SignaledRunning, got {other:?}"),
    }
    assert!(queue.running().expect("still running").cancel.is_cancelled());
}

#[test]
fn cancel_unknown_action_is_not_found() {
    let mut queue = ActionQueue::new(JobId::new());
    let bogus = rfw_core::SessionActionId::new();
    match queue.cancel(bogus, "x".to_string(), CompletedStatus::Canceled, 0) {
        CancelOutcome::NotFound => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn cancel_all_leaves_env_exits_in_place_when_requested() {
    let mut queue = ActionQueue::new(JobId::new());
    let env = EnvironmentId::new();
    queue.enqueue(env_enter(env));
    queue.enqueue(SessionActionKind::EnvExit { environment_id: env });
    queue.dequeue(0); // EnvEnter now running

    let completed = queue.cancel_all("draining".to_string(), CompletedStatus::Canceled, true, 100);

    assert!(completed.is_empty(), "the only queued action was an EnvExit, left in place");
    assert_eq!(queue.len(), 2, "running EnvEnter + retained EnvExit");
    assert!(queue.running().expect("still running").cancel.is_cancelled());
}

#[test]
fn cancel_all_without_ignore_completes_every_queued_action() {
    let mut queue = ActionQueue::new(JobId::new());
    let env = EnvironmentId::new();
    queue.enqueue(env_enter(env));
    queue.enqueue(SessionActionKind::EnvExit { environment_id: env });

    let completed = queue.cancel_all("draining".to_string(), CompletedStatus::NeverAttempted, false, 0);
    assert_eq!(completed.len(), 2);
    assert!(queue.is_empty());
}

#[test]
fn list_identifiers_covers_running_and_queued_actions_without_duplicates() {
    let job_id = JobId::new();
    let mut queue = ActionQueue::new(job_id);
    let env = EnvironmentId::new();
    let step = StepId::new();
    queue.enqueue(env_enter(env));
    queue.enqueue(SessionActionKind::SyncInputJobAttachments { step_id: Some(step) });
    queue.enqueue(SessionActionKind::TaskRun {
        step_id: step,
        task_id: TaskId::new(),
        parameters: Default::default(),
    });
    queue.dequeue(0); // running: EnvEnter

    let identifiers = queue.list_identifiers();
    assert_eq!(identifiers.len(), 3, "env details, job attachment details, step details (deduped)");
}
