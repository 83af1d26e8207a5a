// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes for every resource kind in the data model.

crate::define_id! {
    /// Identity of this worker process, assigned by `CreateWorker`.
    pub struct WorkerId("worker-");
}

crate::define_id! {
    /// The render farm this worker belongs to.
    pub struct FarmId("farm-");
}

crate::define_id! {
    /// The fleet this worker was provisioned into.
    pub struct FleetId("fleet-");
}

crate::define_id! {
    /// A queue a job was submitted against.
    pub struct QueueId("queue-");
}

crate::define_id! {
    /// A job: the top-level unit of submitted work.
    pub struct JobId("job-");
}

crate::define_id! {
    /// A step within a job's template.
    pub struct StepId("step-");
}

crate::define_id! {
    /// A task within a step.
    pub struct TaskId("task-");
}

crate::define_id! {
    /// A job-scoped environment that a session can enter/exit.
    pub struct EnvironmentId("environment-");
}

crate::define_id! {
    /// A session: a worker's locally materialized execution context for a
    /// contiguous slice of one job's work.
    pub struct SessionId("session-");
}

crate::define_id! {
    /// One atomic action inside a session's action queue.
    pub struct SessionActionId("sessionaction-");
}
