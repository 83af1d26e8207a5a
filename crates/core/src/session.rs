// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session state machine: `PENDING -> RUNNING -> (STOPPING -> STOPPED)`,
//! with `STOPPED` terminal.

use serde::{Deserialize, Serialize};

use crate::ids::{JobId, QueueId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Pending,
    Running,
    Stopping,
    Stopped,
}

crate::simple_display! {
    SessionState {
        Pending => "PENDING",
        Running => "RUNNING",
        Stopping => "STOPPING",
        Stopped => "STOPPED",
    }
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped)
    }

    /// True if `next` is a legal transition from `self`.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Pending, SessionState::Running)
                | (SessionState::Running, SessionState::Stopping)
                | (SessionState::Stopping, SessionState::Stopped)
        )
    }
}

/// Error returned when an illegal session state transition is attempted.
#[derive(Debug, thiserror::Error)]
#[error("illegal session transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Metadata identifying a session: fixed for its entire lifetime. A
/// session's OS-user is fixed at creation; it never changes mid-session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub session_id: SessionId,
    pub queue_id: QueueId,
    pub job_id: JobId,
    pub os_user: String,
}

/// Tracks the state machine transitions of one session. Holding the action
/// queue, log uploader and currently-executing action is left to the
/// runtime layer; this type owns only the state machine itself.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: SessionIdentity,
    state: SessionState,
}

impl Session {
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity,
            state: SessionState::Pending,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transition(&mut self, next: SessionState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> SessionIdentity {
        SessionIdentity {
            session_id: SessionId::new(),
            queue_id: QueueId::new(),
            job_id: JobId::new(),
            os_user: "render-job-user".to_string(),
        }
    }

    #[test]
    fn new_session_starts_pending() {
        let session = Session::new(identity());
        assert_eq!(session.state(), SessionState::Pending);
    }

    #[test]
    fn full_lifecycle_transitions_in_order() {
        let mut session = Session::new(identity());
        session.transition(SessionState::Running).expect("pending->running");
        session
            .transition(SessionState::Stopping)
            .expect("running->stopping");
        session
            .transition(SessionState::Stopped)
            .expect("stopping->stopped");
        assert!(session.state().is_terminal());
    }

    #[test]
    fn cannot_skip_stopping_on_the_way_to_stopped() {
        let mut session = Session::new(identity());
        session.transition(SessionState::Running).expect("pending->running");
        let err = session
            .transition(SessionState::Stopped)
            .expect_err("running->stopped must be rejected");
        assert_eq!(err.from, SessionState::Running);
        assert_eq!(err.to, SessionState::Stopped);
    }

    #[test]
    fn stopped_is_terminal_and_rejects_further_transitions() {
        let mut session = Session::new(identity());
        session.transition(SessionState::Running).expect("pending->running");
        session
            .transition(SessionState::Stopping)
            .expect("running->stopping");
        session
            .transition(SessionState::Stopped)
            .expect("stopping->stopped");
        assert!(session.transition(SessionState::Pending).is_err());
    }
}
