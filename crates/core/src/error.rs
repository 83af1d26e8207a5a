// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy: the classification every remote-API wrapper and the
//! credentials refresher branch on.
//!
//! Throttled/transient failures are handled internally by the wrapper
//! (retried with backoff) and never escape as a `Classification` — only
//! [`Classification::Interrupted`] can surface from a retry loop, and only
//! when the caller's interrupt fired during a backoff sleep.

use std::fmt;

/// Outcome of a remote-API call or a credential refresh, after internal
/// retries have been exhausted or pre-empted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The caller's interrupt/cancellation was observed during a retry wait.
    /// Never raised on a first-attempt success or first-attempt permanent
    /// failure.
    Interrupted,
    /// Permanent for this request, but recoverable by re-bootstrapping
    /// (e.g. re-creating the worker after a stale worker id).
    ConditionallyRecoverable,
    /// The service reports this worker as no longer online. The worker
    /// must stop; no further API calls are useful.
    WorkerOffline,
    /// Everything else: access-denied, validation, unknown exception type.
    Unrecoverable,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Classification::Interrupted => "interrupted",
            Classification::ConditionallyRecoverable => "conditionally-recoverable",
            Classification::WorkerOffline => "worker-offline",
            Classification::Unrecoverable => "unrecoverable",
        })
    }
}
