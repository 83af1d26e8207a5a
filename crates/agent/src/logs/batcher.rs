// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log event partitioning and batch admission.

use rfw_wire::{log_limits, LogEvent};

/// Smallest chunk size that always holds one full UTF-8 code point.
pub const MIN_CHUNK_BYTES: usize = 4;

/// Split `message` into successive events sharing `timestamp_ms`, cutting
/// only on UTF-8 character boundaries, each no larger than `chunk_limit`
/// bytes. Panics if `chunk_limit < MIN_CHUNK_BYTES`: a caller passing a
/// smaller limit than one code point can ever fit in is a programming
/// error, not a runtime condition to recover from.
pub fn partition_event(timestamp_ms: i64, message: &str, chunk_limit: usize) -> Vec<LogEvent> {
    assert!(
        chunk_limit >= MIN_CHUNK_BYTES,
        "chunk size {chunk_limit} is smaller than the largest possible UTF-8 code point"
    );

    if message.len() <= chunk_limit {
        return vec![LogEvent {
            timestamp: timestamp_ms,
            message: message.to_string(),
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < message.len() {
        let remaining = message.len() - start;
        let end = if remaining <= chunk_limit {
            message.len()
        } else {
            let mut candidate = start + chunk_limit;
            while !message.is_char_boundary(candidate) {
                candidate -= 1;
            }
            candidate
        };
        chunks.push(LogEvent {
            timestamp: timestamp_ms,
            message: message[start..end].to_string(),
        });
        start = end;
    }
    chunks
}

/// Outcome of offering one event to a [`Batcher`].
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Accepted into the current batch.
    Added,
    /// The current batch is full; take it and retry this same event
    /// against a fresh batch.
    BatchFull,
    /// Permanently rejected; caller should surface `reason` as a synthetic
    /// log event at the same timestamp so the drop is visible in-stream.
    Dropped { reason: String },
}

/// Accumulates events for one `PutLogEvents` call, enforcing the sink's
/// batch quotas.
#[derive(Default)]
pub struct Batcher {
    events: Vec<LogEvent>,
    bytes: usize,
    min_ts: Option<i64>,
    max_ts: Option<i64>,
}

impl Batcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Offer one event for admission into the in-progress batch, following
    /// a fixed ordered sequence of admission checks.
    pub fn admit(&mut self, event: LogEvent, now_ms: i64) -> Admission {
        let event_size = event.wire_size();

        // 1. Would the event overflow event count or byte budget?
        if self.events.len() + 1 > log_limits::MAX_EVENTS_PER_BATCH
            || self.bytes + event_size > log_limits::MAX_BATCH_BYTES
        {
            return Admission::BatchFull;
        }

        // 2/3. Timestamp window: [now - 14d, now + 2h].
        const FOURTEEN_DAYS_MS: i64 = 14 * 24 * 60 * 60 * 1000;
        const TWO_HOURS_MS: i64 = 2 * 60 * 60 * 1000;
        if event.timestamp < now_ms - FOURTEEN_DAYS_MS {
            return Admission::Dropped {
                reason: format!(
                    "log event rejected: timestamp {} is more than 14 days in the past",
                    event.timestamp
                ),
            };
        }
        if event.timestamp > now_ms + TWO_HOURS_MS {
            return Admission::Dropped {
                reason: format!(
                    "log event rejected: timestamp {} is more than 2 hours in the future",
                    event.timestamp
                ),
            };
        }

        // 4. Would admitting this event widen the batch's span past 24h?
        let new_min = self.min_ts.map_or(event.timestamp, |m| m.min(event.timestamp));
        let new_max = self.max_ts.map_or(event.timestamp, |m| m.max(event.timestamp));
        if new_max - new_min > log_limits::MAX_BATCH_TIME_SPAN_MS {
            return Admission::BatchFull;
        }

        // 5. Admit.
        self.min_ts = Some(new_min);
        self.max_ts = Some(new_max);
        self.bytes += event_size;
        self.events.push(event);
        Admission::Added
    }

    /// Drain the accumulated batch, resetting all tracked state.
    pub fn take(&mut self) -> Vec<LogEvent> {
        self.min_ts = None;
        self.max_ts = None;
        self.bytes = 0;
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
#[path = "batcher_tests.rs"]
mod tests;
