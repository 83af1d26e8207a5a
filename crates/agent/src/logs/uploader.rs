// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One uploader per `(log_group, log_stream)`: batches events from a
//! producer channel, rate-limits `PutLogEvents` calls to 5/sec/stream, and
//! retries failures indefinitely unless shutting down.

use std::collections::VecDeque;
use std::time::Duration;

use rfw_core::Clock;
use rfw_wire::{log_limits, LogEvent, PutLogEventsRequest};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::batcher::{self, Admission, Batcher};
use super::sink::LogSink;

const IDLE_WAIT: Duration = Duration::from_millis(200);
const RETRY_WAIT_WHILE_RUNNING: Duration = Duration::from_secs(1);
const MAX_RETRIES_WHILE_STOPPING: u32 = 5;

pub struct LogStreamUploader {
    sender: mpsc::UnboundedSender<LogEvent>,
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LogStreamUploader {
    pub fn start<S: LogSink, C: Clock>(
        sink: S,
        log_group: String,
        log_stream: String,
        clock: C,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let task_stop = stop.clone();
        let handle = tokio::spawn(run(sink, log_group, log_stream, receiver, task_stop, clock));
        Self {
            sender,
            stop,
            handle: Some(handle),
        }
    }

    /// Partition `message` at `MaxEventBytes` and enqueue the resulting
    /// events; never blocks the caller (the channel is unbounded — the
    /// session producing log lines must never stall on upload backpressure).
    pub fn enqueue(&self, timestamp_ms: i64, message: &str) {
        for event in batcher::partition_event(timestamp_ms, message, log_limits::MAX_EVENT_BYTES) {
            let _ = self.sender.send(event);
        }
    }

    /// Signal the uploader to stop and wait for it to flush and exit.
    pub async fn close(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for LogStreamUploader {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn run<S: LogSink, C: Clock>(
    sink: S,
    log_group: String,
    log_stream: String,
    mut receiver: mpsc::UnboundedReceiver<LogEvent>,
    stop: CancellationToken,
    clock: C,
) {
    let mut batcher = Batcher::new();
    let mut limiter = RateLimiter::new();

    loop {
        let mut drained_any = false;
        let mut bounced = None;
        loop {
            match receiver.try_recv() {
                Ok(event) => {
                    drained_any = true;
                    if let Some(b) = admit(&mut batcher, event, clock.epoch_ms() as i64) {
                        bounced = Some(b);
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        if let Some(bounced_event) = bounced {
            let batch = batcher.take();
            limiter.acquire().await;
            submit_with_retry(&sink, &log_group, &log_stream, batch, &stop).await;
            let _ = admit(&mut batcher, bounced_event, clock.epoch_ms() as i64);
            continue;
        }

        if batcher.is_empty() {
            if stop.is_cancelled() && !drained_any {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(IDLE_WAIT) => {}
                _ = stop.cancelled() => {}
            }
            continue;
        }

        let batch = batcher.take();
        limiter.acquire().await;
        submit_with_retry(&sink, &log_group, &log_stream, batch, &stop).await;
    }
}

/// Offer one event to the batcher; synthesize a visible drop notice for
/// rejected events, and hand back an event bounced by `BatchFull` so the
/// caller can submit the full batch and retry it against a fresh one.
fn admit(batcher: &mut Batcher, event: LogEvent, now_ms: i64) -> Option<LogEvent> {
    match batcher.admit(event.clone(), now_ms) {
        Admission::Added => None,
        Admission::BatchFull => Some(event),
        Admission::Dropped { reason } => {
            warn!(reason, "log event dropped");
            let synthetic = LogEvent {
                timestamp: event.timestamp,
                message: reason,
            };
            let _ = batcher.admit(synthetic, now_ms);
            None
        }
    }
}

async fn submit_with_retry<S: LogSink>(
    sink: &S,
    log_group: &str,
    log_stream: &str,
    events: Vec<LogEvent>,
    stop: &CancellationToken,
) {
    let mut attempt: u32 = 0;
    loop {
        let request = PutLogEventsRequest {
            log_group_name: log_group.to_string(),
            log_stream_name: log_stream.to_string(),
            log_events: events.clone(),
            sequence_token: None,
        };
        match sink.put_log_events(&request).await {
            Ok(_) => return,
            Err(err) => {
                attempt += 1;
                let stopping = stop.is_cancelled();
                warn!(error = %err, attempt, stopping, "PutLogEvents failed");
                if stopping && attempt >= MAX_RETRIES_WHILE_STOPPING {
                    warn!(
                        dropped = events.len(),
                        "giving up on log batch during shutdown"
                    );
                    return;
                }
                tokio::time::sleep(RETRY_WAIT_WHILE_RUNNING).await;
            }
        }
    }
}

/// Sliding 1-second window limiting calls to `MaxCallsPerStreamPerSec`.
struct RateLimiter {
    calls: VecDeque<tokio::time::Instant>,
}

impl RateLimiter {
    fn new() -> Self {
        Self {
            calls: VecDeque::with_capacity(log_limits::MAX_CALLS_PER_STREAM_PER_SEC as usize),
        }
    }

    async fn acquire(&mut self) {
        let window = Duration::from_secs(1);
        let now = tokio::time::Instant::now();
        while let Some(&oldest) = self.calls.front() {
            if now.duration_since(oldest) >= window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
        if self.calls.len() >= log_limits::MAX_CALLS_PER_STREAM_PER_SEC as usize {
            let oldest = *self.calls.front().expect("length checked above");
            tokio::time::sleep_until(oldest + window).await;
            self.calls.pop_front();
        }
        self.calls.push_back(tokio::time::Instant::now());
    }
}

#[cfg(test)]
#[path = "uploader_tests.rs"]
mod tests;
