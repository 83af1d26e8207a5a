// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `PutLogEvents` shapes for the remote log sink.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: i64,
    pub message: String,
}

impl LogEvent {
    /// Wire size counted against `MaxBatchBytes`: UTF-8 byte length of the
    /// message plus the service's fixed per-event overhead.
    pub fn wire_size(&self) -> usize {
        self.message.len() + crate::log_limits::PER_EVENT_OVERHEAD_BYTES
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutLogEventsRequest {
    pub log_group_name: String,
    pub log_stream_name: String,
    pub log_events: Vec<LogEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutLogEventsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_sequence_token: Option<String>,
    #[serde(default)]
    pub rejected_log_events_info: Option<RejectedLogEventsInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedLogEventsInfo {
    #[serde(default)]
    pub too_new_log_event_start_index: Option<i64>,
    #[serde(default)]
    pub too_old_log_event_end_index: Option<i64>,
    #[serde(default)]
    pub expired_log_event_end_index: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_size_includes_fixed_overhead() {
        let event = LogEvent {
            timestamp: 0,
            message: "hello".to_string(),
        };
        assert_eq!(event.wire_size(), 5 + crate::log_limits::PER_EVENT_OVERHEAD_BYTES);
    }
}
