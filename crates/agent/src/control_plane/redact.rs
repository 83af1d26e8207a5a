// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static allow-list redaction for request/response logging.
//!
//! Bodies of unknown operations are logged as `"*REDACTED*"` in full; for
//! known operations, only allow-listed top-level fields are kept.

use serde_json::Value;

const REDACTED: &str = "*REDACTED*";

/// Fields safe to print for each named operation. Anything else in the
/// body, and the body of any operation not in this table, is redacted.
fn allow_list(operation: &str) -> Option<&'static [&'static str]> {
    match operation {
        "CreateWorker" => Some(&["farmId", "fleetId"]),
        "DeleteWorker" => Some(&["farmId", "fleetId", "workerId"]),
        "UpdateWorker" => Some(&["farmId", "fleetId", "workerId", "status"]),
        "UpdateWorkerSchedule" => Some(&["farmId", "fleetId", "workerId"]),
        "AssumeFleetRoleForWorker" | "AssumeQueueRoleForWorker" => {
            Some(&["farmId", "fleetId", "workerId", "queueId"])
        }
        "BatchGetJobEntity" => Some(&["farmId", "queueId"]),
        _ => None,
    }
}

/// Render a request/response body for log lines, keeping only the
/// allow-listed fields for the named operation.
pub fn redact_body(operation: &str, body: &Value) -> Value {
    let Some(allowed) = allow_list(operation) else {
        return Value::String(REDACTED.to_string());
    };
    let Some(obj) = body.as_object() else {
        return Value::String(REDACTED.to_string());
    };
    let mut out = serde_json::Map::new();
    for (key, value) in obj {
        if allowed.contains(&key.as_str()) {
            out.insert(key.clone(), value.clone());
        } else {
            out.insert(key.clone(), Value::String(REDACTED.to_string()));
        }
    }
    Value::Object(out)
}
