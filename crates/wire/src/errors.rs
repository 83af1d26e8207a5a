// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error envelope the dispatch service returns on a non-2xx response.
//! Shape only; per-endpoint classification lives in the agent crate.

use serde::{Deserialize, Serialize};

/// Parsed body of a dispatch-service error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub retry_after_seconds: Option<u64>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub resource_status: Option<String>,
}

impl ApiErrorBody {
    pub fn is_throttling(&self) -> bool {
        self.code == "ThrottlingException"
    }

    pub fn is_internal_server(&self) -> bool {
        self.code == "InternalServerException"
    }

    pub fn is_conflict(&self) -> bool {
        self.code == "ConflictException"
    }

    pub fn is_resource_not_found(&self) -> bool {
        self.code == "ResourceNotFoundException"
    }

    pub fn is_access_denied(&self) -> bool {
        self.code == "AccessDeniedException"
    }

    pub fn is_validation(&self) -> bool {
        self.code == "ValidationException"
    }

    /// True if this is a `ConflictException` whose `reason` is `STATUS_CONFLICT`
    /// on the named resource type (`"worker"`, `"fleet"`, `"queue"`, …).
    pub fn is_status_conflict_on(&self, resource_type: &str) -> bool {
        self.is_conflict()
            && self.reason.as_deref() == Some(ConflictReason::StatusConflict.as_str())
            && self.resource_type.as_deref() == Some(resource_type)
    }
}

/// Known `reason` values on a `ConflictException`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    StatusConflict,
    ConcurrentModification,
    CreateInProgress,
}

impl ConflictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictReason::StatusConflict => "STATUS_CONFLICT",
            ConflictReason::ConcurrentModification => "CONCURRENT_MODIFICATION",
            ConflictReason::CreateInProgress => "CREATE_IN_PROGRESS",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_status_conflict_on_a_named_resource() {
        let body = ApiErrorBody {
            code: "ConflictException".to_string(),
            message: String::new(),
            retry_after_seconds: None,
            reason: Some("STATUS_CONFLICT".to_string()),
            resource_type: Some("worker".to_string()),
            resource_status: Some("STOPPING".to_string()),
        };
        assert!(body.is_status_conflict_on("worker"));
        assert!(!body.is_status_conflict_on("queue"));
    }

    #[test]
    fn deserializes_minimal_error_body() {
        let json = r#"{"code":"ThrottlingException"}"#;
        let body: ApiErrorBody = serde_json::from_str(json).expect("parse minimal error body");
        assert!(body.is_throttling());
        assert_eq!(body.retry_after_seconds, None);
    }
}
