// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `BatchGetJobEntity` identifiers and the detail records they resolve to.

use std::collections::BTreeMap;

use rfw_core::{EnvironmentId, JobId, StepId};
use serde::{Deserialize, Serialize};

/// One of the four identifier kinds a `BatchGetJobEntity` call can request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "identifierType", rename_all = "camelCase")]
pub enum EntityIdentifier {
    JobDetails {
        job_id: JobId,
    },
    StepDetails {
        job_id: JobId,
        step_id: StepId,
    },
    EnvironmentDetails {
        job_id: JobId,
        environment_id: EnvironmentId,
    },
    JobAttachmentDetails {
        job_id: JobId,
    },
}

impl EntityIdentifier {
    /// Stable cache key distinguishing identifier kind from bare job id,
    /// so cached responses are keyed by the identifier's logical key.
    pub fn cache_key(&self) -> String {
        match self {
            EntityIdentifier::JobDetails { job_id } => format!("job:{job_id}"),
            EntityIdentifier::StepDetails { job_id, step_id } => {
                format!("step:{job_id}:{step_id}")
            }
            EntityIdentifier::EnvironmentDetails {
                job_id,
                environment_id,
            } => format!("env:{job_id}:{environment_id}"),
            EntityIdentifier::JobAttachmentDetails { job_id } => format!("ja:{job_id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetails {
    pub job_id: JobId,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub job_stem: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDetails {
    pub job_id: JobId,
    pub step_id: StepId,
    #[serde(default)]
    pub dependencies: Vec<StepId>,
    #[serde(default)]
    pub task_run_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentDetails {
    pub job_id: JobId,
    pub environment_id: EnvironmentId,
    #[serde(default)]
    pub enter_command: String,
    #[serde(default)]
    pub exit_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAttachmentDetails {
    pub job_id: JobId,
    #[serde(default)]
    pub manifests: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "identifierType", rename_all = "camelCase")]
pub enum JobEntity {
    JobDetails(JobDetails),
    StepDetails(StepDetails),
    EnvironmentDetails(EnvironmentDetails),
    JobAttachmentDetails(JobAttachmentDetails),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityError {
    pub identifier: EntityIdentifier,
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_distinguish_identifier_kind_for_the_same_job() {
        let job_id = JobId::new();
        let job_details = EntityIdentifier::JobDetails { job_id };
        let attachment_details = EntityIdentifier::JobAttachmentDetails { job_id };
        assert_ne!(job_details.cache_key(), attachment_details.cache_key());
    }
}
