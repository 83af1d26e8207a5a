// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job-entity cache: batched, deduplicated, cached resolution of
//! job/step/environment/attachment detail records through
//! `BatchGetJobEntity`.

use std::collections::HashMap;

use parking_lot::RwLock;
use rfw_core::{FarmId, QueueId};
use rfw_wire::{
    BatchGetJobEntityRequest, EntityIdentifier, EnvironmentDetails, JobAttachmentDetails,
    JobDetails, JobEntity, StepDetails, MAX_IDENTIFIERS_PER_BATCH,
};
use tokio_util::sync::CancellationToken;

use crate::control_plane::ControlPlaneClient;
use crate::error::{AgentError, AgentResult};

/// Caches `BatchGetJobEntity` responses keyed by the identifier's logical
/// cache key, deduplicating and chunking requests.
pub struct EntityCache {
    control_plane: ControlPlaneClient,
    farm_id: FarmId,
    queue_id: QueueId,
    cached: RwLock<HashMap<String, JobEntity>>,
}

impl EntityCache {
    pub fn new(control_plane: ControlPlaneClient, farm_id: FarmId, queue_id: QueueId) -> Self {
        Self {
            control_plane,
            farm_id,
            queue_id,
            cached: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve `identifiers`, deduplicating, serving cached entries without
    /// a call, and chunking the remainder into calls of at most
    /// `MAX_IDENTIFIERS_PER_BATCH` identifiers. Returns one entity per
    /// unique requested identifier, in the identifiers' cache-key order.
    pub async fn resolve(
        &self,
        identifiers: &[EntityIdentifier],
        interrupt: &CancellationToken,
    ) -> AgentResult<Vec<JobEntity>> {
        let mut seen = std::collections::HashSet::new();
        let mut missing = Vec::new();
        for identifier in identifiers {
            let key = identifier.cache_key();
            if self.cached.read().contains_key(&key) {
                continue;
            }
            if seen.insert(key) {
                missing.push(identifier.clone());
            }
        }

        for chunk in missing.chunks(MAX_IDENTIFIERS_PER_BATCH) {
            self.fetch_chunk(chunk, interrupt).await?;
        }

        let cached = self.cached.read();
        let mut resolved = Vec::with_capacity(identifiers.len());
        let mut emitted = std::collections::HashSet::new();
        for identifier in identifiers {
            let key = identifier.cache_key();
            if !emitted.insert(key.clone()) {
                continue;
            }
            if let Some(entity) = cached.get(&key) {
                resolved.push(entity.clone());
            }
        }
        Ok(resolved)
    }

    pub async fn job_details(
        &self,
        identifier: EntityIdentifier,
        interrupt: &CancellationToken,
    ) -> AgentResult<JobDetails> {
        match self.resolve_one(identifier, interrupt).await? {
            JobEntity::JobDetails(details) => Ok(details),
            other => Err(AgentError::JobDetailsError(format!(
                "expected JobDetails, got {}",
                entity_kind(&other)
            ))),
        }
    }

    pub async fn step_details(
        &self,
        identifier: EntityIdentifier,
        interrupt: &CancellationToken,
    ) -> AgentResult<StepDetails> {
        match self.resolve_one(identifier, interrupt).await? {
            JobEntity::StepDetails(details) => Ok(details),
            other => Err(AgentError::StepDetailsError(format!(
                "expected StepDetails, got {}",
                entity_kind(&other)
            ))),
        }
    }

    pub async fn environment_details(
        &self,
        identifier: EntityIdentifier,
        interrupt: &CancellationToken,
    ) -> AgentResult<EnvironmentDetails> {
        match self.resolve_one(identifier, interrupt).await? {
            JobEntity::EnvironmentDetails(details) => Ok(details),
            other => Err(AgentError::EnvironmentDetailsError(format!(
                "expected EnvironmentDetails, got {}",
                entity_kind(&other)
            ))),
        }
    }

    pub async fn job_attachment_details(
        &self,
        identifier: EntityIdentifier,
        interrupt: &CancellationToken,
    ) -> AgentResult<JobAttachmentDetails> {
        match self.resolve_one(identifier, interrupt).await? {
            JobEntity::JobAttachmentDetails(details) => Ok(details),
            other => Err(AgentError::JobAttachmentDetailsError(format!(
                "expected JobAttachmentDetails, got {}",
                entity_kind(&other)
            ))),
        }
    }

    async fn resolve_one(
        &self,
        identifier: EntityIdentifier,
        interrupt: &CancellationToken,
    ) -> AgentResult<JobEntity> {
        let resolved = self.resolve(std::slice::from_ref(&identifier), interrupt).await?;
        resolved.into_iter().next().ok_or_else(|| {
            AgentError::JobEntityUnsupportedSchema(format!(
                "no entity or error returned for {}",
                identifier.cache_key()
            ))
        })
    }

    async fn fetch_chunk(
        &self,
        chunk: &[EntityIdentifier],
        interrupt: &CancellationToken,
    ) -> AgentResult<()> {
        let request = BatchGetJobEntityRequest {
            farm_id: self.farm_id,
            queue_id: self.queue_id,
            identifiers: chunk.to_vec(),
        };
        let response = self
            .control_plane
            .batch_get_job_entity(&request, interrupt)
            .await?;

        if let Some(error) = response.errors.first() {
            return Err(AgentError::JobEntityUnsupportedSchema(format!(
                "{}: {}",
                error.code, error.message
            )));
        }

        let mut cached = self.cached.write();
        for entity in response.entities {
            cached.insert(cache_key_of(&entity), entity);
        }
        Ok(())
    }
}

fn entity_kind(entity: &JobEntity) -> &'static str {
    match entity {
        JobEntity::JobDetails(_) => "JobDetails",
        JobEntity::StepDetails(_) => "StepDetails",
        JobEntity::EnvironmentDetails(_) => "EnvironmentDetails",
        JobEntity::JobAttachmentDetails(_) => "JobAttachmentDetails",
    }
}

fn cache_key_of(entity: &JobEntity) -> String {
    match entity {
        JobEntity::JobDetails(d) => EntityIdentifier::JobDetails { job_id: d.job_id }.cache_key(),
        JobEntity::StepDetails(d) => EntityIdentifier::StepDetails {
            job_id: d.job_id,
            step_id: d.step_id,
        }
        .cache_key(),
        JobEntity::EnvironmentDetails(d) => EntityIdentifier::EnvironmentDetails {
            job_id: d.job_id,
            environment_id: d.environment_id,
        }
        .cache_key(),
        JobEntity::JobAttachmentDetails(d) => {
            EntityIdentifier::JobAttachmentDetails { job_id: d.job_id }.cache_key()
        }
    }
}

#[cfg(test)]
#[path = "entities_tests.rs"]
mod tests;
