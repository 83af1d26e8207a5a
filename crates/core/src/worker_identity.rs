// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted worker identity: written once after `CreateWorker` succeeds,
//! loaded on every subsequent start.

use serde::{Deserialize, Serialize};

use crate::ids::{FarmId, FleetId, WorkerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub worker_id: WorkerId,
    pub farm_id: FarmId,
    pub fleet_id: FleetId,
}

impl WorkerIdentity {
    pub fn new(worker_id: WorkerId, farm_id: FarmId, fleet_id: FleetId) -> Self {
        Self {
            worker_id,
            farm_id,
            fleet_id,
        }
    }
}
