// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declared worker capabilities: numeric amounts and string-set
//! attributes sent at worker-update time and used by the service for
//! placement.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    amounts: BTreeMap<String, f64>,
    attributes: BTreeMap<String, BTreeSet<String>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a numeric amount, e.g. `amount.worker.vcpu = 8.0`.
    pub fn with_amount(mut self, name: impl Into<String>, value: f64) -> Self {
        self.amounts.insert(name.into(), value);
        self
    }

    /// Declare an attribute set, e.g. `attr.worker.os.family = {linux}`.
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn amount(&self, name: &str) -> Option<f64> {
        self.amounts.get(name).copied()
    }

    pub fn attribute(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.attributes.get(name)
    }
}
