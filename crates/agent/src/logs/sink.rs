// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin HTTP client for the remote log sink. Unlike
//! [`crate::control_plane`], this has no per-operation classification
//! table to reproduce — the uploader's own retry policy treats every
//! failure the same way.

use reqwest::Client;
use rfw_wire::{PutLogEventsRequest, PutLogEventsResponse};

use crate::error::{AgentError, AgentResult};

/// The remote log sink's one operation, abstracted so the uploader's
/// batching/retry/throttle logic can be tested without a live network
/// call.
#[async_trait::async_trait]
pub trait LogSink: Send + Sync + 'static {
    async fn put_log_events(
        &self,
        request: &PutLogEventsRequest,
    ) -> AgentResult<PutLogEventsResponse>;
}

#[derive(Clone)]
pub struct LogSinkClient {
    http: Client,
    endpoint: String,
}

impl LogSinkClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait::async_trait]
impl LogSink for LogSinkClient {
    async fn put_log_events(
        &self,
        request: &PutLogEventsRequest,
    ) -> AgentResult<PutLogEventsResponse> {
        let url = format!("{}/PutLogEvents", self.endpoint.trim_end_matches('/'));
        let response = self.http.post(&url).json(request).send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(AgentError::RequestUnrecoverable(format!(
                "PutLogEvents failed with {status}: {body}"
            )))
        }
    }
}
