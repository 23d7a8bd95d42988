// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent bootstrap: wire config, transport and pipeline together.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tracing::{info, warn};

use super::EventPipeline;
use crate::config::AgentConfig;
use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::error::Result;
use crate::transport::{HttpIngestClient, IngestClient, Transport, WorkerHandle};

/// A running agent: one pipeline plus its delivery worker.
///
/// Dropping the agent without calling [`Agent::shutdown`] still stops the
/// worker, which drains what it can in the background.
pub struct Agent {
    pipeline: Arc<EventPipeline>,
    worker: WorkerHandle,
    shutdown_budget: Duration,
}

impl Agent {
    /// Start an agent that posts batches to the configured endpoint.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn start(config: AgentConfig) -> Result<Self> {
        config.validate()?;

        let token = match config.token.as_deref() {
            Some(token) => token.to_string(),
            None => {
                warn!("No ingestion token configured, the endpoint will likely reject batches");
                String::new()
            }
        };
        let client = HttpIngestClient::new(
            config.endpoint.as_str(),
            token,
            config.transport.request_timeout,
        )?;

        info!(
            endpoint = %config.endpoint,
            environment = config.environment.as_deref().unwrap_or("-"),
            "Starting agent"
        );
        Self::with_client(config, Arc::new(client))
    }

    /// Start an agent around any ingest client.
    pub fn with_client(config: AgentConfig, client: Arc<dyn IngestClient>) -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .context("Agent must be started inside a tokio runtime")?;

        let diagnostics = Arc::new(Diagnostics::new());
        let (transport, worker) = Transport::new(
            config.transport.clone(),
            client,
            config.agent_metadata(),
            diagnostics.clone(),
        );
        let pipeline = EventPipeline::new(&config, transport, diagnostics)?;

        Ok(Self {
            pipeline: Arc::new(pipeline),
            worker: worker.spawn(),
            shutdown_budget: config.transport.shutdown_budget,
        })
    }

    pub fn pipeline(&self) -> Arc<EventPipeline> {
        self.pipeline.clone()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.pipeline.diagnostics()
    }

    /// Flush queued events and stop, bounded by the configured budget.
    ///
    /// Returns `false` if undelivered events had to be discarded.
    pub async fn shutdown(self) -> bool {
        let clean = self.worker.shutdown(self.shutdown_budget).await;
        let snapshot = self.pipeline.diagnostics();
        info!(
            delivered = snapshot.events_delivered,
            dropped = snapshot.total_dropped(),
            clean,
            "Agent stopped"
        );
        clean
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("pipeline", &self.pipeline)
            .field("shutdown_budget", &self.shutdown_budget)
            .finish_non_exhaustive()
    }
}
