// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bounded queueing and background delivery of events.
//!
//! Producers call [`Transport::enqueue`], which never waits: a full queue or
//! an open circuit drops the event and bumps a counter. A single
//! [`DeliveryWorker`] drains the queue into batches and delivers them.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use watchtower::transport::{HttpIngestClient, Transport, TransportConfig};
//!
//! let config = TransportConfig::default();
//! let client = HttpIngestClient::new(endpoint, token, config.request_timeout)?;
//! let (transport, worker) = Transport::new(config, Arc::new(client), agent, diagnostics);
//! let handle = worker.spawn();
//! // ... transport.enqueue(event) from request threads ...
//! handle.shutdown(Duration::from_secs(2)).await;
//! ```

mod backoff;
mod batch;
mod circuit;
mod client;
mod worker;

pub use backoff::BackoffPolicy;
pub use batch::{AgentMetadata, Batch, EncodedBatch};
pub use circuit::{CircuitBreaker, CircuitState};
#[cfg(test)]
pub use client::MockIngestClient;
pub use client::{HttpIngestClient, IngestClient};
pub use worker::{DeliveryWorker, WorkerHandle};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

use crate::diagnostics::Diagnostics;
use crate::error::CapacityError;
use crate::types::Event;

/// Queue, batching and delivery settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub queue_capacity: usize,
    pub max_batch_size: usize,
    pub max_batch_age: Duration,
    /// Bound on each delivery attempt.
    pub request_timeout: Duration,
    pub backoff: BackoffPolicy,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
    pub shutdown_budget: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 2048,
            max_batch_size: 100,
            max_batch_age: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
            shutdown_budget: Duration::from_secs(2),
        }
    }
}

/// Producer side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Transport {
    tx: mpsc::Sender<Event>,
    breaker: Arc<CircuitBreaker>,
    diagnostics: Arc<Diagnostics>,
}

impl Transport {
    /// Create the queue and its (not yet running) worker.
    pub fn new(
        config: TransportConfig,
        client: Arc<dyn IngestClient>,
        agent: AgentMetadata,
        diagnostics: Arc<Diagnostics>,
    ) -> (Self, DeliveryWorker) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let breaker = Arc::new(CircuitBreaker::new(
            config.breaker_threshold,
            config.breaker_cooldown,
        ));

        let transport = Self {
            tx,
            breaker: breaker.clone(),
            diagnostics: diagnostics.clone(),
        };
        let worker = DeliveryWorker {
            rx,
            client,
            config,
            breaker,
            diagnostics,
            agent,
        };
        (transport, worker)
    }

    /// Hand an event to the worker without waiting.
    pub fn enqueue(&self, event: Event) -> Result<(), CapacityError> {
        if !self.breaker.allows() {
            Diagnostics::incr(&self.diagnostics.dropped_circuit);
            trace!(kind = %event.kind(), "Circuit open, event dropped");
            return Err(CapacityError::CircuitOpen);
        }

        match self.tx.try_send(event) {
            Ok(()) => {
                Diagnostics::incr(&self.diagnostics.enqueued);
                Ok(())
            }
            Err(TrySendError::Full(event)) => {
                Diagnostics::incr(&self.diagnostics.dropped_capacity);
                trace!(kind = %event.kind(), "Queue full, event dropped");
                Err(CapacityError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                Diagnostics::incr(&self.diagnostics.dropped_capacity);
                Err(CapacityError::Closed)
            }
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}
