// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use watchtower::config::AgentConfig;
use watchtower::transport::{BackoffPolicy, EncodedBatch, IngestClient, TransportConfig};
use watchtower::{Agent, DeliveryError};

/// Ingest client that records every batch it acknowledges.
#[derive(Debug, Default)]
pub struct RecordingIngest {
    bodies: Mutex<Vec<String>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl RecordingIngest {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make subsequent sends fail with a 503.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Raw bodies of acknowledged batches.
    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }

    /// Every delivered event, across batches, in delivery order.
    pub fn events(&self) -> Vec<Value> {
        self.bodies()
            .iter()
            .flat_map(|body| {
                let envelope: Value = serde_json::from_str(body).unwrap();
                envelope["events"].as_array().cloned().unwrap_or_default()
            })
            .collect()
    }
}

#[async_trait]
impl IngestClient for RecordingIngest {
    async fn send(&self, batch: &EncodedBatch) -> Result<(), DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::status(503, "unavailable"));
        }
        self.bodies.lock().unwrap().push(batch.body_str().to_string());
        Ok(())
    }
}

/// Transport settings that flush and give up quickly.
pub fn fast_transport() -> TransportConfig {
    TransportConfig {
        queue_capacity: 64,
        max_batch_size: 10,
        max_batch_age: Duration::from_millis(20),
        request_timeout: Duration::from_millis(500),
        backoff: BackoffPolicy {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(2),
            max_retries: 0,
        },
        breaker_threshold: 5,
        breaker_cooldown: Duration::from_secs(30),
        shutdown_budget: Duration::from_secs(2),
    }
}

pub fn fast_config() -> AgentConfig {
    AgentConfig {
        transport: fast_transport(),
        ..Default::default()
    }
}

pub fn start(config: AgentConfig, ingest: &Arc<RecordingIngest>) -> Agent {
    let client: Arc<dyn IngestClient> = ingest.clone();
    Agent::with_client(config, client).unwrap()
}

/// Wait for the worker to pick up whatever was just enqueued.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(120)).await;
}
