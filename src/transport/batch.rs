// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Batches and their wire envelope.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::types::Event;

/// Identifies this agent and the host deployment on every batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentMetadata {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl Default for AgentMetadata {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: None,
            release: None,
            server: None,
        }
    }
}

/// An ordered group of events owned by the delivery worker.
#[derive(Debug)]
pub struct Batch {
    id: Uuid,
    events: Vec<Event>,
}

impl Batch {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            id: Uuid::new_v4(),
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Serialize into the body sent to the ingestion endpoint.
    pub fn encode(&self, agent: &AgentMetadata) -> Result<EncodedBatch, DeliveryError> {
        let envelope = BatchEnvelope {
            batch_id: self.id,
            sent_at: Utc::now(),
            agent,
            events: &self.events,
        };
        Ok(EncodedBatch {
            id: self.id,
            event_count: self.events.len(),
            body: serde_json::to_vec(&envelope)?,
        })
    }
}

#[derive(Serialize)]
struct BatchEnvelope<'a> {
    batch_id: Uuid,
    sent_at: DateTime<Utc>,
    agent: &'a AgentMetadata,
    events: &'a [Event],
}

/// A batch serialized once and resent as-is on retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    pub id: Uuid,
    pub event_count: usize,
    pub body: Vec<u8>,
}

impl EncodedBatch {
    /// Body as text, for tests and debugging.
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or("")
    }
}
