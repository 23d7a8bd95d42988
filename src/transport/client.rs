// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Ingestion endpoint client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::batch::EncodedBatch;
use crate::error::DeliveryError;

/// Longest error body kept in a [`DeliveryError::Status`] message.
const MAX_ERROR_BODY: usize = 512;

/// Sends encoded batches to the ingestion endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngestClient: Send + Sync {
    /// Deliver one batch. `Ok` means the endpoint acknowledged it.
    async fn send(&self, batch: &EncodedBatch) -> Result<(), DeliveryError>;
}

/// HTTP client posting JSON batches with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpIngestClient {
    client: Client,
    endpoint: String,
    token: String,
}

impl HttpIngestClient {
    pub fn new(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeliveryError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: token.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl IngestClient for HttpIngestClient {
    async fn send(&self, batch: &EncodedBatch) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .header("X-Watchtower-Batch", batch.id.to_string())
            .body(batch.body.clone())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(DeliveryError::status(status.as_u16(), body))
    }
}
