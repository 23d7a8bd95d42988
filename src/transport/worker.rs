// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Background delivery worker.
//!
//! The worker is the only consumer of the queue. It builds batches, flushes
//! them on size or age, retries failed deliveries with backoff and feeds the
//! circuit breaker. Batches never leave the worker once built.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::batch::{AgentMetadata, Batch, EncodedBatch};
use super::circuit::CircuitBreaker;
use super::client::IngestClient;
use super::TransportConfig;
use crate::diagnostics::Diagnostics;
use crate::error::DeliveryError;
use crate::types::Event;

/// Owns the receiving end of the queue; run it with [`DeliveryWorker::spawn`].
pub struct DeliveryWorker {
    pub(super) rx: mpsc::Receiver<Event>,
    pub(super) client: Arc<dyn IngestClient>,
    pub(super) config: TransportConfig,
    pub(super) breaker: Arc<CircuitBreaker>,
    pub(super) diagnostics: Arc<Diagnostics>,
    pub(super) agent: AgentMetadata,
}

/// How a delivery run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    /// Final flush: one attempt per batch, no backoff.
    Draining,
}

impl DeliveryWorker {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle {
            shutdown_tx: Some(shutdown_tx),
            join,
        }
    }

    /// Take the next queued event without delivering it.
    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        let max_batch = self.config.max_batch_size.max(1);
        let mut pending: Vec<Event> = Vec::with_capacity(max_batch);
        let mut oldest: Option<Instant> = None;

        loop {
            let deadline = oldest.map(|t| t + self.config.max_batch_age);
            let age_timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    debug!("Delivery worker received shutdown");
                    break;
                }
                received = self.rx.recv() => match received {
                    Some(event) => {
                        if pending.is_empty() {
                            oldest = Some(Instant::now());
                        }
                        pending.push(event);
                        if pending.len() >= max_batch {
                            self.flush(&mut pending, Mode::Normal).await;
                            oldest = None;
                        }
                    }
                    None => {
                        debug!("Queue closed, delivery worker stopping");
                        break;
                    }
                },
                _ = age_timer => {
                    self.flush(&mut pending, Mode::Normal).await;
                    oldest = None;
                }
            }
        }

        self.drain(pending).await;
    }

    /// Best-effort final flush of everything still queued.
    async fn drain(&mut self, mut pending: Vec<Event>) {
        self.rx.close();
        while let Ok(event) = self.rx.try_recv() {
            pending.push(event);
        }
        if pending.is_empty() {
            return;
        }

        info!(events = pending.len(), "Flushing pending events on shutdown");
        let max_batch = self.config.max_batch_size.max(1);
        while !pending.is_empty() {
            let take = pending.len().min(max_batch);
            let mut chunk: Vec<Event> = pending.drain(..take).collect();
            self.flush(&mut chunk, Mode::Draining).await;
        }
    }

    async fn flush(&self, pending: &mut Vec<Event>, mode: Mode) {
        if pending.is_empty() {
            return;
        }
        let batch = Batch::new(std::mem::take(pending));
        let events = batch.len() as u64;

        match self.deliver(&batch, mode).await {
            Ok(()) => {
                Diagnostics::incr(&self.diagnostics.batches_sent);
                Diagnostics::add(&self.diagnostics.events_delivered, events);
            }
            Err(err) => {
                warn!(batch_id = %batch.id(), events, error = %err, "Dropping batch");
                Diagnostics::incr(&self.diagnostics.batches_failed);
                Diagnostics::add(&self.diagnostics.events_dropped_delivery, events);
            }
        }
    }

    async fn deliver(&self, batch: &Batch, mode: Mode) -> Result<(), DeliveryError> {
        let encoded = batch.encode(&self.agent)?;
        let max_retries = match mode {
            Mode::Normal => self.config.backoff.max_retries,
            Mode::Draining => 0,
        };

        let mut attempt = 0u32;
        loop {
            if !self.breaker.allows() {
                return Err(DeliveryError::CircuitOpen);
            }

            match self.attempt(&encoded).await {
                Ok(()) => {
                    self.breaker.record_success();
                    debug!(batch_id = %encoded.id, events = encoded.event_count, attempt, "Batch delivered");
                    return Ok(());
                }
                Err(err) => {
                    if err.counts_against_endpoint() && self.breaker.record_failure() {
                        Diagnostics::incr(&self.diagnostics.circuit_opens);
                    }
                    if !err.is_retryable() || attempt >= max_retries {
                        return Err(err);
                    }

                    let delay = self.config.backoff.delay(attempt);
                    debug!(
                        batch_id = %encoded.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Delivery failed, retrying"
                    );
                    Diagnostics::incr(&self.diagnostics.retries);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self, encoded: &EncodedBatch) -> Result<(), DeliveryError> {
        let started = std::time::Instant::now();
        let timeout = self.config.request_timeout;
        let result = match tokio::time::timeout(timeout, self.client.send(encoded)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(timeout.as_millis() as u64)),
        };
        self.diagnostics.delivery_latency.record(started.elapsed());
        result
    }
}

/// Handle to a running worker.
pub struct WorkerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Ask the worker to flush and stop, waiting at most `budget`.
    ///
    /// Returns `false` if the budget ran out; whatever was not yet delivered
    /// is discarded.
    pub async fn shutdown(mut self, budget: Duration) -> bool {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match tokio::time::timeout(budget, &mut self.join).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(error = %err, "Delivery worker ended abnormally");
                false
            }
            Err(_) => {
                warn!(
                    budget_ms = budget.as_millis() as u64,
                    "Shutdown budget exhausted, discarding undelivered events"
                );
                self.join.abort();
                false
            }
        }
    }
}
