// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Circuit breaker over consecutive delivery failures.
//!
//! Shared between producers (who check it before enqueueing) and the
//! delivery worker (who records outcomes), so all state lives in atomics.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Deliveries flow normally.
    Closed,
    /// Cooling down; events are dropped at enqueue.
    Open,
    /// Cooldown elapsed; the next delivery is a probe.
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: AtomicU32,
    /// Nanoseconds since `created_at` when the circuit last opened, 0 if closed.
    opened_at_nanos: AtomicU64,
    created_at: Instant,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            consecutive_failures: AtomicU32::new(0),
            opened_at_nanos: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    #[inline]
    fn now_nanos(&self) -> u64 {
        // Never 0, which means "closed".
        u64::try_from(self.created_at.elapsed().as_nanos())
            .unwrap_or(u64::MAX)
            .max(1)
    }

    pub fn state(&self) -> CircuitState {
        let opened = self.opened_at_nanos.load(Ordering::Acquire);
        if opened == 0 {
            return CircuitState::Closed;
        }
        let elapsed = Duration::from_nanos(self.now_nanos().saturating_sub(opened));
        if elapsed < self.cooldown {
            CircuitState::Open
        } else {
            CircuitState::HalfOpen
        }
    }

    /// Whether events and delivery attempts may proceed.
    pub fn allows(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        let was_open = self.opened_at_nanos.swap(0, Ordering::AcqRel) != 0;
        if was_open {
            info!("Ingest endpoint recovered, circuit closed");
        }
    }

    /// Record a failed attempt. Returns `true` if this failure opened the circuit.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures < self.threshold {
            return false;
        }

        // A failed probe in half-open re-arms the cooldown.
        if self.state() == CircuitState::Open {
            return false;
        }
        self.opened_at_nanos.store(self.now_nanos(), Ordering::Release);
        warn!(
            failures,
            cooldown_ms = self.cooldown.as_millis() as u64,
            "Ingest endpoint failing, circuit opened"
        );
        true
    }
}
