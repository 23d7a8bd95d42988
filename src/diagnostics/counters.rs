// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lock-free diagnostic counters for the pipeline and transport.
//!
//! Every place the agent absorbs a failure or drops an event bumps one of
//! these, so silent telemetry loss is still observable locally.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

macro_rules! counters {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        /// Shared counters; hand out as `Arc<Diagnostics>`.
        #[derive(Debug)]
        pub struct Diagnostics {
            $($(#[$doc])* pub $name: AtomicU64,)*
            pub submit_latency: Histogram,
            pub delivery_latency: Histogram,
            start_time: Instant,
        }

        impl Diagnostics {
            pub fn new() -> Self {
                Self {
                    $($name: AtomicU64::new(0),)*
                    submit_latency: Histogram::default(),
                    delivery_latency: Histogram::default(),
                    start_time: Instant::now(),
                }
            }

            /// Copy every counter into a plain value.
            pub fn snapshot(&self) -> DiagnosticsSnapshot {
                DiagnosticsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                    submit_latency: self.submit_latency.snapshot(),
                    delivery_latency: self.delivery_latency.snapshot(),
                    uptime: self.start_time.elapsed(),
                }
            }
        }

        /// Point-in-time copy of [`Diagnostics`].
        #[derive(Debug, Clone, PartialEq, Serialize)]
        pub struct DiagnosticsSnapshot {
            $(pub $name: u64,)*
            pub submit_latency: HistogramSnapshot,
            pub delivery_latency: HistogramSnapshot,
            #[serde(skip)]
            pub uptime: Duration,
        }
    };
}

counters! {
    /// Occurrences handed to `submit`.
    submitted,
    /// Occurrences a collector rejected as malformed.
    collection_errors,
    /// Occurrences for a disabled collector.
    disabled,
    /// Events vetoed by a filter.
    filtered,
    /// Filters that errored or panicked (the event was kept).
    filter_errors,
    /// Events dropped by the sampling draw.
    sampled_out,
    /// Events kept because a force reason bypassed sampling.
    forced_keeps,
    /// Subtrees masked whole because they exceeded the depth bound.
    redaction_fallbacks,
    enqueued,
    /// Events dropped because the queue was full.
    dropped_capacity,
    /// Events dropped while the circuit was open.
    dropped_circuit,
    batches_sent,
    /// Batches dropped after exhausting retries.
    batches_failed,
    events_delivered,
    events_dropped_delivery,
    retries,
    circuit_opens,
}

impl Diagnostics {
    /// Add one to a counter.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticsSnapshot {
    /// Events that were accepted but never delivered, for any reason.
    pub fn total_dropped(&self) -> u64 {
        self.dropped_capacity + self.dropped_circuit + self.events_dropped_delivery
    }

    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Watchtower Diagnostics ===\n\n");
        report.push_str(&format!("Uptime: {:.2?}\n", self.uptime));
        report.push_str(&format!(
            "Submitted: {} ({} collection errors, {} disabled)\n",
            self.submitted, self.collection_errors, self.disabled
        ));
        report.push_str(&format!(
            "Filtered: {} ({} filter errors)\n",
            self.filtered, self.filter_errors
        ));
        report.push_str(&format!(
            "Sampled out: {}, forced keeps: {}\n",
            self.sampled_out, self.forced_keeps
        ));
        report.push_str(&format!(
            "Enqueued: {}, dropped (capacity {}, circuit {})\n",
            self.enqueued, self.dropped_capacity, self.dropped_circuit
        ));
        report.push_str(&format!(
            "Batches: {} sent, {} failed, {} retries, {} circuit opens\n",
            self.batches_sent, self.batches_failed, self.retries, self.circuit_opens
        ));
        report.push_str(&format!(
            "Events: {} delivered, {} dropped in delivery\n",
            self.events_delivered, self.events_dropped_delivery
        ));
        report.push_str(&format!(
            "Submit latency: p50 {:.2?}, p99 {:.2?}\n",
            self.submit_latency.p50(),
            self.submit_latency.p99()
        ));
        report.push_str(&format!(
            "Delivery latency: p50 {:.2?}, p99 {:.2?}\n",
            self.delivery_latency.p50(),
            self.delivery_latency.p99()
        ));

        report
    }
}

/// Fixed-bucket latency histogram, safe to record from many threads.
#[derive(Debug)]
pub struct Histogram {
    /// Bucket boundaries in microseconds.
    /// Default: [100us, 1ms, 10ms, 100ms, 1s, 10s, +inf]
    buckets: Vec<u64>,

    /// Count per bucket, plus one overflow bucket.
    counts: Vec<AtomicU64>,
}

impl Histogram {
    /// Create a histogram with custom bucket boundaries (in microseconds).
    pub fn with_buckets(buckets: Vec<u64>) -> Self {
        let counts = (0..=buckets.len()).map(|_| AtomicU64::new(0)).collect();
        Self { buckets, counts }
    }

    pub fn record(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        let bucket_idx = self
            .buckets
            .iter()
            .position(|&b| micros <= b)
            .unwrap_or(self.buckets.len());
        self.counts[bucket_idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            buckets: self.buckets.clone(),
            counts: self
                .counts
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::with_buckets(vec![100, 1_000, 10_000, 100_000, 1_000_000, 10_000_000])
    }
}

/// Bucket counts copied out of a [`Histogram`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistogramSnapshot {
    pub buckets: Vec<u64>,
    pub counts: Vec<u64>,
}

impl HistogramSnapshot {
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Approximate percentile as the upper bound of the bucket it falls in.
    pub fn percentile(&self, p: f64) -> Duration {
        let total = self.total();
        if total == 0 {
            return Duration::ZERO;
        }

        let target = (total as f64 * p / 100.0).ceil() as u64;
        let mut cumulative = 0u64;

        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                let micros = if i < self.buckets.len() {
                    self.buckets[i]
                } else {
                    self.buckets.last().copied().unwrap_or(0) * 10
                };
                return Duration::from_micros(micros);
            }
        }

        Duration::ZERO
    }

    pub fn p50(&self) -> Duration {
        self.percentile(50.0)
    }

    pub fn p90(&self) -> Duration {
        self.percentile(90.0)
    }

    pub fn p99(&self) -> Duration {
        self.percentile(99.0)
    }
}
