// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-kind sampling decisions.
//!
//! Every kind has a keep rate in `[0, 1]`. By default each event draws
//! independently. Kinds listed under [`TraceConsistency`] instead derive the
//! draw from the trace id, so every event of one trace gets the same outcome
//! (and a kind with a lower rate keeps a subset of the traces a higher rate
//! keeps). Forced-keep reasons skip the draw entirely.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::collector::ForceReason;
use crate::context::TraceId;
use crate::types::EventKind;

/// Which kinds derive their sampling draw from the trace id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TraceConsistency {
    /// Independent draw per event.
    #[default]
    None,
    /// Every kind is trace-consistent.
    All,
    /// Only the listed kinds are trace-consistent.
    Kinds(HashSet<EventKind>),
}

impl TraceConsistency {
    pub fn applies_to(&self, kind: EventKind) -> bool {
        match self {
            TraceConsistency::None => false,
            TraceConsistency::All => true,
            TraceConsistency::Kinds(kinds) => kinds.contains(&kind),
        }
    }
}

/// Why the sampler decided the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Forced(ForceReason),
    Rate { rate: f64, trace_consistent: bool },
}

/// Outcome of sampling one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingDecision {
    pub keep: bool,
    pub forced: bool,
    pub reason: DecisionReason,
}

/// Sampling rates and policy.
#[derive(Debug, Clone)]
pub struct Sampler {
    default_rate: f64,
    rates: HashMap<EventKind, f64>,
    consistency: TraceConsistency,
}

impl Sampler {
    /// Create a sampler; rates are clamped to `[0, 1]`.
    pub fn new(
        default_rate: f64,
        rates: HashMap<EventKind, f64>,
        consistency: TraceConsistency,
    ) -> Self {
        Self {
            default_rate: clamp_rate(default_rate),
            rates: rates
                .into_iter()
                .map(|(kind, rate)| (kind, clamp_rate(rate)))
                .collect(),
            consistency,
        }
    }

    /// Keep everything.
    pub fn keep_all() -> Self {
        Self::new(1.0, HashMap::new(), TraceConsistency::None)
    }

    /// Effective rate for a kind.
    pub fn rate(&self, kind: EventKind) -> f64 {
        self.rates.get(&kind).copied().unwrap_or(self.default_rate)
    }

    /// Decide whether to keep an event.
    pub fn decide(
        &self,
        kind: EventKind,
        trace_id: TraceId,
        forced: Option<ForceReason>,
    ) -> SamplingDecision {
        if let Some(reason) = forced {
            return SamplingDecision {
                keep: true,
                forced: true,
                reason: DecisionReason::Forced(reason),
            };
        }

        let rate = self.rate(kind);
        let trace_consistent = self.consistency.applies_to(kind);
        let keep = if rate >= 1.0 {
            true
        } else if rate <= 0.0 {
            false
        } else if trace_consistent {
            trace_draw(trace_id) < rate
        } else {
            rand::random::<f64>() < rate
        };

        SamplingDecision {
            keep,
            forced: false,
            reason: DecisionReason::Rate {
                rate,
                trace_consistent,
            },
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::keep_all()
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        1.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

/// Map a trace id to a uniform value in `[0, 1)`.
fn trace_draw(trace_id: TraceId) -> f64 {
    let raw = trace_id.as_u128();
    let folded = (raw >> 64) as u64 ^ raw as u64;
    // splitmix64 finalizer, so sequential upstream ids still spread out.
    let mut z = folded.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(rate: f64, consistency: TraceConsistency) -> Sampler {
        Sampler::new(rate, HashMap::new(), consistency)
    }

    #[test]
    fn test_forced_bypasses_zero_rate() {
        let sampler = sampler(0.0, TraceConsistency::None);
        for _ in 0..100 {
            let decision =
                sampler.decide(EventKind::Exception, TraceId::generate(), Some(ForceReason::Exception));
            assert!(decision.keep);
            assert!(decision.forced);
            assert_eq!(decision.reason, DecisionReason::Forced(ForceReason::Exception));
        }
    }

    #[test]
    fn test_zero_and_full_rates() {
        let drop_all = sampler(0.0, TraceConsistency::None);
        let keep_all = sampler(1.0, TraceConsistency::None);
        for _ in 0..100 {
            assert!(!drop_all.decide(EventKind::Query, TraceId::generate(), None).keep);
            assert!(keep_all.decide(EventKind::Query, TraceId::generate(), None).keep);
        }
    }

    #[test]
    fn test_per_kind_rate_overrides_default() {
        let mut rates = HashMap::new();
        rates.insert(EventKind::Query, 0.0);
        let sampler = Sampler::new(1.0, rates, TraceConsistency::None);
        assert_eq!(sampler.rate(EventKind::Query), 0.0);
        assert_eq!(sampler.rate(EventKind::Job), 1.0);
    }

    #[test]
    fn test_rates_are_clamped() {
        let sampler = sampler(7.5, TraceConsistency::None);
        assert_eq!(sampler.rate(EventKind::Request), 1.0);
        let sampler = Sampler::new(f64::NAN, HashMap::new(), TraceConsistency::None);
        assert_eq!(sampler.rate(EventKind::Request), 1.0);
    }

    #[test]
    fn test_trace_consistent_decisions_agree() {
        let sampler = sampler(0.5, TraceConsistency::All);
        for _ in 0..200 {
            let trace = TraceId::generate();
            let first = sampler.decide(EventKind::Query, trace, None).keep;
            for kind in [EventKind::Request, EventKind::Job, EventKind::HttpClient] {
                assert_eq!(sampler.decide(kind, trace, None).keep, first);
            }
        }
    }

    #[test]
    fn test_consistency_for_listed_kinds_only() {
        let kinds: HashSet<EventKind> = [EventKind::Job].into_iter().collect();
        let policy = TraceConsistency::Kinds(kinds);
        assert!(policy.applies_to(EventKind::Job));
        assert!(!policy.applies_to(EventKind::Query));
    }

    #[test]
    fn test_rate_roughly_respected() {
        let sampler = sampler(0.25, TraceConsistency::All);
        let kept = (0..10_000)
            .filter(|_| sampler.decide(EventKind::Request, TraceId::generate(), None).keep)
            .count();
        assert!((2_000..3_000).contains(&kept), "kept {}", kept);
    }

    #[test]
    fn test_trace_draw_in_unit_interval() {
        for _ in 0..1000 {
            let d = trace_draw(TraceId::generate());
            assert!((0.0..1.0).contains(&d));
        }
        assert!((0.0..1.0).contains(&trace_draw(TraceId::from_u128(u128::MAX))));
    }
}
