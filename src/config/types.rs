// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! [`FileConfig`] is what users write (every field optional, camelCase,
//! JSON or YAML). [`AgentConfig`] is the resolved, validated result the
//! agent runs with.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::CollectorRules;
use crate::error::ConfigError;
use crate::redact::{RedactionConfig, Redactor};
use crate::sampler::{Sampler, TraceConsistency};
use crate::transport::{AgentMetadata, BackoffPolicy, TransportConfig};
use crate::types::EventKind;

/// Default ingestion endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://ingest.watchtower.dev/v1/batches";

/// Agent configuration as written in `watchtower.json` / `watchtower.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    /// Master switch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Ingestion endpoint URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// API credential sent as a bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Deployment environment (production, staging, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// Release identifier for regression correlation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,

    /// Host or server name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// Per-collector enable flags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collectors: Option<HashMap<EventKind, bool>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingFileConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub redaction: Option<RedactionFileConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<ThresholdsFileConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportFileConfig>,
}

/// Sampling section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingFileConfig {
    /// Rate for kinds without their own entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_rate: Option<f64>,

    /// Per-kind rates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rates: Option<HashMap<EventKind, f64>>,

    /// `"none"`, `"all"`, or a list of kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_consistency: Option<TraceConsistencySetting>,
}

/// Trace consistency as written in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceConsistencySetting {
    Keyword(String),
    Kinds(Vec<EventKind>),
}

impl TraceConsistencySetting {
    pub fn resolve(&self) -> Result<TraceConsistency, ConfigError> {
        match self {
            TraceConsistencySetting::Keyword(word) => match word.as_str() {
                "none" => Ok(TraceConsistency::None),
                "all" => Ok(TraceConsistency::All),
                other => Err(ConfigError::invalid(
                    "sampling.traceConsistency",
                    format!("expected \"none\", \"all\" or a list of kinds, got \"{}\"", other),
                )),
            },
            TraceConsistencySetting::Kinds(kinds) => {
                Ok(TraceConsistency::Kinds(kinds.iter().copied().collect()))
            }
        }
    }
}

/// Redaction section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionFileConfig {
    /// Replace the built-in key globs entirely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,

    /// Add to the built-in key globs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_keys: Option<Vec<String>>,

    /// Extra value regexes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_numbers: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_keys: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub emails: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
}

/// Collector thresholds section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdsFileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_query_ms: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_request_ms: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_http_client_ms: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_string_length: Option<usize>,
}

/// Transport section. Durations are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportFileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_batch_size: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_batch_age_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_cap_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaker_threshold: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaker_cooldown_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown_budget_ms: Option<u64>,
}

/// Resolved sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    pub default_rate: f64,
    pub rates: HashMap<EventKind, f64>,
    pub trace_consistency: TraceConsistency,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            default_rate: 1.0,
            rates: HashMap::new(),
            trace_consistency: TraceConsistency::None,
        }
    }
}

impl SamplingConfig {
    pub fn build(&self) -> Sampler {
        Sampler::new(
            self.default_rate,
            self.rates.clone(),
            self.trace_consistency.clone(),
        )
    }
}

/// Fully resolved agent configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub token: Option<String>,
    pub environment: Option<String>,
    pub release: Option<String>,
    pub server: Option<String>,
    pub disabled_kinds: HashSet<EventKind>,
    pub sampling: SamplingConfig,
    pub redaction: RedactionConfig,
    pub rules: CollectorRules,
    pub transport: TransportConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: None,
            environment: None,
            release: None,
            server: None,
            disabled_kinds: HashSet::new(),
            sampling: SamplingConfig::default(),
            redaction: RedactionConfig::default(),
            rules: CollectorRules::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Check values the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("https://") || self.endpoint.starts_with("http://")) {
            return Err(ConfigError::invalid(
                "endpoint",
                format!("must be an http(s) URL, got \"{}\"", self.endpoint),
            ));
        }

        check_rate("sampling.defaultRate", self.sampling.default_rate)?;
        for (kind, rate) in &self.sampling.rates {
            check_rate(&format!("sampling.rates.{}", kind), *rate)?;
        }

        let transport = &self.transport;
        if transport.queue_capacity == 0 {
            return Err(ConfigError::invalid("transport.queueCapacity", "must be at least 1"));
        }
        if transport.max_batch_size == 0 {
            return Err(ConfigError::invalid("transport.maxBatchSize", "must be at least 1"));
        }
        if transport.max_batch_age.is_zero() {
            return Err(ConfigError::invalid("transport.maxBatchAgeMs", "must be positive"));
        }
        if transport.request_timeout.is_zero() {
            return Err(ConfigError::invalid("transport.requestTimeoutMs", "must be positive"));
        }
        if transport.breaker_threshold == 0 {
            return Err(ConfigError::invalid("transport.breakerThreshold", "must be at least 1"));
        }
        if transport.backoff.base > transport.backoff.cap {
            return Err(ConfigError::invalid(
                "transport.backoffBaseMs",
                "must not exceed backoffCapMs",
            ));
        }

        if self.redaction.mask.is_empty() {
            return Err(ConfigError::invalid("redaction.mask", "must not be empty"));
        }
        if self.rules.max_string_length == 0 {
            return Err(ConfigError::invalid("thresholds.maxStringLength", "must be at least 1"));
        }

        // Compiles every glob and regex.
        Redactor::new(&self.redaction)?;
        Ok(())
    }

    /// Metadata stamped on every batch.
    pub fn agent_metadata(&self) -> AgentMetadata {
        AgentMetadata {
            environment: self.environment.clone(),
            release: self.release.clone(),
            server: self.server.clone(),
            ..Default::default()
        }
    }

    pub fn is_kind_enabled(&self, kind: EventKind) -> bool {
        self.enabled && !self.disabled_kinds.contains(&kind)
    }

    /// Token with all but the last four characters hidden, for display.
    pub fn masked_token(&self) -> Option<String> {
        self.token.as_ref().map(|token| {
            let chars: Vec<char> = token.chars().collect();
            if chars.len() <= 4 {
                "****".to_string()
            } else {
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("****{}", tail)
            }
        })
    }
}

fn check_rate(field: &str, rate: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&rate) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be between 0 and 1, got {}", rate),
        ))
    }
}

pub(crate) fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

pub(crate) fn backoff_from(file: &TransportFileConfig, base: BackoffPolicy) -> BackoffPolicy {
    BackoffPolicy {
        base: file.backoff_base_ms.map(millis).unwrap_or(base.base),
        cap: file.backoff_cap_ms.map(millis).unwrap_or(base.cap),
        max_retries: file.max_retries.unwrap_or(base.max_retries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AgentConfig::default();
        assert_eq!(config.transport.queue_capacity, 2048);
        assert_eq!(config.transport.max_batch_size, 100);
        assert_eq!(config.transport.max_batch_age, Duration::from_secs(5));
        assert_eq!(config.transport.backoff.max_retries, 4);
        assert_eq!(config.transport.breaker_threshold, 5);
        assert_eq!(config.sampling.default_rate, 1.0);
        assert_eq!(config.redaction.mask, "[REDACTED]");
        assert_eq!(config.redaction.max_depth, 32);
        assert_eq!(config.rules.max_string_length, 10_000);
    }

    #[test]
    fn test_rejects_rate_out_of_range() {
        let mut config = AgentConfig::default();
        config.sampling.rates.insert(EventKind::Query, 1.5);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sampling.rates.query"));
    }

    #[test]
    fn test_rejects_zero_capacity_and_batch() {
        let mut config = AgentConfig::default();
        config.transport.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.transport.max_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        let config = AgentConfig {
            endpoint: "ftp://ingest.example.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_rejects_bad_glob() {
        let mut config = AgentConfig::default();
        config.redaction.keys.push("[unclosed".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trace_consistency_setting() {
        let all: TraceConsistencySetting = serde_json::from_str(r#""all""#).unwrap();
        assert_eq!(all.resolve().unwrap(), TraceConsistency::All);

        let kinds: TraceConsistencySetting = serde_json::from_str(r#"["query", "job"]"#).unwrap();
        match kinds.resolve().unwrap() {
            TraceConsistency::Kinds(set) => {
                assert!(set.contains(&EventKind::Query));
                assert!(set.contains(&EventKind::Job));
            }
            other => panic!("unexpected {:?}", other),
        }

        let bad: TraceConsistencySetting = serde_json::from_str(r#""sometimes""#).unwrap();
        assert!(bad.resolve().is_err());
    }

    #[test]
    fn test_file_config_camel_case() {
        let json = r#"{
            "enabled": true,
            "collectors": {"mail": false},
            "sampling": {"defaultRate": 0.5, "rates": {"http_client": 0.1}},
            "redaction": {"extraKeys": ["*ssn*"], "maxDepth": 8},
            "thresholds": {"slowQueryMs": 250},
            "transport": {"maxBatchSize": 50, "breakerCooldownMs": 1000}
        }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.collectors.unwrap().get(&EventKind::Mail), Some(&false));
        let sampling = config.sampling.unwrap();
        assert_eq!(sampling.default_rate, Some(0.5));
        assert_eq!(sampling.rates.unwrap().get(&EventKind::HttpClient), Some(&0.1));
        assert_eq!(config.redaction.unwrap().max_depth, Some(8));
        assert_eq!(config.thresholds.unwrap().slow_query_ms, Some(250.0));
        assert_eq!(config.transport.unwrap().max_batch_size, Some(50));
    }

    #[test]
    fn test_masked_token() {
        let config = AgentConfig {
            token: Some("wt_live_abcdef123456".to_string()),
            ..Default::default()
        };
        assert_eq!(config.masked_token().as_deref(), Some("****3456"));
        let short = AgentConfig {
            token: Some("abc".to_string()),
            ..Default::default()
        };
        assert_eq!(short.masked_token().as_deref(), Some("****"));
    }

    #[test]
    fn test_kind_enabled() {
        let mut config = AgentConfig::default();
        config.disabled_kinds.insert(EventKind::Mail);
        assert!(!config.is_kind_enabled(EventKind::Mail));
        assert!(config.is_kind_enabled(EventKind::Query));
        config.enabled = false;
        assert!(!config.is_kind_enabled(EventKind::Query));
    }
}
