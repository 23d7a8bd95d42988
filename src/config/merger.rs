// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use super::loader::EnvOverrides;
use super::types::{backoff_from, millis, AgentConfig, FileConfig};
use crate::error::ConfigError;

/// Default configuration values.
pub fn default_config() -> AgentConfig {
    AgentConfig::default()
}

/// Merge configuration sources with precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment (`WATCHTOWER_*`)
/// 2. Local config (.watchtower.local.json)
/// 3. Workspace config (watchtower.json / .yaml)
/// 4. Default values
pub fn merge_config(
    workspace: Option<FileConfig>,
    local: Option<FileConfig>,
    env: EnvOverrides,
) -> Result<AgentConfig, ConfigError> {
    let mut result = default_config();

    if let Some(config) = workspace {
        apply_file_config(&mut result, &config)?;
    }

    if let Some(config) = local {
        apply_file_config(&mut result, &config)?;
    }

    apply_env(&mut result, env);

    Ok(result)
}

fn apply_file_config(result: &mut AgentConfig, config: &FileConfig) -> Result<(), ConfigError> {
    if let Some(enabled) = config.enabled {
        result.enabled = enabled;
    }

    if let Some(ref endpoint) = config.endpoint {
        result.endpoint = endpoint.clone();
    }

    if config.token.is_some() {
        result.token = config.token.clone();
    }

    if config.environment.is_some() {
        result.environment = config.environment.clone();
    }

    if config.release.is_some() {
        result.release = config.release.clone();
    }

    if config.server.is_some() {
        result.server = config.server.clone();
    }

    if let Some(ref collectors) = config.collectors {
        for (kind, enabled) in collectors {
            if *enabled {
                result.disabled_kinds.remove(kind);
            } else {
                result.disabled_kinds.insert(*kind);
            }
        }
    }

    if let Some(ref sampling) = config.sampling {
        if let Some(rate) = sampling.default_rate {
            result.sampling.default_rate = rate;
        }
        if let Some(ref rates) = sampling.rates {
            result.sampling.rates.extend(rates.iter().map(|(k, v)| (*k, *v)));
        }
        if let Some(ref setting) = sampling.trace_consistency {
            result.sampling.trace_consistency = setting.resolve()?;
        }
    }

    if let Some(ref redaction) = config.redaction {
        let target = &mut result.redaction;
        if let Some(ref keys) = redaction.keys {
            target.keys = keys.clone();
        }
        if let Some(ref extra) = redaction.extra_keys {
            for key in extra {
                if !target.keys.contains(key) {
                    target.keys.push(key.clone());
                }
            }
        }
        if let Some(ref patterns) = redaction.patterns {
            target.patterns.extend(patterns.iter().cloned());
        }
        if let Some(ref mask) = redaction.mask {
            target.mask = mask.clone();
        }
        if let Some(cards) = redaction.card_numbers {
            target.card_numbers = cards;
        }
        if let Some(api_keys) = redaction.api_keys {
            target.api_keys = api_keys;
        }
        if let Some(emails) = redaction.emails {
            target.emails = emails;
        }
        if let Some(depth) = redaction.max_depth {
            target.max_depth = depth;
        }
    }

    if let Some(ref thresholds) = config.thresholds {
        let rules = &mut result.rules;
        if let Some(ms) = thresholds.slow_query_ms {
            rules.slow_query_ms = ms;
        }
        if let Some(ms) = thresholds.slow_request_ms {
            rules.slow_request_ms = ms;
        }
        if let Some(ms) = thresholds.slow_http_client_ms {
            rules.slow_http_client_ms = ms;
        }
        if let Some(len) = thresholds.max_string_length {
            rules.max_string_length = len;
        }
    }

    if let Some(ref transport) = config.transport {
        let target = &mut result.transport;
        if let Some(capacity) = transport.queue_capacity {
            target.queue_capacity = capacity;
        }
        if let Some(size) = transport.max_batch_size {
            target.max_batch_size = size;
        }
        if let Some(ms) = transport.max_batch_age_ms {
            target.max_batch_age = millis(ms);
        }
        if let Some(ms) = transport.request_timeout_ms {
            target.request_timeout = millis(ms);
        }
        target.backoff = backoff_from(transport, target.backoff);
        if let Some(threshold) = transport.breaker_threshold {
            target.breaker_threshold = threshold;
        }
        if let Some(ms) = transport.breaker_cooldown_ms {
            target.breaker_cooldown = millis(ms);
        }
        if let Some(ms) = transport.shutdown_budget_ms {
            target.shutdown_budget = millis(ms);
        }
    }

    Ok(())
}

fn apply_env(result: &mut AgentConfig, env: EnvOverrides) {
    if let Some(enabled) = env.enabled {
        result.enabled = enabled;
    }
    if let Some(endpoint) = env.endpoint {
        result.endpoint = endpoint;
    }
    if env.token.is_some() {
        result.token = env.token;
    }
    if env.environment.is_some() {
        result.environment = env.environment;
    }
    if env.release.is_some() {
        result.release = env.release;
    }
    if env.server.is_some() {
        result.server = env.server;
    }
}
