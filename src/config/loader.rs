// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files and the environment.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::EventKind;

use super::types::{FileConfig, RedactionFileConfig, SamplingFileConfig, TransportFileConfig};

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[
    "watchtower.json",
    ".watchtower.json",
    "watchtower.yaml",
    "watchtower.yml",
];

/// Local config file name (for per-machine overrides, usually gitignored).
pub const LOCAL_CONFIG_FILE: &str = ".watchtower.local.json";

/// Prefix of recognized environment variables.
pub const ENV_PREFIX: &str = "WATCHTOWER_";

/// Settings taken from `WATCHTOWER_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub token: Option<String>,
    pub endpoint: Option<String>,
    pub environment: Option<String>,
    pub release: Option<String>,
    pub server: Option<String>,
    pub enabled: Option<bool>,
}

impl EnvOverrides {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary lookup, so tests need not touch
    /// the real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|value| !value.trim().is_empty())
        };

        let enabled = match get("ENABLED") {
            Some(raw) => Some(parse_bool(&raw).ok_or_else(|| {
                ConfigError::invalid("WATCHTOWER_ENABLED", format!("not a boolean: {}", raw))
            })?),
            None => None,
        };

        Ok(Self {
            token: get("TOKEN"),
            endpoint: get("ENDPOINT"),
            environment: get("ENVIRONMENT"),
            release: get("RELEASE"),
            server: get("SERVER"),
            enabled,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Load the first config file found in `dir`.
pub fn load_workspace_config(dir: &Path) -> Result<Option<FileConfig>, ConfigError> {
    match find_config_file(dir) {
        Some(path) => load_config_file(&path).map(Some),
        None => Ok(None),
    }
}

/// Path of the first config file present in `dir`.
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// Load local overrides from `.watchtower.local.json`.
pub fn load_local_config(dir: &Path) -> Result<Option<FileConfig>, ConfigError> {
    let path = dir.join(LOCAL_CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    load_config_file(&path).map(Some)
}

/// Load a configuration file (JSON or YAML by extension).
pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

/// Write a config file, refusing to overwrite an existing one.
pub fn init_config(dir: &Path, config: Option<FileConfig>) -> Result<PathBuf, ConfigError> {
    let path = dir.join(CONFIG_FILES[0]);
    if path.exists() {
        return Err(ConfigError::invalid(
            "path",
            format!("{} already exists", path.display()),
        ));
    }

    let config = config.unwrap_or_else(example_config);
    let content = serde_json::to_string_pretty(&config)?;
    std::fs::write(&path, content)?;
    Ok(path)
}

/// A starting config showing the common knobs.
pub fn example_config() -> FileConfig {
    FileConfig {
        enabled: Some(true),
        endpoint: Some(super::types::DEFAULT_ENDPOINT.to_string()),
        environment: Some("production".to_string()),
        collectors: Some([(EventKind::Mail, true), (EventKind::Gate, false)].into_iter().collect()),
        sampling: Some(SamplingFileConfig {
            default_rate: Some(1.0),
            rates: Some([(EventKind::Query, 0.1)].into_iter().collect()),
            trace_consistency: None,
        }),
        redaction: Some(RedactionFileConfig {
            extra_keys: Some(vec!["*national_id*".to_string()]),
            emails: Some(false),
            ..Default::default()
        }),
        transport: Some(TransportFileConfig {
            max_batch_size: Some(100),
            max_batch_age_ms: Some(5_000),
            ..Default::default()
        }),
        ..Default::default()
    }
}
