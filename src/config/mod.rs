// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for Watchtower.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Workspace config: watchtower.json, .watchtower.json, watchtower.yaml or watchtower.yml
//! - Local config: .watchtower.local.json (gitignored, for per-machine overrides)
//! - Environment: WATCHTOWER_TOKEN, WATCHTOWER_ENDPOINT, WATCHTOWER_ENVIRONMENT,
//!   WATCHTOWER_RELEASE, WATCHTOWER_SERVER, WATCHTOWER_ENABLED
//!
//! Configuration is merged with precedence (env > local > workspace > defaults)
//! and validated before the agent starts.

mod loader;
mod merger;
mod types;

pub use loader::{
    example_config, find_config_file, init_config, load_config_file, load_local_config,
    load_workspace_config, EnvOverrides, CONFIG_FILES, ENV_PREFIX, LOCAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config};

pub use types::{
    AgentConfig, FileConfig, RedactionFileConfig, SamplingConfig, SamplingFileConfig,
    ThresholdsFileConfig, TraceConsistencySetting, TransportFileConfig, DEFAULT_ENDPOINT,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load, merge and validate all configuration sources for a directory.
pub fn load_config(dir: &Path, env: EnvOverrides) -> Result<AgentConfig, ConfigError> {
    let workspace = load_workspace_config(dir)?;
    let local = load_local_config(dir)?;

    let config = merge_config(workspace, local, env)?;
    config.validate()?;
    Ok(config)
}
