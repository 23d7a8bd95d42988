// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Local log output for the agent itself.
//!
//! Embedded in a host application the agent logs through whatever global
//! subscriber the host installed; [`init_logging`] leaves an existing one
//! alone. The standalone binary gets a stderr subscriber so stdout stays
//! free for command output.

use std::io::{self, IsTerminal};

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::AgentConfig;

/// Log target prefix of every agent module.
const TARGET: &str = "watchtower";

/// Environments treated as production when picking a log level.
const PRODUCTION_ENVIRONMENTS: &[&str] = &["production", "prod"];

/// Shape of each log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One line per event.
    Compact,
    /// Full fields plus file/line and span enter/close.
    Verbose,
}

/// Settings for the agent's own log output.
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Level for agent targets. Everything else stays at warn. `RUST_LOG`
    /// wins when set.
    pub level: Level,
    pub format: LogFormat,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            ansi: io::stderr().is_terminal(),
        }
    }
}

impl LogConfig {
    /// Settings for an agent running with `config`.
    ///
    /// Production, or no environment at all, keeps the agent at warn.
    /// Any other environment logs drops and retries at debug.
    pub fn for_agent(config: &AgentConfig) -> Self {
        let production = config.environment.as_deref().map_or(true, |env| {
            PRODUCTION_ENVIRONMENTS
                .iter()
                .any(|prod| env.eq_ignore_ascii_case(prod))
        });
        let level = if production || !config.enabled {
            Level::WARN
        } else {
            Level::DEBUG
        };
        Self {
            level,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Filter directive used when `RUST_LOG` is unset.
    fn directive(&self) -> String {
        format!("warn,{}={}", TARGET, self.level)
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()))
    }
}

/// Returned by [`init_logging`]; hold it for the life of the process.
#[must_use]
#[derive(Debug)]
pub struct LogGuard {
    installed: bool,
}

impl LogGuard {
    /// Whether this call installed the global subscriber. False when the
    /// host already owned logging.
    pub fn installed(&self) -> bool {
        self.installed
    }
}

/// Install a stderr subscriber unless one is already in place.
pub fn init_logging(config: &LogConfig) -> io::Result<LogGuard> {
    if tracing::dispatcher::has_been_set() {
        return Ok(LogGuard { installed: false });
    }

    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi)
        .with_target(true);

    let result = match config.format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(config.env_filter())
            .with(fmt_layer.compact())
            .try_init(),
        LogFormat::Verbose => tracing_subscriber::registry()
            .with(config.env_filter())
            .with(
                fmt_layer
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE),
            )
            .try_init(),
    };
    result.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(LogGuard { installed: true })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(environment: Option<&str>) -> AgentConfig {
        AgentConfig {
            environment: environment.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_is_quiet() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.directive(), "warn,watchtower=WARN");
    }

    #[test]
    fn test_for_agent_follows_environment() {
        assert_eq!(LogConfig::for_agent(&agent(None)).level, Level::WARN);
        assert_eq!(LogConfig::for_agent(&agent(Some("Production"))).level, Level::WARN);
        assert_eq!(LogConfig::for_agent(&agent(Some("prod"))).level, Level::WARN);
        assert_eq!(LogConfig::for_agent(&agent(Some("staging"))).level, Level::DEBUG);

        let mut disabled = agent(Some("staging"));
        disabled.enabled = false;
        assert_eq!(LogConfig::for_agent(&disabled).level, Level::WARN);
    }

    #[test]
    fn test_builder() {
        let config = LogConfig::default()
            .with_level(Level::TRACE)
            .with_format(LogFormat::Verbose);
        assert_eq!(config.directive(), "warn,watchtower=TRACE");
        assert_eq!(config.format, LogFormat::Verbose);
    }

    #[test]
    fn test_existing_subscriber_is_left_alone() {
        // The first call may or may not win, depending on test order.
        let _first = init_logging(&LogConfig::default()).unwrap();
        let second = init_logging(&LogConfig::default().with_level(Level::TRACE)).unwrap();
        assert!(!second.installed());
    }
}
