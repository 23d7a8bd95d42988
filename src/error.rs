// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the Watchtower agent.
//!
//! Every failure inside the event pipeline is absorbed locally. These types
//! exist so the pipeline can classify, count and log what went wrong; none of
//! them ever crosses back into host application control flow.

use thiserror::Error;

use crate::types::EventKind;

/// A raw occurrence could not be normalized into an event.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectionError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    #[error("Collector disabled for kind {0}")]
    Disabled(EventKind),
}

impl CollectionError {
    /// Create an invalid value error.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

/// A user-supplied filter failed while evaluating an event.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Filter #{index} returned an error: {source}")]
    Failed {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Filter #{index} panicked: {message}")]
    Panicked { index: usize, message: String },
}

/// The redactor met a payload shape it could not walk.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RedactionError {
    #[error("Nesting exceeds depth bound of {0}")]
    DepthExceeded(usize),
}

/// Errors that can occur while delivering a batch to the ingestion endpoint.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Endpoint returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Batch serialization failed: {0}")]
    Serialize(String),

    #[error("Circuit open, delivery suspended")]
    CircuitOpen,
}

impl DeliveryError {
    /// Create a status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Check if another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::Serialize(_) | Self::CircuitOpen => false,
        }
    }

    /// Check if the error says something about endpoint health.
    ///
    /// Serialization failures are local and must not trip the breaker.
    pub fn counts_against_endpoint(&self) -> bool {
        !matches!(self, Self::Serialize(_) | Self::CircuitOpen)
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(0)
        } else if let Some(status) = err.status() {
            Self::status(status.as_u16(), err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}

/// The transport refused an event without blocking.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityError {
    #[error("Queue full")]
    QueueFull,

    #[error("Circuit open")]
    CircuitOpen,

    #[error("Transport closed")]
    Closed,
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
