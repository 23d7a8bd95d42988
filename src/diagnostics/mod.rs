// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The agent's own observability: log output and drop/failure counters.
//!
//! Telemetry loss is silent towards the host application, so these are the
//! only place it shows up. Log lines carry kinds, names, counts and attempt
//! numbers, never payload values.
//!
//! ```rust,ignore
//! use watchtower::diagnostics::{init_logging, LogConfig};
//!
//! let _guard = init_logging(&LogConfig::for_agent(&config))?;
//! ```

mod counters;
mod logging;

pub use counters::{Diagnostics, DiagnosticsSnapshot, Histogram, HistogramSnapshot};
pub use logging::{init_logging, LogConfig, LogFormat, LogGuard};
