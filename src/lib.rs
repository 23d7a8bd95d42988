// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Watchtower - an in-process observability agent.
//!
//! Instrumentation hooks hand raw occurrences (requests, exceptions,
//! queries, jobs, outgoing calls, ...) to an [`EventPipeline`]. The pipeline
//! normalizes them into [`Event`]s, attaches the current
//! [`CorrelationContext`], runs user filters, samples, redacts sensitive
//! data and enqueues the result. A background worker batches queued events
//! and ships them to the ingestion endpoint with retry, backoff and a
//! circuit breaker. The host application never blocks on delivery and never
//! sees an error from the agent.
//!
//! # Architecture
//!
//! - [`types`] - Event, EventKind, Severity and the monotonic clock
//! - [`context`] - Correlation context and the W3C trace-context codec
//! - [`collector`] - Typed occurrences and their normalization rules
//! - [`filter`] - User filter chains with typed per-kind views
//! - [`sampler`] - Per-kind rates, forced keeps, trace consistency
//! - [`redact`] - Key and value based masking
//! - [`transport`] - Bounded queue, batching, delivery worker
//! - [`pipeline`] - The submit path, the manual API and agent bootstrap
//! - [`config`] - File, local and environment configuration
//! - [`diagnostics`] - Local logging and self-observability counters
//! - [`error`] - Error taxonomy
//!
//! # Example
//!
//! ```rust,no_run
//! use watchtower::config::{load_config, EnvOverrides};
//! use watchtower::{Agent, CorrelationContext};
//!
//! # async fn run() -> watchtower::Result<()> {
//! let config = load_config(".".as_ref(), EnvOverrides::from_env()?)?;
//! let agent = Agent::start(config)?;
//! let pipeline = agent.pipeline();
//!
//! let ctx = CorrelationContext::from_headers(Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"), None);
//! pipeline.record_query("select * from users where id = ?", vec![7.into()], 12.5, None, &ctx);
//!
//! agent.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod redact;
pub mod sampler;
pub mod transport;
pub mod types;

// Re-export commonly used types at crate root
pub use collector::Occurrence;
pub use config::AgentConfig;
pub use context::{CorrelationContext, SpanId, TraceId, UserIdentity};
pub use error::{
    CapacityError, CollectionError, ConfigError, DeliveryError, FilterError, RedactionError,
    Result,
};
pub use filter::FilterChain;
pub use pipeline::{Agent, EventPipeline, SubmitOutcome};
pub use types::{Event, EventKind, Payload, Severity};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
