// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The event pipeline: collect, enrich, filter, sample, redact, enqueue.
//!
//! [`EventPipeline::submit`] runs inline on the caller's thread and never
//! performs I/O. Every failure inside it is absorbed: the caller gets a
//! [`SubmitOutcome`] describing what happened, never an error or a panic.

mod agent;

pub use agent::Agent;

use std::any::Any;
use std::collections::HashSet;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::collector::{
    BreadcrumbOccurrence, CollectorRules, ExceptionOccurrence, ForceReason, GenericOccurrence,
    HttpClientOccurrence, MetricOccurrence, Occurrence, QueryOccurrence,
};
use crate::config::AgentConfig;
use crate::context::{CorrelationContext, UserIdentity};
use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::error::{CapacityError, CollectionError, ConfigError};
use crate::filter::FilterChain;
use crate::redact::Redactor;
use crate::sampler::Sampler;
use crate::transport::Transport;
use crate::types::{Clock, EventDraft, EventKind, Payload, Severity};

/// Looks up the user behind a unit of work.
pub type UserResolver = Arc<dyn Fn(&CorrelationContext) -> Option<UserIdentity> + Send + Sync>;

/// What `submit` did with an occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Handed to the transport.
    Enqueued { forced: bool },
    /// The collector for this kind is switched off.
    Disabled,
    /// The collector rejected the occurrence.
    Invalid(CollectionError),
    /// A filter vetoed the event.
    Filtered,
    /// The sampling draw dropped the event.
    SampledOut,
    /// The transport refused the event.
    Dropped(CapacityError),
    /// Something inside the pipeline panicked.
    Failed(String),
}

impl SubmitOutcome {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, SubmitOutcome::Enqueued { .. })
    }
}

/// One pipeline per process; share it as `Arc<EventPipeline>`.
pub struct EventPipeline {
    enabled: bool,
    disabled_kinds: HashSet<EventKind>,
    rules: CollectorRules,
    filters: RwLock<Arc<FilterChain>>,
    user_resolver: RwLock<Option<UserResolver>>,
    sampler: Sampler,
    redactor: Redactor,
    transport: Transport,
    clock: Clock,
    diagnostics: Arc<Diagnostics>,
}

impl fmt::Debug for EventPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPipeline")
            .field("enabled", &self.enabled)
            .field("disabled_kinds", &self.disabled_kinds)
            .field("sampler", &self.sampler)
            .finish_non_exhaustive()
    }
}

impl EventPipeline {
    pub fn new(
        config: &AgentConfig,
        transport: Transport,
        diagnostics: Arc<Diagnostics>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: config.enabled,
            disabled_kinds: config.disabled_kinds.clone(),
            rules: config.rules.clone(),
            filters: RwLock::new(Arc::new(FilterChain::new())),
            user_resolver: RwLock::new(None),
            sampler: config.sampling.build(),
            redactor: Redactor::new(&config.redaction)?,
            transport,
            clock: Clock::new(),
            diagnostics,
        })
    }

    pub fn is_enabled(&self, kind: EventKind) -> bool {
        self.enabled && !self.disabled_kinds.contains(&kind)
    }

    /// Run an occurrence through the pipeline.
    pub fn submit(
        &self,
        occurrence: impl Into<Occurrence>,
        context: &CorrelationContext,
    ) -> SubmitOutcome {
        let started = Instant::now();
        Diagnostics::incr(&self.diagnostics.submitted);

        let occurrence = occurrence.into();
        let outcome = match catch_unwind(AssertUnwindSafe(|| self.process(occurrence, context))) {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(error = %message, "Event pipeline panicked, event dropped");
                SubmitOutcome::Failed(message)
            }
        };

        self.diagnostics.submit_latency.record(started.elapsed());
        outcome
    }

    fn process(&self, occurrence: Occurrence, context: &CorrelationContext) -> SubmitOutcome {
        let kind = occurrence.kind();
        if !self.is_enabled(kind) {
            Diagnostics::incr(&self.diagnostics.disabled);
            return SubmitOutcome::Disabled;
        }

        let normalized = match occurrence.normalize(&self.rules) {
            Ok(normalized) => normalized,
            Err(err) => {
                Diagnostics::incr(&self.diagnostics.collection_errors);
                debug!(kind = %kind, error = %err, "Dropping malformed occurrence");
                return SubmitOutcome::Invalid(err);
            }
        };

        let forced = normalized
            .forced
            .or_else(|| context.is_forced().then_some(ForceReason::ForcedContext));

        let mut snapshot = context.snapshot();
        if snapshot.user.is_none() {
            snapshot.user = self.resolve_user(context);
        }

        let event = EventDraft {
            kind: normalized.kind,
            name: normalized.name,
            timestamp: self.clock.now(),
            severity: normalized.severity,
            payload: normalized.payload,
            context: snapshot,
        }
        .freeze();

        let filters = self
            .filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let verdict = filters.evaluate(&event);
        for err in &verdict.errors {
            Diagnostics::incr(&self.diagnostics.filter_errors);
            warn!(kind = %kind, error = %err, "Filter failed, keeping event");
        }
        if !verdict.keep {
            Diagnostics::incr(&self.diagnostics.filtered);
            trace!(kind = %kind, name = event.name(), "Event filtered");
            return SubmitOutcome::Filtered;
        }

        let decision = self
            .sampler
            .decide(event.kind(), event.context().trace_id, forced);
        if !decision.keep {
            Diagnostics::incr(&self.diagnostics.sampled_out);
            return SubmitOutcome::SampledOut;
        }
        if decision.forced {
            Diagnostics::incr(&self.diagnostics.forced_keeps);
        }

        let (event, report) = event.redacted(&self.redactor);
        if report.fallbacks > 0 {
            Diagnostics::add(&self.diagnostics.redaction_fallbacks, report.fallbacks as u64);
        }
        let event = event.truncated(self.rules.max_string_length);

        match self.transport.enqueue(event) {
            Ok(()) => SubmitOutcome::Enqueued {
                forced: decision.forced,
            },
            Err(err) => SubmitOutcome::Dropped(err),
        }
    }

    fn resolve_user(&self, context: &CorrelationContext) -> Option<UserIdentity> {
        let resolver = self
            .user_resolver
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        match catch_unwind(AssertUnwindSafe(|| resolver(context))) {
            Ok(user) => user,
            Err(panic) => {
                warn!(error = %panic_message(panic.as_ref()), "User resolver panicked");
                None
            }
        }
    }

    /// Add or change filters. Takes effect for the next submitted event.
    pub fn configure_filters<F>(&self, configure: F)
    where
        F: FnOnce(&mut FilterChain),
    {
        let mut guard = self.filters.write().unwrap_or_else(PoisonError::into_inner);
        configure(Arc::make_mut(&mut *guard));
    }

    /// Register the resolver consulted when a context has no user set.
    pub fn set_user_resolver<F>(&self, resolver: F)
    where
        F: Fn(&CorrelationContext) -> Option<UserIdentity> + Send + Sync + 'static,
    {
        *self
            .user_resolver
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(resolver));
    }

    /// Record a free-form event of any kind.
    pub fn record_event(
        &self,
        kind: EventKind,
        name: impl Into<String>,
        payload: Payload,
        severity: Option<Severity>,
        context: &CorrelationContext,
    ) -> SubmitOutcome {
        self.submit(
            GenericOccurrence {
                kind,
                name: name.into(),
                payload,
                severity,
            },
            context,
        )
    }

    /// Record a Rust error, including its source chain.
    pub fn record_exception<E>(&self, err: &E, context: &CorrelationContext) -> SubmitOutcome
    where
        E: StdError + ?Sized,
    {
        self.submit(ExceptionOccurrence::from_error(err), context)
    }

    pub fn record_query(
        &self,
        sql: impl Into<String>,
        bindings: Vec<Value>,
        duration_ms: f64,
        connection: Option<&str>,
        context: &CorrelationContext,
    ) -> SubmitOutcome {
        self.submit(
            QueryOccurrence {
                sql: sql.into(),
                bindings,
                duration_ms,
                connection: connection.map(str::to_string),
            },
            context,
        )
    }

    /// Record an outgoing HTTP call; `status` is `None` if no response arrived.
    pub fn record_http_call(
        &self,
        method: impl Into<String>,
        url: impl Into<String>,
        status: Option<u16>,
        duration_ms: f64,
        context: &CorrelationContext,
    ) -> SubmitOutcome {
        self.submit(
            HttpClientOccurrence {
                method: method.into(),
                url: url.into(),
                status,
                duration_ms,
            },
            context,
        )
    }

    /// Record a health or metric sample.
    pub fn record_metric(
        &self,
        name: impl Into<String>,
        value: f64,
        unit: Option<&str>,
        context: &CorrelationContext,
    ) -> SubmitOutcome {
        self.submit(
            MetricOccurrence {
                name: name.into(),
                value,
                unit: unit.map(str::to_string),
                tags: Payload::new(),
            },
            context,
        )
    }

    pub fn record_breadcrumb(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        context: &CorrelationContext,
    ) -> SubmitOutcome {
        self.submit(
            BreadcrumbOccurrence {
                message: message.into(),
                category: category.map(str::to_string),
                data: Payload::new(),
            },
            context,
        )
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::LlmOccurrence;
    use crate::transport::{AgentMetadata, DeliveryWorker, MockIngestClient, TransportConfig};
    use serde_json::json;

    fn pipeline_with(config: AgentConfig) -> (EventPipeline, DeliveryWorker, Arc<Diagnostics>) {
        let diagnostics = Arc::new(Diagnostics::new());
        let (transport, worker) = Transport::new(
            config.transport.clone(),
            Arc::new(MockIngestClient::new()),
            AgentMetadata::default(),
            diagnostics.clone(),
        );
        let pipeline = EventPipeline::new(&config, transport, diagnostics.clone()).unwrap();
        (pipeline, worker, diagnostics)
    }

    fn zero_rate() -> AgentConfig {
        let mut config = AgentConfig::default();
        config.sampling.default_rate = 0.0;
        config
    }

    #[tokio::test]
    async fn test_submit_enqueues() {
        let (pipeline, _worker, diagnostics) = pipeline_with(AgentConfig::default());
        let ctx = CorrelationContext::new();
        let outcome = pipeline.record_query("select 1", vec![], 3.0, None, &ctx);
        assert_eq!(outcome, SubmitOutcome::Enqueued { forced: false });
        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.submitted, 1);
        assert_eq!(snapshot.enqueued, 1);
        assert_eq!(snapshot.submit_latency.total(), 1);
    }

    #[tokio::test]
    async fn test_disabled_kind() {
        let mut config = AgentConfig::default();
        config.disabled_kinds.insert(EventKind::Query);
        let (pipeline, _worker, diagnostics) = pipeline_with(config);
        let outcome =
            pipeline.record_query("select 1", vec![], 3.0, None, &CorrelationContext::new());
        assert_eq!(outcome, SubmitOutcome::Disabled);
        assert_eq!(diagnostics.snapshot().disabled, 1);
    }

    #[tokio::test]
    async fn test_master_switch_off() {
        let config = AgentConfig {
            enabled: false,
            ..Default::default()
        };
        let (pipeline, _worker, _) = pipeline_with(config);
        let outcome = pipeline.record_metric("cpu", 0.5, None, &CorrelationContext::new());
        assert_eq!(outcome, SubmitOutcome::Disabled);
    }

    #[tokio::test]
    async fn test_malformed_is_counted_not_raised() {
        let (pipeline, _worker, diagnostics) = pipeline_with(AgentConfig::default());
        let outcome = pipeline.record_query("", vec![], 3.0, None, &CorrelationContext::new());
        assert!(matches!(outcome, SubmitOutcome::Invalid(CollectionError::MissingField(_))));
        assert_eq!(diagnostics.snapshot().collection_errors, 1);
    }

    #[tokio::test]
    async fn test_token_overflow_is_a_collection_error() {
        let (pipeline, _worker, diagnostics) = pipeline_with(AgentConfig::default());
        let occurrence = LlmOccurrence {
            provider: "anthropic".to_string(),
            model: "claude".to_string(),
            input_tokens: u64::MAX,
            output_tokens: 1,
            cost_usd: None,
            duration_ms: 10.0,
            error: None,
        };
        let outcome = pipeline.submit(occurrence, &CorrelationContext::new());
        assert!(matches!(outcome, SubmitOutcome::Invalid(CollectionError::InvalidValue { .. })));
        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.collection_errors, 1);
        assert_eq!(snapshot.enqueued, 0);
    }

    #[tokio::test]
    async fn test_zero_rate_drops_unforced() {
        let (pipeline, _worker, diagnostics) = pipeline_with(zero_rate());
        let outcome =
            pipeline.record_query("select 1", vec![], 3.0, None, &CorrelationContext::new());
        assert_eq!(outcome, SubmitOutcome::SampledOut);
        assert_eq!(diagnostics.snapshot().sampled_out, 1);
    }

    #[tokio::test]
    async fn test_exception_forced_at_zero_rate() {
        let (pipeline, _worker, diagnostics) = pipeline_with(zero_rate());
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let outcome = pipeline.record_exception(&err, &CorrelationContext::new());
        assert_eq!(outcome, SubmitOutcome::Enqueued { forced: true });
        assert_eq!(diagnostics.snapshot().forced_keeps, 1);
    }

    #[tokio::test]
    async fn test_force_sample_context() {
        let (pipeline, _worker, _) = pipeline_with(zero_rate());
        let mut ctx = CorrelationContext::new();
        ctx.force_sample();
        let outcome = pipeline.record_query("select 1", vec![], 3.0, None, &ctx);
        assert_eq!(outcome, SubmitOutcome::Enqueued { forced: true });
    }

    #[tokio::test]
    async fn test_filter_veto_beats_forced_keep() {
        let (pipeline, _worker, diagnostics) = pipeline_with(AgentConfig::default());
        pipeline.configure_filters(|filters| {
            filters.on_exception(|e| !e.message().contains("ignore me"));
        });
        let err = std::io::Error::new(std::io::ErrorKind::Other, "ignore me");
        let outcome = pipeline.record_exception(&err, &CorrelationContext::new());
        assert_eq!(outcome, SubmitOutcome::Filtered);
        assert_eq!(diagnostics.snapshot().filtered, 1);
        assert_eq!(diagnostics.snapshot().enqueued, 0);
    }

    #[tokio::test]
    async fn test_broken_filter_fails_open() {
        let (pipeline, _worker, diagnostics) = pipeline_with(AgentConfig::default());
        pipeline.configure_filters(|filters| {
            filters.add_global(|_| panic!("filter bug"));
        });
        let outcome = pipeline.record_metric("cpu", 0.5, None, &CorrelationContext::new());
        assert!(outcome.is_enqueued());
        assert_eq!(diagnostics.snapshot().filter_errors, 1);
    }

    #[tokio::test]
    async fn test_user_resolver_fills_identity() {
        let (pipeline, mut worker, _) = pipeline_with(AgentConfig::default());
        pipeline.set_user_resolver(|ctx| {
            ctx.attributes()
                .get("user_id")
                .and_then(Value::as_str)
                .map(|id| UserIdentity::new(id).with("plan", "pro"))
        });

        let mut ctx = CorrelationContext::new();
        ctx.add("user_id", "u-1");
        assert!(pipeline.record_metric("cpu", 0.5, None, &ctx).is_enqueued());

        let event = worker.try_recv().unwrap();
        let user = event.context().user.as_ref().unwrap();
        assert_eq!(user.id, "u-1");
        assert_eq!(user.extra["plan"], "pro");
    }

    #[tokio::test]
    async fn test_resolver_panic_is_absorbed() {
        let (pipeline, _worker, _) = pipeline_with(AgentConfig::default());
        pipeline.set_user_resolver(|_| panic!("resolver bug"));
        let outcome = pipeline.record_metric("cpu", 0.5, None, &CorrelationContext::new());
        assert!(outcome.is_enqueued());
    }

    #[tokio::test]
    async fn test_payload_redacted_before_enqueue() {
        let (pipeline, mut worker, _) = pipeline_with(AgentConfig::default());
        let mut payload = Payload::new();
        payload.insert("password".to_string(), json!("secret123"));
        payload.insert("note".to_string(), json!("card 4111 1111 1111 1111"));
        let mut ctx = CorrelationContext::new();
        ctx.add("api_key", "live-key");

        pipeline.record_event(EventKind::Custom, "signup", payload, None, &ctx);

        let event = worker.try_recv().unwrap();
        assert_eq!(event.field("password").unwrap(), "[REDACTED]");
        assert_eq!(event.field("note").unwrap(), "card [REDACTED]");
        assert_eq!(event.context().attributes["api_key"], "[REDACTED]");
    }

    #[tokio::test]
    async fn test_full_queue_reports_drop() {
        let mut config = AgentConfig::default();
        config.transport = TransportConfig {
            queue_capacity: 1,
            ..Default::default()
        };
        let (pipeline, _worker, diagnostics) = pipeline_with(config);
        let ctx = CorrelationContext::new();
        assert!(pipeline.record_metric("a", 1.0, None, &ctx).is_enqueued());
        assert_eq!(
            pipeline.record_metric("b", 1.0, None, &ctx),
            SubmitOutcome::Dropped(CapacityError::QueueFull)
        );
        assert_eq!(diagnostics.snapshot().dropped_capacity, 1);
    }

    #[tokio::test]
    async fn test_event_has_context_snapshot() {
        let (pipeline, mut worker, _) = pipeline_with(AgentConfig::default());
        let mut ctx = CorrelationContext::new();
        ctx.add("tenant", "acme");
        pipeline.record_breadcrumb("clicked", Some("ui"), &ctx);
        ctx.add("later", true);

        let event = worker.try_recv().unwrap();
        assert_eq!(event.context().trace_id, ctx.trace_id());
        assert_eq!(event.context().attributes.get("tenant"), Some(&json!("acme")));
        assert!(event.context().attributes.get("later").is_none());
    }
}
