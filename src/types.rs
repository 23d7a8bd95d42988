// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core type definitions for Watchtower.
//!
//! An [`Event`] is the canonical telemetry record. It is built as a mutable
//! [`EventDraft`] while the pipeline enriches it, then frozen. Filters see
//! only the frozen event. The pipeline's redaction pass consumes it and
//! yields the masked event that goes to the transport; after that nothing
//! can change it.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collector::{truncate_text, truncate_value};
use crate::context::{SpanId, TraceId, UserIdentity};
use crate::redact::{RedactionReport, Redactor};

/// Ordered key/value payload carried by events.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// The closed set of event kinds the agent understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Request,
    Exception,
    Query,
    Job,
    HttpClient,
    Mail,
    Gate,
    Llm,
    Test,
    ScheduledTask,
    Custom,
    Metric,
    Breadcrumb,
}

impl EventKind {
    /// Every kind, in wire order.
    pub const ALL: [EventKind; 13] = [
        EventKind::Request,
        EventKind::Exception,
        EventKind::Query,
        EventKind::Job,
        EventKind::HttpClient,
        EventKind::Mail,
        EventKind::Gate,
        EventKind::Llm,
        EventKind::Test,
        EventKind::ScheduledTask,
        EventKind::Custom,
        EventKind::Metric,
        EventKind::Breadcrumb,
    ];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Request => "request",
            EventKind::Exception => "exception",
            EventKind::Query => "query",
            EventKind::Job => "job",
            EventKind::HttpClient => "http_client",
            EventKind::Mail => "mail",
            EventKind::Gate => "gate",
            EventKind::Llm => "llm",
            EventKind::Test => "test",
            EventKind::ScheduledTask => "scheduled_task",
            EventKind::Custom => "custom",
            EventKind::Metric => "metric",
            EventKind::Breadcrumb => "breadcrumb",
        }
    }

    /// Severity assigned when the collector sees no failure condition.
    pub fn default_severity(&self) -> Severity {
        match self {
            EventKind::Exception => Severity::Error,
            EventKind::Metric | EventKind::Breadcrumb => Severity::Debug,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown event kind: {}", s))
    }
}

/// Event severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Raise to `floor` if currently below it.
    pub fn at_least(self, floor: Severity) -> Severity {
        self.max(floor)
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Info
    }
}

/// Correlation data captured with an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSnapshot {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserIdentity>,
}

/// An event still being enriched by the pipeline.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub kind: EventKind,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub payload: Payload,
    pub context: ContextSnapshot,
}

impl EventDraft {
    /// Freeze the draft into an immutable event.
    pub fn freeze(self) -> Event {
        Event {
            id: Uuid::new_v4(),
            kind: self.kind,
            name: self.name,
            timestamp: self.timestamp,
            severity: self.severity,
            payload: self.payload,
            context: self.context,
        }
    }
}

/// A normalized, immutable telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    id: Uuid,
    kind: EventKind,
    name: String,
    timestamp: DateTime<Utc>,
    severity: Severity,
    payload: Payload,
    context: ContextSnapshot,
}

impl Event {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn context(&self) -> &ContextSnapshot {
        &self.context
    }

    /// Look up a payload field.
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.payload.get(key)
    }

    /// Mask sensitive data in the name, payload and context before the
    /// event is handed to the transport.
    pub(crate) fn redacted(mut self, redactor: &Redactor) -> (Self, RedactionReport) {
        let mut report = redactor.redact_payload(&mut self.payload);
        report.merge(redactor.redact_payload(&mut self.context.attributes));
        if let Some(user) = self.context.user.as_mut() {
            report.merge(redactor.redact_payload(&mut user.extra));
        }
        let masked = match redactor.redact_str(&self.name) {
            Cow::Owned(name) => Some(name),
            Cow::Borrowed(_) => None,
        };
        if let Some(name) = masked {
            self.name = name;
        }
        (self, report)
    }

    /// Cap the name and every payload string at `max_len` bytes. Runs
    /// after [`Event::redacted`], never before.
    pub(crate) fn truncated(mut self, max_len: usize) -> Self {
        truncate_text(&mut self.name, max_len);
        for value in self.payload.values_mut() {
            truncate_value(value, max_len);
        }
        self
    }
}

/// Wall clock anchored to a monotonic instant.
///
/// Timestamps never go backwards within one process even if the system
/// clock is adjusted after startup.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    wall: DateTime<Utc>,
    mono: Instant,
}

impl Clock {
    /// Anchor a clock at the current instant.
    pub fn new() -> Self {
        Self {
            wall: Utc::now(),
            mono: Instant::now(),
        }
    }

    /// Current wall-clock time derived from the monotonic anchor.
    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = self.mono.elapsed();
        let elapsed = ChronoDuration::from_std(elapsed).unwrap_or(ChronoDuration::zero());
        self.wall + elapsed
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
