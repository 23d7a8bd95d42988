// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Collectors turn raw runtime occurrences into normalized events.
//!
//! The set of kinds is closed: [`Occurrence`] is a tagged variant with one
//! typed shape per kind, and each shape implements [`Collector`]. A
//! collector validates its input, builds the kind-specific payload, picks a
//! severity and decides whether the event must bypass sampling.

mod occurrence;

pub use occurrence::{
    BreadcrumbOccurrence, ExceptionOccurrence, GateOccurrence, GenericOccurrence,
    HttpClientOccurrence, JobOccurrence, JobStatus, LlmOccurrence, MailOccurrence,
    MetricOccurrence, QueryOccurrence, RequestOccurrence, ScheduledTaskOccurrence, TaskStatus,
    TestOccurrence, TestStatus,
};

use serde::{Deserialize, Serialize};

use crate::error::CollectionError;
use crate::types::{EventKind, Payload, Severity};

/// Suffix appended to truncated string values.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Why a collector marked an event as forced-keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceReason {
    Exception,
    SlowQuery,
    SlowRequest,
    ServerError,
    SlowHttpCall,
    HttpCallFailed,
    JobFailed,
    TaskFailed,
    TestFailed,
    LlmFailed,
    HighSeverity,
    ForcedContext,
}

/// Thresholds and limits collectors apply while normalizing.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorRules {
    pub slow_query_ms: f64,
    pub slow_request_ms: f64,
    pub slow_http_client_ms: f64,
    pub max_string_length: usize,
}

impl Default for CollectorRules {
    fn default() -> Self {
        Self {
            slow_query_ms: 1000.0,
            slow_request_ms: 1000.0,
            slow_http_client_ms: 1000.0,
            max_string_length: 10_000,
        }
    }
}

/// Output of a collector, before correlation data is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub kind: EventKind,
    pub name: String,
    pub severity: Severity,
    pub payload: Payload,
    pub forced: Option<ForceReason>,
}

/// A normalizer for one kind of raw occurrence.
pub trait Collector {
    /// Kind of event this collector produces.
    const KIND: EventKind;

    /// Validate and normalize.
    fn collect(self, rules: &CollectorRules) -> Result<Normalized, CollectionError>;
}

/// A raw runtime occurrence handed in by instrumentation hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "occurrence", rename_all = "snake_case")]
pub enum Occurrence {
    Request(RequestOccurrence),
    Exception(ExceptionOccurrence),
    Query(QueryOccurrence),
    Job(JobOccurrence),
    HttpClient(HttpClientOccurrence),
    Mail(MailOccurrence),
    Gate(GateOccurrence),
    Llm(LlmOccurrence),
    Test(TestOccurrence),
    ScheduledTask(ScheduledTaskOccurrence),
    Metric(MetricOccurrence),
    Breadcrumb(BreadcrumbOccurrence),
    Event(GenericOccurrence),
}

impl Occurrence {
    /// Kind of event this occurrence will become.
    pub fn kind(&self) -> EventKind {
        match self {
            Occurrence::Request(_) => RequestOccurrence::KIND,
            Occurrence::Exception(_) => ExceptionOccurrence::KIND,
            Occurrence::Query(_) => QueryOccurrence::KIND,
            Occurrence::Job(_) => JobOccurrence::KIND,
            Occurrence::HttpClient(_) => HttpClientOccurrence::KIND,
            Occurrence::Mail(_) => MailOccurrence::KIND,
            Occurrence::Gate(_) => GateOccurrence::KIND,
            Occurrence::Llm(_) => LlmOccurrence::KIND,
            Occurrence::Test(_) => TestOccurrence::KIND,
            Occurrence::ScheduledTask(_) => ScheduledTaskOccurrence::KIND,
            Occurrence::Metric(_) => MetricOccurrence::KIND,
            Occurrence::Breadcrumb(_) => BreadcrumbOccurrence::KIND,
            Occurrence::Event(generic) => generic.kind,
        }
    }

    /// Run the collector for this occurrence.
    ///
    /// Strings are left at full length; the pipeline caps them only after
    /// redaction so value matchers always see whole secrets.
    pub fn normalize(self, rules: &CollectorRules) -> Result<Normalized, CollectionError> {
        match self {
            Occurrence::Request(o) => o.collect(rules),
            Occurrence::Exception(o) => o.collect(rules),
            Occurrence::Query(o) => o.collect(rules),
            Occurrence::Job(o) => o.collect(rules),
            Occurrence::HttpClient(o) => o.collect(rules),
            Occurrence::Mail(o) => o.collect(rules),
            Occurrence::Gate(o) => o.collect(rules),
            Occurrence::Llm(o) => o.collect(rules),
            Occurrence::Test(o) => o.collect(rules),
            Occurrence::ScheduledTask(o) => o.collect(rules),
            Occurrence::Metric(o) => o.collect(rules),
            Occurrence::Breadcrumb(o) => o.collect(rules),
            Occurrence::Event(o) => o.collect(rules),
        }
    }
}

macro_rules! impl_from_occurrence {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Occurrence {
                fn from(o: $ty) -> Self {
                    Occurrence::$variant(o)
                }
            }
        )*
    };
}

impl_from_occurrence! {
    Request => RequestOccurrence,
    Exception => ExceptionOccurrence,
    Query => QueryOccurrence,
    Job => JobOccurrence,
    HttpClient => HttpClientOccurrence,
    Mail => MailOccurrence,
    Gate => GateOccurrence,
    Llm => LlmOccurrence,
    Test => TestOccurrence,
    ScheduledTask => ScheduledTaskOccurrence,
    Metric => MetricOccurrence,
    Breadcrumb => BreadcrumbOccurrence,
    Event => GenericOccurrence,
}

/// Truncate a string in place on a char boundary.
pub(crate) fn truncate_text(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    s.push_str(TRUNCATION_MARKER);
}

/// Truncate every string inside a value.
pub(crate) fn truncate_value(value: &mut serde_json::Value, max: usize) {
    match value {
        serde_json::Value::String(s) => truncate_text(s, max),
        serde_json::Value::Array(items) => {
            for item in items {
                truncate_value(item, max);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values_mut() {
                truncate_value(item, max);
            }
        }
        _ => {}
    }
}

pub(crate) fn require_text(field: &'static str, value: &str) -> Result<(), CollectionError> {
    if value.trim().is_empty() {
        Err(CollectionError::MissingField(field))
    } else {
        Ok(())
    }
}

pub(crate) fn require_duration(field: &'static str, value: f64) -> Result<(), CollectionError> {
    if !value.is_finite() || value < 0.0 {
        Err(CollectionError::invalid(field, format!("{} is not a valid duration", value)))
    } else {
        Ok(())
    }
}

pub(crate) fn require_status(field: &'static str, value: u16) -> Result<(), CollectionError> {
    if (100..=599).contains(&value) {
        Ok(())
    } else {
        Err(CollectionError::invalid(field, format!("{} is not an HTTP status", value)))
    }
}
