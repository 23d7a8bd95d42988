// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Correlation context for one unit of work.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::traceparent::{parse_traceparent, TraceHeaders, TraceParent, TraceState, VENDOR_KEY};
use crate::types::{ContextSnapshot, Payload};

/// 128-bit identifier shared by every span of a distributed operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// Generate a new random, non-zero trace ID.
    pub fn generate() -> Self {
        loop {
            let id: u128 = rand::random();
            if id != 0 {
                return Self(id);
            }
        }
    }

    pub fn from_u128(id: u128) -> Self {
        Self(id)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }

    /// Get a short representation (first 8 hex characters).
    pub fn short(&self) -> String {
        self.to_string()[..8].to_string()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self.short())
    }
}

impl Serialize for TraceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TraceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        u128::from_str_radix(&s, 16)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// 64-bit identifier of one local segment of a trace.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Generate a new random, non-zero span ID.
    pub fn generate() -> Self {
        loop {
            let id: u64 = rand::random();
            if id != 0 {
                return Self(id);
            }
        }
    }

    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self)
    }
}

impl Serialize for SpanId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SpanId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        u64::from_str_radix(&s, 16)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// Trace flags byte from `traceparent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TraceFlags(u8);

impl TraceFlags {
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    pub fn new(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_sampled(&self) -> bool {
        self.0 & Self::SAMPLED.0 != 0
    }
}

/// Resolved identity of the user behind a unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    #[serde(flatten)]
    pub extra: Payload,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extra: Payload::new(),
        }
    }

    /// Attach an extra field such as a name or email.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Trace identifiers and attributes for one request, job or test.
///
/// A context is owned by exactly one unit of work. Child contexts for
/// outgoing calls and dispatched jobs are made with [`branch`], which copies
/// the attributes; nothing a child does is visible to its parent.
///
/// [`branch`]: CorrelationContext::branch
#[derive(Debug)]
pub struct CorrelationContext {
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    flags: TraceFlags,
    trace_state: TraceState,
    attributes: Payload,
    user: Option<UserIdentity>,
    forced: bool,
}

impl CorrelationContext {
    /// Start a new trace.
    pub fn new() -> Self {
        Self {
            trace_id: TraceId::generate(),
            span_id: SpanId::generate(),
            parent_span_id: None,
            flags: TraceFlags::SAMPLED,
            trace_state: TraceState::default(),
            attributes: Payload::new(),
            user: None,
            forced: false,
        }
    }

    /// Continue an inbound trace, or start a new one if the header is
    /// missing or malformed. A fresh span id is always minted.
    pub fn from_headers(traceparent: Option<&str>, tracestate: Option<&str>) -> Self {
        let parent = match traceparent.map(parse_traceparent) {
            Some(Ok(parent)) => parent,
            Some(Err(err)) => {
                tracing::debug!(error = %err, "Ignoring malformed traceparent");
                return Self::new();
            }
            None => return Self::new(),
        };

        Self {
            trace_id: parent.trace_id,
            span_id: SpanId::generate(),
            parent_span_id: Some(parent.parent_id),
            flags: parent.flags,
            trace_state: tracestate.map(TraceState::parse).unwrap_or_default(),
            attributes: Payload::new(),
            user: None,
            forced: false,
        }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    pub fn flags(&self) -> TraceFlags {
        self.flags
    }

    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }

    pub fn attributes(&self) -> &Payload {
        &self.attributes
    }

    pub fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    /// Whether every event of this unit of work bypasses sampling.
    pub fn is_forced(&self) -> bool {
        self.forced
    }

    /// Add an attribute to this context.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> &mut Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add several attributes at once.
    pub fn extend<I, K, V>(&mut self, attributes: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        for (key, value) in attributes {
            self.attributes.insert(key.into(), value.into());
        }
        self
    }

    pub fn set_user(&mut self, user: UserIdentity) -> &mut Self {
        self.user = Some(user);
        self
    }

    /// Keep every event of this unit of work regardless of sampling rates.
    pub fn force_sample(&mut self) -> &mut Self {
        self.forced = true;
        self
    }

    /// Copy-on-branch child for an outgoing call or dispatched job.
    pub fn branch(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::generate(),
            parent_span_id: Some(self.span_id),
            flags: self.flags,
            trace_state: self.trace_state.clone(),
            attributes: self.attributes.clone(),
            user: self.user.clone(),
            forced: self.forced,
        }
    }

    /// Headers that let a downstream process continue this trace with
    /// this context's span as parent.
    pub fn outgoing_headers(&self) -> TraceHeaders {
        let parent = TraceParent::new(self.trace_id, self.span_id, self.flags);
        let state = self.trace_state.with_entry(VENDOR_KEY, self.span_id.to_string());
        TraceHeaders {
            traceparent: parent.to_string(),
            tracestate: Some(state.to_string()),
        }
    }

    /// Branch a child for an outgoing call and return it with the headers
    /// to send. The headers name the child's span as parent.
    pub fn outgoing(&self) -> (Self, TraceHeaders) {
        let child = self.branch();
        let headers = child.outgoing_headers();
        (child, headers)
    }

    /// Immutable copy of the correlation data for an event.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_span_id: self.parent_span_id,
            attributes: self.attributes.clone(),
            user: self.user.clone(),
        }
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new()
    }
}
