// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Typed read-only views over kind-specific payloads.
//!
//! Views borrow the event and read fields lazily. Missing or mistyped fields
//! come back as empty/zero values rather than errors.

use serde_json::Value;

use crate::types::Event;

fn text<'a>(event: &'a Event, key: &str) -> &'a str {
    event.field(key).and_then(Value::as_str).unwrap_or("")
}

fn opt_text<'a>(event: &'a Event, key: &str) -> Option<&'a str> {
    event.field(key).and_then(Value::as_str)
}

fn number(event: &Event, key: &str) -> f64 {
    event.field(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn unsigned(event: &Event, key: &str) -> u64 {
    event.field(key).and_then(Value::as_u64).unwrap_or(0)
}

fn flag(event: &Event, key: &str) -> bool {
    event.field(key).and_then(Value::as_bool).unwrap_or(false)
}

fn strings<'a>(event: &'a Event, key: &str) -> Vec<&'a str> {
    event
        .field(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Database query.
#[derive(Debug, Clone, Copy)]
pub struct QueryView<'a>(pub(crate) &'a Event);

impl<'a> QueryView<'a> {
    pub fn event(&self) -> &'a Event {
        self.0
    }

    pub fn sql(&self) -> &'a str {
        text(self.0, "sql")
    }

    pub fn bindings(&self) -> &'a [Value] {
        self.0
            .field("bindings")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn duration_ms(&self) -> f64 {
        number(self.0, "duration_ms")
    }

    pub fn connection(&self) -> Option<&'a str> {
        opt_text(self.0, "connection")
    }
}

/// Raised or reported error.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionView<'a>(pub(crate) &'a Event);

impl<'a> ExceptionView<'a> {
    pub fn event(&self) -> &'a Event {
        self.0
    }

    pub fn class(&self) -> &'a str {
        text(self.0, "class")
    }

    pub fn message(&self) -> &'a str {
        text(self.0, "message")
    }

    pub fn handled(&self) -> bool {
        flag(self.0, "handled")
    }
}

/// Queued job.
#[derive(Debug, Clone, Copy)]
pub struct JobView<'a>(pub(crate) &'a Event);

impl<'a> JobView<'a> {
    pub fn event(&self) -> &'a Event {
        self.0
    }

    pub fn name(&self) -> &'a str {
        text(self.0, "name")
    }

    pub fn queue(&self) -> Option<&'a str> {
        opt_text(self.0, "queue")
    }

    /// Status as its wire name (`queued`, `processed`, `released`, `failed`).
    pub fn status(&self) -> &'a str {
        text(self.0, "status")
    }

    pub fn attempt(&self) -> u64 {
        unsigned(self.0, "attempt")
    }

    pub fn duration_ms(&self) -> f64 {
        number(self.0, "duration_ms")
    }
}

/// Outgoing mail.
#[derive(Debug, Clone, Copy)]
pub struct MailView<'a>(pub(crate) &'a Event);

impl<'a> MailView<'a> {
    pub fn event(&self) -> &'a Event {
        self.0
    }

    pub fn class(&self) -> &'a str {
        text(self.0, "class")
    }

    pub fn subject(&self) -> Option<&'a str> {
        opt_text(self.0, "subject")
    }

    pub fn to(&self) -> Vec<&'a str> {
        strings(self.0, "to")
    }

    pub fn failed(&self) -> bool {
        flag(self.0, "failed")
    }
}

/// Outgoing HTTP call.
#[derive(Debug, Clone, Copy)]
pub struct HttpClientView<'a>(pub(crate) &'a Event);

impl<'a> HttpClientView<'a> {
    pub fn event(&self) -> &'a Event {
        self.0
    }

    pub fn method(&self) -> &'a str {
        text(self.0, "method")
    }

    pub fn url(&self) -> &'a str {
        text(self.0, "url")
    }

    /// `None` when the call never got a response.
    pub fn status(&self) -> Option<u16> {
        self.0
            .field("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
    }

    pub fn duration_ms(&self) -> f64 {
        number(self.0, "duration_ms")
    }
}

/// Incoming HTTP request.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a>(pub(crate) &'a Event);

impl<'a> RequestView<'a> {
    pub fn event(&self) -> &'a Event {
        self.0
    }

    pub fn method(&self) -> &'a str {
        text(self.0, "method")
    }

    pub fn url(&self) -> &'a str {
        text(self.0, "url")
    }

    pub fn route(&self) -> Option<&'a str> {
        opt_text(self.0, "route")
    }

    pub fn status(&self) -> u16 {
        u16::try_from(unsigned(self.0, "status")).unwrap_or(0)
    }

    pub fn duration_ms(&self) -> f64 {
        number(self.0, "duration_ms")
    }
}

/// Authorization check.
#[derive(Debug, Clone, Copy)]
pub struct GateView<'a>(pub(crate) &'a Event);

impl<'a> GateView<'a> {
    pub fn event(&self) -> &'a Event {
        self.0
    }

    pub fn ability(&self) -> &'a str {
        text(self.0, "ability")
    }

    pub fn allowed(&self) -> bool {
        flag(self.0, "allowed")
    }
}

/// Language model call.
#[derive(Debug, Clone, Copy)]
pub struct LlmView<'a>(pub(crate) &'a Event);

impl<'a> LlmView<'a> {
    pub fn event(&self) -> &'a Event {
        self.0
    }

    pub fn provider(&self) -> &'a str {
        text(self.0, "provider")
    }

    pub fn model(&self) -> &'a str {
        text(self.0, "model")
    }

    pub fn total_tokens(&self) -> u64 {
        unsigned(self.0, "total_tokens")
    }

    pub fn cost_usd(&self) -> Option<f64> {
        self.0.field("cost_usd").and_then(Value::as_f64)
    }
}
