// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Typed raw occurrences, one per event kind.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    require_duration, require_status, require_text, Collector, CollectorRules, ForceReason,
    Normalized,
};
use crate::error::CollectionError;
use crate::types::{EventKind, Payload, Severity};

fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

/// Strip the query string so URLs group well as event names.
fn url_path(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// An incoming HTTP request handled by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOccurrence {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub route: Option<String>,
    pub status: u16,
    pub duration_ms: f64,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub headers: Payload,
}

impl Collector for RequestOccurrence {
    const KIND: EventKind = EventKind::Request;

    fn collect(self, rules: &CollectorRules) -> Result<Normalized, CollectionError> {
        require_text("method", &self.method)?;
        require_text("url", &self.url)?;
        require_status("status", self.status)?;
        require_duration("duration_ms", self.duration_ms)?;

        let method = self.method.to_uppercase();
        let name = format!(
            "{} {}",
            method,
            self.route.as_deref().unwrap_or_else(|| url_path(&self.url))
        );

        let (severity, forced) = if self.status >= 500 {
            (Severity::Error, Some(ForceReason::ServerError))
        } else if self.duration_ms >= rules.slow_request_ms {
            (Severity::Warning, Some(ForceReason::SlowRequest))
        } else if self.status >= 400 {
            (Severity::Warning, None)
        } else {
            (Self::KIND.default_severity(), None)
        };

        Ok(Normalized {
            kind: Self::KIND,
            name,
            severity,
            payload: object(json!({
                "method": method,
                "url": self.url,
                "route": self.route,
                "status": self.status,
                "duration_ms": self.duration_ms,
                "ip": self.ip,
                "headers": self.headers,
            })),
            forced,
        })
    }
}

/// An error raised or reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionOccurrence {
    pub class: String,
    pub message: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub trace: Vec<String>,
    #[serde(default = "default_true")]
    pub handled: bool,
    #[serde(default)]
    pub data: Payload,
}

fn default_true() -> bool {
    true
}

impl ExceptionOccurrence {
    /// Build from any Rust error, including its `source()` chain.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut trace = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push(cause.to_string());
            source = cause.source();
        }

        Self {
            class: std::any::type_name::<E>().to_string(),
            message: err.to_string(),
            file: None,
            line: None,
            trace,
            handled: true,
            data: Payload::new(),
        }
    }
}

impl Collector for ExceptionOccurrence {
    const KIND: EventKind = EventKind::Exception;

    fn collect(self, _rules: &CollectorRules) -> Result<Normalized, CollectionError> {
        require_text("class", &self.class)?;

        let severity = if self.handled {
            Self::KIND.default_severity()
        } else {
            Severity::Critical
        };

        Ok(Normalized {
            kind: Self::KIND,
            name: self.class.clone(),
            severity,
            payload: object(json!({
                "class": self.class,
                "message": self.message,
                "file": self.file,
                "line": self.line,
                "trace": self.trace,
                "handled": self.handled,
                "data": self.data,
            })),
            forced: Some(ForceReason::Exception),
        })
    }
}

/// A database query executed by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOccurrence {
    pub sql: String,
    #[serde(default)]
    pub bindings: Vec<Value>,
    pub duration_ms: f64,
    #[serde(default)]
    pub connection: Option<String>,
}

impl Collector for QueryOccurrence {
    const KIND: EventKind = EventKind::Query;

    fn collect(self, rules: &CollectorRules) -> Result<Normalized, CollectionError> {
        require_text("sql", &self.sql)?;
        require_duration("duration_ms", self.duration_ms)?;

        let verb = self
            .sql
            .split_whitespace()
            .next()
            .unwrap_or("query")
            .to_lowercase();

        let slow = self.duration_ms >= rules.slow_query_ms;
        Ok(Normalized {
            kind: Self::KIND,
            name: verb,
            severity: if slow { Severity::Warning } else { Self::KIND.default_severity() },
            payload: object(json!({
                "sql": self.sql,
                "bindings": self.bindings,
                "duration_ms": self.duration_ms,
                "connection": self.connection,
                "slow": slow,
            })),
            forced: slow.then_some(ForceReason::SlowQuery),
        })
    }
}

/// Outcome of a queued job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processed,
    Released,
    Failed,
}

/// A queued job dispatched or executed by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOccurrence {
    pub name: String,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default)]
    pub attempt: u32,
    pub status: JobStatus,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub error: Option<String>,
}

impl Collector for JobOccurrence {
    const KIND: EventKind = EventKind::Job;

    fn collect(self, _rules: &CollectorRules) -> Result<Normalized, CollectionError> {
        require_text("name", &self.name)?;
        require_duration("duration_ms", self.duration_ms)?;

        let (severity, forced) = match self.status {
            JobStatus::Failed => (Severity::Error, Some(ForceReason::JobFailed)),
            JobStatus::Released => (Severity::Warning, None),
            _ => (Self::KIND.default_severity(), None),
        };

        Ok(Normalized {
            kind: Self::KIND,
            name: self.name.clone(),
            severity,
            payload: object(json!({
                "name": self.name,
                "queue": self.queue,
                "connection": self.connection,
                "attempt": self.attempt,
                "status": self.status,
                "duration_ms": self.duration_ms,
                "error": self.error,
            })),
            forced,
        })
    }
}

/// An outgoing HTTP call made by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpClientOccurrence {
    pub method: String,
    pub url: String,
    /// `None` when the call failed before a response arrived.
    #[serde(default)]
    pub status: Option<u16>,
    pub duration_ms: f64,
}

impl Collector for HttpClientOccurrence {
    const KIND: EventKind = EventKind::HttpClient;

    fn collect(self, rules: &CollectorRules) -> Result<Normalized, CollectionError> {
        require_text("method", &self.method)?;
        require_text("url", &self.url)?;
        require_duration("duration_ms", self.duration_ms)?;
        if let Some(status) = self.status {
            require_status("status", status)?;
        }

        let method = self.method.to_uppercase();
        let name = format!("{} {}", method, url_path(&self.url));

        let (severity, forced) = match self.status {
            None => (Severity::Error, Some(ForceReason::HttpCallFailed)),
            Some(status) if status >= 500 => (Severity::Error, Some(ForceReason::HttpCallFailed)),
            Some(status) if status >= 400 => (Severity::Warning, Some(ForceReason::HttpCallFailed)),
            Some(_) if self.duration_ms >= rules.slow_http_client_ms => {
                (Severity::Warning, Some(ForceReason::SlowHttpCall))
            }
            Some(_) => (Self::KIND.default_severity(), None),
        };

        Ok(Normalized {
            kind: Self::KIND,
            name,
            severity,
            payload: object(json!({
                "method": method,
                "url": self.url,
                "status": self.status,
                "duration_ms": self.duration_ms,
            })),
            forced,
        })
    }
}

/// A mail message sent by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailOccurrence {
    pub class: String,
    #[serde(default)]
    pub mailer: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub failed: bool,
}

impl Collector for MailOccurrence {
    const KIND: EventKind = EventKind::Mail;

    fn collect(self, _rules: &CollectorRules) -> Result<Normalized, CollectionError> {
        require_text("class", &self.class)?;
        require_duration("duration_ms", self.duration_ms)?;

        Ok(Normalized {
            kind: Self::KIND,
            name: self.class.clone(),
            severity: if self.failed { Severity::Error } else { Self::KIND.default_severity() },
            payload: object(json!({
                "class": self.class,
                "mailer": self.mailer,
                "subject": self.subject,
                "to": self.to,
                "cc": self.cc,
                "bcc": self.bcc,
                "duration_ms": self.duration_ms,
                "failed": self.failed,
            })),
            forced: None,
        })
    }
}

/// An authorization check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOccurrence {
    pub ability: String,
    pub allowed: bool,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl Collector for GateOccurrence {
    const KIND: EventKind = EventKind::Gate;

    fn collect(self, _rules: &CollectorRules) -> Result<Normalized, CollectionError> {
        require_text("ability", &self.ability)?;

        Ok(Normalized {
            kind: Self::KIND,
            name: self.ability.clone(),
            severity: if self.allowed { Self::KIND.default_severity() } else { Severity::Warning },
            payload: object(json!({
                "ability": self.ability,
                "allowed": self.allowed,
                "arguments": self.arguments,
            })),
            forced: None,
        })
    }
}

/// A call to a language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmOccurrence {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cost_usd: Option<f64>,
    pub duration_ms: f64,
    #[serde(default)]
    pub error: Option<String>,
}

impl Collector for LlmOccurrence {
    const KIND: EventKind = EventKind::Llm;

    fn collect(self, _rules: &CollectorRules) -> Result<Normalized, CollectionError> {
        require_text("provider", &self.provider)?;
        require_text("model", &self.model)?;
        require_duration("duration_ms", self.duration_ms)?;
        if let Some(cost) = self.cost_usd {
            if !cost.is_finite() || cost < 0.0 {
                return Err(CollectionError::invalid("cost_usd", format!("{} is not a cost", cost)));
            }
        }

        let total_tokens = self.input_tokens.checked_add(self.output_tokens).ok_or_else(|| {
            CollectionError::invalid("output_tokens", "token total overflows u64")
        })?;

        let failed = self.error.is_some();
        Ok(Normalized {
            kind: Self::KIND,
            name: format!("{}/{}", self.provider, self.model),
            severity: if failed { Severity::Error } else { Self::KIND.default_severity() },
            payload: object(json!({
                "provider": self.provider,
                "model": self.model,
                "input_tokens": self.input_tokens,
                "output_tokens": self.output_tokens,
                "total_tokens": total_tokens,
                "cost_usd": self.cost_usd,
                "duration_ms": self.duration_ms,
                "error": self.error,
            })),
            forced: failed.then_some(ForceReason::LlmFailed),
        })
    }
}

/// Outcome of a test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

/// A finished test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOccurrence {
    pub name: String,
    #[serde(default)]
    pub suite: Option<String>,
    pub status: TestStatus,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub message: Option<String>,
}

impl Collector for TestOccurrence {
    const KIND: EventKind = EventKind::Test;

    fn collect(self, _rules: &CollectorRules) -> Result<Normalized, CollectionError> {
        require_text("name", &self.name)?;
        require_duration("duration_ms", self.duration_ms)?;

        let failed = self.status == TestStatus::Failed;
        Ok(Normalized {
            kind: Self::KIND,
            name: self.name.clone(),
            severity: if failed { Severity::Error } else { Self::KIND.default_severity() },
            payload: object(json!({
                "name": self.name,
                "suite": self.suite,
                "status": self.status,
                "duration_ms": self.duration_ms,
                "message": self.message,
            })),
            forced: failed.then_some(ForceReason::TestFailed),
        })
    }
}

/// Outcome of a scheduled task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Processed,
    Skipped,
    Failed,
}

/// A scheduled task run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTaskOccurrence {
    pub name: String,
    #[serde(default)]
    pub cron: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

impl Collector for ScheduledTaskOccurrence {
    const KIND: EventKind = EventKind::ScheduledTask;

    fn collect(self, _rules: &CollectorRules) -> Result<Normalized, CollectionError> {
        require_text("name", &self.name)?;
        require_duration("duration_ms", self.duration_ms)?;

        let failed =
            self.status == TaskStatus::Failed || self.exit_code.is_some_and(|code| code != 0);
        Ok(Normalized {
            kind: Self::KIND,
            name: self.name.clone(),
            severity: if failed { Severity::Error } else { Self::KIND.default_severity() },
            payload: object(json!({
                "name": self.name,
                "cron": self.cron,
                "status": self.status,
                "duration_ms": self.duration_ms,
                "exit_code": self.exit_code,
            })),
            forced: failed.then_some(ForceReason::TaskFailed),
        })
    }
}

/// A health or metric sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricOccurrence {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub tags: Payload,
}

impl Collector for MetricOccurrence {
    const KIND: EventKind = EventKind::Metric;

    fn collect(self, _rules: &CollectorRules) -> Result<Normalized, CollectionError> {
        require_text("name", &self.name)?;
        if !self.value.is_finite() {
            return Err(CollectionError::invalid("value", "metric value must be finite"));
        }

        Ok(Normalized {
            kind: Self::KIND,
            name: self.name.clone(),
            severity: Self::KIND.default_severity(),
            payload: object(json!({
                "value": self.value,
                "unit": self.unit,
                "tags": self.tags,
            })),
            forced: None,
        })
    }
}

/// A breadcrumb leading up to a later event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreadcrumbOccurrence {
    pub message: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub data: Payload,
}

impl Collector for BreadcrumbOccurrence {
    const KIND: EventKind = EventKind::Breadcrumb;

    fn collect(self, _rules: &CollectorRules) -> Result<Normalized, CollectionError> {
        require_text("message", &self.message)?;

        Ok(Normalized {
            kind: Self::KIND,
            name: self.category.clone().unwrap_or_else(|| "default".to_string()),
            severity: Self::KIND.default_severity(),
            payload: object(json!({
                "message": self.message,
                "category": self.category,
                "data": self.data,
            })),
            forced: None,
        })
    }
}

/// A free-form event of any kind, recorded through the manual API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericOccurrence {
    pub kind: EventKind,
    pub name: String,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub severity: Option<Severity>,
}

impl Collector for GenericOccurrence {
    // Generic events report their own kind; this is the fallback.
    const KIND: EventKind = EventKind::Custom;

    fn collect(self, _rules: &CollectorRules) -> Result<Normalized, CollectionError> {
        require_text("name", &self.name)?;

        let severity = self.severity.unwrap_or_else(|| self.kind.default_severity());
        Ok(Normalized {
            kind: self.kind,
            name: self.name,
            severity,
            payload: self.payload,
            forced: (severity >= Severity::Error).then_some(ForceReason::HighSeverity),
        })
    }
}
