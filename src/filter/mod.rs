// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Ordered filter predicates that can veto events.
//!
//! Global filters run first for every kind, then the filters registered for
//! the event's kind, in registration order. The first filter that returns
//! `false` discards the event. A filter that returns an error or panics is
//! treated as "keep" and reported back so the pipeline can log and count it.
//!
//! # Example
//!
//! ```rust
//! use watchtower::filter::FilterChain;
//!
//! let mut filters = FilterChain::new();
//! filters.add_global(|event| !event.name().starts_with("health"));
//! filters.on_query(|query| query.duration_ms() > 1000.0);
//! ```

mod views;

pub use views::{
    ExceptionView, GateView, HttpClientView, JobView, LlmView, MailView, QueryView, RequestView,
};

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::FilterError;
use crate::types::{Event, EventKind};

/// A type-erased filter predicate.
pub type FilterFn = Arc<dyn Fn(&Event) -> anyhow::Result<bool> + Send + Sync>;

/// Result of running the chain over one event.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub keep: bool,
    /// Position of the vetoing filter (globals first, then kind filters).
    pub vetoed_by: Option<usize>,
    pub errors: Vec<FilterError>,
}

/// Global and per-kind filter predicates.
#[derive(Clone, Default)]
pub struct FilterChain {
    global: Vec<FilterFn>,
    by_kind: HashMap<EventKind, Vec<FilterFn>>,
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("global", &self.global.len())
            .field(
                "by_kind",
                &self
                    .by_kind
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.len()))
                    .collect::<HashMap<_, _>>(),
            )
            .finish()
    }
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of registered filters.
    pub fn len(&self) -> usize {
        self.global.len() + self.by_kind.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a filter that runs for every kind.
    pub fn add_global<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.global.push(Arc::new(move |event| Ok(filter(event))));
        self
    }

    /// Add a fallible filter that runs for every kind.
    pub fn try_add_global<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(&Event) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.global.push(Arc::new(filter));
        self
    }

    /// Add a filter for one kind.
    pub fn add_kind<F>(&mut self, kind: EventKind, filter: F) -> &mut Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.try_add_kind(kind, move |event| Ok(filter(event)))
    }

    /// Add a fallible filter for one kind.
    pub fn try_add_kind<F>(&mut self, kind: EventKind, filter: F) -> &mut Self
    where
        F: Fn(&Event) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.by_kind.entry(kind).or_default().push(Arc::new(filter));
        self
    }

    pub fn on_query<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(QueryView<'_>) -> bool + Send + Sync + 'static,
    {
        self.add_kind(EventKind::Query, move |event| filter(QueryView(event)))
    }

    pub fn on_exception<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(ExceptionView<'_>) -> bool + Send + Sync + 'static,
    {
        self.add_kind(EventKind::Exception, move |event| filter(ExceptionView(event)))
    }

    pub fn on_job<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(JobView<'_>) -> bool + Send + Sync + 'static,
    {
        self.add_kind(EventKind::Job, move |event| filter(JobView(event)))
    }

    pub fn on_mail<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(MailView<'_>) -> bool + Send + Sync + 'static,
    {
        self.add_kind(EventKind::Mail, move |event| filter(MailView(event)))
    }

    pub fn on_http_client<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(HttpClientView<'_>) -> bool + Send + Sync + 'static,
    {
        self.add_kind(EventKind::HttpClient, move |event| filter(HttpClientView(event)))
    }

    pub fn on_request<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(RequestView<'_>) -> bool + Send + Sync + 'static,
    {
        self.add_kind(EventKind::Request, move |event| filter(RequestView(event)))
    }

    pub fn on_gate<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(GateView<'_>) -> bool + Send + Sync + 'static,
    {
        self.add_kind(EventKind::Gate, move |event| filter(GateView(event)))
    }

    pub fn on_llm<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(LlmView<'_>) -> bool + Send + Sync + 'static,
    {
        self.add_kind(EventKind::Llm, move |event| filter(LlmView(event)))
    }

    /// Run global then kind filters, stopping at the first veto.
    pub fn evaluate(&self, event: &Event) -> FilterOutcome {
        let mut outcome = FilterOutcome {
            keep: true,
            ..Default::default()
        };

        let kind_filters = self
            .by_kind
            .get(&event.kind())
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        for (index, filter) in self.global.iter().chain(kind_filters).enumerate() {
            match run_filter(filter, event) {
                Ok(true) => {}
                Ok(false) => {
                    outcome.keep = false;
                    outcome.vetoed_by = Some(index);
                    break;
                }
                Err(err) => outcome.errors.push(err.at(index)),
            }
        }

        outcome
    }
}

/// Error from a filter before its chain position is known.
enum RawFilterError {
    Failed(anyhow::Error),
    Panicked(String),
}

impl RawFilterError {
    fn at(self, index: usize) -> FilterError {
        match self {
            RawFilterError::Failed(source) => FilterError::Failed { index, source },
            RawFilterError::Panicked(message) => FilterError::Panicked { index, message },
        }
    }
}

fn run_filter(filter: &FilterFn, event: &Event) -> Result<bool, RawFilterError> {
    match catch_unwind(AssertUnwindSafe(|| filter(event))) {
        Ok(Ok(keep)) => Ok(keep),
        Ok(Err(err)) => Err(RawFilterError::Failed(err)),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(RawFilterError::Panicked(message))
        }
    }
}
