// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Correlation context and trace-context propagation.
//!
//! Each unit of work (request, job, test) owns one [`CorrelationContext`].
//! It is threaded explicitly through collector calls; there is no ambient
//! "current context". Correlation across processes happens only through the
//! `traceparent`/`tracestate` headers produced by
//! [`CorrelationContext::outgoing_headers`].
//!
//! # Example
//!
//! ```rust
//! use watchtower::context::CorrelationContext;
//!
//! let mut request = CorrelationContext::from_headers(None, None);
//! request.add("tenant", "acme");
//!
//! // Dispatch a job: the job gets its own copy.
//! let mut job = request.branch();
//! job.add("queue", "emails");
//! assert!(request.attributes().get("queue").is_none());
//!
//! // Downstream HTTP call headers.
//! let headers = request.outgoing_headers();
//! assert!(headers.traceparent.starts_with("00-"));
//! ```

mod correlation;
mod traceparent;

pub use correlation::{CorrelationContext, SpanId, TraceFlags, TraceId, UserIdentity};
pub use traceparent::{
    parse_traceparent, TraceHeaders, TraceParent, TraceParentError, TraceState,
    TRACEPARENT_HEADER, TRACESTATE_HEADER, VENDOR_KEY,
};
