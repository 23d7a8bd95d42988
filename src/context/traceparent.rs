// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! W3C trace-context header codec.
//!
//! `traceparent` carries `version-trace_id-parent_id-flags`; `tracestate`
//! carries an ordered list of vendor `key=value` members that we pass along
//! with our own entry in front.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::correlation::{SpanId, TraceFlags, TraceId};

/// Inbound/outbound trace parent header name.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Inbound/outbound trace state header name.
pub const TRACESTATE_HEADER: &str = "tracestate";

/// Our vendor key inside `tracestate`.
pub const VENDOR_KEY: &str = "wt";

const SUPPORTED_VERSION: u8 = 0x00;
const TRACEPARENT_LEN: usize = 55;
const MAX_TRACESTATE_MEMBERS: usize = 32;
const MAX_TRACESTATE_LEN: usize = 512;

/// Errors that can occur while parsing trace-context headers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceParentError {
    #[error("Header has wrong length: {0}")]
    Length(usize),

    #[error("Header has {0} fields, expected 4")]
    FieldCount(usize),

    #[error("Invalid hex in {0}")]
    InvalidHex(&'static str),

    #[error("Unsupported version {0:02x}")]
    UnsupportedVersion(u8),

    #[error("All-zero {0}")]
    ZeroId(&'static str),
}

/// A parsed `traceparent` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceParent {
    pub version: u8,
    pub trace_id: TraceId,
    pub parent_id: SpanId,
    pub flags: TraceFlags,
}

impl TraceParent {
    /// Build a version-00 header for the given ids.
    pub fn new(trace_id: TraceId, parent_id: SpanId, flags: TraceFlags) -> Self {
        Self {
            version: SUPPORTED_VERSION,
            trace_id,
            parent_id,
            flags,
        }
    }
}

impl fmt::Display for TraceParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Always emit the version we understand, whatever we received.
        write!(
            f,
            "{:02x}-{}-{}-{:02x}",
            SUPPORTED_VERSION,
            self.trace_id,
            self.parent_id,
            self.flags.bits()
        )
    }
}

impl FromStr for TraceParent {
    type Err = TraceParentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_traceparent(s)
    }
}

/// Parse a `traceparent` header value.
pub fn parse_traceparent(header: &str) -> Result<TraceParent, TraceParentError> {
    let header = header.trim();
    // Byte slicing below assumes ASCII.
    if !header.is_ascii() {
        return Err(TraceParentError::InvalidHex("header"));
    }
    if header.len() < TRACEPARENT_LEN {
        return Err(TraceParentError::Length(header.len()));
    }

    let version = parse_hex_u8(&header[..2], "version")?;
    if version == 0xff {
        return Err(TraceParentError::UnsupportedVersion(version));
    }

    let fields: Vec<&str> = if version == SUPPORTED_VERSION {
        if header.len() != TRACEPARENT_LEN {
            return Err(TraceParentError::Length(header.len()));
        }
        header.split('-').collect()
    } else {
        // Future versions may append fields after the first 55 bytes.
        if header.len() > TRACEPARENT_LEN && header.as_bytes()[TRACEPARENT_LEN] != b'-' {
            return Err(TraceParentError::Length(header.len()));
        }
        header[..TRACEPARENT_LEN].split('-').collect()
    };

    if fields.len() != 4 {
        return Err(TraceParentError::FieldCount(fields.len()));
    }
    if fields[1].len() != 32 || fields[2].len() != 16 || fields[3].len() != 2 {
        return Err(TraceParentError::Length(header.len()));
    }

    let trace_id = if is_lower_hex(fields[1]) {
        u128::from_str_radix(fields[1], 16).map_err(|_| TraceParentError::InvalidHex("trace_id"))?
    } else {
        return Err(TraceParentError::InvalidHex("trace_id"));
    };
    let parent_id = if is_lower_hex(fields[2]) {
        u64::from_str_radix(fields[2], 16).map_err(|_| TraceParentError::InvalidHex("parent_id"))?
    } else {
        return Err(TraceParentError::InvalidHex("parent_id"));
    };
    let flags = parse_hex_u8(fields[3], "flags")?;

    if trace_id == 0 {
        return Err(TraceParentError::ZeroId("trace_id"));
    }
    if parent_id == 0 {
        return Err(TraceParentError::ZeroId("parent_id"));
    }

    Ok(TraceParent {
        version,
        trace_id: TraceId::from_u128(trace_id),
        parent_id: SpanId::from_u64(parent_id),
        flags: TraceFlags::new(flags),
    })
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn parse_hex_u8(s: &str, field: &'static str) -> Result<u8, TraceParentError> {
    if s.len() != 2 || !is_lower_hex(s) {
        return Err(TraceParentError::InvalidHex(field));
    }
    u8::from_str_radix(s, 16).map_err(|_| TraceParentError::InvalidHex(field))
}

/// Ordered vendor members of a `tracestate` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceState {
    members: Vec<(String, String)>,
}

impl TraceState {
    /// Parse a `tracestate` header, skipping malformed members.
    pub fn parse(header: &str) -> Self {
        if header.len() > MAX_TRACESTATE_LEN {
            return Self::default();
        }

        let mut members = Vec::new();
        for member in header.split(',') {
            let member = member.trim();
            if member.is_empty() {
                continue;
            }
            let Some((key, value)) = member.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() || value.contains('=') {
                continue;
            }
            if members.iter().any(|(k, _)| k == key) {
                continue;
            }
            members.push((key.to_string(), value.to_string()));
            if members.len() == MAX_TRACESTATE_MEMBERS {
                break;
            }
        }

        Self { members }
    }

    /// Value for a vendor key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Put `key=value` at the front, replacing any previous entry for `key`.
    pub fn with_entry(&self, key: &str, value: impl Into<String>) -> Self {
        let mut members = Vec::with_capacity(self.members.len() + 1);
        members.push((key.to_string(), value.into()));
        members.extend(
            self.members
                .iter()
                .filter(|(k, _)| k != key)
                .take(MAX_TRACESTATE_MEMBERS - 1)
                .cloned(),
        );
        Self { members }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }
}

impl fmt::Display for TraceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.members.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Header pair to attach to an outgoing call or dispatched job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHeaders {
    pub traceparent: String,
    pub tracestate: Option<String>,
}

impl TraceHeaders {
    /// Iterate `(name, value)` pairs ready for an HTTP client.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        std::iter::once((TRACEPARENT_HEADER, self.traceparent.as_str())).chain(
            self.tracestate
                .as_deref()
                .map(|state| (TRACESTATE_HEADER, state)),
        )
    }
}
