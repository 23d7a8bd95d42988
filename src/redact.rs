// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Redaction of sensitive data before events leave the process.
//!
//! Two surfaces:
//!
//! - **Keys**: any mapping key matching the denylist (case-insensitive
//!   globs) has its whole value replaced by the mask, whatever its type.
//!   URL query parameters with a denylisted name are masked too.
//! - **Values**: strings are scanned for card numbers (Luhn-checked),
//!   common API-key shapes, optional emails and user patterns; matches are
//!   masked in place.
//!
//! Redaction is idempotent and never fails. Subtrees nested deeper than the
//! depth bound are masked as a whole.

use std::borrow::Cow;
use std::ops::RangeInclusive;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde_json::Value;

use crate::error::{ConfigError, RedactionError};
use crate::types::Payload;

/// Default mask token.
pub const DEFAULT_MASK: &str = "[REDACTED]";

/// Key patterns masked out of the box.
pub const DEFAULT_KEYS: &[&str] = &[
    "*password*",
    "*passwd*",
    "*secret*",
    "token",
    "*_token",
    "*-token",
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "*api_key*",
    "*apikey*",
    "*api-key*",
    "*credit_card*",
    "*card_number*",
    "cvv",
    "cvc",
    "ssn",
    "*private_key*",
];

/// Digit groups joined by single spaces or dashes. Card numbers are looked
/// for inside each run, aligned to group edges.
const DIGIT_RUN_PATTERN: &str = r"\b[0-9]+(?:[ -][0-9]+)*\b";

const CARD_DIGITS: RangeInclusive<usize> = 13..=19;

const API_KEY_PATTERN: &str = concat!(
    r"\b(?:sk|pk|rk)_(?:live|test)_[A-Za-z0-9]{16,}\b",
    r"|\bsk-[A-Za-z0-9_-]{20,}",
    r"|\bAKIA[0-9A-Z]{16}\b",
    r"|\bgh[pousr]_[A-Za-z0-9]{36,}\b",
    r"|\bxox[abprs]-[A-Za-z0-9-]{10,}",
    r"|\beyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}",
    r"|\b[Bb]earer\s+[A-Za-z0-9\-._~+/]{16,}=*",
);

const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";

const QUERY_PARAM_PATTERN: &str = r"([?&;])([^=&#;\s?]+)=([^&#;\s]*)";

/// Redactor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RedactionConfig {
    /// Key globs, matched case-insensitively.
    pub keys: Vec<String>,
    /// Extra value regexes.
    pub patterns: Vec<String>,
    pub mask: String,
    pub card_numbers: bool,
    pub api_keys: bool,
    pub emails: bool,
    pub max_depth: usize,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            keys: DEFAULT_KEYS.iter().map(|k| k.to_string()).collect(),
            patterns: Vec::new(),
            mask: DEFAULT_MASK.to_string(),
            card_numbers: true,
            api_keys: true,
            emails: false,
            max_depth: 32,
        }
    }
}

/// What a redaction pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedactionReport {
    pub masked_keys: usize,
    pub masked_values: usize,
    pub fallbacks: usize,
}

impl RedactionReport {
    /// Add another report's counts to this one.
    pub fn merge(&mut self, other: RedactionReport) {
        self.masked_keys += other.masked_keys;
        self.masked_values += other.masked_values;
        self.fallbacks += other.fallbacks;
    }
}

/// Compiled redaction rules.
#[derive(Debug, Clone)]
pub struct Redactor {
    keys: GlobSet,
    digit_runs: Option<Regex>,
    values: Vec<Regex>,
    query_param: Regex,
    mask: String,
    max_depth: usize,
}

impl Redactor {
    /// Compile a redactor; invalid globs or regexes are config errors.
    pub fn new(config: &RedactionConfig) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.keys {
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| ConfigError::invalid("redaction.keys", e.to_string()))?;
            builder.add(glob);
        }
        let keys = builder
            .build()
            .map_err(|e| ConfigError::invalid("redaction.keys", e.to_string()))?;

        let compile = |field: &str, pattern: &str| {
            Regex::new(pattern).map_err(|e| ConfigError::invalid(field, e.to_string()))
        };

        let digit_runs = if config.card_numbers {
            Some(compile("redaction.cardNumbers", DIGIT_RUN_PATTERN)?)
        } else {
            None
        };

        let mut values = Vec::new();
        if config.api_keys {
            values.push(compile("redaction.apiKeys", API_KEY_PATTERN)?);
        }
        if config.emails {
            values.push(compile("redaction.emails", EMAIL_PATTERN)?);
        }
        for pattern in &config.patterns {
            values.push(compile("redaction.patterns", pattern)?);
        }

        Ok(Self {
            keys,
            digit_runs,
            values,
            query_param: compile("redaction", QUERY_PARAM_PATTERN)?,
            mask: if config.mask.is_empty() {
                DEFAULT_MASK.to_string()
            } else {
                config.mask.clone()
            },
            max_depth: config.max_depth.max(1),
        })
    }

    pub fn mask(&self) -> &str {
        &self.mask
    }

    /// Whether a mapping key is on the denylist.
    pub fn is_sensitive_key(&self, key: &str) -> bool {
        self.keys.is_match(key)
    }

    /// Redact a payload in place.
    pub fn redact_payload(&self, payload: &mut Payload) -> RedactionReport {
        let mut report = RedactionReport::default();
        self.redact_map(payload, 1, &mut report);
        report
    }

    /// Redact a string, returning the masked copy.
    pub fn redact_str<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut report = RedactionReport::default();
        self.scan(input, &mut report)
    }

    fn redact_map(&self, map: &mut Payload, depth: usize, report: &mut RedactionReport) {
        for (key, value) in map.iter_mut() {
            if self.is_sensitive_key(key) {
                if value.as_str() != Some(self.mask.as_str()) {
                    report.masked_keys += 1;
                }
                *value = Value::String(self.mask.clone());
            } else {
                self.walk(value, depth + 1, report);
            }
        }
    }

    fn walk(&self, value: &mut Value, depth: usize, report: &mut RedactionReport) {
        if depth > self.max_depth && (value.is_object() || value.is_array()) {
            tracing::debug!(error = %RedactionError::DepthExceeded(self.max_depth), "Masking subtree");
            *value = Value::String(self.mask.clone());
            report.fallbacks += 1;
            return;
        }

        match value {
            Value::String(s) => {
                let masked = match self.scan(s, report) {
                    Cow::Owned(masked) => Some(masked),
                    Cow::Borrowed(_) => None,
                };
                if let Some(masked) = masked {
                    *s = masked;
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.walk(item, depth + 1, report);
                }
            }
            Value::Object(map) => self.redact_map(map, depth, report),
            _ => {}
        }
    }

    /// Scan a string, leaving existing masks untouched so a second pass
    /// cannot re-match them.
    fn scan<'a>(&self, input: &'a str, report: &mut RedactionReport) -> Cow<'a, str> {
        if input.is_empty() || input == self.mask {
            return Cow::Borrowed(input);
        }

        if !input.contains(self.mask.as_str()) {
            return self.scan_segment(input, report);
        }

        let mut changed = false;
        let segments: Vec<Cow<'_, str>> = input
            .split(self.mask.as_str())
            .map(|segment| {
                let out = self.scan_segment(segment, report);
                changed |= matches!(out, Cow::Owned(_));
                out
            })
            .collect();

        if changed {
            Cow::Owned(segments.join(self.mask.as_str()))
        } else {
            Cow::Borrowed(input)
        }
    }

    fn scan_segment<'a>(&self, input: &'a str, report: &mut RedactionReport) -> Cow<'a, str> {
        let mut ranges: Vec<(usize, usize)> = Vec::new();

        if input.contains('=') {
            for caps in self.query_param.captures_iter(input) {
                if let Some(value) = caps.get(3) {
                    if !value.as_str().is_empty() && self.is_sensitive_key(&caps[2]) {
                        ranges.push((value.start(), value.end()));
                    }
                }
            }
        }

        if let Some(digit_runs) = &self.digit_runs {
            for run in digit_runs.find_iter(input) {
                card_ranges(run.as_str(), run.start(), &mut ranges);
            }
        }

        for pattern in &self.values {
            ranges.extend(pattern.find_iter(input).map(|m| (m.start(), m.end())));
        }

        if ranges.is_empty() {
            return Cow::Borrowed(input);
        }

        // All matchers see the original text; overlapping hits collapse
        // into one mask.
        ranges.sort_unstable();
        let mut out = String::with_capacity(input.len());
        let mut cursor = 0;
        for (start, end) in ranges {
            if end <= cursor {
                continue;
            }
            if start >= cursor {
                out.push_str(&input[cursor..start]);
                out.push_str(&self.mask);
                report.masked_values += 1;
            }
            cursor = end;
        }
        out.push_str(&input[cursor..]);
        Cow::Owned(out)
    }
}

/// Find card numbers inside one run of digit groups.
///
/// A candidate begins on the first digit of a group and ends on the last
/// digit of a group, so a neighbouring `order 12` or trailing quantity
/// cannot hide a card. At each start the longest Luhn-valid candidate wins
/// and the search resumes after it.
fn card_ranges(run: &str, offset: usize, ranges: &mut Vec<(usize, usize)>) {
    // Byte offset and value of every digit; groups index into `digits`.
    let mut digits: Vec<(usize, u32)> = Vec::with_capacity(run.len());
    let mut groups: Vec<(usize, usize)> = Vec::new();
    let mut in_group = false;
    for (at, c) in run.char_indices() {
        let Some(d) = c.to_digit(10) else {
            in_group = false;
            continue;
        };
        let index = digits.len();
        digits.push((at, d));
        if in_group {
            if let Some(group) = groups.last_mut() {
                group.1 = index;
            }
        } else {
            groups.push((index, index));
            in_group = true;
        }
    }
    if digits.len() < *CARD_DIGITS.start() {
        return;
    }

    let values: Vec<u32> = digits.iter().map(|&(_, d)| d).collect();
    let mut first = 0;
    while first < groups.len() {
        let start = groups[first].0;
        let hit = (first..groups.len()).rev().find(|&last| {
            let end = groups[last].1;
            CARD_DIGITS.contains(&(end - start + 1)) && luhn_valid(&values[start..=end])
        });
        match hit {
            Some(last) => {
                let end = groups[last].1;
                ranges.push((offset + digits[start].0, offset + digits[end].0 + 1));
                first = last + 1;
            }
            None => first += 1,
        }
    }
}

/// Luhn checksum over the digits of a candidate card number.
fn luhn_valid(digits: &[u32]) -> bool {
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
