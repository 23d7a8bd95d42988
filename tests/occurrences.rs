// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The newline-delimited occurrence format accepted by `watchtower replay`.

mod common;

use common::{fast_config, start, RecordingIngest};
use watchtower::{CorrelationContext, EventKind, Occurrence, SubmitOutcome};

const LINES: &str = r#"
{"occurrence": "request", "method": "POST", "url": "/login?password=hunter2", "status": 500, "duration_ms": 84.0}
{"occurrence": "job", "name": "SendInvoice", "queue": "mail", "status": "failed", "attempt": 3, "duration_ms": 1200.0}
{"occurrence": "http_client", "method": "GET", "url": "https://api.example.com", "duration_ms": 2500.0}
{"occurrence": "event", "kind": "custom", "name": "cart.abandoned", "payload": {"items": 3}}
{"occurrence": "query", "sql": "", "duration_ms": 1.0}
"#;

fn parse() -> Vec<Occurrence> {
    LINES
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn lines_parse_into_tagged_occurrences() {
    let kinds: Vec<EventKind> = parse().iter().map(Occurrence::kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Request,
            EventKind::Job,
            EventKind::HttpClient,
            EventKind::Custom,
            EventKind::Query,
        ]
    );
}

#[test]
fn unknown_tag_is_rejected() {
    let result: Result<Occurrence, _> =
        serde_json::from_str(r#"{"occurrence": "rocket", "name": "x"}"#);
    assert!(result.is_err());
}

#[tokio::test]
async fn replayed_lines_reach_the_endpoint() {
    let ingest = RecordingIngest::new();
    let agent = start(fast_config(), &ingest);
    let pipeline = agent.pipeline();
    let ctx = CorrelationContext::new();

    let outcomes: Vec<SubmitOutcome> = parse()
        .into_iter()
        .map(|occurrence| pipeline.submit(occurrence, &ctx))
        .collect();
    assert_eq!(outcomes.iter().filter(|o| o.is_enqueued()).count(), 4);
    assert!(matches!(outcomes[4], SubmitOutcome::Invalid(_)));

    assert!(agent.shutdown().await);
    let events = ingest.events();
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| e["context"]["trace_id"] == ctx.trace_id().to_string().as_str()));

    let request = &events[0];
    assert_eq!(request["severity"], "error");
    assert_eq!(
        request["payload"]["url"],
        "/login?password=[REDACTED]"
    );
}
