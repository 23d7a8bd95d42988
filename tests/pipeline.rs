// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end tests: submit through the pipeline, observe what the
//! ingestion endpoint receives.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use common::{fast_config, fast_transport, settle, start, RecordingIngest};
use watchtower::collector::{ExceptionOccurrence, QueryOccurrence};
use watchtower::config::AgentConfig;
use watchtower::diagnostics::Diagnostics;
use watchtower::transport::{AgentMetadata, Transport, TransportConfig};
use watchtower::{
    CapacityError, CorrelationContext, EventKind, EventPipeline, Payload, SubmitOutcome,
};

fn zero_rate() -> AgentConfig {
    let mut config = fast_config();
    config.sampling.default_rate = 0.0;
    config
}

#[tokio::test]
async fn global_filter_veto_never_reaches_transport() {
    let ingest = RecordingIngest::new();
    let agent = start(fast_config(), &ingest);
    let pipeline = agent.pipeline();
    pipeline.configure_filters(|filters| {
        filters.add_global(|event| !event.name().starts_with("health"));
    });

    let ctx = CorrelationContext::new();
    let mut payload = Payload::new();
    payload.insert("path".to_string(), json!("/health"));
    assert_eq!(
        pipeline.record_event(EventKind::Custom, "health.check", payload, None, &ctx),
        SubmitOutcome::Filtered
    );
    assert!(pipeline
        .record_event(EventKind::Custom, "checkout", Payload::new(), None, &ctx)
        .is_enqueued());

    assert!(agent.shutdown().await);
    let events = ingest.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["name"], "checkout");
    assert_eq!(pipeline.diagnostics().filtered, 1);
}

#[tokio::test]
async fn secrets_cut_by_length_limit_are_still_masked() {
    let ingest = RecordingIngest::new();
    let mut config = fast_config();
    config.rules.max_string_length = 39;
    let agent = start(config, &ingest);
    let pipeline = agent.pipeline();
    let ctx = CorrelationContext::new();

    let mut payload = Payload::new();
    payload.insert(
        "note".to_string(),
        json!("customer paid with card 4111111111111111 ok"),
    );
    payload.insert(
        "log".to_string(),
        json!("rotated the key and then sk_live_abcdefghijklmnop1234"),
    );
    assert!(pipeline
        .record_event(EventKind::Custom, "payment", payload, None, &ctx)
        .is_enqueued());

    assert!(agent.shutdown().await);
    let body = ingest.bodies().concat();
    assert!(!body.contains("41111111"), "{}", body);
    assert!(!body.contains("sk_live"), "{}", body);

    let events = ingest.events();
    assert_eq!(events[0]["payload"]["note"], "customer paid with card [REDACTED] ok");
    assert_eq!(
        events[0]["payload"]["log"],
        "rotated the key and then [REDACTED]"
    );
}

#[tokio::test]
async fn exception_is_kept_at_zero_rate() {
    let ingest = RecordingIngest::new();
    let agent = start(zero_rate(), &ingest);
    let pipeline = agent.pipeline();
    let ctx = CorrelationContext::new();

    let err = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
    assert_eq!(
        pipeline.record_exception(&err, &ctx),
        SubmitOutcome::Enqueued { forced: true }
    );
    assert_eq!(
        pipeline.record_query("select 1", vec![], 2.0, None, &ctx),
        SubmitOutcome::SampledOut
    );

    assert!(agent.shutdown().await);
    let events = ingest.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["kind"], "exception");
    assert_eq!(events[0]["payload"]["message"], "connection reset");
}

#[tokio::test]
async fn slow_query_survives_filter_and_zero_rate() {
    let ingest = RecordingIngest::new();
    let agent = start(zero_rate(), &ingest);
    let pipeline = agent.pipeline();
    pipeline.configure_filters(|filters| {
        filters.on_query(|query| query.duration_ms() > 1000.0);
    });

    let ctx = CorrelationContext::new();
    let slow = pipeline.submit(
        QueryOccurrence {
            sql: "select * from orders".to_string(),
            bindings: vec![],
            duration_ms: 1500.0,
            connection: Some("primary".to_string()),
        },
        &ctx,
    );
    assert_eq!(slow, SubmitOutcome::Enqueued { forced: true });

    let fast = pipeline.record_query("select 1", vec![], 10.0, None, &ctx);
    assert_eq!(fast, SubmitOutcome::Filtered);

    assert!(agent.shutdown().await);
    let events = ingest.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["payload"]["duration_ms"], 1500.0);
    assert_eq!(events[0]["payload"]["slow"], true);
}

#[tokio::test]
async fn exception_password_never_leaves_process() {
    let ingest = RecordingIngest::new();
    let agent = start(fast_config(), &ingest);
    let pipeline = agent.pipeline();

    let mut data = Payload::new();
    data.insert("password".to_string(), json!("secret123"));
    let occurrence = ExceptionOccurrence {
        class: "LoginFailed".to_string(),
        message: "bad credentials".to_string(),
        file: Some("src/auth.rs".to_string()),
        line: Some(42),
        trace: vec![],
        handled: true,
        data,
    };
    assert!(pipeline
        .submit(occurrence, &CorrelationContext::new())
        .is_enqueued());

    assert!(agent.shutdown().await);
    let bodies = ingest.bodies();
    assert_eq!(bodies.len(), 1);
    assert!(!bodies[0].contains("secret123"));

    let events = ingest.events();
    assert_eq!(events[0]["payload"]["data"]["password"], "[REDACTED]");
}

#[tokio::test]
async fn nested_password_masked_at_every_depth() {
    let ingest = RecordingIngest::new();
    let agent = start(fast_config(), &ingest);
    let pipeline = agent.pipeline();
    let ctx = CorrelationContext::new();

    for depth in 1..=10 {
        let mut payload = Payload::new();
        payload.insert("password".to_string(), json!(format!("hunter{}", depth)));
        for level in 1..depth {
            let mut outer = Payload::new();
            outer.insert(format!("level{}", level), Value::Object(payload));
            payload = outer;
        }
        assert!(pipeline
            .record_event(EventKind::Custom, format!("depth{}", depth), payload, None, &ctx)
            .is_enqueued());
    }

    assert!(agent.shutdown().await);
    let bodies = ingest.bodies().join("\n");
    assert!(!bodies.contains("hunter"));
    assert_eq!(ingest.events().len(), 10);
}

#[tokio::test]
async fn events_carry_their_own_context() {
    let ingest = RecordingIngest::new();
    let agent = start(fast_config(), &ingest);
    let pipeline = agent.pipeline();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let pipeline = pipeline.clone();
            std::thread::spawn(move || {
                let mut ctx = CorrelationContext::new();
                ctx.add("worker", worker);
                for _ in 0..5 {
                    pipeline.record_metric("tick", worker as f64, None, &ctx);
                }
                ctx.trace_id().to_string()
            })
        })
        .collect();
    let traces: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(agent.shutdown().await);
    let events = ingest.events();
    assert_eq!(events.len(), 20);
    for event in events {
        let worker = event["context"]["attributes"]["worker"].as_u64().unwrap() as usize;
        assert_eq!(event["payload"]["value"], worker as f64);
        assert_eq!(event["context"]["trace_id"], traces[worker].as_str());
    }
}

#[tokio::test]
async fn outgoing_headers_continue_the_trace() {
    let ingest = RecordingIngest::new();
    let agent = start(fast_config(), &ingest);
    let pipeline = agent.pipeline();

    let inbound = CorrelationContext::new();
    let (child, headers) = inbound.outgoing();
    let downstream = CorrelationContext::from_headers(
        Some(headers.traceparent.as_str()),
        headers.tracestate.as_deref(),
    );
    assert_eq!(downstream.trace_id(), inbound.trace_id());
    assert_eq!(downstream.parent_span_id(), Some(child.span_id()));

    pipeline.record_http_call("GET", "https://api.example.com/items", Some(200), 35.0, &child);
    pipeline.record_breadcrumb("handled downstream", None, &downstream);

    assert!(agent.shutdown().await);
    let events = ingest.events();
    assert_eq!(events.len(), 2);
    let trace = inbound.trace_id().to_string();
    assert!(events.iter().all(|e| e["context"]["trace_id"] == trace.as_str()));
}

#[tokio::test]
async fn full_queue_drops_the_extra_event() {
    let capacity = 8;
    let config = AgentConfig {
        transport: TransportConfig {
            queue_capacity: capacity,
            ..fast_transport()
        },
        ..Default::default()
    };
    let diagnostics = Arc::new(Diagnostics::new());
    // Worker is never spawned, so nothing drains the queue.
    let (transport, _worker) = Transport::new(
        config.transport.clone(),
        RecordingIngest::new(),
        AgentMetadata::default(),
        diagnostics.clone(),
    );
    let pipeline = EventPipeline::new(&config, transport, diagnostics).unwrap();
    let ctx = CorrelationContext::new();

    for i in 0..capacity {
        assert!(pipeline.record_metric("m", i as f64, None, &ctx).is_enqueued());
    }
    assert_eq!(
        pipeline.record_metric("m", 99.0, None, &ctx),
        SubmitOutcome::Dropped(CapacityError::QueueFull)
    );

    let snapshot = pipeline.diagnostics();
    assert_eq!(snapshot.enqueued, capacity as u64);
    assert_eq!(snapshot.dropped_capacity, 1);
}

#[tokio::test]
async fn circuit_opens_then_recovers_after_cooldown() {
    let ingest = RecordingIngest::new();
    let mut config = fast_config();
    config.transport.max_batch_size = 1;
    config.transport.breaker_cooldown = Duration::from_millis(300);
    let agent = start(config, &ingest);
    let pipeline = agent.pipeline();
    let ctx = CorrelationContext::new();

    ingest.set_failing(true);
    for i in 0..5 {
        assert!(pipeline.record_metric("m", i as f64, None, &ctx).is_enqueued());
        settle().await;
    }
    assert_eq!(ingest.calls(), 5);
    assert_eq!(pipeline.diagnostics().circuit_opens, 1);

    // While open, events are dropped without touching the endpoint.
    assert_eq!(
        pipeline.record_metric("m", 5.0, None, &ctx),
        SubmitOutcome::Dropped(CapacityError::CircuitOpen)
    );
    assert_eq!(ingest.calls(), 5);

    ingest.set_failing(false);
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(pipeline.record_metric("m", 6.0, None, &ctx).is_enqueued());
    settle().await;

    assert!(pipeline.transport().breaker().allows());
    assert_eq!(ingest.events().len(), 1);
    assert!(agent.shutdown().await);

    let snapshot = pipeline.diagnostics();
    assert_eq!(snapshot.dropped_circuit, 1);
    assert_eq!(snapshot.batches_failed, 5);
    assert_eq!(snapshot.events_delivered, 1);
}
