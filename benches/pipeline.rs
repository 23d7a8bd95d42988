// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for the submit hot path.
//!
//! Run with: `cargo bench --bench pipeline`

use std::hint::black_box;
use std::sync::Arc;

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use serde_json::json;

use watchtower::collector::QueryOccurrence;
use watchtower::config::AgentConfig;
use watchtower::redact::{RedactionConfig, Redactor};
use watchtower::transport::{EncodedBatch, IngestClient};
use watchtower::{Agent, CorrelationContext, DeliveryError, EventKind, Payload};

struct NoopIngest;

#[async_trait]
impl IngestClient for NoopIngest {
    async fn send(&self, _batch: &EncodedBatch) -> Result<(), DeliveryError> {
        Ok(())
    }
}

fn payload() -> Payload {
    match json!({
        "order_id": 1042,
        "customer": { "email": "jo@example.com", "password": "hunter2" },
        "items": [{ "sku": "A-1", "qty": 2 }, { "sku": "B-7", "qty": 1 }],
        "note": "paid with 4242 4242 4242 4242",
    }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Benchmark submit through filters, sampling and redaction.
fn bench_submit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let guard = runtime.enter();

    let mut config = AgentConfig::default();
    config.transport.queue_capacity = 1 << 16;
    let agent = Agent::with_client(config, Arc::new(NoopIngest)).unwrap();
    let pipeline = agent.pipeline();
    pipeline.configure_filters(|filters| {
        filters.add_global(|event| !event.name().starts_with("health"));
        filters.on_query(|query| query.duration_ms() > 0.5);
    });

    let mut sampled_config = AgentConfig::default();
    sampled_config.sampling.default_rate = 0.0;
    let sampled = Agent::with_client(sampled_config, Arc::new(NoopIngest)).unwrap();
    let sampled_pipeline = sampled.pipeline();

    let mut ctx = CorrelationContext::new();
    ctx.add("tenant", "acme");

    let mut group = c.benchmark_group("submit");
    group.throughput(Throughput::Elements(1));

    group.bench_function("query", |b| {
        b.iter(|| {
            pipeline.submit(
                black_box(QueryOccurrence {
                    sql: "select * from orders where id = ?".to_string(),
                    bindings: vec![json!(1042)],
                    duration_ms: 3.2,
                    connection: None,
                }),
                &ctx,
            )
        });
    });

    group.bench_function("custom_with_redaction", |b| {
        b.iter(|| {
            pipeline.record_event(
                EventKind::Custom,
                "order.paid",
                black_box(payload()),
                None,
                &ctx,
            )
        });
    });

    group.bench_function("sampled_out", |b| {
        b.iter(|| sampled_pipeline.record_metric("queue_depth", black_box(12.0), None, &ctx));
    });

    group.finish();
    drop(guard);

    runtime.block_on(async {
        agent.shutdown().await;
        sampled.shutdown().await;
    });
}

/// Benchmark a redaction pass on its own.
fn bench_redaction(c: &mut Criterion) {
    let redactor = Redactor::new(&RedactionConfig {
        emails: true,
        ..Default::default()
    })
    .unwrap();

    let mut group = c.benchmark_group("redaction");
    group.throughput(Throughput::Elements(1));

    group.bench_function("payload", |b| {
        b.iter(|| {
            let mut p = payload();
            redactor.redact_payload(black_box(&mut p))
        });
    });

    group.bench_function("clean_string", |b| {
        b.iter(|| redactor.redact_str(black_box("GET /api/v1/orders?page=2 200 in 14ms")).len());
    });

    group.finish();
}

criterion_group!(benches, bench_submit, bench_redaction);
criterion_main!(benches);
