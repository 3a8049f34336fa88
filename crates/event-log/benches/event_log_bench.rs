use std::sync::Arc;

use async_trait::async_trait;
use criterion::{Criterion, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use common::AggregateId;
use event_log::{
    Event, EventHandler, EventLog, EventType, HandlerError, InMemoryEventLog, Subscription,
};

struct NoopHandler;

#[async_trait]
impl EventHandler for NoopHandler {
    fn name(&self) -> &str {
        "noop"
    }

    async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
        Ok(())
    }
}

fn order_placed(aggregate_id: AggregateId) -> Event {
    Event::builder()
        .event_type(EventType::OrderPlaced)
        .aggregate_id(aggregate_id)
        .payload_raw(serde_json::json!({
            "orderNumber": "ORD-2024-001",
            "customerName": "Acme Manufacturing",
            "totalAmount": 12500.0,
        }))
        .build()
}

fn bench_append(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("event_log/append_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let log = InMemoryEventLog::new();
                log.append(order_placed(AggregateId::new())).await.unwrap();
            })
        })
    });
}

fn bench_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("event_log/append_with_five_subscribers", |b| {
        b.iter(|| {
            rt.block_on(async {
                let log = InMemoryEventLog::new();
                for _ in 0..5 {
                    log.subscribe(Subscription::All, Arc::new(NoopHandler)).await;
                }
                log.append(order_placed(AggregateId::new())).await.unwrap();
            })
        })
    });
}

fn bench_read(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let log = InMemoryEventLog::new();
    let aggregate_id = AggregateId::new();
    rt.block_on(async {
        for _ in 0..100 {
            log.append(order_placed(aggregate_id)).await.unwrap();
        }
    });

    c.bench_function("event_log/events_for_aggregate_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let events = log.events_for(aggregate_id).await.unwrap();
                assert_eq!(events.len(), 100);
            })
        })
    });
}

criterion_group!(benches, bench_append, bench_fan_out, bench_read);
criterion_main!(benches);
