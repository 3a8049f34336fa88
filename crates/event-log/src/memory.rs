use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use common::AggregateId;

use crate::error::{EventLogError, Result};
use crate::event::{Event, EventId, EventType};
use crate::log::{
    EventHandler, EventLog, EventStream, LogStats, Subscription, SubscriptionId, validate_event,
};
use crate::query::EventQuery;

/// Identity of the call frame currently running the dispatch loop.
///
/// Re-entrant appends made by handlers must not wait on the dispatch lock
/// their own outer frame holds; they are queued and delivered by that frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DispatchOwner {
    task: Option<tokio::task::Id>,
    thread: std::thread::ThreadId,
}

impl DispatchOwner {
    fn current() -> Self {
        Self {
            task: tokio::task::try_id(),
            thread: std::thread::current().id(),
        }
    }
}

#[derive(Default)]
struct Store {
    events: Vec<Event>,
    ids: HashSet<EventId>,
    counters: HashMap<EventType, u64>,
}

#[derive(Default)]
struct LogInner {
    store: RwLock<Store>,
    subscribers: RwLock<HashMap<Subscription, Vec<(SubscriptionId, Arc<dyn EventHandler>)>>>,
    pending: StdMutex<VecDeque<Event>>,
    dispatch: Mutex<()>,
    drainer: StdMutex<Option<DispatchOwner>>,
    next_subscription_id: AtomicU64,
    handler_failures: AtomicU64,
}

/// In-memory event log, the reference implementation of [`EventLog`].
///
/// Events live in a single append-ordered vector. Fan-out is synchronous:
/// the outermost `append` call drains a FIFO dispatch queue, so follow-on
/// events appended by handlers are delivered after the event that caused
/// them and every subscriber observes appends in order.
#[derive(Clone, Default)]
pub struct InMemoryEventLog {
    inner: Arc<LogInner>,
}

impl InMemoryEventLog {
    /// Creates a new empty in-memory event log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.inner.store.read().await.events.len()
    }

    /// Clears all events and counters. Subscribers stay registered.
    pub async fn clear(&self) {
        let mut store = self.inner.store.write().await;
        store.events.clear();
        store.ids.clear();
        store.counters.clear();
    }

    /// Removes events recorded before `cutoff` and returns how many were
    /// dropped. Retention policy lives in the janitor, not in the log
    /// contract; callers must keep the window longer than any active flow.
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut store = self.inner.store.write().await;
        let (kept, removed): (Vec<_>, Vec<_>) = store
            .events
            .drain(..)
            .partition(|event| event.timestamp >= cutoff);
        store.events = kept;
        for event in &removed {
            store.ids.remove(&event.event_id);
            if let Some(count) = store.counters.get_mut(&event.event_type) {
                *count = count.saturating_sub(1);
            }
        }
        removed.len()
    }

    fn is_reentrant(&self) -> bool {
        *self.inner.drainer.lock().unwrap() == Some(DispatchOwner::current())
    }

    /// Delivers queued events until the queue is empty. Runs under the
    /// dispatch lock; handler appends enqueue and are picked up here.
    async fn drain_pending(&self) {
        loop {
            let next = self.inner.pending.lock().unwrap().pop_front();
            let Some(event) = next else { break };
            self.deliver(&event).await;
        }
    }

    async fn deliver(&self, event: &Event) {
        let handlers: Vec<(SubscriptionId, Arc<dyn EventHandler>)> = {
            let subscribers = self.inner.subscribers.read().await;
            let mut list = Vec::new();
            if let Some(typed) = subscribers.get(&Subscription::Type(event.event_type)) {
                list.extend(typed.iter().cloned());
            }
            if let Some(wildcard) = subscribers.get(&Subscription::All) {
                list.extend(wildcard.iter().cloned());
            }
            list
        };

        for (subscription_id, handler) in handlers {
            if let Err(e) = handler.handle(event).await {
                self.inner.handler_failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("event_log_handler_failures_total").increment(1);
                tracing::warn!(
                    subscription_id = %subscription_id,
                    handler = handler.name(),
                    event_type = %event.event_type,
                    aggregate_id = %event.aggregate_id,
                    error = %e,
                    "event handler failed; containment applied"
                );
            }
        }
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, event: Event) -> Result<()> {
        validate_event(&event)?;

        {
            let mut store = self.inner.store.write().await;
            if let Some(causation_id) = event.metadata.causation_id
                && !store.ids.contains(&causation_id)
            {
                return Err(EventLogError::invalid(format!(
                    "causation id {causation_id} does not reference an appended event"
                )));
            }
            store.ids.insert(event.event_id);
            *store.counters.entry(event.event_type).or_insert(0) += 1;
            store.events.push(event.clone());
        }
        metrics::counter!("event_log_appended_total", "event_type" => event.event_type.as_str())
            .increment(1);

        self.inner.pending.lock().unwrap().push_back(event);
        if self.is_reentrant() {
            // The outer frame's drain loop delivers this event in order.
            return Ok(());
        }

        let _dispatch = self.inner.dispatch.lock().await;
        *self.inner.drainer.lock().unwrap() = Some(DispatchOwner::current());
        self.drain_pending().await;
        *self.inner.drainer.lock().unwrap() = None;
        Ok(())
    }

    async fn events_for(&self, aggregate_id: AggregateId) -> Result<Vec<Event>> {
        let store = self.inner.store.read().await;
        Ok(store
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }

    async fn events_of_type(&self, event_type: EventType) -> Result<Vec<Event>> {
        let store = self.inner.store.read().await;
        Ok(store
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect())
    }

    async fn events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let store = self.inner.store.read().await;
        Ok(store
            .events
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect())
    }

    async fn query(&self, query: EventQuery) -> Result<Vec<Event>> {
        let store = self.inner.store.read().await;
        let offset = query.offset.unwrap_or(0);
        let matching = store
            .events
            .iter()
            .filter(|e| query.matches(e))
            .skip(offset);

        let events = if let Some(limit) = query.limit {
            matching.take(limit).cloned().collect()
        } else {
            matching.cloned().collect()
        };
        Ok(events)
    }

    async fn stream_all(&self) -> Result<EventStream> {
        use futures_util::stream;

        let store = self.inner.store.read().await;
        let events = store.events.clone();
        let stream = stream::iter(events.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn subscribe(
        &self,
        subscription: Subscription,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId::new(
            self.inner
                .next_subscription_id
                .fetch_add(1, Ordering::Relaxed),
        );
        let mut subscribers = self.inner.subscribers.write().await;
        subscribers
            .entry(subscription)
            .or_default()
            .push((id, handler));
        id
    }

    async fn unsubscribe(&self, subscription: Subscription, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.write().await;
        let Some(handlers) = subscribers.get_mut(&subscription) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() < before
    }

    async fn stats(&self) -> LogStats {
        let store = self.inner.store.read().await;
        let subscribers = self.inner.subscribers.read().await;
        LogStats {
            total_events: store.events.len() as u64,
            events_by_type: store.counters.clone(),
            subscriber_count: subscribers.values().map(Vec::len).sum(),
            handler_failures: self.inner.handler_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::HandlerError;

    fn test_event(aggregate_id: AggregateId, event_type: EventType) -> Event {
        Event::builder()
            .event_type(event_type)
            .aggregate_id(aggregate_id)
            .payload_raw(serde_json::json!({"test": true}))
            .build()
    }

    /// Records the types it sees, in delivery order.
    #[derive(Default)]
    struct RecordingHandler {
        seen: StdMutex<Vec<EventType>>,
    }

    impl RecordingHandler {
        fn seen(&self) -> Vec<EventType> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        fn name(&self) -> &str {
            "recording"
        }

        async fn handle(&self, event: &Event) -> std::result::Result<(), HandlerError> {
            self.seen.lock().unwrap().push(event.event_type);
            Ok(())
        }
    }

    /// Always fails.
    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(&self, _event: &Event) -> std::result::Result<(), HandlerError> {
            Err(HandlerError::new("boom"))
        }
    }

    /// Appends a follow-on event for every ORDER_PLACED it sees.
    struct ChainingHandler {
        log: InMemoryEventLog,
    }

    #[async_trait]
    impl EventHandler for ChainingHandler {
        fn name(&self) -> &str {
            "chaining"
        }

        async fn handle(&self, event: &Event) -> std::result::Result<(), HandlerError> {
            if event.event_type == EventType::OrderPlaced {
                let follow_on = Event::builder()
                    .event_type(EventType::InventoryChecked)
                    .payload_raw(serde_json::json!({"hasSufficientStock": true}))
                    .caused_by(event)
                    .build();
                self.log
                    .append(follow_on)
                    .await
                    .map_err(|e| HandlerError::new(e.to_string()))?;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn append_and_read_back() {
        let log = InMemoryEventLog::new();
        let aggregate_id = AggregateId::new();

        log.append(test_event(aggregate_id, EventType::OrderPlaced))
            .await
            .unwrap();
        log.append(test_event(aggregate_id, EventType::InventoryChecked))
            .await
            .unwrap();

        let events = log.events_for(aggregate_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::OrderPlaced);
        assert_eq!(events[1].event_type, EventType::InventoryChecked);
    }

    #[tokio::test]
    async fn append_rejects_nil_event_id() {
        let log = InMemoryEventLog::new();
        let event = Event::builder()
            .event_id(EventId::from_uuid(uuid::Uuid::nil()))
            .event_type(EventType::OrderPlaced)
            .aggregate_id(AggregateId::new())
            .payload_raw(serde_json::json!({}))
            .build();

        let result = log.append(event).await;
        assert!(matches!(result, Err(EventLogError::InvalidEvent { .. })));
        assert_eq!(log.event_count().await, 0);
    }

    #[tokio::test]
    async fn append_rejects_forward_causation_reference() {
        let log = InMemoryEventLog::new();
        let aggregate_id = AggregateId::new();
        let event = Event::builder()
            .event_type(EventType::InventoryChecked)
            .aggregate_id(aggregate_id)
            .causation_id(EventId::new())
            .payload_raw(serde_json::json!({}))
            .build();

        let result = log.append(event).await;
        assert!(matches!(result, Err(EventLogError::InvalidEvent { .. })));
    }

    #[tokio::test]
    async fn append_accepts_causation_of_earlier_event() {
        let log = InMemoryEventLog::new();
        let trigger = test_event(AggregateId::new(), EventType::OrderPlaced);
        let follow_on = Event::builder()
            .event_type(EventType::InventoryChecked)
            .payload_raw(serde_json::json!({}))
            .caused_by(&trigger)
            .build();

        log.append(trigger).await.unwrap();
        log.append(follow_on).await.unwrap();
        assert_eq!(log.event_count().await, 2);
    }

    #[tokio::test]
    async fn events_of_type_filters() {
        let log = InMemoryEventLog::new();
        log.append(test_event(AggregateId::new(), EventType::OrderPlaced))
            .await
            .unwrap();
        log.append(test_event(AggregateId::new(), EventType::OrderShipped))
            .await
            .unwrap();
        log.append(test_event(AggregateId::new(), EventType::OrderPlaced))
            .await
            .unwrap();

        let placed = log.events_of_type(EventType::OrderPlaced).await.unwrap();
        assert_eq!(placed.len(), 2);
        let shipped = log.events_of_type(EventType::OrderShipped).await.unwrap();
        assert_eq!(shipped.len(), 1);
    }

    #[tokio::test]
    async fn events_in_range_is_inclusive() {
        let log = InMemoryEventLog::new();
        let event = test_event(AggregateId::new(), EventType::OrderPlaced);
        let at = event.timestamp;
        log.append(event).await.unwrap();

        let hits = log.events_in_range(at, at).await.unwrap();
        assert_eq!(hits.len(), 1);

        let later = at + chrono::Duration::seconds(1);
        let misses = log.events_in_range(later, later).await.unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn query_applies_offset_and_limit() {
        let log = InMemoryEventLog::new();
        let aggregate_id = AggregateId::new();
        for _ in 0..5 {
            log.append(test_event(aggregate_id, EventType::OrderPlaced))
                .await
                .unwrap();
        }

        let page = log
            .query(
                EventQuery::new()
                    .aggregate_id(aggregate_id)
                    .offset(1)
                    .limit(2),
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn exact_type_subscription_receives_only_that_type() {
        let log = InMemoryEventLog::new();
        let handler = Arc::new(RecordingHandler::default());
        log.subscribe(
            Subscription::Type(EventType::OrderPlaced),
            handler.clone(),
        )
        .await;

        log.append(test_event(AggregateId::new(), EventType::OrderPlaced))
            .await
            .unwrap();
        log.append(test_event(AggregateId::new(), EventType::OrderShipped))
            .await
            .unwrap();

        assert_eq!(handler.seen(), vec![EventType::OrderPlaced]);
    }

    #[tokio::test]
    async fn wildcard_subscription_receives_all_types() {
        let log = InMemoryEventLog::new();
        let handler = Arc::new(RecordingHandler::default());
        log.subscribe(Subscription::All, handler.clone()).await;

        log.append(test_event(AggregateId::new(), EventType::OrderPlaced))
            .await
            .unwrap();
        log.append(test_event(AggregateId::new(), EventType::QualityPassed))
            .await
            .unwrap();

        assert_eq!(
            handler.seen(),
            vec![EventType::OrderPlaced, EventType::QualityPassed]
        );
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let log = InMemoryEventLog::new();
        let handler = Arc::new(RecordingHandler::default());
        let id = log.subscribe(Subscription::All, handler.clone()).await;

        log.append(test_event(AggregateId::new(), EventType::OrderPlaced))
            .await
            .unwrap();
        assert!(log.unsubscribe(Subscription::All, id).await);
        log.append(test_event(AggregateId::new(), EventType::OrderShipped))
            .await
            .unwrap();

        assert_eq!(handler.seen(), vec![EventType::OrderPlaced]);
        assert!(!log.unsubscribe(Subscription::All, id).await);
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_others_or_the_caller() {
        let log = InMemoryEventLog::new();
        let recording = Arc::new(RecordingHandler::default());
        log.subscribe(Subscription::All, Arc::new(FailingHandler))
            .await;
        log.subscribe(Subscription::All, recording.clone()).await;

        let result = log
            .append(test_event(AggregateId::new(), EventType::OrderPlaced))
            .await;

        assert!(result.is_ok());
        assert_eq!(recording.seen(), vec![EventType::OrderPlaced]);
        assert_eq!(log.stats().await.handler_failures, 1);
    }

    #[tokio::test]
    async fn reentrant_append_from_handler_preserves_order() {
        let log = InMemoryEventLog::new();
        let recording = Arc::new(RecordingHandler::default());
        // The chaining handler runs first and appends INVENTORY_CHECKED
        // while ORDER_PLACED is still being fanned out.
        log.subscribe(
            Subscription::All,
            Arc::new(ChainingHandler { log: log.clone() }),
        )
        .await;
        log.subscribe(Subscription::All, recording.clone()).await;

        log.append(test_event(AggregateId::new(), EventType::OrderPlaced))
            .await
            .unwrap();

        // The recording subscriber observes the trigger before the follow-on.
        assert_eq!(
            recording.seen(),
            vec![EventType::OrderPlaced, EventType::InventoryChecked]
        );
        assert_eq!(log.event_count().await, 2);
    }

    #[tokio::test]
    async fn prune_removes_only_expired_events() {
        let log = InMemoryEventLog::new();
        let aggregate_id = AggregateId::new();
        let old = Event::builder()
            .event_type(EventType::OrderPlaced)
            .aggregate_id(aggregate_id)
            .timestamp(Utc::now() - chrono::Duration::days(60))
            .payload_raw(serde_json::json!({}))
            .build();
        log.append(old).await.unwrap();
        log.append(test_event(aggregate_id, EventType::InventoryChecked))
            .await
            .unwrap();

        let removed = log
            .prune_older_than(Utc::now() - chrono::Duration::days(30))
            .await;

        assert_eq!(removed, 1);
        let remaining = log.events_for(aggregate_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].event_type, EventType::InventoryChecked);
        assert_eq!(
            log.stats().await.events_by_type.get(&EventType::OrderPlaced),
            Some(&0)
        );
    }

    #[tokio::test]
    async fn stats_count_by_type_and_subscribers() {
        let log = InMemoryEventLog::new();
        log.subscribe(Subscription::All, Arc::new(RecordingHandler::default()))
            .await;
        log.append(test_event(AggregateId::new(), EventType::OrderPlaced))
            .await
            .unwrap();
        log.append(test_event(AggregateId::new(), EventType::OrderPlaced))
            .await
            .unwrap();

        let stats = log.stats().await;
        assert_eq!(stats.total_events, 2);
        assert_eq!(
            stats.events_by_type.get(&EventType::OrderPlaced),
            Some(&2)
        );
        assert_eq!(stats.subscriber_count, 1);
        assert_eq!(stats.handler_failures, 0);
    }

    #[tokio::test]
    async fn stream_all_yields_append_order() {
        use futures_util::StreamExt;

        let log = InMemoryEventLog::new();
        let aggregate_id = AggregateId::new();
        log.append(test_event(aggregate_id, EventType::OrderPlaced))
            .await
            .unwrap();
        log.append(test_event(aggregate_id, EventType::InventoryChecked))
            .await
            .unwrap();

        let stream = log.stream_all().await.unwrap();
        let events: Vec<_> = stream.map(|e| e.unwrap().event_type).collect().await;
        assert_eq!(
            events,
            vec![EventType::OrderPlaced, EventType::InventoryChecked]
        );
    }
}
