//! The stream processor: derived state, reactions, and exception containment.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use common::AggregateId;
use event_log::{
    Event, EventHandler, EventId, EventLog, EventType, ExceptionRaisedData, HandlerError,
    StateChangedData, Subscription, SubscriptionId,
};

use crate::error::Result;
use crate::reactions::reaction_for;
use crate::state::{DerivedOrderState, state_tag};

/// Counters describing what the processor has done so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorStats {
    pub orders_tracked: usize,
    pub events_processed: u64,
    pub reactions_emitted: u64,
    pub exceptions_contained: u64,
    pub duplicates_ignored: u64,
}

/// Subscribes to the event log and drives the orchestration rules.
///
/// For every event delivered the processor:
/// 1. drops it if the event id was already processed
/// 2. folds it into the order's [`DerivedOrderState`]
/// 3. for domain events, appends the follow-on event from the decision
///    table and a STATE_CHANGED event, both stamped with causation metadata
///
/// A failure in step 3 is contained: an EXCEPTION_RAISED event is appended
/// for the order and the triggering append still succeeds. Synthetic events
/// are folded but never trigger step 3, so the chain cannot amplify itself.
pub struct StreamProcessor<L: EventLog> {
    log: L,
    states: RwLock<HashMap<AggregateId, DerivedOrderState>>,
    seen: RwLock<HashSet<EventId>>,
    subscription: StdMutex<Option<SubscriptionId>>,
    events_processed: AtomicU64,
    reactions_emitted: AtomicU64,
    exceptions_contained: AtomicU64,
    duplicates_ignored: AtomicU64,
}

impl<L: EventLog + Clone + 'static> StreamProcessor<L> {
    /// Creates a processor over `log` without subscribing it.
    pub fn new(log: L) -> Self {
        Self {
            log,
            states: RwLock::new(HashMap::new()),
            seen: RwLock::new(HashSet::new()),
            subscription: StdMutex::new(None),
            events_processed: AtomicU64::new(0),
            reactions_emitted: AtomicU64::new(0),
            exceptions_contained: AtomicU64::new(0),
            duplicates_ignored: AtomicU64::new(0),
        }
    }

    /// Creates a processor and subscribes it to every event type on `log`.
    pub async fn attach(log: L) -> Arc<Self> {
        let processor = Arc::new(Self::new(log.clone()));
        let handler: Arc<dyn EventHandler> = processor.clone();
        let id = log.subscribe(Subscription::All, handler).await;
        *processor.subscription.lock().unwrap() = Some(id);
        processor
    }

    /// Unsubscribes the processor from the log. Returns false if it was
    /// not attached.
    pub async fn detach(&self) -> bool {
        let id = self.subscription.lock().unwrap().take();
        match id {
            Some(id) => self.log.unsubscribe(Subscription::All, id).await,
            None => false,
        }
    }

    /// Returns the derived state of one order.
    pub async fn order_state(&self, aggregate_id: AggregateId) -> Option<DerivedOrderState> {
        self.states.read().await.get(&aggregate_id).cloned()
    }

    /// Returns the derived state of every tracked order.
    pub async fn order_states(&self) -> Vec<DerivedOrderState> {
        self.states.read().await.values().cloned().collect()
    }

    /// Returns the full event history of one order from the log.
    pub async fn order_history(&self, aggregate_id: AggregateId) -> Result<Vec<Event>> {
        Ok(self.log.events_for(aggregate_id).await?)
    }

    /// Drops all derived state and refolds the entire log.
    ///
    /// Replay is side-effect free: no reactions or synthetic events are
    /// emitted, the stored ones are simply folded back in. Returns the
    /// number of events replayed.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild(&self) -> Result<u64> {
        use futures_util::TryStreamExt;

        let events: Vec<Event> = self.log.stream_all().await?.try_collect().await?;

        let mut states = self.states.write().await;
        let mut seen = self.seen.write().await;
        states.clear();
        seen.clear();

        for event in &events {
            seen.insert(event.event_id);
            states
                .entry(event.aggregate_id)
                .or_insert_with(|| DerivedOrderState::new(event.aggregate_id))
                .apply(event);
        }

        let count = events.len() as u64;
        tracing::info!(events_replayed = count, "rebuild complete");
        Ok(count)
    }

    /// Returns processing counters.
    pub async fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            orders_tracked: self.states.read().await.len(),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            reactions_emitted: self.reactions_emitted.load(Ordering::Relaxed),
            exceptions_contained: self.exceptions_contained.load(Ordering::Relaxed),
            duplicates_ignored: self.duplicates_ignored.load(Ordering::Relaxed),
        }
    }

    /// Appends the decision-table follow-on and the STATE_CHANGED event
    /// for a domain event. Mirrors the processing order of the rules:
    /// reaction first, state change second, and a reaction failure skips
    /// the state change.
    async fn emit_follow_ons(
        &self,
        event: &Event,
        previous_state: String,
    ) -> event_log::Result<()> {
        if let Some(reaction) = reaction_for(event) {
            let follow_on = Event::builder()
                .event_type(reaction.event_type)
                .payload_raw(reaction.payload)
                .source_component("stream-processor")
                .caused_by(event)
                .build();
            self.log.append(follow_on).await?;
            self.reactions_emitted.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("processor_reactions_emitted").increment(1);
        }

        if let Some(tag) = state_tag(event.event_type) {
            let data = StateChangedData {
                previous_state,
                new_state: tag.to_string(),
                trigger: event.event_type,
            };
            let state_event = Event::builder()
                .event_type(EventType::StateChanged)
                .payload(&data)
                .map_err(event_log::EventLogError::from)?
                .source_component("stream-processor")
                .caused_by(event)
                .build();
            self.log.append(state_event).await?;
        }

        Ok(())
    }

    /// Converts a processing failure into an EXCEPTION_RAISED event for
    /// the order. Only a failure to append the exception itself is
    /// reported to the log's fan-out.
    async fn contain(
        &self,
        trigger: &Event,
        error: &event_log::EventLogError,
    ) -> std::result::Result<(), HandlerError> {
        self.exceptions_contained.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("processor_exceptions_contained").increment(1);
        tracing::warn!(
            event_type = %trigger.event_type,
            aggregate_id = %trigger.aggregate_id,
            error = %error,
            "event processing failed; raising exception event"
        );

        let data = ExceptionRaisedData {
            original_event_type: trigger.event_type,
            error: error.to_string(),
        };
        let exception = Event::builder()
            .event_type(EventType::ExceptionRaised)
            .payload(&data)
            .map_err(HandlerError::from)?
            .source_component("stream-processor")
            .caused_by(trigger)
            .build();
        self.log
            .append(exception)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))
    }
}

#[async_trait]
impl<L: EventLog + Clone + 'static> EventHandler for StreamProcessor<L> {
    fn name(&self) -> &str {
        "stream-processor"
    }

    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type, aggregate_id = %event.aggregate_id))]
    async fn handle(&self, event: &Event) -> std::result::Result<(), HandlerError> {
        let started = std::time::Instant::now();

        {
            let mut seen = self.seen.write().await;
            if !seen.insert(event.event_id) {
                self.duplicates_ignored.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("processor_duplicates_ignored").increment(1);
                tracing::debug!("duplicate event ignored");
                return Ok(());
            }
        }

        let previous_state = {
            let mut states = self.states.write().await;
            let state = states
                .entry(event.aggregate_id)
                .or_insert_with(|| DerivedOrderState::new(event.aggregate_id));
            let previous = state.current_state.clone();
            state.apply(event);
            previous
        };

        self.events_processed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("processor_events_processed", "event_type" => event.event_type.as_str())
            .increment(1);

        if !event.event_type.is_synthetic()
            && let Err(e) = self.emit_follow_ons(event, previous_state).await
        {
            self.contain(event, &e).await?;
        }

        metrics::histogram!("processor_event_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        Ok(())
    }
}
