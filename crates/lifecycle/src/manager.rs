//! The lifecycle manager: subscribes to the log and walks orders through
//! the phase graph.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};

use common::{
    AggregateId, AuditCategory, AuditOutcome, AuditRecord, AuditSink, OrganizationId, Severity,
};
use event_log::{
    Event, EventHandler, EventLog, EventType, HandlerError, Subscription, SubscriptionId,
};
use recovery::{OperationError, PolicyName, RetryExecutor};

use crate::collaborators::{ChannelMessage, MaterialPlan, MrpEngine, Notifier, RuleEngine};
use crate::error::{LifecycleError, Result};
use crate::phase::{Phase, PhaseAction, PhaseStatus, PhaseTransition, transition_from};
use crate::state::{LifecycleState, LifecycleStats, PhaseHistoryEntry};

/// Kind of phase notification sent to team channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEventKind {
    PhaseStarted,
    PhaseCompleted,
    PhaseBlocked,
}

/// External services the manager drives.
pub struct Collaborators {
    pub rules: Arc<dyn RuleEngine>,
    pub mrp: Arc<dyn MrpEngine>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditSink>,
    pub executor: Arc<RetryExecutor>,
}

/// Subscribes to the event log and maintains one [`LifecycleState`] per order.
///
/// ORDER_PLACED opens a lifecycle; every later event for the order merges its
/// facts and, when it matches the current phase's exit trigger, may advance
/// the phase. Failures never propagate into the log's fan-out: a failed entry
/// action becomes a blocker on the order instead.
///
/// Each order sits behind its own async mutex so a slow entry action (the MRP
/// call retries with backoff) serializes events for that order without
/// holding up the rest of the map.
pub struct LifecycleManager<L: EventLog> {
    log: L,
    states: RwLock<HashMap<AggregateId, Arc<Mutex<LifecycleState>>>>,
    rules: Arc<dyn RuleEngine>,
    mrp: Arc<dyn MrpEngine>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    executor: Arc<RetryExecutor>,
    subscription: StdMutex<Option<SubscriptionId>>,
}

impl<L: EventLog + Clone + 'static> LifecycleManager<L> {
    /// Creates a manager over `log` without subscribing it.
    pub fn new(log: L, collaborators: Collaborators) -> Self {
        Self {
            log,
            states: RwLock::new(HashMap::new()),
            rules: collaborators.rules,
            mrp: collaborators.mrp,
            notifier: collaborators.notifier,
            audit: collaborators.audit,
            executor: collaborators.executor,
            subscription: StdMutex::new(None),
        }
    }

    /// Creates a manager and subscribes it to every event type on `log`.
    pub async fn attach(log: L, collaborators: Collaborators) -> Arc<Self> {
        let manager = Arc::new(Self::new(log.clone(), collaborators));
        let handler: Arc<dyn EventHandler> = manager.clone();
        let id = log.subscribe(Subscription::All, handler).await;
        *manager.subscription.lock().unwrap() = Some(id);
        manager
    }

    /// Unsubscribes the manager from the log. Returns false if it was
    /// not attached.
    pub async fn detach(&self) -> bool {
        let id = self.subscription.lock().unwrap().take();
        match id {
            Some(id) => self.log.unsubscribe(Subscription::All, id).await,
            None => false,
        }
    }

    /// Returns the lifecycle of one order.
    pub async fn lifecycle_for(&self, aggregate_id: AggregateId) -> Option<LifecycleState> {
        let entry = self.states.read().await.get(&aggregate_id).cloned()?;
        let state = entry.lock().await;
        Some(state.clone())
    }

    /// Returns every lifecycle belonging to `organization_id`.
    pub async fn list_for_org(&self, organization_id: &OrganizationId) -> Vec<LifecycleState> {
        let entries: Vec<_> = self.states.read().await.values().cloned().collect();
        let mut lifecycles = Vec::new();
        for entry in entries {
            let state = entry.lock().await;
            if &state.organization_id == organization_id {
                lifecycles.push(state.clone());
            }
        }
        lifecycles
    }

    /// Returns lifecycle counts for `organization_id`.
    pub async fn stats(&self, organization_id: &OrganizationId) -> LifecycleStats {
        let entries: Vec<_> = self.states.read().await.values().cloned().collect();
        let mut stats = LifecycleStats::default();
        for entry in entries {
            let state = entry.lock().await;
            if &state.organization_id == organization_id {
                stats.absorb(&state);
            }
        }
        stats
    }

    /// Records a blocker against the order and fails its current phase.
    pub async fn add_blocker(
        &self,
        aggregate_id: AggregateId,
        blocker: impl Into<String> + Send,
    ) -> Result<()> {
        let entry = self.entry(aggregate_id).await?;
        let mut state = entry.lock().await;
        self.block(&mut state, blocker.into());
        Ok(())
    }

    /// Removes a blocker; the phase returns to in-progress once none remain.
    ///
    /// Resolution alone never advances the phase: the next matching trigger
    /// event does.
    pub async fn resolve_blocker(&self, aggregate_id: AggregateId, blocker: &str) -> Result<()> {
        let entry = self.entry(aggregate_id).await?;
        let mut state = entry.lock().await;
        state.blockers.retain(|b| b != blocker);
        if state.blockers.is_empty() && state.phase_status == PhaseStatus::Failed {
            state.phase_status = PhaseStatus::InProgress;
        }
        let phase = state.current_phase;
        let status = state.phase_status;
        self.record_history(&mut state, phase, status, format!("Blocker resolved: {blocker}"));
        Ok(())
    }

    async fn entry(&self, aggregate_id: AggregateId) -> Result<Arc<Mutex<LifecycleState>>> {
        self.states
            .read()
            .await
            .get(&aggregate_id)
            .cloned()
            .ok_or(LifecycleError::UnknownAggregate(aggregate_id))
    }

    /// Opens the lifecycle for a newly placed order.
    ///
    /// A repeated ORDER_PLACED for a known order only merges its facts; the
    /// phase machine is never re-opened.
    async fn start_lifecycle(&self, event: &Event) {
        let existing = self.states.read().await.get(&event.aggregate_id).cloned();
        if let Some(entry) = existing {
            let mut state = entry.lock().await;
            state.phase_data.merge_event(event);
            tracing::debug!("repeated order placement merged into open lifecycle");
            return;
        }

        let mut state = LifecycleState::open(
            event.aggregate_id,
            event.organization_id.clone(),
            &event.payload,
        );
        state.phase_data.merge_event(event);
        state
            .phase_data
            .records
            .insert("captureTime".to_string(), json!(Utc::now()));
        self.record_history(
            &mut state,
            Phase::OrderCreation,
            PhaseStatus::InProgress,
            "Order received and created.",
        );
        self.notify_phase(
            &state,
            Phase::OrderCreation,
            PhaseEventKind::PhaseStarted,
            event.payload.clone(),
        );
        self.notify_org(&state);

        self.states
            .write()
            .await
            .insert(event.aggregate_id, Arc::new(Mutex::new(state)));
        metrics::counter!("lifecycle_started_total").increment(1);
        tracing::info!("lifecycle opened");
    }

    /// Merges the event's facts and evaluates the current phase's exit edge.
    async fn observe(&self, event: &Event) {
        let entry = self.states.read().await.get(&event.aggregate_id).cloned();
        let Some(entry) = entry else {
            tracing::debug!("event for unknown lifecycle ignored");
            return;
        };
        let mut state = entry.lock().await;
        state.phase_data.merge_event(event);

        let Some(transition) = transition_from(state.current_phase) else {
            return;
        };
        if transition.trigger != event.event_type {
            return;
        }
        if !state.blockers.is_empty() {
            tracing::debug!(
                blockers = state.blockers.len(),
                "transition held by open blockers"
            );
            return;
        }
        if let Some(unmet) = transition
            .preconditions
            .iter()
            .find(|p| !p.holds(&state.phase_data))
        {
            tracing::debug!(
                precondition = unmet.as_str(),
                "transition precondition not met"
            );
            return;
        }

        for &action in transition.actions {
            if let Err(error) = self.run_action(action, &mut state).await {
                tracing::warn!(action = action.as_str(), %error, "entry action failed");
                self.block(
                    &mut state,
                    format!("Action '{}' failed: {}", action.as_str(), error),
                );
                return;
            }
        }
        self.advance(&mut state, transition);
    }

    /// Completes the current phase and starts `transition.to`.
    fn advance(&self, state: &mut LifecycleState, transition: &PhaseTransition) {
        let now = Utc::now();
        let completed = state.current_phase;

        state.phase_status = PhaseStatus::Completed;
        state.actual_completion = Some(now);
        self.record_history(state, completed, PhaseStatus::Completed, "Phase completed.");
        self.notify_phase(state, completed, PhaseEventKind::PhaseCompleted, json!({}));

        state.current_phase = transition.to;
        state.phase_status = PhaseStatus::InProgress;
        state.start_time = now;
        state.estimated_completion = now + transition.duration();
        state.actual_completion = None;
        state.assigned_team = transition
            .to
            .teams()
            .iter()
            .map(|t| t.to_string())
            .collect();
        self.record_history(
            state,
            transition.to,
            PhaseStatus::InProgress,
            "Phase transition triggered.",
        );
        self.notify_phase(state, transition.to, PhaseEventKind::PhaseStarted, json!({}));
        self.notify_org(state);

        metrics::counter!("lifecycle_transitions_total", "phase" => transition.to.as_str())
            .increment(1);
        tracing::info!(
            from = completed.as_str(),
            to = transition.to.as_str(),
            "phase advanced"
        );
    }

    /// Runs one entry action. Actions without a collaborator today are
    /// acknowledged and logged.
    async fn run_action(
        &self,
        action: PhaseAction,
        state: &mut LifecycleState,
    ) -> std::result::Result<(), OperationError> {
        match action {
            PhaseAction::ValidateOrder => self.validate("order", "customerRequirements", state).await,
            PhaseAction::CheckInventory => self.validate("inventory", "inventoryCheck", state).await,
            PhaseAction::CalculateMaterialRequirements => self.run_mrp(state).await,
            other => {
                tracing::debug!(action = other.as_str(), "action acknowledged");
                Ok(())
            }
        }
    }

    /// Validates one recorded payload with the rule engine.
    async fn validate(
        &self,
        data_type: &str,
        record: &str,
        state: &LifecycleState,
    ) -> std::result::Result<(), OperationError> {
        let payload = state
            .phase_data
            .records
            .get(record)
            .cloned()
            .unwrap_or(Value::Null);
        let verdict = self.rules.validate(data_type, &payload).await?;
        if !verdict.is_valid {
            return Err(OperationError::new(format!(
                "{data_type} validation failed: {}",
                verdict.errors.join("; ")
            )));
        }
        Ok(())
    }

    /// Plans material requirements through the retry executor.
    ///
    /// A fallback outcome is not a plan; it is kept in the phase records for
    /// later review and still counts as a completed calculation so the order
    /// keeps moving.
    async fn run_mrp(
        &self,
        state: &mut LifecycleState,
    ) -> std::result::Result<(), OperationError> {
        let aggregate_id = state.aggregate_id;
        let requirements = state
            .phase_data
            .records
            .get("customerRequirements")
            .cloned()
            .unwrap_or(Value::Null);
        let mrp = self.mrp.clone();

        let outcome = self
            .executor
            .execute(
                PolicyName::ErpConnection,
                json!({
                    "aggregateId": aggregate_id,
                    "action": PhaseAction::CalculateMaterialRequirements.as_str(),
                }),
                move |_attempt| {
                    let mrp = mrp.clone();
                    let requirements = requirements.clone();
                    async move {
                        let plan = mrp.plan(aggregate_id, &requirements).await?;
                        serde_json::to_value(&plan)
                            .map_err(|e| OperationError::new(e.to_string()))
                    }
                },
            )
            .await;

        if !outcome.success {
            return Err(OperationError::new(
                "material requirements calculation failed",
            ));
        }
        match serde_json::from_value::<MaterialPlan>(outcome.result.clone()) {
            Ok(plan) => state.phase_data.purchase_order = Some(plan),
            Err(_) => {
                state
                    .phase_data
                    .records
                    .insert("mrpFallback".to_string(), outcome.result);
            }
        }
        state.phase_data.mrp_calculation_complete = true;
        Ok(())
    }

    /// Records a blocker and fails the current phase.
    fn block(&self, state: &mut LifecycleState, blocker: String) {
        state.blockers.push(blocker.clone());
        state.phase_status = PhaseStatus::Failed;
        let phase = state.current_phase;
        self.record_history(
            state,
            phase,
            PhaseStatus::Failed,
            format!("Blocker added: {blocker}"),
        );
        self.notify_phase(
            state,
            phase,
            PhaseEventKind::PhaseBlocked,
            json!({"blocker": blocker}),
        );
        self.notify_org(state);
        metrics::counter!("lifecycle_blockers_total").increment(1);
    }

    /// Appends a phase-history entry and mirrors it into the audit trail.
    fn record_history(
        &self,
        state: &mut LifecycleState,
        phase: Phase,
        status: PhaseStatus,
        notes: impl Into<String>,
    ) {
        let notes = notes.into();
        state.phase_history.push(PhaseHistoryEntry {
            phase,
            status,
            timestamp: Utc::now(),
            notes: Some(notes.clone()),
        });
        let (severity, outcome) = if status == PhaseStatus::Failed {
            (Severity::Warning, AuditOutcome::Failure)
        } else {
            (Severity::Info, AuditOutcome::Success)
        };
        self.audit.record(AuditRecord::now(
            "phase_history",
            AuditCategory::System,
            severity,
            state.aggregate_id.to_string(),
            status.as_str(),
            outcome,
            json!({"phase": phase.as_str(), "notes": notes}),
        ));
    }

    /// Broadcasts a phase event to each of the phase's team channels.
    fn notify_phase(&self, state: &LifecycleState, phase: Phase, kind: PhaseEventKind, data: Value) {
        for team in phase.teams() {
            self.notifier.publish(ChannelMessage {
                channel: team.to_string(),
                event_name: "lifecycle_event".to_string(),
                payload: json!({
                    "aggregateId": state.aggregate_id,
                    "phase": phase,
                    "eventType": kind,
                    "data": data,
                }),
            });
        }
    }

    /// Broadcasts the order's position to its organization channel.
    fn notify_org(&self, state: &LifecycleState) {
        self.notifier.publish(ChannelMessage {
            channel: state.organization_id.as_str().to_string(),
            event_name: "lifecycle_update".to_string(),
            payload: json!({
                "aggregateId": state.aggregate_id,
                "currentPhase": state.current_phase,
                "phaseStatus": state.phase_status,
                "priority": state.priority,
            }),
        });
    }
}

#[async_trait]
impl<L: EventLog + Clone + 'static> EventHandler for LifecycleManager<L> {
    fn name(&self) -> &str {
        "lifecycle-manager"
    }

    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type, aggregate_id = %event.aggregate_id))]
    async fn handle(&self, event: &Event) -> std::result::Result<(), HandlerError> {
        if event.event_type.is_synthetic() {
            return Ok(());
        }
        if event.event_type == EventType::OrderPlaced {
            self.start_lifecycle(event).await;
        } else {
            self.observe(event).await;
        }
        Ok(())
    }
}
