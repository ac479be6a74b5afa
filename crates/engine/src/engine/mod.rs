//! The escalation scheduler.
//!
//! Instances live in a registry keyed by id, each behind its own mutex.
//! Every transition (start, timer firing, external response) runs inside
//! that instance's critical section, so a late timer and a response can
//! never both resolve an instance.
//!
//! Transitions plan first and commit last: the decision is evaluated and
//! the next timer armed before any state changes, so a clock or timer
//! failure leaves the instance exactly as it was.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use escalator_rules::{DecisionTable, RuleError};

use crate::clock::Clock;
use crate::command::EngineCommand;
use crate::config::EngineConfig;
use crate::decision::{decide, stage_facts, StageDecision};
use crate::error::{EngineError, Result};
use crate::instance::{EscalationInstance, InstanceSnapshot, PendingWake, WakeReason};
use crate::stage::{Action, EscalationOutcome, Stage};
use crate::timer::{TimerFired, TimerRequest, TimerService};

/// Cap for the linear retry backoff on `SchedulingUnavailable`.
const MAX_RETRY_BACKOFF: StdDuration = StdDuration::from_secs(30);

/// How often the timer loop evicts resolved instances past retention.
const PURGE_INTERVAL: StdDuration = StdDuration::from_secs(60);

type InstanceCell = Arc<Mutex<EscalationInstance>>;

pub struct EscalationEngine {
    config: EngineConfig,
    table: Arc<DecisionTable>,
    clock: Arc<dyn Clock>,
    timer: Arc<dyn TimerService>,
    commands: mpsc::UnboundedSender<EngineCommand>,
    instances: RwLock<HashMap<Uuid, InstanceCell>>,
    next_seq: AtomicU64,
}

impl EscalationEngine {
    /// Create an engine evaluating stages against `table` (normally the
    /// built-in `notification-action` table). Returns the engine and the
    /// receiving end of its command stream.
    pub fn new(
        config: EngineConfig,
        table: Arc<DecisionTable>,
        clock: Arc<dyn Clock>,
        timer: Arc<dyn TimerService>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<EngineCommand>)> {
        config.validate()?;
        if let Err(e) = escalator_rules::validate(&table) {
            warn!(table_id = %table.id(), error = %e, "notification table is malformed; instances will close");
        }

        let (commands, rx) = mpsc::unbounded_channel();
        let engine = Self {
            config,
            table,
            clock,
            timer,
            commands,
            instances: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        };
        Ok((engine, rx))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Create an instance at `INITIAL` and evaluate it immediately.
    ///
    /// On [`EngineError::SchedulingUnavailable`] nothing is registered and
    /// the caller should retry.
    pub async fn start(&self, trigger_reason: impl Into<String>, now: DateTime<Utc>) -> Result<Uuid> {
        let instance = EscalationInstance::new(trigger_reason.into(), now);
        let id = instance.id;
        let cell: InstanceCell = Arc::new(Mutex::new(instance));

        // Registered while locked so an immediate timer firing waits for
        // the first transition to finish.
        let mut inst = cell.lock().await;
        self.instances.write().await.insert(id, Arc::clone(&cell));

        info!(instance_id = %id, trigger_reason = %inst.trigger_reason, "escalation started");
        if let Err(e) = self.transition(&mut inst, Stage::Initial, now) {
            drop(inst);
            self.instances.write().await.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// The armed wait elapsed. No-op for resolved instances; otherwise
    /// advances (or, after a deferral, re-evaluates) the stage.
    pub async fn on_timer_fire(&self, instance_id: Uuid) -> Result<()> {
        let cell = self.instance(instance_id).await?;
        let mut inst = cell.lock().await;
        self.fire(&mut inst, None)
    }

    /// Deliver a firing from the timer service. Firings whose sequence
    /// number is not the instance's current timer are stale and ignored.
    pub async fn handle_timer_fired(&self, fired: TimerFired) -> Result<()> {
        let cell = self.instance(fired.instance_id).await?;
        let mut inst = cell.lock().await;
        self.fire(&mut inst, Some(fired.seq))
    }

    /// The kill switch. Cancels the armed timer and resolves `RESUMED`.
    /// Returns false when the instance had already resolved.
    pub async fn on_external_response(&self, instance_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let cell = self.instance(instance_id).await?;
        let mut inst = cell.lock().await;

        if inst.is_resolved() {
            debug!(instance_id = %instance_id, "response for resolved instance ignored");
            return Ok(false);
        }

        self.account_elapsed(&mut inst, now);
        self.resolve(&mut inst, EscalationOutcome::Resumed, None, now);
        Ok(true)
    }

    /// Evaluate the instance's current stage at `now` without acting on it.
    /// `Ok(None)` means no rule matched.
    pub async fn evaluate_stage(&self, instance_id: Uuid, now: DateTime<Utc>) -> Result<Option<StageDecision>> {
        let cell = self.instance(instance_id).await?;
        let inst = cell.lock().await;
        Ok(self.decide_stage(&inst, inst.stage, now)?)
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub async fn snapshot(&self, instance_id: Uuid) -> Result<InstanceSnapshot> {
        let cell = self.instance(instance_id).await?;
        let inst = cell.lock().await;
        Ok(inst.snapshot())
    }

    pub async fn outcome(&self, instance_id: Uuid) -> Result<Option<EscalationOutcome>> {
        let cell = self.instance(instance_id).await?;
        let inst = cell.lock().await;
        Ok(inst.outcome)
    }

    /// Number of unresolved instances.
    pub async fn active_count(&self) -> usize {
        let cells: Vec<InstanceCell> = self.instances.read().await.values().cloned().collect();
        let mut active = 0;
        for cell in cells {
            if !cell.lock().await.is_resolved() {
                active += 1;
            }
        }
        active
    }

    /// Evict a resolved instance and return its final state. Active
    /// instances are left in place (`Ok(None)`).
    pub async fn remove(&self, instance_id: Uuid) -> Result<Option<InstanceSnapshot>> {
        self.evict_if(instance_id, |_| true).await
    }

    /// Evict every instance resolved at or before `cutoff`. Returns how
    /// many were removed.
    pub async fn purge_resolved(&self, cutoff: DateTime<Utc>) -> usize {
        let ids: Vec<Uuid> = self.instances.read().await.keys().copied().collect();
        let mut removed = 0;
        for id in ids {
            let expired = |at: DateTime<Utc>| at <= cutoff;
            if let Ok(Some(_)) = self.evict_if(id, expired).await {
                removed += 1;
            }
        }
        removed
    }

    /// Evict instances resolved longer ago than the configured retention.
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now()?;
        let removed = self.purge_resolved(now - self.config.resolved_retention).await;
        if removed > 0 {
            let remaining = self.instances.read().await.len();
            info!(removed, remaining, "resolved instances purged");
        }
        Ok(removed)
    }

    async fn evict_if<F>(&self, instance_id: Uuid, expired: F) -> Result<Option<InstanceSnapshot>>
    where
        F: Fn(DateTime<Utc>) -> bool,
    {
        let cell = self.instance(instance_id).await?;
        let inst = cell.lock().await;
        match inst.resolved_at {
            Some(at) if expired(at) => {}
            _ => return Ok(None),
        }
        let snapshot = inst.snapshot();
        drop(inst);
        self.instances.write().await.remove(&instance_id);
        debug!(instance_id = %instance_id, "resolved instance evicted");
        Ok(Some(snapshot))
    }

    // ── Timer loop ──────────────────────────────────────────────────

    /// Deliver timer firings until the channel closes or `shutdown` is
    /// notified. Firings that hit `SchedulingUnavailable` are retried with
    /// linear backoff in their own task. Resolved instances past retention
    /// are purged on a fixed interval.
    pub async fn run(self: Arc<Self>, mut fired_rx: mpsc::UnboundedReceiver<TimerFired>, shutdown: Arc<Notify>) {
        let stop = shutdown.notified();
        tokio::pin!(stop);

        let mut purge = tokio::time::interval(PURGE_INTERVAL);
        purge.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut stop => {
                    info!("escalation timer loop stopping");
                    break;
                }
                _ = purge.tick() => {
                    if let Err(e) = self.purge_expired().await {
                        warn!(error = %e, "purge of resolved instances skipped");
                    }
                }
                fired = fired_rx.recv() => match fired {
                    Some(fired) => {
                        let engine = Arc::clone(&self);
                        tokio::spawn(async move { engine.deliver(fired).await });
                    }
                    None => {
                        debug!("timer channel closed");
                        break;
                    }
                },
            }
        }
    }

    async fn deliver(&self, fired: TimerFired) {
        let mut attempt: u32 = 0;
        loop {
            match self.handle_timer_fired(fired).await {
                Ok(()) => return,
                Err(EngineError::SchedulingUnavailable(reason)) => {
                    attempt += 1;
                    let backoff = StdDuration::from_secs(u64::from(attempt)).min(MAX_RETRY_BACKOFF);
                    warn!(
                        instance_id = %fired.instance_id,
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        reason = %reason,
                        "scheduling unavailable, retrying timer firing"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(EngineError::UnknownInstance(_)) => {
                    debug!(instance_id = %fired.instance_id, "timer fired for evicted instance");
                    return;
                }
                Err(e) => {
                    error!(instance_id = %fired.instance_id, error = %e, "timer firing failed");
                    return;
                }
            }
        }
    }

    // ── Transitions ─────────────────────────────────────────────────

    async fn instance(&self, instance_id: Uuid) -> Result<InstanceCell> {
        self.instances
            .read()
            .await
            .get(&instance_id)
            .cloned()
            .ok_or(EngineError::UnknownInstance(instance_id))
    }

    fn fire(&self, inst: &mut EscalationInstance, seq: Option<u64>) -> Result<()> {
        if inst.is_resolved() {
            debug!(instance_id = %inst.id, "timer fired after resolution, ignored");
            return Ok(());
        }
        if let Some(seq) = seq {
            if inst.pending.map(|p| p.seq) != Some(seq) {
                debug!(instance_id = %inst.id, seq, "stale timer firing ignored");
                return Ok(());
            }
        }

        let now = self.clock.now()?;

        let target = match inst.pending.map(|p| p.reason) {
            Some(WakeReason::Deferred) => inst.stage,
            Some(WakeReason::NextStage) | None => match inst.stage.next() {
                Some(next) => next,
                None => {
                    self.account_elapsed(inst, now);
                    self.close(inst, now, Some("deadline stage completed".into()));
                    return Ok(());
                }
            },
        };

        self.transition(inst, target, now)?;
        self.account_elapsed(inst, now);
        Ok(())
    }

    /// Evaluate `stage` and act on the decision. Only
    /// `SchedulingUnavailable` escapes; rule failures close the instance.
    fn transition(&self, inst: &mut EscalationInstance, stage: Stage, now: DateTime<Utc>) -> Result<()> {
        let decision = match self.decide_stage(inst, stage, now) {
            Ok(Some(decision)) => decision,
            Ok(None) => {
                inst.enter_stage(stage);
                self.close(inst, now, Some(format!("no rule matched stage {stage}")));
                return Ok(());
            }
            Err(e) => {
                inst.enter_stage(stage);
                self.close(inst, now, Some(e.to_string()));
                return Ok(());
            }
        };

        match decision.action {
            Action::CloseWorkflow => {
                inst.enter_stage(stage);
                self.emit_notify(inst, &decision, now);
                self.close(inst, now, None);
            }
            Action::ScheduleNextWindow => {
                let wake_at = self.config.business_hours.next_window_start(now);
                self.arm(inst, WakeReason::Deferred, wake_at)?;
                inst.enter_stage(stage);
                info!(instance_id = %inst.id, stage = %stage, wake_at = %wake_at, "send deferred to next business window");
                self.emit_notify(inst, &decision, now);
            }
            Action::SendNow => {
                let first_sent = inst.first_sent_at.unwrap_or(now);
                match self.next_stage_wake(stage, first_sent, now) {
                    Some(wake_at) => {
                        self.arm(inst, WakeReason::NextStage, wake_at)?;
                        inst.enter_stage(stage);
                        inst.first_sent_at = Some(first_sent);
                        inst.last_sent_at = Some(now);
                        debug!(instance_id = %inst.id, stage = %stage, wake_at = %wake_at, "next stage armed");
                        self.emit_notify(inst, &decision, now);
                    }
                    None => {
                        inst.enter_stage(stage);
                        inst.last_sent_at = Some(now);
                        self.emit_notify(inst, &decision, now);
                        self.close(inst, now, Some(format!("no stage after {stage}")));
                    }
                }
            }
        }
        Ok(())
    }

    /// Table decision for `stage` at `now`. A send requested outside
    /// business hours is turned into a deferral.
    fn decide_stage(
        &self,
        inst: &EscalationInstance,
        stage: Stage,
        now: DateTime<Utc>,
    ) -> std::result::Result<Option<StageDecision>, RuleError> {
        let business = self.config.business_hours.is_business_hours(now);
        let facts = stage_facts(&inst.trigger_reason, stage, business);
        let decision = decide(&self.table, &facts)?.map(|mut d| {
            if d.action == Action::SendNow && !business {
                d.action = Action::ScheduleNextWindow;
            }
            d
        });

        if let Some(d) = &decision {
            debug!(
                instance_id = %inst.id,
                table_id = %self.table.id(),
                stage = %stage,
                business_hours = business,
                action = %d.action,
                rule = ?d.rule,
                "stage evaluated"
            );
        }
        Ok(decision)
    }

    /// When the stage after `stage` should start. Follow-ups wait their
    /// configured business time from this send; the deadline is measured
    /// from the first send.
    fn next_stage_wake(&self, stage: Stage, first_sent: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let hours = &self.config.business_hours;
        let next = stage.next()?;
        let wake_at = match self.config.wait_before(next) {
            Some(wait) => hours.add_business_time(now, wait),
            None => hours.add_business_time(first_sent, self.config.deadline),
        };
        Some(wake_at.max(now))
    }

    fn arm(&self, inst: &mut EscalationInstance, reason: WakeReason, wake_at: DateTime<Utc>) -> Result<()> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = self.timer.arm(TimerRequest {
            instance_id: inst.id,
            seq,
            wake_at,
        })?;
        inst.replace_timer(Some(handle), Some(PendingWake { reason, at: wake_at, seq }));
        Ok(())
    }

    fn account_elapsed(&self, inst: &mut EscalationInstance, now: DateTime<Utc>) {
        if let Some(first_sent) = inst.first_sent_at {
            let elapsed = self.config.business_hours.business_time_between(first_sent, now);
            inst.record_elapsed(elapsed);
        }
    }

    fn close(&self, inst: &mut EscalationInstance, now: DateTime<Utc>, diagnostic: Option<String>) {
        if let Some(reason) = &diagnostic {
            warn!(instance_id = %inst.id, stage = %inst.stage, diagnostic = %reason, "closing escalation");
        }
        self.resolve(inst, EscalationOutcome::Closed, diagnostic, now);
    }

    fn resolve(
        &self,
        inst: &mut EscalationInstance,
        outcome: EscalationOutcome,
        diagnostic: Option<String>,
        now: DateTime<Utc>,
    ) {
        if !inst.resolve(outcome, diagnostic.clone(), now) {
            return;
        }
        info!(instance_id = %inst.id, stage = %inst.stage, outcome = %outcome, "escalation resolved");
        self.emit(EngineCommand::Resolved {
            instance_id: inst.id,
            outcome,
            diagnostic,
            at: now,
        });
    }

    fn emit_notify(&self, inst: &EscalationInstance, decision: &StageDecision, now: DateTime<Utc>) {
        self.emit(EngineCommand::Notify {
            instance_id: inst.id,
            trigger_reason: inst.trigger_reason.clone(),
            stage: inst.stage,
            action: decision.action,
            notification_kind: decision.notification_kind,
            at: now,
        });
    }

    fn emit(&self, command: EngineCommand) {
        if self.commands.send(command).is_err() {
            debug!("command receiver dropped, command discarded");
        }
    }
}
