//! Per-instance escalation state.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::stage::{EscalationOutcome, Stage};
use crate::timer::TimerHandle;

/// Why the armed timer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeReason {
    /// Stage wait elapsed; advance to the next stage.
    NextStage,
    /// Send deferred to the next business window; re-evaluate the same stage.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingWake {
    pub reason: WakeReason,
    pub at: DateTime<Utc>,
    pub seq: u64,
}

/// Mutable state of one escalation. Only the engine touches it, always
/// under the instance's own lock.
#[derive(Debug)]
pub(crate) struct EscalationInstance {
    pub id: Uuid,
    pub trigger_reason: String,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub first_sent_at: Option<DateTime<Utc>>,
    pub last_sent_at: Option<DateTime<Utc>>,
    /// Business time since the first send. Never decreases.
    pub elapsed_business: Duration,
    pub outcome: Option<EscalationOutcome>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub diagnostic: Option<String>,
    pub pending: Option<PendingWake>,
    /// At most one armed timer; replacing it cancels the old one.
    pub timer: Option<TimerHandle>,
    pub stage_history: Vec<Stage>,
}

impl EscalationInstance {
    pub fn new(trigger_reason: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger_reason,
            stage: Stage::Initial,
            created_at: now,
            first_sent_at: None,
            last_sent_at: None,
            elapsed_business: Duration::zero(),
            outcome: None,
            resolved_at: None,
            diagnostic: None,
            pending: None,
            timer: None,
            stage_history: vec![Stage::Initial],
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    /// Move forward to `stage`. Returns false (and changes nothing) for
    /// anything but a forward move.
    pub fn enter_stage(&mut self, stage: Stage) -> bool {
        if stage <= self.stage {
            return false;
        }
        self.stage = stage;
        self.stage_history.push(stage);
        true
    }

    /// Replace the armed timer. The previous one is cancelled first.
    pub fn replace_timer(&mut self, handle: Option<TimerHandle>, pending: Option<PendingWake>) {
        if let Some(old) = self.timer.take() {
            old.cancel();
        }
        self.timer = handle;
        self.pending = pending;
    }

    pub fn record_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_business = self.elapsed_business.max(elapsed);
    }

    /// First writer wins. Cancels any armed timer. Returns false when the
    /// instance was already resolved.
    pub fn resolve(&mut self, outcome: EscalationOutcome, diagnostic: Option<String>, at: DateTime<Utc>) -> bool {
        if self.is_resolved() {
            return false;
        }
        self.replace_timer(None, None);
        self.outcome = Some(outcome);
        self.diagnostic = diagnostic;
        self.resolved_at = Some(at);
        true
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            id: self.id,
            trigger_reason: self.trigger_reason.clone(),
            stage: self.stage,
            created_at: self.created_at,
            first_sent_at: self.first_sent_at,
            last_sent_at: self.last_sent_at,
            elapsed_business_minutes: self.elapsed_business.num_minutes(),
            resolved: self.is_resolved(),
            outcome: self.outcome,
            resolved_at: self.resolved_at,
            diagnostic: self.diagnostic.clone(),
            next_wake: self.pending.map(|p| p.at),
            wake_reason: self.pending.map(|p| p.reason),
            stage_history: self.stage_history.clone(),
        }
    }
}

/// Read-only copy of an instance's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSnapshot {
    pub id: Uuid,
    pub trigger_reason: String,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub first_sent_at: Option<DateTime<Utc>>,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub elapsed_business_minutes: i64,
    pub resolved: bool,
    pub outcome: Option<EscalationOutcome>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub diagnostic: Option<String>,
    pub next_wake: Option<DateTime<Utc>>,
    pub wake_reason: Option<WakeReason>,
    pub stage_history: Vec<Stage>,
}
