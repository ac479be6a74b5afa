//! Side-effect commands emitted by the engine.
//!
//! The engine never sends anything itself; collaborators consume this
//! stream (see [`crate::dispatch`]).

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::stage::{Action, EscalationOutcome, NotificationKind, Stage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineCommand {
    /// A stage was evaluated. Emitted for every evaluation, including
    /// deferrals, so collaborators can record the decision.
    Notify {
        instance_id: Uuid,
        trigger_reason: String,
        stage: Stage,
        action: Action,
        notification_kind: Option<NotificationKind>,
        at: DateTime<Utc>,
    },
    /// The instance resolved. Emitted exactly once per instance.
    Resolved {
        instance_id: Uuid,
        outcome: EscalationOutcome,
        diagnostic: Option<String>,
        at: DateTime<Utc>,
    },
}

impl EngineCommand {
    pub fn instance_id(&self) -> Uuid {
        match self {
            EngineCommand::Notify { instance_id, .. } | EngineCommand::Resolved { instance_id, .. } => *instance_id,
        }
    }
}
