//! Escalation stages, actions, notification kinds, and outcomes.
//!
//! All four enums round-trip through the uppercase names used in decision
//! tables (`FOLLOW_UP_1`, `SEND_NOW`, ...).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

// ── Stage ───────────────────────────────────────────────────────────

/// Fixed escalation sequence. Ordering follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "INITIAL")]
    Initial,
    #[serde(rename = "FOLLOW_UP_1")]
    FollowUp1,
    #[serde(rename = "FOLLOW_UP_2")]
    FollowUp2,
    #[serde(rename = "DEADLINE")]
    Deadline,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Initial, Stage::FollowUp1, Stage::FollowUp2, Stage::Deadline];

    /// The stage after this one, or `None` at the deadline.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Initial => Some(Stage::FollowUp1),
            Stage::FollowUp1 => Some(Stage::FollowUp2),
            Stage::FollowUp2 => Some(Stage::Deadline),
            Stage::Deadline => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initial => "INITIAL",
            Stage::FollowUp1 => "FOLLOW_UP_1",
            Stage::FollowUp2 => "FOLLOW_UP_2",
            Stage::Deadline => "DEADLINE",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = EngineError;

    /// Case-insensitive, so config files may use `follow_up_1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EngineError::InvalidValue {
                kind: "stage",
                value: s.to_string(),
            })
    }
}

// ── Action ──────────────────────────────────────────────────────────

/// What the scheduler does with a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Notify now and arm the wait for the next stage.
    SendNow,
    /// Outside business hours: wake at the next window and re-evaluate.
    ScheduleNextWindow,
    /// Terminal: resolve the instance as closed.
    CloseWorkflow,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::SendNow => "SEND_NOW",
            Action::ScheduleNextWindow => "SCHEDULE_NEXT_WINDOW",
            Action::CloseWorkflow => "CLOSE_WORKFLOW",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Action::CloseWorkflow)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SEND_NOW" => Ok(Action::SendNow),
            "SCHEDULE_NEXT_WINDOW" => Ok(Action::ScheduleNextWindow),
            "CLOSE_WORKFLOW" => Ok(Action::CloseWorkflow),
            _ => Err(EngineError::InvalidValue {
                kind: "action",
                value: s.to_string(),
            }),
        }
    }
}

// ── Notification kind ───────────────────────────────────────────────

/// Which message the notification collaborator should send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "INITIAL_ALERT")]
    InitialAlert,
    #[serde(rename = "FOLLOW_UP_1")]
    FollowUp1,
    #[serde(rename = "FOLLOW_UP_2")]
    FollowUp2,
    #[serde(rename = "CLOSING_MESSAGE")]
    ClosingMessage,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::InitialAlert => "INITIAL_ALERT",
            NotificationKind::FollowUp1 => "FOLLOW_UP_1",
            NotificationKind::FollowUp2 => "FOLLOW_UP_2",
            NotificationKind::ClosingMessage => "CLOSING_MESSAGE",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIAL_ALERT" => Ok(NotificationKind::InitialAlert),
            "FOLLOW_UP_1" => Ok(NotificationKind::FollowUp1),
            "FOLLOW_UP_2" => Ok(NotificationKind::FollowUp2),
            "CLOSING_MESSAGE" => Ok(NotificationKind::ClosingMessage),
            _ => Err(EngineError::InvalidValue {
                kind: "notification kind",
                value: s.to_string(),
            }),
        }
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// How a resolved escalation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationOutcome {
    /// A human responded; the parent workflow continues.
    Resumed,
    /// Deadline reached, or the instance failed and was closed.
    Closed,
}

impl EscalationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            EscalationOutcome::Resumed => "RESUMED",
            EscalationOutcome::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for EscalationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
