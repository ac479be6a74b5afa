//! Business-hours-aware escalation scheduler.
//!
//! This crate provides:
//! - Business-hours window arithmetic (membership, next window, business durations)
//! - The escalation stage machine driven by the `notification-action` decision table
//! - Cancellable per-instance timers behind a `TimerService` trait
//! - A command stream bridged to notification dispatch and workflow resumption
//! - Environment-driven configuration

pub mod business_hours;
pub mod clock;
pub mod command;
pub mod config;
pub mod decision;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod instance;
pub mod stage;
pub mod timer;

pub use business_hours::{BusinessHours, BusinessTimezone};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::EngineCommand;
pub use config::EngineConfig;
pub use decision::{classify_application, StageDecision};
pub use dispatch::{CommandBridge, LogResumer, WorkflowResumer};
pub use engine::EscalationEngine;
pub use error::{EngineError, Result};
pub use instance::{InstanceSnapshot, WakeReason};
pub use stage::{Action, EscalationOutcome, NotificationKind, Stage};
pub use timer::{ManualTimer, TimerFired, TimerHandle, TimerRequest, TimerService, TokioTimer};
