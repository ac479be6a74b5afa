//! Notification dispatch for escalation commands.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - Log and webhook notifier implementations
//! - Minijinja message templates per notification kind
//! - Dispatcher that routes notifications to configured channels

pub mod dispatcher;
pub mod log;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use log::LogNotifier;
pub use templating::{EscalationContext, MessageTemplate, MessageTemplates, TemplateContext, TemplateRenderer};
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
