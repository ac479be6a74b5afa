//! Minijinja template rendering for notification messages.
//!
//! Each notification kind (`INITIAL_ALERT`, `FOLLOW_UP_1`, ...) has a
//! subject and body template. Templates see the escalation that produced the
//! notification under `escalation` and the render time under `now`.
//!
//! Templates are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call.

use std::collections::HashMap;

use crate::traits::{Notification, NotifyError};

/// Context data available to notification templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateContext {
    pub escalation: EscalationContext,
    /// Current timestamp in ISO 8601 format.
    pub now: String,
}

/// Escalation state exposed to templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EscalationContext {
    pub instance_id: String,
    /// Classification that started the escalation (e.g. `MULTI_APPLICATION`).
    pub trigger_reason: String,
    /// Stage being notified (e.g. `FOLLOW_UP_1`).
    pub stage: String,
    /// Notification kind selected by the decision table.
    pub notification_kind: String,
    /// Action selected by the decision table (e.g. `SEND_NOW`).
    pub action: String,
}

/// Renders notification templates using minijinja.
#[derive(Debug)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    /// Create a new template renderer.
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Build a minijinja environment with the builtin filters plus
    /// `humanize`.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("humanize", humanize_filter);
        env
    }

    /// Render a template string with any serializable context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render<S: serde::Serialize>(&self, template_str: &str, ctx: &S) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Validate that a template string parses without errors.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template has syntax errors.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Message templates ───────────────────────────────────────────────

/// Subject and body template for one notification kind.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageTemplate {
    pub subject: String,
    pub body: String,
}

impl MessageTemplate {
    fn new(subject: &str, body: &str) -> Self {
        Self {
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }
}

/// Message templates keyed by notification kind, with a generic fallback.
#[derive(Debug, Clone)]
pub struct MessageTemplates {
    by_kind: HashMap<String, MessageTemplate>,
    fallback: MessageTemplate,
}

impl MessageTemplates {
    /// Built-in wording for the intake escalation kinds.
    pub fn defaults() -> Self {
        let by_kind = HashMap::from([
            (
                "INITIAL_ALERT".to_string(),
                MessageTemplate::new(
                    "Action needed: intake {{ escalation.instance_id }} ({{ escalation.trigger_reason | humanize }})",
                    "Your loan intake could not be processed ({{ escalation.trigger_reason | humanize }}). \
                     Please reply to this message with the corrected documents.",
                ),
            ),
            (
                "FOLLOW_UP_1".to_string(),
                MessageTemplate::new(
                    "Reminder: intake {{ escalation.instance_id }} is waiting for your reply",
                    "We are still waiting for your reply about {{ escalation.trigger_reason | humanize }}.",
                ),
            ),
            (
                "FOLLOW_UP_2".to_string(),
                MessageTemplate::new(
                    "Second reminder: intake {{ escalation.instance_id }}",
                    "This intake will be closed if we do not hear back. \
                     Reason: {{ escalation.trigger_reason | humanize }}.",
                ),
            ),
            (
                "CLOSING_MESSAGE".to_string(),
                MessageTemplate::new(
                    "Closed: intake {{ escalation.instance_id }}",
                    "No reply was received before the deadline, so this intake has been closed.",
                ),
            ),
        ]);

        Self {
            by_kind,
            fallback: MessageTemplate::new(
                "Intake {{ escalation.instance_id }}: {{ escalation.notification_kind | humanize }}",
                "Stage {{ escalation.stage | humanize }}, reason {{ escalation.trigger_reason | humanize }}.",
            ),
        }
    }

    /// Template for `kind`, or the fallback.
    pub fn get(&self, kind: &str) -> &MessageTemplate {
        self.by_kind.get(kind).unwrap_or(&self.fallback)
    }

    /// Render the notification for `ctx`.
    pub fn compose(&self, renderer: &TemplateRenderer, ctx: &TemplateContext) -> Result<Notification, NotifyError> {
        let esc = &ctx.escalation;
        let template = self.get(&esc.notification_kind);

        Ok(Notification {
            subject: renderer.render(&template.subject, ctx)?,
            body: renderer.render(&template.body, ctx)?,
            metadata: HashMap::from([
                ("instance_id".to_string(), esc.instance_id.clone()),
                ("trigger_reason".to_string(), esc.trigger_reason.clone()),
                ("stage".to_string(), esc.stage.clone()),
                ("notification_kind".to_string(), esc.notification_kind.clone()),
                ("action".to_string(), esc.action.clone()),
                ("sent_at".to_string(), ctx.now.clone()),
            ]),
        })
    }
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Custom filter: `MULTI_APPLICATION` -> `multi application`.
fn humanize_filter(value: String) -> String {
    value.replace('_', " ").to_lowercase()
}
