//! Bridges engine commands to the notification dispatcher and the
//! parent-workflow resumer.
//!
//! A notification whose instance has already resolved `RESUMED` by the time
//! the bridge reaches it is dropped. A send that already started when the
//! response arrived runs to completion; its result is only logged.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use escalator_notify::{
    DispatchResult, Dispatcher, EscalationContext, MessageTemplates, TemplateContext, TemplateRenderer,
};

use crate::command::EngineCommand;
use crate::engine::EscalationEngine;
use crate::error::{EngineError, Result};
use crate::stage::{Action, EscalationOutcome};

/// Continues the parent workflow once an escalation resolves.
#[async_trait]
pub trait WorkflowResumer: Send + Sync {
    async fn resume(&self, instance_id: Uuid, outcome: EscalationOutcome, diagnostic: Option<&str>) -> Result<()>;

    fn name(&self) -> &str;
}

/// Resumer that only logs the resolution.
#[derive(Debug, Default)]
pub struct LogResumer;

#[async_trait]
impl WorkflowResumer for LogResumer {
    async fn resume(&self, instance_id: Uuid, outcome: EscalationOutcome, diagnostic: Option<&str>) -> Result<()> {
        info!(
            instance_id = %instance_id,
            outcome = %outcome,
            diagnostic = diagnostic.unwrap_or(""),
            "workflow resumed"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

pub struct CommandBridge {
    engine: Arc<EscalationEngine>,
    dispatcher: Dispatcher,
    templates: MessageTemplates,
    renderer: TemplateRenderer,
    resumer: Arc<dyn WorkflowResumer>,
}

impl CommandBridge {
    pub fn new(engine: Arc<EscalationEngine>, dispatcher: Dispatcher, resumer: Arc<dyn WorkflowResumer>) -> Self {
        Self {
            engine,
            dispatcher,
            templates: MessageTemplates::defaults(),
            renderer: TemplateRenderer::new(),
            resumer,
        }
    }

    /// Act on one command. Returns the per-channel delivery results (empty
    /// when nothing was sent).
    pub async fn handle(&self, command: &EngineCommand) -> Result<Vec<DispatchResult>> {
        match command {
            EngineCommand::Notify {
                instance_id,
                trigger_reason,
                stage,
                action,
                notification_kind,
                at,
            } => {
                if *action == Action::ScheduleNextWindow {
                    debug!(instance_id = %instance_id, stage = %stage, "send deferred, nothing to dispatch");
                    return Ok(Vec::new());
                }
                let Some(kind) = notification_kind else {
                    return Ok(Vec::new());
                };

                match self.engine.outcome(*instance_id).await {
                    Ok(Some(EscalationOutcome::Resumed)) => {
                        info!(instance_id = %instance_id, kind = %kind, "instance resumed, notification dropped");
                        return Ok(Vec::new());
                    }
                    Err(EngineError::UnknownInstance(_)) => {
                        debug!(instance_id = %instance_id, "instance evicted, notification dropped");
                        return Ok(Vec::new());
                    }
                    Ok(_) => {}
                    Err(e) => return Err(e),
                }

                let ctx = TemplateContext {
                    escalation: EscalationContext {
                        instance_id: instance_id.to_string(),
                        trigger_reason: trigger_reason.clone(),
                        stage: stage.to_string(),
                        notification_kind: kind.to_string(),
                        action: action.to_string(),
                    },
                    now: at.to_rfc3339(),
                };
                let notification = self
                    .templates
                    .compose(&self.renderer, &ctx)
                    .map_err(|e| EngineError::Collaborator {
                        name: "notify".into(),
                        reason: e.to_string(),
                    })?;

                let results = self.dispatcher.dispatch(kind.as_str(), &notification).await;
                let failed = results.iter().filter(|r| !r.success).count();
                if failed > 0 {
                    warn!(instance_id = %instance_id, kind = %kind, failed, "some channels failed");
                }
                Ok(results)
            }
            EngineCommand::Resolved {
                instance_id,
                outcome,
                diagnostic,
                ..
            } => {
                self.resumer
                    .resume(*instance_id, *outcome, diagnostic.as_deref())
                    .await
                    .map_err(|e| EngineError::Collaborator {
                        name: self.resumer.name().to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Vec::new())
            }
        }
    }

    /// Consume commands in order until the stream ends or `shutdown` is
    /// notified. Commands already queued at shutdown are still handled.
    /// Failures are logged and do not stop the bridge.
    pub async fn run(self, mut commands: mpsc::UnboundedReceiver<EngineCommand>, shutdown: Arc<Notify>) {
        let stop = shutdown.notified();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => {
                    while let Ok(command) = commands.try_recv() {
                        self.handle_logged(&command).await;
                    }
                    info!("command bridge stopping");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_logged(&command).await,
                    None => {
                        debug!("command stream closed");
                        break;
                    }
                },
            }
        }
    }

    async fn handle_logged(&self, command: &EngineCommand) {
        if let Err(e) = self.handle(command).await {
            warn!(instance_id = %command.instance_id(), error = %e, "command handling failed");
        }
    }
}
