//! escalation-worker: runs the escalation engine behind a JSON-lines
//! interface on stdin/stdout.
//!
//! Requests (one JSON object per line):
//! - `{"op":"classify","loan_application_count":2,"requirements_present":true}`
//!   classifies an intake and starts an escalation for non-`SUCCESS` classes
//! - `{"op":"start","trigger_reason":"MULTI_APPLICATION"}`
//! - `{"op":"respond","instance_id":"..."}`, the kill switch
//! - `{"op":"status","instance_id":"..."}`
//!
//! Notifications go to the log channel, plus a webhook when
//! `NOTIFY_WEBHOOK_URL` is set (optionally only for the kinds listed in
//! `NOTIFY_WEBHOOK_KINDS`). Resolutions are logged by the resumer.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::{info, warn};
use uuid::Uuid;

use escalator_engine::config::load_dotenv;
use escalator_engine::{
    classify_application, CommandBridge, EngineConfig, EscalationEngine, LogResumer, NotificationKind, SystemClock,
    TokioTimer,
};
use escalator_notify::{Dispatcher, LogNotifier, Notifier, TemplateRenderer, WebhookNotifier};
use escalator_rules::builtin::{self, APPLICATION_VALIDATION_ID, NOTIFICATION_ACTION_ID};
use escalator_rules::{DecisionTable, TableSet};

// ── CLI ─────────────────────────────────────────────────────────────

/// Business-hours-aware escalation worker.
#[derive(Parser, Debug)]
#[command(name = "escalation-worker", version, about)]
struct Cli {
    /// Directory of YAML decision tables overriding the built-in ones.
    #[arg(long, env = "TABLES_DIR")]
    tables_dir: Option<PathBuf>,

    /// Webhook endpoint for notifications (in addition to the log channel).
    #[arg(long, env = "NOTIFY_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Optional webhook body template (minijinja).
    #[arg(long, env = "NOTIFY_WEBHOOK_TEMPLATE")]
    webhook_template: Option<String>,

    /// Notification kinds routed to the webhook (default: all kinds).
    #[arg(long, env = "NOTIFY_WEBHOOK_KINDS", value_delimiter = ',')]
    webhook_kinds: Vec<String>,

    /// Config profile; keys are read as `{PROFILE}_{KEY}` first.
    #[arg(long, env = "ESCALATOR_PROFILE", default_value = "")]
    profile: String,
}

// ── Requests ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    Classify {
        loan_application_count: i64,
        requirements_present: bool,
        at: Option<DateTime<Utc>>,
    },
    Start {
        trigger_reason: String,
        at: Option<DateTime<Utc>>,
    },
    Respond {
        instance_id: Uuid,
        at: Option<DateTime<Utc>>,
    },
    Status {
        instance_id: Uuid,
    },
}

struct Worker {
    engine: Arc<EscalationEngine>,
    validation: Arc<DecisionTable>,
}

impl Worker {
    async fn handle(&self, request: Request) -> anyhow::Result<Value> {
        match request {
            Request::Classify {
                loan_application_count,
                requirements_present,
                at,
            } => {
                let classification =
                    classify_application(&self.validation, loan_application_count, requirements_present)?
                        .ok_or_else(|| anyhow::anyhow!("no classification rule matched"))?;
                if classification == "SUCCESS" {
                    return Ok(json!({ "classification": classification }));
                }
                let id = self.engine.start(classification.clone(), at.unwrap_or_else(Utc::now)).await?;
                Ok(json!({ "classification": classification, "instance_id": id }))
            }
            Request::Start { trigger_reason, at } => {
                let id = self.engine.start(trigger_reason, at.unwrap_or_else(Utc::now)).await?;
                Ok(json!({ "instance_id": id }))
            }
            Request::Respond { instance_id, at } => {
                let resolved = self
                    .engine
                    .on_external_response(instance_id, at.unwrap_or_else(Utc::now))
                    .await?;
                Ok(json!({ "instance_id": instance_id, "resolved": resolved }))
            }
            Request::Status { instance_id } => {
                let snapshot = self.engine.snapshot(instance_id).await?;
                Ok(serde_json::to_value(snapshot)?)
            }
        }
    }
}

fn load_tables(config: &EngineConfig) -> anyhow::Result<TableSet> {
    let mut tables = builtin::table_set()?;
    if let Some(dir) = &config.tables_dir {
        let results = tables.load_dir(dir)?;
        info!(dir = %dir.display(), files = results.len(), tables = ?tables.ids(), "override tables scanned");
    }
    Ok(tables)
}

fn build_dispatcher(cli: &Cli) -> anyhow::Result<Dispatcher> {
    let Some(url) = &cli.webhook_url else {
        return Ok(Dispatcher::with_defaults(vec![Box::new(LogNotifier::new())]));
    };

    let renderer = Arc::new(TemplateRenderer::new());
    let with_webhook = || -> anyhow::Result<Vec<Box<dyn Notifier>>> {
        let webhook = WebhookNotifier::from_config(
            url.clone(),
            None,
            None,
            cli.webhook_template.clone(),
            Arc::clone(&renderer),
        )?;
        let channels: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier::new()), Box::new(webhook)];
        Ok(channels)
    };

    if cli.webhook_kinds.is_empty() {
        info!("webhook notification channel enabled for all kinds");
        return Ok(Dispatcher::with_defaults(with_webhook()?));
    }

    let mut dispatcher = Dispatcher::with_defaults(vec![Box::new(LogNotifier::new())]);
    for kind in &cli.webhook_kinds {
        let kind: NotificationKind = kind.parse()?;
        dispatcher.set_kind_channels(kind.to_string(), with_webhook()?);
    }
    info!(kinds = ?cli.webhook_kinds, "webhook notification channel enabled");
    Ok(dispatcher)
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::for_profile(&cli.profile)?;
    if cli.tables_dir.is_some() {
        config.tables_dir = cli.tables_dir.clone();
    }
    config.log_summary();

    let tables = load_tables(&config)?;
    let notification_table = tables.require(NOTIFICATION_ACTION_ID)?;
    let validation = tables.require(APPLICATION_VALIDATION_ID)?;

    let clock = Arc::new(SystemClock);
    let (timer, fired_rx) = TokioTimer::new(clock.clone());
    let (engine, commands) = EscalationEngine::new(config, notification_table, clock, Arc::new(timer))?;
    let engine = Arc::new(engine);

    let shutdown = Arc::new(Notify::new());
    let timers = tokio::spawn(Arc::clone(&engine).run(fired_rx, shutdown.clone()));
    let bridge = CommandBridge::new(Arc::clone(&engine), build_dispatcher(&cli)?, Arc::new(LogResumer));
    let bridge = tokio::spawn(bridge.run(commands, shutdown.clone()));

    let worker = Worker { engine, validation };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!("escalation-worker ready, reading requests from stdin");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let response = match serde_json::from_str::<Request>(&line) {
                    Ok(request) => match worker.handle(request).await {
                        Ok(body) => json!({ "ok": true, "result": body }),
                        Err(e) => {
                            warn!(error = %e, "request failed");
                            json!({ "ok": false, "error": e.to_string() })
                        }
                    },
                    Err(e) => json!({ "ok": false, "error": format!("invalid request: {e}") }),
                };
                println!("{response}");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
        }
    }

    shutdown.notify_waiters();
    let _ = tokio::join!(timers, bridge);
    info!("escalation-worker exited cleanly");
    Ok(())
}
