//! Escalation flows through the public API: classification, stage
//! progression, notification dispatch, and the kill switch.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use escalator_engine::{
    classify_application, CommandBridge, EngineCommand, EngineConfig, EscalationEngine, EscalationOutcome,
    ManualClock, ManualTimer, Stage, TimerService, TokioTimer, WorkflowResumer,
};
use escalator_notify::{Dispatcher, Notification, Notifier, NotifyError};
use escalator_rules::builtin;

/// 2026-10-19 is a Monday.
fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, hour, minute, 0).unwrap()
}

#[derive(Clone, Default)]
struct Outbox(Arc<Mutex<Vec<String>>>);

impl Outbox {
    fn kinds(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.0
            .lock()
            .unwrap()
            .push(notification.metadata["notification_kind"].clone());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "outbox"
    }
}

#[derive(Default)]
struct Resumptions(Mutex<Vec<(Uuid, EscalationOutcome)>>);

#[async_trait]
impl WorkflowResumer for Resumptions {
    async fn resume(
        &self,
        instance_id: Uuid,
        outcome: EscalationOutcome,
        _diagnostic: Option<&str>,
    ) -> escalator_engine::Result<()> {
        self.0.lock().unwrap().push((instance_id, outcome));
        Ok(())
    }

    fn name(&self) -> &str {
        "resumptions"
    }
}

fn engine_with(
    clock: Arc<ManualClock>,
    timer: Arc<dyn TimerService>,
) -> (Arc<EscalationEngine>, mpsc::UnboundedReceiver<EngineCommand>) {
    let table = builtin::table_set().unwrap().require(builtin::NOTIFICATION_ACTION_ID).unwrap();
    let (engine, commands) = EscalationEngine::new(EngineConfig::default(), table, clock, timer).unwrap();
    (Arc::new(engine), commands)
}

async fn pump(bridge: &CommandBridge, commands: &mut mpsc::UnboundedReceiver<EngineCommand>) {
    while let Ok(command) = commands.try_recv() {
        bridge.handle(&command).await.unwrap();
    }
}

#[tokio::test]
async fn classified_intake_escalates_until_answered() {
    let clock = Arc::new(ManualClock::new(utc(19, 10, 0)));
    let timer = Arc::new(ManualTimer::new());
    let (engine, mut commands) = engine_with(clock.clone(), timer.clone());
    let outbox = Outbox::default();
    let resumptions = Arc::new(Resumptions::default());
    let bridge = CommandBridge::new(
        Arc::clone(&engine),
        Dispatcher::with_defaults(vec![Box::new(outbox.clone())]),
        resumptions.clone(),
    );

    let validation = builtin::application_validation().unwrap();
    let trigger = classify_application(&validation, 2, true).unwrap().unwrap();
    assert_eq!(trigger, "MULTI_APPLICATION");

    let id = engine.start(trigger, utc(19, 10, 0)).await.unwrap();
    pump(&bridge, &mut commands).await;
    assert_eq!(outbox.kinds(), vec!["INITIAL_ALERT"]);

    // One business hour later the first follow-up goes out.
    let wake = timer.pending_for(id).unwrap();
    assert_eq!(wake.wake_at, utc(19, 11, 0));
    clock.set(wake.wake_at);
    engine.handle_timer_fired(wake.into()).await.unwrap();
    pump(&bridge, &mut commands).await;
    assert_eq!(outbox.kinds(), vec!["INITIAL_ALERT", "FOLLOW_UP_1"]);

    // The customer answers; nothing else is sent.
    assert!(engine.on_external_response(id, utc(19, 11, 20)).await.unwrap());
    assert!(!engine.on_external_response(id, utc(19, 11, 21)).await.unwrap());
    engine.on_timer_fire(id).await.unwrap();
    pump(&bridge, &mut commands).await;

    assert_eq!(outbox.kinds().len(), 2);
    assert_eq!(*resumptions.0.lock().unwrap(), vec![(id, EscalationOutcome::Resumed)]);
    assert!(timer.pending().is_empty());
}

#[tokio::test]
async fn unanswered_escalation_closes_at_the_deadline() {
    let friday_evening = utc(23, 20, 0);
    let clock = Arc::new(ManualClock::new(friday_evening));
    let timer = Arc::new(ManualTimer::new());
    let (engine, mut commands) = engine_with(clock.clone(), timer.clone());
    let outbox = Outbox::default();
    let resumptions = Arc::new(Resumptions::default());
    let bridge = CommandBridge::new(
        Arc::clone(&engine),
        Dispatcher::with_defaults(vec![Box::new(outbox.clone())]),
        resumptions.clone(),
    );

    let id = engine.start("INVALID_NO_APPLICATION", friday_evening).await.unwrap();
    let mut wakes = Vec::new();
    while let Some(wake) = timer.pending_for(id) {
        wakes.push(wake.wake_at);
        clock.set(wake.wake_at);
        engine.handle_timer_fired(wake.into()).await.unwrap();
    }
    pump(&bridge, &mut commands).await;

    assert_eq!(
        wakes,
        vec![
            // FOLLOW_UP_1: 21:00 Friday.
            utc(23, 21, 0),
            // FOLLOW_UP_2: 1h left on Friday, 2h on Monday.
            utc(26, 8, 0),
            // DEADLINE: 16 business hours after the 20:00 Friday send.
            utc(26, 20, 0),
        ]
    );
    assert_eq!(
        outbox.kinds(),
        vec!["INITIAL_ALERT", "FOLLOW_UP_1", "FOLLOW_UP_2", "CLOSING_MESSAGE"]
    );
    assert_eq!(*resumptions.0.lock().unwrap(), vec![(id, EscalationOutcome::Closed)]);

    let snapshot = engine.snapshot(id).await.unwrap();
    assert_eq!(snapshot.stage, Stage::Deadline);
    assert_eq!(snapshot.elapsed_business_minutes, 16 * 60);
}

#[tokio::test(start_paused = true)]
async fn tokio_timers_drive_the_engine() {
    let clock = Arc::new(ManualClock::new(utc(19, 10, 0)));
    let (timer, fired_rx) = TokioTimer::new(clock.clone());
    let (engine, commands) = engine_with(clock.clone(), Arc::new(timer));
    let outbox = Outbox::default();
    let bridge = CommandBridge::new(
        Arc::clone(&engine),
        Dispatcher::with_defaults(vec![Box::new(outbox.clone())]),
        Arc::new(Resumptions::default()),
    );

    let shutdown = Arc::new(Notify::new());
    let timers = tokio::spawn(Arc::clone(&engine).run(fired_rx, shutdown.clone()));
    let bridge = tokio::spawn(bridge.run(commands, shutdown.clone()));

    let id = engine.start("UNREADABLE_DOCUMENT", utc(19, 10, 0)).await.unwrap();
    // Past the one-hour wait; the paused runtime jumps straight there.
    tokio::time::sleep(std::time::Duration::from_secs(3_700)).await;
    assert_eq!(engine.snapshot(id).await.unwrap().stage, Stage::FollowUp1);

    engine.on_external_response(id, utc(19, 11, 5)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_secs(24 * 3_600)).await;

    shutdown.notify_waiters();
    timers.await.unwrap();
    bridge.await.unwrap();

    assert_eq!(outbox.kinds(), vec!["INITIAL_ALERT", "FOLLOW_UP_1"]);
    assert_eq!(engine.outcome(id).await.unwrap(), Some(EscalationOutcome::Resumed));
}
