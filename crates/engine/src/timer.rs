//! Cancellable per-instance timers.
//!
//! Arming returns a [`TimerHandle`]; cancelling or dropping the handle
//! signals the timer's oneshot channel without waiting for the timer task.
//! Each timer carries the sequence number it was armed with so the engine
//! can discard firings that raced with a newer timer or a cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{EngineError, Result};

/// A wake-up the engine wants delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub instance_id: Uuid,
    pub seq: u64,
    pub wake_at: DateTime<Utc>,
}

/// Delivered when an armed timer elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub instance_id: Uuid,
    pub seq: u64,
}

/// Arms wake-ups. Implementations must not block.
pub trait TimerService: Send + Sync {
    /// Fails with [`EngineError::SchedulingUnavailable`] when the timer
    /// subsystem cannot accept the request.
    fn arm(&self, request: TimerRequest) -> Result<TimerHandle>;
}

// ── Handle ──────────────────────────────────────────────────────────

/// Owner side of an armed timer. Dropping it cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    seq: u64,
    wake_at: DateTime<Utc>,
    cancel: Option<oneshot::Sender<()>>,
}

impl TimerHandle {
    pub fn new(seq: u64, wake_at: DateTime<Utc>, cancel: oneshot::Sender<()>) -> Self {
        Self {
            seq,
            wake_at,
            cancel: Some(cancel),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn wake_at(&self) -> DateTime<Utc> {
        self.wake_at
    }

    pub fn cancel(mut self) {
        self.signal();
    }

    fn signal(&mut self) {
        if let Some(tx) = self.cancel.take() {
            // The timer may already have fired and dropped its receiver.
            let _ = tx.send(());
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.signal();
    }
}

// ── Tokio timer ─────────────────────────────────────────────────────

/// Timers backed by `tokio::time::sleep`, firing into an mpsc channel.
pub struct TokioTimer {
    fired_tx: mpsc::UnboundedSender<TimerFired>,
    clock: Arc<dyn Clock>,
}

impl TokioTimer {
    /// Returns the timer service and the receiver its firings arrive on.
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        (Self { fired_tx, clock }, fired_rx)
    }
}

impl TimerService for TokioTimer {
    fn arm(&self, request: TimerRequest) -> Result<TimerHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| EngineError::SchedulingUnavailable("no tokio runtime for timers".into()))?;
        if self.fired_tx.is_closed() {
            return Err(EngineError::SchedulingUnavailable("timer receiver closed".into()));
        }

        let delay = (request.wake_at - self.clock.now()?)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let fired_tx = self.fired_tx.clone();
        let fired = TimerFired {
            instance_id: request.instance_id,
            seq: request.seq,
        };

        runtime.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if fired_tx.send(fired).is_err() {
                        tracing::debug!(instance_id = %fired.instance_id, "timer fired after engine shutdown");
                    }
                }
                _ = cancel_rx => {
                    tracing::trace!(instance_id = %fired.instance_id, seq = fired.seq, "timer cancelled");
                }
            }
        });

        Ok(TimerHandle::new(request.seq, request.wake_at, cancel_tx))
    }
}

// ── Manual timer ────────────────────────────────────────────────────

struct ArmedTimer {
    request: TimerRequest,
    cancel_rx: oneshot::Receiver<()>,
    cancelled: bool,
}

/// Records armed timers without firing them, for deterministic replay.
/// The caller fires a timer by handing its [`TimerFired`] to the engine.
#[derive(Default)]
pub struct ManualTimer {
    armed: Mutex<Vec<ArmedTimer>>,
    unavailable: AtomicBool,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make [`TimerService::arm`] fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every request ever armed, in arming order.
    pub fn armed(&self) -> Vec<TimerRequest> {
        match self.armed.lock() {
            Ok(armed) => armed.iter().map(|t| t.request).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Requests whose handles are still live.
    pub fn pending(&self) -> Vec<TimerRequest> {
        let Ok(mut armed) = self.armed.lock() else {
            return Vec::new();
        };
        armed
            .iter_mut()
            .filter_map(|timer| {
                if !timer.cancelled && timer.cancel_rx.try_recv() != Err(oneshot::error::TryRecvError::Empty) {
                    timer.cancelled = true;
                }
                (!timer.cancelled).then_some(timer.request)
            })
            .collect()
    }

    /// The live timer for one instance, if any.
    pub fn pending_for(&self, instance_id: Uuid) -> Option<TimerRequest> {
        self.pending().into_iter().find(|r| r.instance_id == instance_id)
    }
}

impl TimerService for ManualTimer {
    fn arm(&self, request: TimerRequest) -> Result<TimerHandle> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::SchedulingUnavailable("timer service unavailable".into()));
        }
        let mut armed = self
            .armed
            .lock()
            .map_err(|_| EngineError::SchedulingUnavailable("manual timer lock poisoned".into()))?;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        armed.push(ArmedTimer {
            request,
            cancel_rx,
            cancelled: false,
        });
        Ok(TimerHandle::new(request.seq, request.wake_at, cancel_tx))
    }
}

impl From<TimerRequest> for TimerFired {
    fn from(request: TimerRequest) -> Self {
        Self {
            instance_id: request.instance_id,
            seq: request.seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use chrono::Duration;

    fn request(seq: u64, wake_at: DateTime<Utc>) -> TimerRequest {
        TimerRequest {
            instance_id: Uuid::new_v4(),
            seq,
            wake_at,
        }
    }

    #[test]
    fn manual_timer_tracks_cancellation() {
        let timer = ManualTimer::new();
        let now = Utc::now();

        let first = timer.arm(request(1, now)).unwrap();
        let second = timer.arm(request(2, now)).unwrap();
        assert_eq!(timer.pending().len(), 2);

        first.cancel();
        let pending = timer.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].seq, 2);

        drop(second);
        assert!(timer.pending().is_empty());
        assert_eq!(timer.armed().len(), 2);
    }

    #[test]
    fn manual_timer_can_refuse() {
        let timer = ManualTimer::new();
        timer.set_unavailable(true);
        assert!(matches!(
            timer.arm(request(1, Utc::now())),
            Err(EngineError::SchedulingUnavailable(_))
        ));
        assert!(timer.armed().is_empty());
    }

    #[test]
    fn tokio_timer_needs_a_runtime() {
        let (timer, _rx) = TokioTimer::new(Arc::new(SystemClock));
        assert!(matches!(
            timer.arm(request(1, Utc::now())),
            Err(EngineError::SchedulingUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_timer_fires_after_delay() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (timer, mut rx) = TokioTimer::new(clock.clone());
        let req = request(7, clock.now().unwrap() + Duration::minutes(5));

        let _handle = timer.arm(req).unwrap();
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, TimerFired::from(req));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_tokio_timer_never_fires() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (timer, mut rx) = TokioTimer::new(clock.clone());

        let handle = timer.arm(request(1, clock.now().unwrap() + Duration::minutes(5))).unwrap();
        handle.cancel();
        let kept = timer.arm(request(2, clock.now().unwrap() + Duration::minutes(10))).unwrap();

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.seq, 2);
        drop(kept);
    }
}
