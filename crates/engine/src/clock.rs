//! Time source for the engine.
//!
//! Timer firings read "now" through a [`Clock`] so tests and replays can
//! drive the engine with a [`ManualClock`].

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::error::{EngineError, Result};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Fails with [`EngineError::SchedulingUnavailable`] when no trustworthy
    /// time is available.
    fn now(&self) -> Result<DateTime<Utc>>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<DateTime<Utc>> {
        Ok(Utc::now())
    }
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    unavailable: bool,
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now,
                unavailable: false,
            }),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut state) = self.state.lock() {
            state.now = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.now = state.now + by;
        }
    }

    /// Make [`Clock::now`] fail until reset, simulating a time-source outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = unavailable;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<DateTime<Utc>> {
        let state = self
            .state
            .lock()
            .map_err(|_| EngineError::SchedulingUnavailable("manual clock lock poisoned".into()))?;
        if state.unavailable {
            return Err(EngineError::SchedulingUnavailable("clock unavailable".into()));
        }
        Ok(state.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_moves_on_request() {
        let start = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now().unwrap(), start);

        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now().unwrap(), start + Duration::minutes(90));

        clock.set(start);
        assert_eq!(clock.now().unwrap(), start);
    }

    #[test]
    fn unavailable_clock_reports_scheduling_error() {
        let clock = ManualClock::new(Utc::now());
        clock.set_unavailable(true);
        assert!(matches!(clock.now(), Err(EngineError::SchedulingUnavailable(_))));
        clock.set_unavailable(false);
        assert!(clock.now().is_ok());
    }
}
