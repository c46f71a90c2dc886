//! Session window and cutoff handling

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveTime, Utc};
use log::info;

use super::config::SessionConfig;
use super::gateway::OrderGateway;
use super::pool::SlotPool;

/// Source of the current time
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replays
///
/// Clones share the same instant, so a test can keep a handle while the
/// engine owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Level-triggered session cutoff
///
/// Every tick outside the window asks the pool to expire pending entries.
/// Slot expiry is idempotent, so repeated ticks past the cutoff are harmless.
#[derive(Debug, Clone)]
pub struct SessionScheduler {
    start: Option<NaiveTime>,
    cutoff: NaiveTime,
    last_open: Option<bool>,
}

impl SessionScheduler {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            start: config.start,
            cutoff: config.cutoff,
            last_open: None,
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let time = now.time();
        let started = self.start.map_or(true, |start| time >= start);
        started && time < self.cutoff
    }

    pub fn is_past_cutoff(&self, now: DateTime<Utc>) -> bool {
        now.time() >= self.cutoff
    }

    /// Expire pending entries when outside the window; returns cancels requested
    pub fn tick<G: OrderGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        pool: &mut SlotPool,
        now: DateTime<Utc>,
    ) -> usize {
        let open = self.is_open(now);
        if self.last_open != Some(open) {
            if open {
                info!("Session open at {}", now.format("%H:%M:%S"));
            } else {
                info!("Session closed at {} (cutoff {})", now.format("%H:%M:%S"), self.cutoff);
            }
            self.last_open = Some(open);
        }

        if open {
            0
        } else {
            pool.expire_all(gateway)
        }
    }
}
