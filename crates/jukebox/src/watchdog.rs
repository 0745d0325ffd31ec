//! Inactivity tracking and the auto-shutdown watchdog.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::clock::SharedClock;

/// Timestamp of the last user activity, touched from any thread.
///
/// Concurrent touches race benignly: the last write wins.
#[derive(Clone)]
pub struct ActivityClock {
    clock: SharedClock,
    last_ms: Arc<AtomicU64>,
    touches: Arc<AtomicU64>,
}

impl ActivityClock {
    /// Starts out touched at the current time.
    pub fn new(clock: SharedClock) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            last_ms: Arc::new(AtomicU64::new(now)),
            touches: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn touch(&self) {
        self.last_ms.store(self.clock.now_ms(), Ordering::Release);
        self.touches.fetch_add(1, Ordering::AcqRel);
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_ms.load(Ordering::Acquire)
    }

    pub fn touch_count(&self) -> u64 {
        self.touches.load(Ordering::Acquire)
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

/// Fires once `timeout_ms` has passed without activity.
pub struct Watchdog {
    activity: ActivityClock,
    timeout_ms: u64,
    fired_at_touch: Option<u64>,
}

impl Watchdog {
    pub fn new(activity: ActivityClock, timeout_ms: u64) -> Self {
        Self {
            activity,
            timeout_ms,
            fired_at_touch: None,
        }
    }

    pub fn touch(&self) {
        self.activity.touch();
    }

    pub fn expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.activity.last_activity_ms()) >= self.timeout_ms
    }

    /// Milliseconds left before expiry (0 once expired).
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        remaining_ms(self.activity.last_activity_ms(), self.timeout_ms, now_ms)
    }

    /// True exactly once per idle period; re-armed by the next touch.
    pub fn check(&mut self, now_ms: u64) -> bool {
        let touches = self.activity.touch_count();
        if let Some(fired) = self.fired_at_touch {
            if fired == touches {
                return false;
            }
            self.fired_at_touch = None;
        }
        if self.expired(now_ms) {
            self.fired_at_touch = Some(touches);
            return true;
        }
        false
    }
}

pub(crate) fn remaining_ms(last_activity_ms: u64, timeout_ms: u64, now_ms: u64) -> u64 {
    last_activity_ms
        .saturating_add(timeout_ms)
        .saturating_sub(now_ms)
}
