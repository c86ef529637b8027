//! Clock and timer boundary of the reorder timeout engine.
//!
//! The engine keeps at most one timer per access category. When a timer
//! expires the host calls `RxReorder::on_timer` for that category.

use std::{
    cmp::Reverse,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use keyed_priority_queue::KeyedPriorityQueue;
use spin::Mutex;

use crate::protocol::qos::AccessCategory;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(now_ms: u64) -> Self {
        ManualClock {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// One single-shot, re-armable timer per access category.
///
/// `arm` replaces any pending deadline of the category. `cancel` must not
/// return while the category's callback is running.
///
/// Both are called with the engine's device lock held, so neither may block
/// or sleep.
pub trait TimerService: Send + Sync {
    fn arm(&self, ac: AccessCategory, duration_ms: u64);
    fn cancel(&self, ac: AccessCategory);
}

/// Software timer queue polled by the host loop. Its queue lock spins.
pub struct SoftTimers {
    clock: Arc<dyn Clock>,
    deadlines: Mutex<KeyedPriorityQueue<AccessCategory, Reverse<u64>>>,
}

impl SoftTimers {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        SoftTimers {
            clock,
            deadlines: Mutex::new(KeyedPriorityQueue::new()),
        }
    }

    /// Absolute deadline of the category's timer, if armed.
    #[must_use]
    pub fn deadline(&self, ac: AccessCategory) -> Option<u64> {
        let deadlines = self.deadlines.lock();
        deadlines.get_priority(&ac).map(|deadline| deadline.0)
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        let deadlines = self.deadlines.lock();
        deadlines.peek().map(|(_, deadline)| deadline.0)
    }

    #[must_use]
    pub fn armed_len(&self) -> usize {
        self.deadlines.lock().len()
    }

    /// Disarms and returns every category whose deadline has passed, earliest
    /// first.
    pub fn expired(&self) -> Vec<AccessCategory> {
        let now = self.clock.now_ms();
        let mut deadlines = self.deadlines.lock();
        let mut fired = Vec::new();
        while let Some((_, deadline)) = deadlines.peek() {
            if now < deadline.0 {
                break;
            }
            if let Some((ac, _)) = deadlines.pop() {
                fired.push(ac);
            }
        }
        fired
    }
}

impl TimerService for SoftTimers {
    fn arm(&self, ac: AccessCategory, duration_ms: u64) {
        let deadline = self.clock.now_ms() + duration_ms;
        self.deadlines.lock().push(ac, Reverse(deadline));
    }

    fn cancel(&self, ac: AccessCategory) {
        self.deadlines.lock().remove(&ac);
    }
}
