use crate::{
    event::Violation,
    protocol::qos::{AccessCategory, Tid},
    timer::TimerService,
    utils::idx_list::{IdxList, NodeIdx},
};

use super::PeerId;

/// Registration of one (peer, tid) for a forced flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutElem {
    node: Option<NodeIdx>,
    expiry_ms: u64,
}

impl TimeoutElem {
    #[must_use]
    #[inline]
    pub fn is_active(&self) -> bool {
        self.node.is_some()
    }

    #[must_use]
    #[inline]
    pub fn expiry_ms(&self) -> u64 {
        self.expiry_ms
    }

    /// Forgets the link after [`AcTimeout::pop_expired`] took the node.
    pub fn clear(&mut self) {
        *self = TimeoutElem::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutKey {
    pub peer: PeerId,
    pub tid: Tid,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    key: TimeoutKey,
    expiry_ms: u64,
}

/// Expiry list and timer of one access category.
///
/// Every element of a category waits the same duration, so appending keeps
/// the list in expiry order and only the head needs a timer.
pub struct AcTimeout {
    ac: AccessCategory,
    duration_ms: u64,
    list: IdxList<Entry>,
    /// Absolute expiry the category timer is armed for.
    armed_for: Option<u64>,
}

impl AcTimeout {
    fn check_rep(&self) {
        let mut last = 0;
        for entry in self.list.iter() {
            assert!(last <= entry.expiry_ms);
            last = entry.expiry_ms;
        }
        assert_eq!(
            self.armed_for,
            self.list.front().map(|entry| entry.expiry_ms)
        );
    }

    #[must_use]
    pub fn new(ac: AccessCategory, duration_ms: u64) -> Self {
        assert!(duration_ms > 0);
        let this = AcTimeout {
            ac,
            duration_ms,
            list: IdxList::new(),
            armed_for: None,
        };
        this.check_rep();
        this
    }

    #[must_use]
    #[inline]
    pub fn ac(&self) -> AccessCategory {
        self.ac
    }

    #[must_use]
    #[inline]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    #[must_use]
    pub fn head_expiry_ms(&self) -> Option<u64> {
        self.list.front().map(|entry| entry.expiry_ms)
    }

    /// Expiries from head to tail.
    pub fn expiries(&self) -> impl Iterator<Item = u64> + '_ {
        self.list.iter().map(|entry| entry.expiry_ms)
    }

    /// Idle -> Holding. An already active element is left untouched.
    pub fn activate(
        &mut self,
        elem: &mut TimeoutElem,
        key: TimeoutKey,
        now: u64,
        timers: &dyn TimerService,
    ) -> Result<(), Violation> {
        if elem.is_active() {
            return Err(Violation::DoubleActivation {
                peer: key.peer,
                tid: key.tid,
            });
        }
        // an expiry earlier than the tail would break the order
        let expiry_ms = match self.list.back() {
            Some(tail) => u64::max(now + self.duration_ms, tail.expiry_ms),
            None => now + self.duration_ms,
        };
        elem.node = Some(self.list.push_back(Entry { key, expiry_ms }));
        elem.expiry_ms = expiry_ms;
        self.sync_timer(now, timers);
        self.check_rep();
        Ok(())
    }

    /// Holding -> Idle without a flush. No-op if `elem` is inactive.
    pub fn deactivate(&mut self, elem: &mut TimeoutElem, now: u64, timers: &dyn TimerService) {
        if let Some(node) = elem.node.take() {
            self.list.remove(node);
            self.sync_timer(now, timers);
        }
        self.check_rep();
    }

    /// The category timer went off and is no longer armed.
    pub fn timer_fired(&mut self) {
        self.armed_for = None;
    }

    /// Unlinks the head if it has expired by `now`. The caller owns clearing
    /// the element of the returned key.
    pub fn pop_expired(&mut self, now: u64) -> Option<TimeoutKey> {
        let head = self.list.front()?;
        if now < head.expiry_ms {
            return None;
        }
        self.list.pop_front().map(|entry| entry.key)
    }

    /// Points the category timer at the head, or disarms it when empty.
    pub fn sync_timer(&mut self, now: u64, timers: &dyn TimerService) {
        let head = self.head_expiry_ms();
        if head == self.armed_for {
            return;
        }
        match head {
            Some(expiry_ms) => {
                let remaining = expiry_ms.saturating_sub(now);
                log::debug!(target: "txrx::rx", "{:?} timer armed for {} ms", self.ac, remaining);
                timers.arm(self.ac, remaining);
            }
            None => timers.cancel(self.ac),
        }
        self.armed_for = head;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        layer::rx::PeerId,
        protocol::qos::{AccessCategory, Tid},
        timer::{Clock, ManualClock, SoftTimers},
    };

    use super::*;

    const AC: AccessCategory = AccessCategory::BestEffort;

    fn key(peer: u32) -> TimeoutKey {
        TimeoutKey {
            peer: PeerId::from_raw(peer, 0),
            tid: Tid::new(0).unwrap(),
        }
    }

    fn setup() -> (Arc<ManualClock>, SoftTimers, AcTimeout) {
        let clock = Arc::new(ManualClock::new(0));
        let timers = SoftTimers::new(Arc::clone(&clock) as Arc<dyn Clock>);
        (clock, timers, AcTimeout::new(AC, 40))
    }

    fn assert_one_timer(ac: &AcTimeout, timers: &SoftTimers) {
        assert_eq!(timers.deadline(AC), ac.head_expiry_ms());
    }

    #[test]
    fn activate_appends_and_arms_once() {
        let (clock, timers, mut ac) = setup();
        let mut a = TimeoutElem::default();
        let mut b = TimeoutElem::default();

        ac.activate(&mut a, key(1), 0, &timers).unwrap();
        assert_eq!(timers.deadline(AC), Some(40));

        clock.set(10);
        ac.activate(&mut b, key(2), 10, &timers).unwrap();
        // still governed by the head
        assert_eq!(timers.deadline(AC), Some(40));
        assert_eq!(ac.expiries().collect::<Vec<_>>(), vec![40, 50]);
        assert!(a.is_active() && b.is_active());
        assert_eq!(b.expiry_ms(), 50);
    }

    #[test]
    fn double_activation_is_a_noop() {
        let (_clock, timers, mut ac) = setup();
        let mut a = TimeoutElem::default();
        ac.activate(&mut a, key(1), 0, &timers).unwrap();
        let before = a;
        match ac.activate(&mut a, key(1), 5, &timers) {
            Err(Violation::DoubleActivation { .. }) => (),
            _ => panic!(),
        }
        assert_eq!(a, before);
        assert_eq!(ac.len(), 1);
    }

    #[test]
    fn deactivate_head_rearms_for_next() {
        let (clock, timers, mut ac) = setup();
        let mut a = TimeoutElem::default();
        let mut b = TimeoutElem::default();
        ac.activate(&mut a, key(1), 0, &timers).unwrap();
        clock.set(10);
        ac.activate(&mut b, key(2), 10, &timers).unwrap();

        clock.set(20);
        ac.deactivate(&mut a, 20, &timers);
        assert!(!a.is_active());
        assert_eq!(timers.deadline(AC), Some(50));

        ac.deactivate(&mut b, 20, &timers);
        assert_eq!(timers.deadline(AC), None);
        assert!(ac.is_empty());

        // deactivating an idle element does nothing
        ac.deactivate(&mut b, 20, &timers);
        assert_one_timer(&ac, &timers);
    }

    #[test]
    fn pop_expired_stops_at_future_head() {
        let (clock, timers, mut ac) = setup();
        let mut elems = [TimeoutElem::default(); 3];
        for (i, elem) in elems.iter_mut().enumerate() {
            ac.activate(elem, key(i as u32), i as u64 * 10, &timers).unwrap();
        }

        clock.set(50);
        ac.timer_fired();
        assert_eq!(ac.pop_expired(50), Some(key(0)));
        assert_eq!(ac.pop_expired(50), Some(key(1)));
        assert_eq!(ac.pop_expired(50), None);
        ac.sync_timer(50, &timers);
        assert_eq!(timers.deadline(AC), Some(60));
        assert_eq!(ac.len(), 1);
    }

    #[test]
    fn overdue_head_arms_for_zero() {
        let (clock, timers, mut ac) = setup();
        let mut a = TimeoutElem::default();
        let mut b = TimeoutElem::default();
        ac.activate(&mut a, key(1), 0, &timers).unwrap();
        clock.set(5);
        ac.activate(&mut b, key(2), 5, &timers).unwrap();

        // the timer for `a` has not been serviced yet and `b` is overdue too
        clock.set(60);
        ac.deactivate(&mut a, 60, &timers);
        assert_eq!(ac.head_expiry_ms(), Some(45));
        assert_eq!(timers.deadline(AC), Some(60));
        assert_eq!(timers.expired(), vec![AC]);
    }

    #[test]
    fn sorted_under_random_churn() {
        let (clock, timers, mut ac) = setup();
        let mut elems = [TimeoutElem::default(); 16];
        let mut now = 0;
        let mut state: u32 = 0x9e37_79b9;
        for _ in 0..500 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            now += (state % 7) as u64;
            clock.set(now);
            if timers.expired().contains(&AC) {
                ac.timer_fired();
                while let Some(key) = ac.pop_expired(now) {
                    elems[key.peer.index() as usize].clear();
                }
                ac.sync_timer(now, &timers);
            }
            let i = (state >> 8) as usize % elems.len();
            if elems[i].is_active() {
                ac.deactivate(&mut elems[i], now, &timers);
            } else {
                ac.activate(&mut elems[i], key(i as u32), now, &timers).unwrap();
            }
            let expiries: Vec<_> = ac.expiries().collect();
            assert!(expiries.windows(2).all(|w| w[0] <= w[1]));
            assert_one_timer(&ac, &timers);
        }
    }
}
