use std::sync::Arc;

use crate::{
    event::{Event, Notifier, Violation},
    protocol::qos::{AccessCategory, Tid, NUM_ACS, NUM_TIDS},
    timer::{Clock, TimerService},
    utils::{
        excl::{ExclusionDomain, Lock, SpinDomain},
        Seq12, SEQ12_HALF_SPACE,
    },
};

use super::{AcTimeout, ReorderWnd, SeqLocation, TimeoutElem, TimeoutKey};

/// Weak reference to a peer; goes stale once the peer is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId {
    index: u32,
    gen: u32,
}

impl PeerId {
    #[must_use]
    pub(crate) fn from_raw(index: u32, gen: u32) -> Self {
        PeerId { index, gen }
    }

    #[must_use]
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }
}

#[derive(Debug, Clone)]
pub struct ReorderConfig {
    /// Hole timeout per access category, indexed by [`AccessCategory::index`].
    pub timeout_ms: [u64; NUM_ACS],
    pub win_size: usize,
    pub max_peers: usize,
}

impl ReorderConfig {
    #[must_use]
    pub fn default() -> Self {
        let mut timeout_ms = [100; NUM_ACS];
        timeout_ms[AccessCategory::Voice.index()] = 40;
        ReorderConfig {
            timeout_ms,
            win_size: 64,
            max_peers: 32,
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        0 < self.win_size
            && self.win_size <= SEQ12_HALF_SPACE
            && self.max_peers > 0
            && self.timeout_ms.iter().all(|&ms| ms > 0)
    }
}

#[derive(Debug)]
pub enum RxError {
    UnknownPeer,
    PeerTableFull,
}

/// Frames a timeout forced out of one (peer, tid).
#[derive(Debug)]
pub struct Flushed<F> {
    pub peer: PeerId,
    pub tid: Tid,
    pub frames: Vec<F>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStat {
    pub in_order: u64,
    pub held: u64,
    pub dropped_stale: u64,
    pub timeout_flushes: u64,
    pub released_by_timeout: u64,
}

struct TidState<F> {
    wnd: ReorderWnd<F>,
    timeout: TimeoutElem,
}

struct PeerState<F> {
    tids: Vec<TidState<F>>,
}

impl<F> PeerState<F> {
    fn new(win_size: usize) -> Self {
        PeerState {
            tids: (0..NUM_TIDS)
                .map(|_| TidState {
                    wnd: ReorderWnd::new(win_size),
                    timeout: TimeoutElem::default(),
                })
                .collect(),
        }
    }
}

struct PeerSlot<F> {
    gen: u32,
    peer: Option<PeerState<F>>,
}

struct PeerTable<F> {
    slots: Vec<PeerSlot<F>>,
    free: Vec<u32>,
    len: usize,
    len_cap: usize,
}

impl<F> PeerTable<F> {
    fn check_rep(&self) {
        assert!(self.len <= self.len_cap);
        assert_eq!(self.len + self.free.len(), self.slots.len());
    }

    fn new(len_cap: usize) -> Self {
        PeerTable {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            len_cap,
        }
    }

    fn insert(&mut self, peer: PeerState<F>) -> Result<PeerId, RxError> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                if self.slots.len() == self.len_cap {
                    return Err(RxError::PeerTableFull);
                }
                self.slots.push(PeerSlot { gen: 0, peer: None });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.peer = Some(peer);
        let gen = slot.gen;
        self.len += 1;
        self.check_rep();
        Ok(PeerId::from_raw(index, gen))
    }

    fn get_mut(&mut self, id: PeerId) -> Option<&mut PeerState<F>> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.gen != id.gen {
            return None;
        }
        slot.peer.as_mut()
    }

    fn remove(&mut self, id: PeerId) -> Option<PeerState<F>> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.gen != id.gen {
            return None;
        }
        let peer = slot.peer.take()?;
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        self.check_rep();
        Some(peer)
    }
}

struct RxState<F> {
    peers: PeerTable<F>,
    acs: [AcTimeout; NUM_ACS],
    stat: RxStat,
}

/// Reorder buffers of one device and the per-category flush timers.
///
/// The peer table and all four category lists sit behind one lock, so frame
/// arrival, timer fire and peer teardown are totally ordered.
pub struct RxReorder<F: Send, D: ExclusionDomain = SpinDomain> {
    state: D::Guarded<RxState<F>>,
    clock: Arc<dyn Clock>,
    timers: Arc<dyn TimerService>,
    notifier: Arc<Notifier<D>>,
    win_size: usize,
}

impl<F: Send, D: ExclusionDomain> RxReorder<F, D> {
    /// # Panics
    ///
    /// If `config` has a zero timeout, a zero peer capacity, or a window size
    /// outside `1..=SEQ12_HALF_SPACE`.
    #[must_use]
    pub fn new(
        config: &ReorderConfig,
        clock: Arc<dyn Clock>,
        timers: Arc<dyn TimerService>,
        notifier: Arc<Notifier<D>>,
    ) -> Self {
        assert!(config.is_valid());
        let acs = AccessCategory::ALL.map(|ac| AcTimeout::new(ac, config.timeout_ms[ac.index()]));
        let state = RxState {
            peers: PeerTable::new(config.max_peers),
            acs,
            stat: RxStat::default(),
        };
        RxReorder {
            state: <D::Guarded<RxState<F>> as Lock<RxState<F>>>::new(state),
            clock,
            timers,
            notifier,
            win_size: config.win_size,
        }
    }

    pub fn add_peer(&self) -> Result<PeerId, RxError> {
        let peer = PeerState::new(self.win_size);
        let result = self.state.with(|state| state.peers.insert(peer));
        match &result {
            Ok(peer) => log::debug!(target: "txrx::rx", "peer {:?} added", peer),
            Err(e) => log::warn!(target: "txrx::rx", "add peer: {:?}", e),
        }
        result
    }

    /// Tears the peer down and hands back every frame it still held.
    pub fn remove_peer(&self, peer: PeerId) -> Result<Vec<F>, RxError> {
        let now = self.clock.now_ms();
        let timers = &*self.timers;
        let mut released = Vec::new();
        let removed = self.state.with(|state| {
            let mut peer_state = state.peers.remove(peer).ok_or(RxError::UnknownPeer)?;
            for (tid, tid_state) in Tid::all().zip(peer_state.tids.iter_mut()) {
                state.acs[tid.access_category().index()].deactivate(
                    &mut tid_state.timeout,
                    now,
                    timers,
                );
                tid_state.wnd.flush_all(&mut released);
            }
            Ok(peer_state)
        })?;
        drop(removed);
        log::debug!(target: "txrx::rx", "peer {:?} removed, {} frames released", peer, released.len());
        Ok(released)
    }

    /// Feeds one received frame; returns the frames now deliverable in order.
    pub fn rx_frame(&self, peer: PeerId, tid: Tid, seq: Seq12, frame: F) -> Result<Vec<F>, RxError> {
        let now = self.clock.now_ms();
        let timers = &*self.timers;
        self.state.with(|state| {
            let tid_state = state
                .peers
                .get_mut(peer)
                .map(|peer_state| &mut peer_state.tids[tid.index()])
                .ok_or(RxError::UnknownPeer)?;
            let mut released = Vec::new();
            match tid_state.wnd.insert(seq, frame, &mut released) {
                SeqLocation::TooLate | SeqLocation::Duplicate => state.stat.dropped_stale += 1,
                SeqLocation::AtWindowStart => state.stat.in_order += 1,
                SeqLocation::InWindow | SeqLocation::BeyondWindow => state.stat.held += 1,
            }

            let ac = &mut state.acs[tid.access_category().index()];
            if tid_state.wnd.num_mpdus() == 0 {
                ac.deactivate(&mut tid_state.timeout, now, timers);
            } else if !tid_state.timeout.is_active() {
                let activated = ac.activate(&mut tid_state.timeout, TimeoutKey { peer, tid }, now, timers);
                debug_assert!(activated.is_ok());
                log::debug!(target: "txrx::rx", "hole on {:?} {:?}, expires at {}", peer, tid, tid_state.timeout.expiry_ms());
            }
            Ok(released)
        })
    }

    /// Restarts the window of one tid at `ssn`, handing back held frames.
    pub fn reset_tid(&self, peer: PeerId, tid: Tid, ssn: Seq12) -> Result<Vec<F>, RxError> {
        let now = self.clock.now_ms();
        let timers = &*self.timers;
        self.state.with(|state| {
            let tid_state = state
                .peers
                .get_mut(peer)
                .map(|peer_state| &mut peer_state.tids[tid.index()])
                .ok_or(RxError::UnknownPeer)?;
            state.acs[tid.access_category().index()].deactivate(&mut tid_state.timeout, now, timers);
            let mut released = Vec::new();
            tid_state.wnd.reset(ssn, &mut released);
            Ok(released)
        })
    }

    /// Timer callback of `ac`. A callback for a timer that was cancelled or
    /// re-armed meanwhile finds nothing expired and flushes nothing.
    pub fn on_timer(&self, ac: AccessCategory) -> Vec<Flushed<F>> {
        let now = self.clock.now_ms();
        let timers = &*self.timers;
        let mut flushed = Vec::new();
        let mut violations = Vec::new();
        self.state.with(|state| {
            let timeout = &mut state.acs[ac.index()];
            timeout.timer_fired();
            while let Some(key) = timeout.pop_expired(now) {
                let Some(peer_state) = state.peers.get_mut(key.peer) else {
                    violations.push(Violation::DanglingTimeout {
                        peer: key.peer,
                        tid: key.tid,
                    });
                    continue;
                };
                let tid_state = &mut peer_state.tids[key.tid.index()];
                tid_state.timeout.clear();

                let mut frames = Vec::new();
                let n = tid_state.wnd.flush_to_next_hole(&mut frames);
                state.stat.timeout_flushes += 1;
                state.stat.released_by_timeout += n as u64;

                // frames behind the next hole wait for a fresh timeout
                if tid_state.wnd.num_mpdus() > 0 {
                    if let Err(violation) = timeout.activate(&mut tid_state.timeout, key, now, timers) {
                        violations.push(violation);
                    }
                }
                flushed.push(Flushed {
                    peer: key.peer,
                    tid: key.tid,
                    frames,
                });
            }
            timeout.sync_timer(now, timers);
        });

        for flush in &flushed {
            log::debug!(target: "txrx::rx", "{:?} timeout flushed {} frames of {:?} {:?}", ac, flush.frames.len(), flush.peer, flush.tid);
            self.notifier.publish(&Event::ReorderFlush {
                peer: flush.peer,
                tid: flush.tid,
                released: flush.frames.len(),
            });
        }
        for violation in violations {
            log::warn!(target: "txrx::rx", "{:?}", violation);
            self.notifier.publish(&Event::ContractViolation(violation));
        }
        flushed
    }

    pub fn num_held(&self, peer: PeerId, tid: Tid) -> Result<usize, RxError> {
        self.state.with(|state| {
            state
                .peers
                .get_mut(peer)
                .map(|peer_state| peer_state.tids[tid.index()].wnd.num_mpdus())
                .ok_or(RxError::UnknownPeer)
        })
    }

    /// Whether the (peer, tid) is linked into its category's timeout list.
    pub fn is_holding(&self, peer: PeerId, tid: Tid) -> Result<bool, RxError> {
        self.state.with(|state| {
            state
                .peers
                .get_mut(peer)
                .map(|peer_state| peer_state.tids[tid.index()].timeout.is_active())
                .ok_or(RxError::UnknownPeer)
        })
    }

    #[must_use]
    pub fn timeout_len(&self, ac: AccessCategory) -> usize {
        self.state.with(|state| state.acs[ac.index()].len())
    }

    #[must_use]
    pub fn head_expiry_ms(&self, ac: AccessCategory) -> Option<u64> {
        self.state.with(|state| state.acs[ac.index()].head_expiry_ms())
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.state.with(|state| state.peers.len)
    }

    #[must_use]
    pub fn stat(&self) -> RxStat {
        self.state.with(|state| state.stat)
    }
}
