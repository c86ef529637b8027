use std::sync::Arc;

use crate::{
    event::{Event, Notifier, Violation},
    utils::{
        buf::BufChain,
        excl::{ExclusionDomain, Lock, SpinDomain},
    },
};

pub const MAX_POOL_CAPACITY: usize = u16::MAX as usize;

/// Dense descriptor index; also the tag carried in completion records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescId(u16);

impl DescId {
    #[must_use]
    pub fn from_u16(id: u16) -> Self {
        DescId(id)
    }

    #[must_use]
    #[inline]
    pub fn to_u16(self) -> u16 {
        self.0
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Position of a descriptor within a segmentation-offload fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    pub index: usize,
    pub count: usize,
    /// Needs special teardown: management frame or segmented flow.
    pub is_nonstandard: bool,
}

impl SegmentInfo {
    #[must_use]
    pub fn single() -> Self {
        SegmentInfo {
            index: 0,
            count: 1,
            is_nonstandard: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescHandle {
    pub id: DescId,
    pub segment: SegmentInfo,
    pub byte_len: usize,
}

struct Descriptor {
    buf: BufChain,
    segment: SegmentInfo,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolStat {
    pub allocs: u64,
    pub exhaustions: u64,
    pub tx_ok: u64,
    pub tx_err: u64,
    /// Freed without being sent.
    pub unsent: u64,
    pub double_releases: u64,
}

struct PoolInner {
    slots: Vec<Option<Descriptor>>,
    free: Vec<u16>,
    allocated: usize,
    stat: PoolStat,
}

impl PoolInner {
    #[inline]
    fn check_rep(&self) {
        assert_eq!(self.free.len() + self.allocated, self.slots.len());
    }

    fn take(&mut self, id: DescId) -> Result<Descriptor, ReleaseError> {
        let slot = self
            .slots
            .get_mut(id.index())
            .ok_or(ReleaseError::OutOfRange)?;
        let desc = slot.take().ok_or(ReleaseError::NotAllocated)?;
        self.free.push(id.0);
        self.allocated -= 1;
        self.check_rep();
        Ok(desc)
    }
}

/// The pool was empty; the buffer is handed back untouched.
#[derive(Debug)]
pub struct PoolExhausted(pub BufChain);

#[derive(Debug, PartialEq, Eq)]
pub enum ReleaseError {
    OutOfRange,
    NotAllocated,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchRelease {
    pub released: usize,
    pub invalid: Vec<DescId>,
}

pub struct DescPool<D: ExclusionDomain = SpinDomain> {
    inner: D::Guarded<PoolInner>,
    capacity: usize,
    notifier: Arc<Notifier<D>>,
}

impl<D: ExclusionDomain> DescPool<D> {
    /// `capacity` is clamped to [`MAX_POOL_CAPACITY`].
    #[must_use]
    pub fn new(capacity: usize, notifier: Arc<Notifier<D>>) -> Self {
        let capacity = usize::min(capacity, MAX_POOL_CAPACITY);
        let inner = PoolInner {
            slots: (0..capacity).map(|_| None).collect(),
            // lowest id on top
            free: (0..capacity as u16).rev().collect(),
            allocated: 0,
            stat: PoolStat::default(),
        };
        inner.check_rep();
        DescPool {
            inner: <D::Guarded<PoolInner> as Lock<PoolInner>>::new(inner),
            capacity,
            notifier,
        }
    }

    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.inner.with(|inner| inner.free.len())
    }

    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.inner.with(|inner| inner.allocated)
    }

    #[must_use]
    pub fn stat(&self) -> PoolStat {
        self.inner.with(|inner| inner.stat.clone())
    }

    /// Binds `buf` to a free descriptor. Never blocks.
    pub fn allocate(&self, buf: BufChain, segment: SegmentInfo) -> Result<DescHandle, PoolExhausted> {
        let byte_len = buf.len();
        let result = self.inner.with(|inner| {
            let Some(id) = inner.free.pop() else {
                inner.stat.exhaustions += 1;
                return Err(PoolExhausted(buf));
            };
            inner.slots[id as usize] = Some(Descriptor { buf, segment });
            inner.allocated += 1;
            inner.stat.allocs += 1;
            inner.check_rep();
            Ok(DescHandle {
                id: DescId(id),
                segment,
                byte_len,
            })
        });
        if result.is_err() {
            log::warn!(target: "txrx::tx", "descriptor pool exhausted (capacity {})", self.capacity);
            self.notifier.publish(&Event::PoolExhausted {
                capacity: self.capacity,
            });
        }
        result
    }

    #[must_use]
    pub fn lookup(&self, id: DescId) -> Option<DescHandle> {
        self.inner.with(|inner| {
            let desc = inner.slots.get(id.index())?.as_ref()?;
            Some(DescHandle {
                id,
                segment: desc.segment,
                byte_len: desc.buf.len(),
            })
        })
    }

    /// Frees a descriptor that was never completed by the transport and hands
    /// its buffer back.
    pub fn release(&self, id: DescId) -> Result<BufChain, ReleaseError> {
        let result = self.inner.with(|inner| {
            let result = inner.take(id);
            match &result {
                Ok(_) => inner.stat.unsent += 1,
                Err(_) => inner.stat.double_releases += 1,
            }
            result
        });
        match result {
            Ok(desc) => Ok(desc.buf),
            Err(e) => {
                self.report_invalid(id, &e);
                Err(e)
            }
        }
    }

    /// Drains a completion: frees every descriptor in `ids` and drops its
    /// buffer. Counters move once for the whole batch.
    pub fn release_batch(&self, ids: &[DescId], had_error: bool) -> BatchRelease {
        let mut bufs = Vec::with_capacity(ids.len());
        let mut invalid = Vec::new();
        self.inner.with(|inner| {
            for &id in ids {
                match inner.take(id) {
                    Ok(desc) => bufs.push(desc.buf),
                    Err(e) => invalid.push((id, e)),
                }
            }
            let released = bufs.len() as u64;
            match had_error {
                true => inner.stat.tx_err += released,
                false => inner.stat.tx_ok += released,
            }
            inner.stat.double_releases += invalid.len() as u64;
        });
        let released = bufs.len();
        drop(bufs);

        for (id, e) in &invalid {
            self.report_invalid(*id, e);
        }
        BatchRelease {
            released,
            invalid: invalid.into_iter().map(|(id, _)| id).collect(),
        }
    }

    /// Frees every allocated descriptor, lowest id first.
    pub fn drain(&self) -> Vec<BufChain> {
        self.inner.with(|inner| {
            let mut bufs = Vec::with_capacity(inner.allocated);
            for index in 0..inner.slots.len() {
                if inner.slots[index].is_none() {
                    continue;
                }
                if let Ok(desc) = inner.take(DescId(index as u16)) {
                    bufs.push(desc.buf);
                }
            }
            inner.stat.unsent += bufs.len() as u64;
            bufs
        })
    }

    fn report_invalid(&self, id: DescId, e: &ReleaseError) {
        log::warn!(target: "txrx::tx", "release of {:?} ignored: {:?}", id, e);
        let violation = match e {
            ReleaseError::OutOfRange => Violation::UnknownDescriptor { id },
            ReleaseError::NotAllocated => Violation::DoubleRelease { id },
        };
        self.notifier.publish(&Event::ContractViolation(violation));
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use parking_lot::Mutex;

    use crate::{
        event::{Event, EventType, Notifier, Violation},
        utils::buf::{BufChain, BufSlice},
    };

    use super::*;

    fn pool(capacity: usize) -> DescPool {
        DescPool::new(capacity, Arc::new(Notifier::new(8)))
    }

    fn buf(len: usize) -> BufChain {
        BufChain::from_bytes(vec![0xaa; len])
    }

    fn assert_conserved(pool: &DescPool) {
        assert_eq!(pool.free_count() + pool.allocated_count(), pool.capacity());
    }

    #[test]
    fn exhaust_and_reuse() {
        let pool = pool(4);
        let mut ids = HashSet::new();
        for _ in 0..4 {
            let handle = pool.allocate(buf(10), SegmentInfo::single()).unwrap();
            assert!(ids.insert(handle.id));
        }
        assert_eq!(pool.free_count(), 0);

        let exhausted = pool.allocate(buf(7), SegmentInfo::single());
        match exhausted {
            Err(PoolExhausted(buf)) => assert_eq!(buf.len(), 7),
            Ok(_) => panic!(),
        }

        let released = pool.release(DescId::from_u16(2)).unwrap();
        assert_eq!(released.len(), 10);
        let handle = pool.allocate(buf(3), SegmentInfo::single()).unwrap();
        assert_eq!(handle.id, DescId::from_u16(2));
        assert_conserved(&pool);

        let stat = pool.stat();
        assert_eq!(stat.allocs, 5);
        assert_eq!(stat.exhaustions, 1);
        assert_eq!(stat.unsent, 1);
    }

    #[test]
    fn lookup_is_bounds_checked() {
        let pool = pool(2);
        let handle = pool
            .allocate(
                buf(5),
                SegmentInfo {
                    index: 1,
                    count: 3,
                    is_nonstandard: true,
                },
            )
            .unwrap();
        assert_eq!(pool.lookup(handle.id), Some(handle));
        assert_eq!(pool.lookup(DescId::from_u16(1)), None);
        assert_eq!(pool.lookup(DescId::from_u16(u16::MAX)), None);
        pool.release(handle.id).unwrap();
        assert_eq!(pool.lookup(handle.id), None);
    }

    #[test]
    fn double_release_is_reported() {
        let notifier: Arc<Notifier> = Arc::new(Notifier::new(8));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        notifier
            .subscribe(EventType::ContractViolation, move |event| {
                sink.lock().push(event.clone());
            })
            .unwrap();
        let pool: DescPool = DescPool::new(2, Arc::clone(&notifier));

        let handle = pool.allocate(buf(1), SegmentInfo::single()).unwrap();
        pool.release(handle.id).unwrap();
        assert_eq!(pool.release(handle.id).unwrap_err(), ReleaseError::NotAllocated);
        assert_eq!(
            pool.release(DescId::from_u16(9)).unwrap_err(),
            ReleaseError::OutOfRange
        );
        assert_conserved(&pool);
        assert_eq!(pool.stat().double_releases, 2);
        assert_eq!(
            *seen.lock(),
            vec![
                Event::ContractViolation(Violation::DoubleRelease { id: handle.id }),
                Event::ContractViolation(Violation::UnknownDescriptor {
                    id: DescId::from_u16(9)
                }),
            ]
        );
    }

    #[test]
    fn batch_release_drops_buffers() {
        let pool = pool(4);
        let slice = BufSlice::from_bytes(vec![1; 64]);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let handle = pool
                .allocate(BufChain::from_slice(slice.clone()), SegmentInfo::single())
                .unwrap();
            ids.push(handle.id);
        }
        assert_eq!(slice.ref_count(), 4);

        ids.push(ids[0]);
        let outcome = pool.release_batch(&ids, true);
        assert_eq!(outcome.released, 3);
        assert_eq!(outcome.invalid, vec![ids[0]]);
        assert_eq!(slice.ref_count(), 1);
        assert_eq!(pool.stat().tx_err, 3);
        assert_eq!(pool.stat().tx_ok, 0);
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn drain_returns_everything() {
        let pool = pool(4);
        for len in 1..=3 {
            pool.allocate(buf(len), SegmentInfo::single()).unwrap();
        }
        pool.release(DescId::from_u16(1)).unwrap();
        let lens: Vec<_> = pool.drain().iter().map(BufChain::len).collect();
        assert_eq!(lens, vec![1, 3]);
        assert_eq!(pool.allocated_count(), 0);
        assert_conserved(&pool);
    }

    #[test]
    fn random_sequences_conserve_and_never_double_allocate() {
        let pool = pool(8);
        let mut live: Vec<DescId> = Vec::new();
        // xorshift keeps the sequence reproducible
        let mut state: u32 = 0x2545_f491;
        for _ in 0..2000 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            if state % 3 != 0 {
                match pool.allocate(buf(1), SegmentInfo::single()) {
                    Ok(handle) => {
                        assert!(!live.contains(&handle.id));
                        live.push(handle.id);
                    }
                    Err(_) => assert_eq!(live.len(), pool.capacity()),
                }
            } else if !live.is_empty() {
                let id = live.swap_remove(state as usize % live.len());
                pool.release(id).unwrap();
            }
            assert_conserved(&pool);
            assert_eq!(pool.allocated_count(), live.len());
        }
    }

    #[test]
    fn concurrent_submit_and_complete() {
        let pool = Arc::new(pool(16));
        let (tx, rx) = std::sync::mpsc::channel();
        let producer = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let mut sent = 0;
                while sent < 1000 {
                    if let Ok(handle) = pool.allocate(buf(1), SegmentInfo::single()) {
                        tx.send(handle.id).unwrap();
                        sent += 1;
                    }
                }
            })
        };
        let mut completed = 0;
        while completed < 1000 {
            let id = rx.recv().unwrap();
            completed += pool.release_batch(&[id], false).released;
        }
        producer.join().unwrap();
        assert_eq!(pool.stat().tx_ok, 1000);
        assert_eq!(pool.free_count(), 16);
    }
}
