use std::sync::Arc;

use crate::{
    event::{Event, Notifier},
    protocol::{completion::CompletionRecord, DecodingError},
    utils::{
        buf::BufChain,
        excl::{ExclusionDomain, SpinDomain},
    },
};

use super::{BatchRelease, DescId, DescPool, PoolExhausted, SegmentInfo};

/// Lower transport send primitive.
///
/// Completion is reported later, out of band, through
/// [`TxPath::complete`] or [`TxPath::complete_record`].
pub trait Transport: Send + Sync {
    fn send(&self, id: DescId, segment: &BufChain) -> Result<(), Rejected>;
}

/// The transport refused a segment at submission time.
#[derive(Debug, PartialEq, Eq)]
pub struct Rejected;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Mgmt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsoConfig {
    pub enabled: bool,
    /// Largest segment handed to the transport when offload is enabled.
    pub mss: usize,
}

impl TsoConfig {
    #[must_use]
    pub fn default() -> Self {
        TsoConfig {
            enabled: true,
            mss: 1460,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    PoolExhausted,
    Rejected,
}

/// Submission stopped early. `remainder` is everything not yet accepted by
/// the transport, starting at the segment that failed.
#[derive(Debug)]
pub struct PartialSubmit {
    pub remainder: BufChain,
    pub submitted: usize,
    pub reason: StopReason,
}

pub struct TxPath<T, D: ExclusionDomain = SpinDomain>
where
    T: Transport,
{
    pool: Arc<DescPool<D>>,
    transport: T,
    tso: TsoConfig,
    notifier: Arc<Notifier<D>>,
}

impl<T, D> TxPath<T, D>
where
    T: Transport,
    D: ExclusionDomain,
{
    #[must_use]
    pub fn new(pool: Arc<DescPool<D>>, transport: T, tso: TsoConfig, notifier: Arc<Notifier<D>>) -> Self {
        TxPath {
            pool,
            transport,
            tso,
            notifier,
        }
    }

    #[must_use]
    #[inline]
    pub fn pool(&self) -> &Arc<DescPool<D>> {
        &self.pool
    }

    #[must_use]
    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[must_use]
    pub fn segment_count(&self, len: usize) -> usize {
        if self.tso.enabled && self.tso.mss > 0 && len > self.tso.mss {
            (len + self.tso.mss - 1) / self.tso.mss
        } else {
            1
        }
    }

    /// Fans `pkt` out into descriptors and hands them to the transport in
    /// order. Segments already handed over are never recalled.
    pub fn submit(&self, mut pkt: BufChain, kind: FrameKind) -> Result<usize, PartialSubmit> {
        let count = self.segment_count(pkt.len());
        let seg_len = match count {
            1 => pkt.len(),
            _ => self.tso.mss,
        };
        let is_nonstandard = count > 1 || kind == FrameKind::Mgmt;

        for index in 0..count {
            // one reference for the descriptor, one for the transport call
            let segment = pkt.front(seg_len);
            let info = SegmentInfo {
                index,
                count,
                is_nonstandard,
            };
            let handle = match self.pool.allocate(segment.clone(), info) {
                Ok(handle) => handle,
                Err(PoolExhausted(_)) => {
                    return Err(PartialSubmit {
                        remainder: pkt,
                        submitted: index,
                        reason: StopReason::PoolExhausted,
                    });
                }
            };
            if let Err(Rejected) = self.transport.send(handle.id, &segment) {
                log::debug!(
                    target: "txrx::tx",
                    "transport rejected {:?} (segment {}/{})",
                    handle.id,
                    index + 1,
                    count
                );
                // ours, never handed over
                let released = self.pool.release(handle.id);
                debug_assert!(released.is_ok());
                return Err(PartialSubmit {
                    remainder: pkt,
                    submitted: index,
                    reason: StopReason::Rejected,
                });
            }
            pkt.advance(segment.len());
        }
        Ok(count)
    }

    /// Completion delivery from the transport.
    pub fn complete(&self, ids: &[DescId], had_error: bool) -> BatchRelease {
        let outcome = self.pool.release_batch(ids, had_error);
        self.notifier.publish(&Event::TxCompletion {
            released: outcome.released,
            had_error,
        });
        outcome
    }

    /// Completion delivery as raw records; returns the number of descriptors
    /// released. Records before a malformed one are still applied.
    pub fn complete_record(&self, mut bytes: &[u8]) -> Result<usize, DecodingError> {
        let mut released = 0;
        while !bytes.is_empty() {
            let record = CompletionRecord::read_from(&mut bytes)?;
            released += self
                .complete(record.ids(), record.status().is_error())
                .released;
        }
        Ok(released)
    }
}
