use std::collections::BTreeMap;

use crate::utils::{Seq, Seq12, SEQ12_HALF_SPACE};

const SEQ12_SPACE: usize = SEQ12_HALF_SPACE * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqLocation {
    /// Behind the window start; dropped.
    TooLate,
    /// Already held; dropped.
    Duplicate,
    AtWindowStart,
    InWindow,
    /// Past the window end; the window slid forward to take it.
    BeyondWindow,
}

/// Receive window of one (peer, tid).
///
/// Holds out-of-order frames until the frames before them arrive or a flush
/// skips the gap.
pub struct ReorderWnd<F> {
    wnd: BTreeMap<Seq12, F>,
    start: Seq12,
    size: usize,
}

impl<F> ReorderWnd<F> {
    fn check_rep(&self) {
        assert!(self.wnd.len() < self.size);
        assert!(!self.wnd.contains_key(&self.start));
        for seq in self.wnd.keys() {
            assert!(seq.sub(&self.start) < self.size);
        }
    }

    /// `size` must be within `1..=SEQ12_HALF_SPACE`.
    #[must_use]
    pub fn new(size: usize) -> Self {
        assert!(0 < size && size <= SEQ12_HALF_SPACE);
        let this = ReorderWnd {
            wnd: BTreeMap::new(),
            start: Seq12::zero(),
            size,
        };
        this.check_rep();
        this
    }

    #[must_use]
    #[inline]
    pub fn start(&self) -> Seq12 {
        self.start
    }

    #[must_use]
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of frames held behind a hole.
    #[must_use]
    #[inline]
    pub fn num_mpdus(&self) -> usize {
        self.wnd.len()
    }

    #[must_use]
    pub fn location(&self, seq: Seq12) -> SeqLocation {
        let offset = seq.sub(&self.start);
        if offset == 0 {
            SeqLocation::AtWindowStart
        } else if offset < self.size {
            match self.wnd.contains_key(&seq) {
                true => SeqLocation::Duplicate,
                false => SeqLocation::InWindow,
            }
        } else if offset < SEQ12_HALF_SPACE {
            SeqLocation::BeyondWindow
        } else {
            SeqLocation::TooLate
        }
    }

    /// Accepts one frame; frames that become in-order are appended to
    /// `released` in sequence order.
    pub fn insert(&mut self, seq: Seq12, frame: F, released: &mut Vec<F>) -> SeqLocation {
        let location = self.location(seq);
        match location {
            SeqLocation::TooLate | SeqLocation::Duplicate => (),
            SeqLocation::AtWindowStart => {
                // hot path: in-order frame bypasses the window
                released.push(frame);
                self.proceed();
                self.pop_consecutive(released);
            }
            SeqLocation::InWindow => {
                self.wnd.insert(seq, frame);
            }
            SeqLocation::BeyondWindow => {
                let new_start = seq.add_usize(SEQ12_SPACE - (self.size - 1));
                self.release_before(new_start, released);
                self.pop_consecutive(released);
                match self.location(seq) {
                    SeqLocation::AtWindowStart => {
                        released.push(frame);
                        self.proceed();
                        self.pop_consecutive(released);
                    }
                    _ => {
                        self.wnd.insert(seq, frame);
                    }
                }
            }
        }
        self.check_rep();
        location
    }

    /// Skips the leading gap and releases frames up to the next hole.
    pub fn flush_to_next_hole(&mut self, released: &mut Vec<F>) -> usize {
        let before = released.len();
        if let Some(first) = self.first_held() {
            self.start = first;
            self.pop_consecutive(released);
        }
        self.check_rep();
        released.len() - before
    }

    /// Releases every held frame and moves the window past the last one.
    pub fn flush_all(&mut self, released: &mut Vec<F>) -> usize {
        let before = released.len();
        while self.flush_to_next_hole(released) > 0 {}
        released.len() - before
    }

    /// Flushes everything and restarts the window at `ssn`.
    pub fn reset(&mut self, ssn: Seq12, released: &mut Vec<F>) -> usize {
        let n = self.flush_all(released);
        self.start = ssn;
        self.check_rep();
        n
    }

    fn first_held(&self) -> Option<Seq12> {
        self.wnd.keys().copied().min_by_key(|seq| seq.sub(&self.start))
    }

    #[inline]
    fn proceed(&mut self) {
        self.start.increment();
    }

    fn pop_consecutive(&mut self, released: &mut Vec<F>) {
        while let Some(frame) = self.wnd.remove(&self.start) {
            released.push(frame);
            self.proceed();
        }
    }

    /// Releases held frames in `[start, new_start)` and moves the start there.
    fn release_before(&mut self, new_start: Seq12, released: &mut Vec<F>) {
        let span = new_start.sub(&self.start);
        for _ in 0..span {
            if let Some(frame) = self.wnd.remove(&self.start) {
                released.push(frame);
            }
            self.proceed();
        }
    }
}
