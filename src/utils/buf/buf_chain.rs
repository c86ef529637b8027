use std::collections::VecDeque;

use super::BufSlice;

/// Packet made of a chain of buffer views.
#[derive(Debug, Clone, Default)]
pub struct BufChain {
    slices: VecDeque<BufSlice>,
    len: usize,
}

/// One contiguous region of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Byte offset of the region from the start of the chain.
    pub offset: usize,
    pub data: &'a [u8],
}

impl BufChain {
    #[inline]
    fn check_rep(&self) {
        let mut cum_len = 0;
        for slice in &self.slices {
            assert!(!slice.is_empty());
            cum_len += slice.len();
        }
        assert_eq!(cum_len, self.len);
    }

    #[must_use]
    pub fn new() -> Self {
        let this = BufChain {
            slices: VecDeque::new(),
            len: 0,
        };
        this.check_rep();
        this
    }

    #[must_use]
    pub fn from_slice(slice: BufSlice) -> Self {
        let mut this = Self::new();
        this.push_back(slice);
        this
    }

    #[must_use]
    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Self::from_slice(BufSlice::from_bytes(buf))
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push_back(&mut self, slice: BufSlice) {
        if slice.is_empty() {
            return;
        }
        self.len += slice.len();
        self.slices.push_back(slice);
        self.check_rep();
    }

    pub fn segments(&self) -> impl Iterator<Item = Segment<'_>> {
        let mut offset = 0;
        self.slices.iter().map(move |slice| {
            let segment = Segment {
                offset,
                data: slice.data(),
            };
            offset += slice.len();
            segment
        })
    }

    /// Takes a new reference on the first `len` bytes (clamped to the chain
    /// length) without consuming them.
    #[must_use]
    pub fn front(&self, len: usize) -> BufChain {
        let mut front = BufChain::new();
        let mut left = usize::min(len, self.len);
        for slice in &self.slices {
            if left == 0 {
                break;
            }
            if slice.len() <= left {
                left -= slice.len();
                front.push_back(slice.clone());
            } else {
                let mut slice = slice.clone();
                if let Ok(head) = slice.pop_front(left) {
                    front.push_back(head);
                }
                left = 0;
            }
        }
        front
    }

    /// Drops the first `len` bytes (clamped to the chain length).
    pub fn advance(&mut self, len: usize) {
        let mut left = usize::min(len, self.len);
        while left > 0 {
            let Some(mut slice) = self.slices.pop_front() else {
                break;
            };
            if slice.len() <= left {
                left -= slice.len();
                self.len -= slice.len();
            } else {
                if slice.pop_front(left).is_ok() {
                    self.len -= left;
                }
                left = 0;
                self.slices.push_front(slice);
            }
        }
        self.check_rep();
    }

    /// Splits off the first `len` bytes.
    pub fn pop_front(&mut self, len: usize) -> BufChain {
        let front = self.front(len);
        self.advance(front.len());
        front
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len);
        for segment in self.segments() {
            buf.extend_from_slice(segment.data);
        }
        buf
    }
}
