use std::{ops::Range, sync::Arc};

/// Reference-counted view into a packet buffer.
///
/// Cloning takes another reference on the backing storage; dropping the last
/// view releases it.
#[derive(Debug, Clone)]
pub struct BufSlice {
    buf: Arc<Vec<u8>>,
    range: Range<usize>,
}

pub struct BufSliceBuilder {
    pub buf: Arc<Vec<u8>>,
    pub range: Range<usize>,
}

impl BufSliceBuilder {
    pub fn build(self) -> Result<BufSlice, Error> {
        if !(self.range.start <= self.range.end) {
            return Err(Error::IndexOutOfRange);
        }
        if !(self.range.end <= self.buf.len()) {
            return Err(Error::IndexOutOfRange);
        }

        let this = BufSlice {
            buf: self.buf,
            range: self.range,
        };
        this.check_rep();
        Ok(this)
    }
}

impl BufSlice {
    #[inline]
    fn check_rep(&self) {
        assert!(self.range.start <= self.range.end);
        assert!(self.range.end <= self.buf.len());
    }

    pub fn from_bytes(buf: Vec<u8>) -> Self {
        let range = 0..buf.len();
        let this = BufSlice {
            buf: Arc::new(buf),
            range,
        };
        this.check_rep();
        this
    }

    #[must_use]
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buf[self.range.start..self.range.end]
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.range.end - self.range.start
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live views sharing the backing storage.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.buf)
    }

    pub fn slice(&self, range: Range<usize>) -> Result<BufSlice, Error> {
        if !(range.start <= range.end && range.end <= self.len()) {
            return Err(Error::IndexOutOfRange);
        }
        let start = self.range.start + range.start;
        let end = self.range.start + range.end;
        BufSliceBuilder {
            buf: Arc::clone(&self.buf),
            range: start..end,
        }
        .build()
    }

    pub fn pop_front(&mut self, len: usize) -> Result<BufSlice, Error> {
        let front = self.slice(0..len)?;
        self.range.start += len;
        self.check_rep();
        Ok(front)
    }
}

#[derive(Debug)]
pub enum Error {
    IndexOutOfRange,
}
