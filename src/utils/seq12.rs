use crate::utils::Seq;
use std::cmp::Ordering;

const SEQ_SPACE: u16 = 1 << 12;
const SEQ_MASK: u16 = SEQ_SPACE - 1;
pub const SEQ12_HALF_SPACE: usize = (SEQ_SPACE / 2) as usize;

/// 802.11 sequence control number (12 bits).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Seq12 {
    n: u16,
}

impl Seq12 {
    pub fn from_u16(n: u16) -> Self {
        Seq12 { n: n & SEQ_MASK }
    }

    pub fn to_u16(&self) -> u16 {
        self.n
    }

    pub fn increment(&mut self) {
        *self = self.add_usize(1);
    }
}

impl Seq for Seq12 {
    fn add_usize(&self, n: usize) -> Self {
        let n = (n % SEQ_SPACE as usize) as u16;
        Seq12::from_u16(self.n.wrapping_add(n))
    }

    fn sub(&self, other: &Self) -> usize {
        (self.n.wrapping_sub(other.n) & SEQ_MASK) as usize
    }

    fn zero() -> Self {
        Seq12::from_u16(0)
    }
}

impl PartialOrd for Seq12 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Seq12 {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.n == other.n {
            return Ordering::Equal;
        }
        match other.sub(self) < SEQ12_HALF_SPACE {
            true => Ordering::Less,
            false => Ordering::Greater,
        }
    }
}
