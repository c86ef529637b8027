use std::fmt::Debug;

/// Wrapping sequence number.
///
/// `Ord` is only meaningful between sequences less than half the space apart.
pub trait Seq: Debug + Copy + Eq + Ord {
    fn add_usize(&self, n: usize) -> Self;
    /// Distance from `other` forward to `self`, modulo the sequence space.
    fn sub(&self, other: &Self) -> usize;
    fn zero() -> Self;
}
