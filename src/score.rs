//! Numeric type shared by every weight and score in the engine.
//!
//! The incremental bookkeeping adds signed deltas to a running total, so a
//! single engine must use one precision throughout. All engine types are
//! generic over [`Score`] and default to `f64`.

use std::fmt::{Debug, Display};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Floating-point precision used for branch weights, node statistics and scores.
///
/// Implemented for `f32` and `f64`. `f32` halves the size of the node
/// statistics table; `f64` keeps rounding drift of long update sequences small.
pub trait Score:
    Copy
    + Default
    + Debug
    + Display
    + PartialOrd
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + Sum
    + 'static
{
    const ZERO: Self;
    const ONE: Self;

    /// Convert from `f64`, rounding if the target is narrower.
    fn from_f64(v: f64) -> Self;

    /// Widen to `f64`.
    fn to_f64(self) -> f64;

    /// `e^self`, used by the decaying branch-weight scheme.
    fn exp(self) -> Self;
}

impl Score for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn exp(self) -> Self {
        f64::exp(self)
    }
}

impl Score for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn exp(self) -> Self {
        f32::exp(self)
    }
}
