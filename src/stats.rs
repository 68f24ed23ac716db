//! Per-node aggregate statistics and the recurrence that combines two
//! children into their parent.
//!
//! # Overview
//! Every forest node carries a [`NodeStats`] record:
//!
//! | Field          | Meaning                                                        |
//! |----------------|----------------------------------------------------------------|
//! | `totals`       | weighted number of leaves of each class below the node         |
//! | `pairs`        | pairwise products of child totals, accumulated unscaled        |
//! | `scaled_pairs` | the same products, scaled by the squared branch weight per level |
//! | `triples`      | per-class triple-product accumulator built from pair differences |
//! | `q`            | the node's contribution to the partition score                 |
//!
//! Leaves only ever hold `totals`; everything else is produced by
//! [`NodeStats::recompute`] from the two children.
//!
//! # Why two pair forms
//! `pairs` counts leaf pairs that meet below a node, `scaled_pairs` counts the
//! same pairs discounted by the branch weights between the pair's meeting
//! point and the node. Their difference `pairs - scaled_pairs` vanishes when
//! every weight is 1, and it is this difference that feeds `triples` and `q`.
//! Because each level multiplies its totals by its own weight, an ancestor can
//! fold a whole subtree in as if it were a single weighted leaf.
//!
//! # Class slots
//! Slot `k` of [`Totals`] holds class `k`. [`PairSums`] stores the three
//! same-class products in `same[k]` and the three mixed products in
//! `mixed[k]`, where `mixed[k]` pairs the two classes *other than* `k`:
//!
//! ```text
//! same  = [xx, yy, zz]
//! mixed = [yz, xz, xy]
//! ```
//!
//! The recurrence is symmetric under any permutation of the three classes,
//! so which class lands in which slot never changes a score.

use crate::class::Class;
use crate::score::Score;
use std::ops::{Index, IndexMut};

/// Weighted leaf counts per class.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Totals<S: Score = f64>(pub [S; 3]);

impl<S: Score> Totals<S> {
    #[inline]
    pub fn zero() -> Self {
        Totals([S::ZERO; 3])
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&v| v == S::ZERO)
    }

    #[inline]
    fn sum_scaled(a: &Self, b: &Self, weight: S) -> Self {
        Totals([
            (a.0[0] + b.0[0]) * weight,
            (a.0[1] + b.0[1]) * weight,
            (a.0[2] + b.0[2]) * weight,
        ])
    }
}

impl<S: Score> Index<Class> for Totals<S> {
    type Output = S;

    #[inline]
    fn index(&self, class: Class) -> &S {
        &self.0[class.index()]
    }
}

impl<S: Score> IndexMut<Class> for Totals<S> {
    #[inline]
    fn index_mut(&mut self, class: Class) -> &mut S {
        &mut self.0[class.index()]
    }
}

/// The six pairwise accumulators of a node.
///
/// `same[k]` accumulates products of class `k` with class `k`; `mixed[k]`
/// accumulates products of the two classes other than `k`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PairSums<S: Score = f64> {
    pub same: [S; 3],
    pub mixed: [S; 3],
}

impl<S: Score> PairSums<S> {
    #[inline]
    pub fn zero() -> Self {
        PairSums {
            same: [S::ZERO; 3],
            mixed: [S::ZERO; 3],
        }
    }

    /// Pairs formed by taking one leaf from each side: `u.x * v.x` for
    /// same-class slots and `u.y * v.z + u.z * v.y` for mixed slots.
    #[inline]
    pub fn cross(u: &Totals<S>, v: &Totals<S>) -> Self {
        let mut out = Self::zero();
        for class in Class::ALL {
            let k = class.index();
            let (i, j) = class.others();
            out.same[k] = u[class] * v[class];
            out.mixed[k] = u[i] * v[j] + u[j] * v[i];
        }
        out
    }

    /// Pairs below a node: everything already paired in either child plus
    /// the pairs that meet at the node itself.
    #[inline]
    pub fn join(u: &Self, v: &Self, u_totals: &Totals<S>, v_totals: &Totals<S>) -> Self {
        let cross = Self::cross(u_totals, v_totals);
        let mut out = Self::zero();
        for k in 0..3 {
            out.same[k] = u.same[k] + v.same[k] + cross.same[k];
            out.mixed[k] = u.mixed[k] + v.mixed[k] + cross.mixed[k];
        }
        out
    }

    #[inline]
    pub fn scale(mut self, factor: S) -> Self {
        for k in 0..3 {
            self.same[k] = self.same[k] * factor;
            self.mixed[k] = self.mixed[k] * factor;
        }
        self
    }

    /// Slot-wise `self - other`.
    #[inline]
    pub fn difference(&self, other: &Self) -> Self {
        let mut out = Self::zero();
        for k in 0..3 {
            out.same[k] = self.same[k] - other.same[k];
            out.mixed[k] = self.mixed[k] - other.mixed[k];
        }
        out
    }
}

/// Aggregate statistics of one forest node.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeStats<S: Score = f64> {
    pub totals: Totals<S>,
    pub pairs: PairSums<S>,
    pub scaled_pairs: PairSums<S>,
    pub triples: Totals<S>,
    pub q: S,
}

impl<S: Score> NodeStats<S> {
    pub fn zero() -> Self {
        NodeStats {
            totals: Totals::zero(),
            pairs: PairSums::zero(),
            scaled_pairs: PairSums::zero(),
            triples: Totals::zero(),
            q: S::ZERO,
        }
    }

    /// Statistics of a node with children `u` (first) and `v` (second) and
    /// branch weight `weight`.
    ///
    /// # Recurrence
    /// With `D = pairs - scaled_pairs` for each child and `(i, j)` the two
    /// classes other than `k`:
    ///
    /// ```text
    /// totals       = (u.totals + v.totals) * w
    /// pairs        =  u.pairs + v.pairs + cross(u.totals, v.totals)
    /// scaled_pairs = (u.scaled_pairs + v.scaled_pairs + cross(u.totals, v.totals)) * w²
    /// triples[k]   = (u.triples[k] + v.triples[k]
    ///                 + u.T[i]·v.D.same[j] + u.D.same[j]·v.T[i]
    ///                 + u.T[j]·v.D.same[i] + u.D.same[i]·v.T[j]) * w
    /// q            = Σk u.T[k]·v.triples[k] + v.T[k]·u.triples[k]
    ///              + Σk u.pairs.same[k]·v.pairs.mixed[k]
    ///                 - u.scaled_pairs.same[k]·v.scaled_pairs.mixed[k]
    /// ```
    ///
    /// The last sum takes the same-class pairs from the first child and the
    /// mixed pairs from the second one, so child order is significant.
    pub fn join(u: &Self, v: &Self, weight: S) -> Self {
        let totals = Totals::sum_scaled(&u.totals, &v.totals, weight);
        let pairs = PairSums::join(&u.pairs, &v.pairs, &u.totals, &v.totals);
        let scaled_pairs =
            PairSums::join(&u.scaled_pairs, &v.scaled_pairs, &u.totals, &v.totals)
                .scale(weight * weight);

        let du = u.pairs.difference(&u.scaled_pairs);
        let dv = v.pairs.difference(&v.scaled_pairs);

        let mut triples = Totals::zero();
        for class in Class::ALL {
            let (i, j) = class.others();
            let (ii, jj) = (i.index(), j.index());
            triples[class] = (u.triples[class]
                + v.triples[class]
                + u.totals[i] * dv.same[jj]
                + du.same[jj] * v.totals[i]
                + u.totals[j] * dv.same[ii]
                + du.same[ii] * v.totals[j])
                * weight;
        }

        let mut q = S::ZERO;
        for class in Class::ALL {
            let k = class.index();
            q += u.totals[class] * v.triples[class] + v.totals[class] * u.triples[class];
            q += u.pairs.same[k] * v.pairs.mixed[k]
                - u.scaled_pairs.same[k] * v.scaled_pairs.mixed[k];
        }

        NodeStats {
            totals,
            pairs,
            scaled_pairs,
            triples,
            q,
        }
    }

    /// Replace `self` with the join of `u` and `v` and return `q_new - q_old`.
    ///
    /// The caller adds the returned delta to its running total; summed over a
    /// root-ward walk this keeps the total equal to the sum of all `q`.
    #[inline]
    pub fn recompute(&mut self, u: &Self, v: &Self, weight: S) -> S {
        let old_q = self.q;
        *self = Self::join(u, v, weight);
        self.q - old_q
    }
}
