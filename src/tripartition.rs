//! The aggregate scoring engine: independent partitions updated together.
//!
//! # Overview
//! The taxon set is sharded into partitions (for example one per gene tree,
//! or a few balanced groups of gene trees). Partitions share no state, so a
//! reclassification fans out to all of them at once:
//!
//! ```text
//!  update(t, c) ──┬── partition 0   (calling thread)
//!                 ├── partition 1   (rayon task)
//!                 ├── ...
//!                 └── partition n   (rayon task)
//!                      ── join ──▶ return
//! ```
//!
//! `update` takes `&mut self`, so the borrow checker rules out a second
//! update or a `score()` read while one is in flight, and `split_first_mut`
//! hands every task a disjoint `&mut Partition`.

use crate::class::Class;
use crate::forest::{TaxonId, TripartitionInit};
use crate::partition::Partition;
use crate::score::Score;
use rayon::prelude::*;

/// How partition updates are scheduled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Parallelism {
    /// Update partitions one after another on the calling thread.
    Sequential,
    /// Run the first partition on the calling thread and every other
    /// partition as its own rayon task, then join.
    #[default]
    Parallel,
}

impl Parallelism {
    /// `1` thread means sequential, anything else (including `0` for "all
    /// cores") allows parallel execution.
    pub fn from_threads(n_threads: usize) -> Self {
        match n_threads {
            1 => Parallelism::Sequential,
            _ => Parallelism::Parallel,
        }
    }
}

/// Run `op` on `first` on the calling thread and on every item of `rest` as
/// its own rayon task; returns once all of them are done.
fn fork_join<T, F>(first: &mut T, rest: &mut [T], op: F)
where
    T: Send,
    F: Fn(&mut T) + Sync,
{
    if rest.is_empty() {
        op(first);
        return;
    }
    let op = &op;
    rayon::in_place_scope(|s| {
        for item in rest.iter_mut() {
            s.spawn(move |_| op(item));
        }
        op(first);
    });
}

#[derive(Clone, Debug)]
pub struct Tripartition<S: Score = f64> {
    parts: Vec<Partition<S>>,
    parallelism: Parallelism,
}

impl<S: Score> Tripartition<S> {
    /// Build one partition per forest of the initializer.
    ///
    /// Every partition is sized for the full taxon range of the initializer,
    /// so any taxon id below [`num_taxa`](Self::num_taxa) is valid for all of
    /// them.
    pub fn new(init: TripartitionInit<S>) -> Self {
        let num_taxa = init.num_taxa();
        let parts = init
            .partitions
            .into_par_iter()
            .map(|forest| Partition::new(forest.with_taxa(num_taxa)))
            .collect();
        Tripartition {
            parts,
            parallelism: Parallelism::default(),
        }
    }

    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    /// Move `taxon` to `class` in every partition and wait for all of them.
    ///
    /// A no-op when the taxon already holds `class`.
    pub fn update(&mut self, taxon: TaxonId, class: Option<Class>) {
        let Some((first, rest)) = self.parts.split_first_mut() else {
            return;
        };
        if first.class_of(taxon) == class {
            return;
        }

        match self.parallelism {
            Parallelism::Parallel => fork_join(first, rest, |part| part.update(taxon, class)),
            Parallelism::Sequential => {
                first.update(taxon, class);
                for part in rest.iter_mut() {
                    part.update(taxon, class);
                }
            }
        }
    }

    /// Apply a whole assignment, one taxon at a time. `assignment[t]` is the
    /// class of taxon `t`.
    pub fn apply(&mut self, assignment: &[Option<Class>]) {
        for (taxon, &class) in assignment.iter().enumerate() {
            self.update(taxon, class);
        }
    }

    /// Sum of all partition scores. O(number of partitions).
    pub fn score(&self) -> S {
        self.parts.iter().map(Partition::score).sum()
    }

    pub fn partition_scores(&self) -> Vec<S> {
        self.parts.iter().map(Partition::score).collect()
    }

    /// Sum of all partitions rescored from scratch; see [`Partition::rescore`].
    pub fn rescore(&self) -> S {
        self.parts.par_iter().map(Partition::rescore).sum()
    }

    pub fn class_of(&self, taxon: TaxonId) -> Option<Class> {
        self.parts.first().and_then(|p| p.class_of(taxon))
    }

    pub fn partitions(&self) -> &[Partition<S>] {
        &self.parts
    }

    pub fn num_partitions(&self) -> usize {
        self.parts.len()
    }

    pub fn num_taxa(&self) -> usize {
        self.parts.first().map_or(0, Partition::num_taxa)
    }
}
