//! A single scoring partition: one forest, its node statistics and the
//! class of every taxon.
//!
//! # Update protocol
//! Reclassifying a taxon touches only the leaves where it occurs and their
//! ancestors:
//!
//! ```text
//! for each occurrence leaf ℓ of the taxon:
//!     ℓ.totals[old] -= ℓ.weight        (skipped when unassigned)
//!     ℓ.totals[new] += ℓ.weight        (skipped when unassigned)
//!     for each ancestor w of ℓ, bottom-up:
//!         total += w.recompute(children of w)
//! ```
//!
//! Each occurrence's walk finishes before the next one starts. An ancestor
//! shared by two occurrences is therefore recomputed twice, each time from
//! children that are already current, and the running total stays equal to
//! the sum of every node's `q`.
//!
//! The cost of one update is the summed depth of the taxon's occurrences.

use crate::class::Class;
use crate::forest::{ForestInit, ForestNode, NodeId, TaxonId};
use crate::score::Score;
use crate::stats::NodeStats;

#[derive(Clone, Debug)]
pub struct Partition<S: Score = f64> {
    nodes: Vec<ForestNode<S>>,
    stats: Vec<NodeStats<S>>,
    occurrences: Vec<Vec<NodeId>>,
    classes: Vec<Option<Class>>,
    total: S,
}

impl<S: Score> Partition<S> {
    /// Build a partition with every taxon unassigned and a score of zero.
    pub fn new(init: ForestInit<S>) -> Self {
        let ForestInit { nodes, occurrences } = init;
        Partition {
            stats: vec![NodeStats::zero(); nodes.len()],
            classes: vec![None; occurrences.len()],
            nodes,
            occurrences,
            total: S::ZERO,
        }
    }

    /// Move `taxon` to `class` (`None` unassigns it).
    ///
    /// Does nothing when the taxon already holds `class` or is not known to
    /// this partition.
    pub fn update(&mut self, taxon: TaxonId, class: Option<Class>) {
        let Partition {
            nodes,
            stats,
            occurrences,
            classes,
            total,
        } = self;

        let Some(slot) = classes.get_mut(taxon) else {
            return;
        };
        let old = *slot;
        if old == class {
            return;
        }

        for &leaf in &occurrences[taxon] {
            let weight = nodes[leaf].weight;
            if let Some(old) = old {
                stats[leaf].totals[old] -= weight;
            }
            if let Some(new) = class {
                stats[leaf].totals[new] += weight;
            }
            *total += propagate(nodes.as_slice(), stats.as_mut_slice(), leaf);
        }
        *slot = class;
    }

    /// Running total of all node contributions. O(1).
    #[inline]
    pub fn score(&self) -> S {
        self.total
    }

    pub fn class_of(&self, taxon: TaxonId) -> Option<Class> {
        self.classes.get(taxon).copied().flatten()
    }

    pub fn stats(&self, node: NodeId) -> &NodeStats<S> {
        &self.stats[node]
    }

    pub fn node_stats(&self) -> &[NodeStats<S>] {
        &self.stats
    }

    pub fn nodes(&self) -> &[ForestNode<S>] {
        &self.nodes
    }

    pub fn occurrences(&self, taxon: TaxonId) -> &[NodeId] {
        self.occurrences.get(taxon).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_taxa(&self) -> usize {
        self.classes.len()
    }

    /// Score recomputed from scratch for the current assignment.
    ///
    /// Rebuilds every internal node bottom-up in a scratch table seeded with
    /// the current leaf totals. The partition itself is left untouched, so
    /// this can be compared against [`score`](Self::score) to check the
    /// incremental bookkeeping.
    pub fn rescore(&self) -> S {
        let mut scratch: Vec<NodeStats<S>> = self
            .nodes
            .iter()
            .zip(&self.stats)
            .map(|(node, stats)| {
                let mut fresh = NodeStats::zero();
                if node.is_leaf() {
                    fresh.totals = stats.totals;
                }
                fresh
            })
            .collect();

        let mut total = S::ZERO;
        for id in postorder(&self.nodes) {
            let node = &self.nodes[id];
            if let Some((l, r)) = node.children {
                let (u, v) = (scratch[l], scratch[r]);
                total += scratch[id].recompute(&u, &v, node.weight);
            }
        }
        total
    }
}

/// Recompute every ancestor of `leaf`, bottom-up, and return the summed
/// change of their contributions.
#[inline]
fn propagate<S: Score>(nodes: &[ForestNode<S>], stats: &mut [NodeStats<S>], leaf: NodeId) -> S {
    let mut delta = S::ZERO;
    let mut current = nodes[leaf].parent;
    while let Some(w) = current {
        let node = &nodes[w];
        if let Some((l, r)) = node.children {
            let (u, v) = (stats[l], stats[r]);
            delta += stats[w].recompute(&u, &v, node.weight);
        }
        current = node.parent;
    }
    delta
}

/// Children-before-parent order over every tree of the forest.
///
/// Iterative so that caterpillar-shaped gene trees with thousands of leaves
/// do not exhaust the stack.
fn postorder<S: Score>(nodes: &[ForestNode<S>]) -> Vec<NodeId> {
    let mut order = Vec::with_capacity(nodes.len());
    let mut stack: Vec<(NodeId, bool)> = Vec::new();

    for (root, _) in nodes.iter().enumerate().filter(|(_, n)| n.is_root()) {
        stack.push((root, false));
        while let Some((id, expanded)) = stack.pop() {
            match nodes[id].children {
                Some((l, r)) if !expanded => {
                    stack.push((id, true));
                    stack.push((r, false));
                    stack.push((l, false));
                }
                _ => order.push(id),
            }
        }
    }
    order
}
