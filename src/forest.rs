//! Initializer describing the forests fed into the scoring engine.
//!
//! # Overview
//! Each partition of the engine is built from one [`ForestInit`]: a flat
//! table of nodes linked by integer ids, plus for every taxon the list of
//! leaf nodes where that taxon occurs. A [`TripartitionInit`] is simply the
//! ordered list of these per-partition forests.
//!
//! ```text
//!   id:     0   1   2   3   4
//!   node:   a   b   n   c   r
//!                  / \     / \
//!                 0   1   2   3
//!
//!   occurrences[taxon_a] = [0]
//!   occurrences[taxon_b] = [1]
//!   occurrences[taxon_c] = [3]
//! ```
//!
//! The structure is trusted as given: ids are not range-checked and cycles
//! are not detected. Producers must hand over a forest of rooted binary
//! trees.

use crate::score::Score;

/// Index of a node in a partition's node table.
pub type NodeId = usize;

/// Dense identifier of a taxon, shared by all partitions.
pub type TaxonId = usize;

/// One entry of the node table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForestNode<S: Score = f64> {
    /// Node immediately above, `None` for a root.
    pub parent: Option<NodeId>,
    /// Both children, `None` for a leaf. A node never has exactly one child.
    pub children: Option<(NodeId, NodeId)>,
    /// Multiplier applied when this node's statistics are folded into its parent.
    pub weight: S,
}

impl<S: Score> ForestNode<S> {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Forest topology and taxon occurrences of a single partition.
#[derive(Clone, Debug, Default)]
pub struct ForestInit<S: Score = f64> {
    pub nodes: Vec<ForestNode<S>>,
    /// `occurrences[taxon]` lists the leaves occupied by that taxon.
    pub occurrences: Vec<Vec<NodeId>>,
}

impl<S: Score> ForestInit<S> {
    pub fn new() -> Self {
        ForestInit {
            nodes: Vec::new(),
            occurrences: Vec::new(),
        }
    }

    /// Reserve occurrence lists for taxa `0..n` so that every taxon of the
    /// run is addressable even if it never occurs in this forest.
    pub fn with_taxa(mut self, n: usize) -> Self {
        if self.occurrences.len() < n {
            self.occurrences.resize_with(n, Vec::new);
        }
        self
    }

    pub fn add_leaf(&mut self, weight: S) -> NodeId {
        self.nodes.push(ForestNode {
            parent: None,
            children: None,
            weight,
        });
        self.nodes.len() - 1
    }

    /// Add an internal node above `left` and `right` and link them to it.
    pub fn add_internal(&mut self, left: NodeId, right: NodeId, weight: S) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(ForestNode {
            parent: None,
            children: Some((left, right)),
            weight,
        });
        self.nodes[left].parent = Some(id);
        self.nodes[right].parent = Some(id);
        id
    }

    /// Record that `taxon` occurs at `leaf`.
    pub fn add_occurrence(&mut self, taxon: TaxonId, leaf: NodeId) {
        if self.occurrences.len() <= taxon {
            self.occurrences.resize_with(taxon + 1, Vec::new);
        }
        self.occurrences[taxon].push(leaf);
    }

    /// Move all trees of `other` into this forest, shifting their node ids
    /// past the nodes already present.
    pub fn extend_from(&mut self, other: ForestInit<S>) {
        let offset = self.nodes.len();
        self.nodes.extend(other.nodes.into_iter().map(|node| ForestNode {
            parent: node.parent.map(|p| p + offset),
            children: node.children.map(|(l, r)| (l + offset, r + offset)),
            weight: node.weight,
        }));
        for (taxon, leaves) in other.occurrences.into_iter().enumerate() {
            for leaf in leaves {
                self.add_occurrence(taxon, leaf + offset);
            }
        }
    }

    pub fn num_taxa(&self) -> usize {
        self.occurrences.len()
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_root())
            .map(|(id, _)| id)
    }
}

/// Per-partition forests handed to [`Tripartition::new`](crate::Tripartition::new).
#[derive(Clone, Debug, Default)]
pub struct TripartitionInit<S: Score = f64> {
    pub partitions: Vec<ForestInit<S>>,
}

impl<S: Score> TripartitionInit<S> {
    pub fn new(partitions: Vec<ForestInit<S>>) -> Self {
        TripartitionInit { partitions }
    }

    /// Number of taxa addressable in at least one partition.
    pub fn num_taxa(&self) -> usize {
        self.partitions
            .iter()
            .map(ForestInit::num_taxa)
            .max()
            .unwrap_or(0)
    }

    pub fn num_nodes(&self) -> usize {
        self.partitions.iter().map(|p| p.nodes.len()).sum()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// `((A, B):0.5, (C, D):0.5)` with taxa 0..4 on the leaves in that order.
    pub fn quartet_forest() -> ForestInit<f64> {
        let mut forest = ForestInit::new();
        let leaves: Vec<NodeId> = (0..4).map(|_| forest.add_leaf(1.0)).collect();
        let n1 = forest.add_internal(leaves[0], leaves[1], 0.5);
        let n2 = forest.add_internal(leaves[2], leaves[3], 0.5);
        forest.add_internal(n1, n2, 1.0);
        for (taxon, &leaf) in leaves.iter().enumerate() {
            forest.add_occurrence(taxon, leaf);
        }
        forest
    }

    /// Random forest with unit-weight leaves; see [`random_weighted_forest`].
    pub fn random_forest(
        num_taxa: usize,
        leaf_taxa: &[TaxonId],
        picks: &[(usize, usize, f64)],
    ) -> ForestInit<f64> {
        let leaves: Vec<(TaxonId, f64)> = leaf_taxa.iter().map(|&t| (t, 1.0)).collect();
        random_weighted_forest(num_taxa, &leaves, picks)
    }

    /// Random forest: one leaf per `(taxon, weight)` entry of `leaves`, then
    /// each `(i, j, w)` pick merges two of the current roots under a node of
    /// weight `w`. Picks beyond the last possible merge are ignored, so the
    /// result may hold several trees.
    pub fn random_weighted_forest(
        num_taxa: usize,
        leaves: &[(TaxonId, f64)],
        picks: &[(usize, usize, f64)],
    ) -> ForestInit<f64> {
        let mut forest = ForestInit::new().with_taxa(num_taxa);
        let mut roots: Vec<NodeId> = leaves
            .iter()
            .map(|&(taxon, weight)| {
                let leaf = forest.add_leaf(weight);
                forest.add_occurrence(taxon, leaf);
                leaf
            })
            .collect();

        for &(i, j, weight) in picks {
            if roots.len() < 2 {
                break;
            }
            let left = roots.swap_remove(i % roots.len());
            let right = roots.swap_remove(j % roots.len());
            roots.push(forest.add_internal(left, right, weight));
        }
        forest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_internal_links_children() {
        let mut forest = ForestInit::<f64>::new();
        let a = forest.add_leaf(1.0);
        let b = forest.add_leaf(0.5);
        let n = forest.add_internal(a, b, 0.25);

        assert_eq!(forest.nodes[a].parent, Some(n));
        assert_eq!(forest.nodes[b].parent, Some(n));
        assert_eq!(forest.nodes[n].children, Some((a, b)));
        assert!(forest.nodes[n].is_root());
        assert!(forest.nodes[a].is_leaf());
        assert_eq!(forest.roots().collect::<Vec<_>>(), vec![n]);
    }

    #[test]
    fn test_occurrences_grow_on_demand() {
        let mut forest = ForestInit::<f64>::new();
        let a = forest.add_leaf(1.0);
        forest.add_occurrence(3, a);
        assert_eq!(forest.num_taxa(), 4);
        assert!(forest.occurrences[0].is_empty());
        assert_eq!(forest.occurrences[3], vec![a]);

        let forest = forest.with_taxa(6);
        assert_eq!(forest.num_taxa(), 6);
        let forest = forest.with_taxa(2);
        assert_eq!(forest.num_taxa(), 6);
    }

    #[test]
    fn test_extend_from_offsets_ids() {
        let mut forest = testing::quartet_forest();
        forest.extend_from(testing::quartet_forest());

        assert_eq!(forest.nodes.len(), 14);
        assert_eq!(forest.roots().collect::<Vec<_>>(), vec![6, 13]);
        assert_eq!(forest.occurrences[2], vec![2, 9]);
        assert_eq!(forest.nodes[13].children, Some((11, 12)));
        assert_eq!(forest.nodes[7].parent, Some(11));
    }

    #[test]
    fn test_initializer_counts() {
        let mut f1 = ForestInit::<f64>::new();
        let l = f1.add_leaf(1.0);
        f1.add_occurrence(1, l);
        let mut f2 = ForestInit::<f64>::new();
        let a = f2.add_leaf(1.0);
        let b = f2.add_leaf(1.0);
        f2.add_internal(a, b, 1.0);
        f2.add_occurrence(4, a);

        let init = TripartitionInit::new(vec![f1, f2]);
        assert_eq!(init.num_taxa(), 5);
        assert_eq!(init.num_nodes(), 4);
    }
}
