//! Turn parsed gene trees into the engine's initializer.
//!
//! # Overview
//! 1. Collect every leaf label of every tree and map it to a species name
//!    (the part before the first delimiter, or the whole label). Species are
//!    sorted alphabetically and numbered, so taxon ids do not depend on the
//!    order in which trees or leaves were read.
//! 2. Convert each tree into a binary forest fragment: unlabeled leaves are
//!    dropped, unifurcations collapsed, polytomies resolved into a
//!    caterpillar of unit-weight nodes. Optionally, clades made only of
//!    copies of one species (in-paralogs) are reduced to a single leaf.
//! 3. Group fragments into partitions, one per tree or a fixed number of
//!    partitions balanced by node count.
//!
//! ```text
//!   gene tree (A_1,(B_1,B_2,C_1)):0.3      species: A=0, B=1, C=2
//!
//!   forest:        n3 (w = weight(0.3))
//!                 /  \
//!                A    n2 (w = weight(len))
//!                    /  \
//!             (unit) n1   C
//!                   /  \
//!                  B    B          occurrences[B] = [leaf, leaf]
//! ```

use crate::forest::{ForestInit, NodeId, TaxonId, TripartitionInit};
use crate::score::Score;
use phylotree::tree::{Node, Tree as PhyloTree};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq)]
pub enum BuildError {
    #[error("no gene trees to build from")]
    NoTrees,

    #[error("gene trees contain no labeled leaves")]
    NoTaxa,

    #[error("gene tree {index} is malformed: {message}")]
    Tree { index: usize, message: String },

    #[error("leaf label '{0}' does not map to a known taxon")]
    UnknownTaxon(String),

    #[error("number of partitions must be positive")]
    ZeroShards,
}

/// How branch lengths become branch weights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WeightScheme {
    /// Every weight is 1.
    Unit,
    /// The branch length itself; missing lengths count as 1.
    #[default]
    Length,
    /// `exp(-length)`; missing lengths count as 0, giving weight 1.
    Decay,
}

impl WeightScheme {
    pub fn weight<S: Score>(self, length: Option<f64>) -> S {
        match (self, length) {
            (WeightScheme::Unit, _) => S::ONE,
            (WeightScheme::Length, Some(len)) => S::from_f64(len),
            (WeightScheme::Length, None) => S::ONE,
            (WeightScheme::Decay, Some(len)) => S::from_f64(-len).exp(),
            (WeightScheme::Decay, None) => S::ONE,
        }
    }
}

/// How gene trees are grouped into partitions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Sharding {
    /// One partition per gene tree.
    #[default]
    PerTree,
    /// Exactly `n` partitions; trees are assigned largest first to the
    /// partition with the fewest nodes so far.
    Balanced(usize),
}

#[derive(Clone, Debug, Default)]
pub struct BuildOptions {
    /// Leaf labels are cut at the first occurrence of this delimiter to get
    /// the species name (`"human_1"` → `"human"` with `"_"`).
    pub delimiter: Option<String>,
    pub weights: WeightScheme,
    pub sharding: Sharding,
    /// Reduce every clade whose leaves all belong to one species to a
    /// single leaf of that species.
    pub remove_in_paralogs: bool,
}

/// Dense numbering of species names.
#[derive(Clone, Debug, Default)]
pub struct TaxonIndex {
    names: Vec<String>,
    ids: HashMap<String, TaxonId>,
    delimiter: Option<String>,
}

impl TaxonIndex {
    /// Index every species that labels a leaf in `trees`.
    pub fn from_trees(trees: &[PhyloTree], delimiter: Option<&str>) -> Self {
        let mut names: Vec<String> = trees
            .iter()
            .flat_map(|tree| {
                tree.get_leaves()
                    .into_iter()
                    .filter_map(|id| tree.get(&id).ok()?.name.clone())
                    .collect::<Vec<_>>()
            })
            .map(|label| species_of(&label, delimiter).to_string())
            .collect();
        names.sort();
        names.dedup();
        Self::from_names(names, delimiter)
    }

    /// Index an explicit list of species names; ids follow the list order.
    pub fn from_names(names: Vec<String>, delimiter: Option<&str>) -> Self {
        let ids = names
            .iter()
            .enumerate()
            .map(|(id, name)| (name.clone(), id))
            .collect();
        TaxonIndex {
            names,
            ids,
            delimiter: delimiter.map(str::to_string),
        }
    }

    pub fn id(&self, species: &str) -> Option<TaxonId> {
        self.ids.get(species).copied()
    }

    /// Taxon of a raw leaf label, after cutting at the delimiter.
    pub fn taxon_of_label(&self, label: &str) -> Option<TaxonId> {
        self.id(species_of(label, self.delimiter.as_deref()))
    }

    pub fn name(&self, id: TaxonId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn species_of<'a>(label: &'a str, delimiter: Option<&str>) -> &'a str {
    match delimiter {
        Some(d) if !d.is_empty() => label.split(d).next().unwrap_or(label),
        _ => label,
    }
}

/// Convert gene tree number `tree_index` into a standalone forest fragment.
pub fn tree_to_forest<S: Score>(
    tree: &PhyloTree,
    tree_index: usize,
    index: &TaxonIndex,
    options: &BuildOptions,
) -> Result<ForestInit<S>, BuildError> {
    let mut forest = ForestInit::new().with_taxa(index.len());
    let root = tree.get_root().map_err(|e| BuildError::Tree {
        index: tree_index,
        message: e.to_string(),
    })?;
    let mut builder = ForestBuilder {
        tree,
        tree_index,
        index,
        weights: options.weights,
        forest: &mut forest,
    };
    let clades = if options.remove_in_paralogs {
        Some(builder.clades(root)?)
    } else {
        None
    };
    builder.append_tree(root, clades.as_ref())?;
    Ok(forest)
}

/// Species content of a gene-tree clade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Clade {
    /// No labeled leaf below.
    Empty,
    /// Every labeled leaf below belongs to this taxon.
    Single(TaxonId),
    Mixed,
}

impl Clade {
    fn merge(self, other: Clade) -> Clade {
        match (self, other) {
            (Clade::Empty, c) | (c, Clade::Empty) => c,
            (Clade::Single(a), Clade::Single(b)) if a == b => Clade::Single(a),
            _ => Clade::Mixed,
        }
    }
}

enum Visit {
    Enter(usize),
    /// All `arity` visited children have pushed their result.
    Exit { id: usize, arity: usize },
}

struct ForestBuilder<'a, S: Score> {
    tree: &'a PhyloTree,
    tree_index: usize,
    index: &'a TaxonIndex,
    weights: WeightScheme,
    forest: &'a mut ForestInit<S>,
}

impl<'a, S: Score> ForestBuilder<'a, S> {
    fn node(&self, id: usize) -> Result<&'a Node, BuildError> {
        let tree = self.tree;
        tree.get(&id).map_err(|e| BuildError::Tree {
            index: self.tree_index,
            message: e.to_string(),
        })
    }

    /// Taxon of a leaf, `None` for an unlabeled one.
    fn leaf_taxon(&self, node: &Node) -> Result<Option<TaxonId>, BuildError> {
        let Some(label) = node.name.as_deref().filter(|l| !l.is_empty()) else {
            return Ok(None);
        };
        self.index
            .taxon_of_label(label)
            .map(Some)
            .ok_or_else(|| BuildError::UnknownTaxon(label.to_string()))
    }

    /// Species content of every clade below `root`.
    fn clades(&self, root: usize) -> Result<HashMap<usize, Clade>, BuildError> {
        let mut clades = HashMap::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            let node = self.node(id)?;
            if node.children.is_empty() {
                let clade = self.leaf_taxon(node)?.map_or(Clade::Empty, Clade::Single);
                clades.insert(id, clade);
            } else if expanded {
                let clade = node
                    .children
                    .iter()
                    .filter_map(|c| clades.get(c).copied())
                    .fold(Clade::Empty, Clade::merge);
                clades.insert(id, clade);
            } else {
                stack.push((id, true));
                stack.extend(node.children.iter().map(|&c| (c, false)));
            }
        }
        Ok(clades)
    }

    /// Append the binary image of the tree below `root`, walking it with an
    /// explicit stack. With `clades`, every single-species clade is reduced
    /// to the path down its first labeled child, which leaves one leaf.
    fn append_tree(
        &mut self,
        root: usize,
        clades: Option<&HashMap<usize, Clade>>,
    ) -> Result<Option<NodeId>, BuildError> {
        let clade_of = |id: &usize| clades.and_then(|c| c.get(id)).copied();
        let mut stack = vec![Visit::Enter(root)];
        let mut built: Vec<Option<NodeId>> = Vec::new();

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    let node = self.node(id)?;
                    if node.children.is_empty() {
                        let leaf = match self.leaf_taxon(node)? {
                            Some(taxon) => {
                                let weight = self.weights.weight(node.parent_edge);
                                let leaf = self.forest.add_leaf(weight);
                                self.forest.add_occurrence(taxon, leaf);
                                Some(leaf)
                            }
                            None => None,
                        };
                        built.push(leaf);
                        continue;
                    }

                    let children: Vec<usize> = match clade_of(&id) {
                        Some(Clade::Single(_)) => node
                            .children
                            .iter()
                            .copied()
                            .find(|c| matches!(clade_of(c), Some(Clade::Single(_))))
                            .into_iter()
                            .collect(),
                        _ => node.children.clone(),
                    };
                    stack.push(Visit::Exit {
                        id,
                        arity: children.len(),
                    });
                    stack.extend(children.into_iter().rev().map(Visit::Enter));
                }
                Visit::Exit { id, arity } => {
                    let node = self.node(id)?;
                    let weight: S = self.weights.weight(node.parent_edge);
                    let kids: Vec<NodeId> = built
                        .split_off(built.len() - arity)
                        .into_iter()
                        .flatten()
                        .collect();
                    built.push(self.join(&kids, weight));
                }
            }
        }
        Ok(built.pop().flatten())
    }

    /// Resolve the built children of one gene-tree node into binary nodes.
    fn join(&mut self, kids: &[NodeId], weight: S) -> Option<NodeId> {
        match kids {
            [] => None,
            &[only] => {
                // Unifurcation: the single child absorbs this node's branch.
                let child = &mut self.forest.nodes[only];
                child.weight = child.weight * weight;
                Some(only)
            }
            [first, middle @ .., last] => {
                let mut acc = *first;
                for &next in middle {
                    acc = self.forest.add_internal(acc, next, S::ONE);
                }
                Some(self.forest.add_internal(acc, *last, weight))
            }
        }
    }
}

/// Build the taxon index and the per-partition forests from gene trees.
pub fn build_initializer<S: Score>(
    trees: &[PhyloTree],
    options: &BuildOptions,
) -> Result<(TaxonIndex, TripartitionInit<S>), BuildError> {
    if trees.is_empty() {
        return Err(BuildError::NoTrees);
    }
    let index = TaxonIndex::from_trees(trees, options.delimiter.as_deref());
    if index.is_empty() {
        return Err(BuildError::NoTaxa);
    }
    let init = build_with_index(trees, &index, options)?;
    info!(
        "Built {} partition(s) with {} nodes over {} taxa from {} gene trees",
        init.partitions.len(),
        init.num_nodes(),
        index.len(),
        trees.len()
    );
    Ok((index, init))
}

/// Like [`build_initializer`] but with a caller-supplied taxon index.
pub fn build_with_index<S: Score>(
    trees: &[PhyloTree],
    index: &TaxonIndex,
    options: &BuildOptions,
) -> Result<TripartitionInit<S>, BuildError> {
    let fragments = trees
        .iter()
        .enumerate()
        .map(|(i, tree)| tree_to_forest(tree, i, index, options))
        .collect::<Result<Vec<ForestInit<S>>, _>>()?;

    let partitions = match options.sharding {
        Sharding::PerTree => fragments,
        Sharding::Balanced(0) => return Err(BuildError::ZeroShards),
        Sharding::Balanced(n) => balance(fragments, n, index.len()),
    };
    debug!("Sharded gene trees into {} partition(s)", partitions.len());
    Ok(TripartitionInit::new(partitions))
}

/// Longest-processing-time grouping of fragments into `n` partitions.
fn balance<S: Score>(
    mut fragments: Vec<ForestInit<S>>,
    n: usize,
    num_taxa: usize,
) -> Vec<ForestInit<S>> {
    fragments.sort_by_key(|f| std::cmp::Reverse(f.nodes.len()));

    let mut shards: Vec<ForestInit<S>> = (0..n)
        .map(|_| ForestInit::new().with_taxa(num_taxa))
        .collect();
    for fragment in fragments {
        if let Some(lightest) = shards.iter_mut().min_by_key(|s| s.nodes.len()) {
            lightest.extend_from(fragment);
        }
    }
    shards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;
    use crate::Tripartition;
    use approx::assert_relative_eq;

    fn trees(newicks: &[&str]) -> Vec<PhyloTree> {
        newicks
            .iter()
            .map(|nwk| PhyloTree::from_newick(nwk).unwrap())
            .collect()
    }

    #[test]
    fn test_species_of() {
        assert_eq!(species_of("human_1", Some("_")), "human");
        assert_eq!(species_of("human", Some("_")), "human");
        assert_eq!(species_of("human_1", None), "human_1");
        assert_eq!(species_of("human_1", Some("")), "human_1");
    }

    #[test]
    fn test_weight_schemes() {
        assert_eq!(WeightScheme::Unit.weight::<f64>(Some(0.3)), 1.0);
        assert_eq!(WeightScheme::Length.weight::<f64>(Some(0.3)), 0.3);
        assert_eq!(WeightScheme::Length.weight::<f64>(None), 1.0);
        assert_relative_eq!(WeightScheme::Decay.weight::<f64>(Some(1.0)), (-1.0f64).exp());
        assert_eq!(WeightScheme::Decay.weight::<f64>(None), 1.0);
    }

    #[test]
    fn test_taxon_index_is_sorted_and_collapses_copies() {
        let ts = trees(&["((D_1,B_1),(C_1,(A_1,B_2)));", "((A_2,C_1),E_1);"]);
        let index = TaxonIndex::from_trees(&ts, Some("_"));
        assert_eq!(index.names(), &["A", "B", "C", "D", "E"]);
        assert_eq!(index.taxon_of_label("B_2"), Some(1));
        assert_eq!(index.id("E"), Some(4));
        assert_eq!(index.name(2), Some("C"));
        assert_eq!(index.taxon_of_label("Z_1"), None);
    }

    #[test]
    fn test_binary_tree_becomes_matching_forest() {
        let ts = trees(&["((A:1,B:1):0.5,(C:1,D:1):0.5);"]);
        let (index, init) = build_initializer::<f64>(&ts, &BuildOptions::default()).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(init.partitions.len(), 1);

        let forest = &init.partitions[0];
        assert_eq!(forest.nodes.len(), 7);
        assert_eq!(forest.roots().count(), 1);
        for taxon in 0..4 {
            assert_eq!(forest.occurrences[taxon].len(), 1);
        }

        let mut engine = Tripartition::new(init);
        engine.apply(&[
            Some(Class::First),
            Some(Class::First),
            Some(Class::Second),
            Some(Class::Third),
        ]);
        assert_relative_eq!(engine.score(), 0.9375);
    }

    #[test]
    fn test_polytomy_is_resolved() {
        let ts = trees(&["(A,B,C,D);"]);
        let (_, init) = build_initializer::<f64>(&ts, &BuildOptions::default()).unwrap();
        let forest = &init.partitions[0];
        // 4 leaves, 3 binary internal nodes.
        assert_eq!(forest.nodes.len(), 7);
        assert!(forest.nodes.iter().all(|n| n.is_leaf() || n.children.is_some()));
        assert_eq!(forest.roots().count(), 1);
    }

    #[test]
    fn test_multi_copy_leaves_share_taxon() {
        let ts = trees(&["((A_1,A_2),(B_1,C_1));"]);
        let options = BuildOptions {
            delimiter: Some("_".to_string()),
            ..Default::default()
        };
        let (index, init) = build_initializer::<f64>(&ts, &options).unwrap();
        let a = index.id("A").unwrap();
        assert_eq!(init.partitions[0].occurrences[a].len(), 2);
    }

    #[test]
    fn test_unifurcation_collapses_weights() {
        let ts = trees(&["(((A:0.5):0.5,B:1):1,C:1);"]);
        let (index, init) = build_initializer::<f64>(&ts, &BuildOptions::default()).unwrap();
        let forest = &init.partitions[0];
        let a = forest.occurrences[index.id("A").unwrap()][0];
        assert_eq!(forest.nodes[a].weight, 0.25);
        assert_eq!(forest.nodes.len(), 5);
    }

    #[test]
    fn test_deep_caterpillar_does_not_overflow() {
        const LEAVES: usize = 25_000;
        let mut newick = String::with_capacity(LEAVES * 10);
        for i in 0..LEAVES - 1 {
            newick.push_str(&format!("(t{i}:1,"));
        }
        newick.push_str(&format!("t{}:1", LEAVES - 1));
        newick.push_str(&")".repeat(LEAVES - 1));
        newick.push(';');

        let ts = trees(&[newick.as_str()]);
        let (index, init) = build_initializer::<f64>(&ts, &BuildOptions::default()).unwrap();
        assert_eq!(index.len(), LEAVES);
        assert_eq!(init.num_nodes(), 2 * LEAVES - 1);
        assert_eq!(init.partitions[0].roots().count(), 1);

        let mut engine = Tripartition::new(init);
        let deepest = index.id(&format!("t{}", LEAVES - 1)).unwrap();
        engine.update(deepest, Some(Class::First));
        assert_eq!(engine.score(), engine.rescore());
    }

    #[test]
    fn test_in_paralogs_are_reduced_to_one_leaf() {
        let ts = trees(&["((A_1,A_2):0.5,(B_1,(C_1,C_2):0.4):1);"]);
        let keep = BuildOptions {
            delimiter: Some("_".to_string()),
            ..Default::default()
        };
        let (index, init) = build_initializer::<f64>(&ts, &keep).unwrap();
        assert_eq!(init.num_nodes(), 9);
        assert_eq!(init.partitions[0].occurrences[index.id("A").unwrap()].len(), 2);

        let collapse = BuildOptions {
            remove_in_paralogs: true,
            ..keep
        };
        let (index, init) = build_initializer::<f64>(&ts, &collapse).unwrap();
        let forest = &init.partitions[0];
        assert_eq!(forest.nodes.len(), 5);
        assert_eq!(forest.roots().count(), 1);

        let a = &forest.occurrences[index.id("A").unwrap()];
        let c = &forest.occurrences[index.id("C").unwrap()];
        assert_eq!((a.len(), c.len()), (1, 1));
        // The kept copy absorbs the branch of the collapsed clade.
        assert_eq!(forest.nodes[a[0]].weight, 0.5);
        assert_eq!(forest.nodes[c[0]].weight, 0.4);
    }

    #[test]
    fn test_single_species_tree_collapses_to_a_leaf() {
        let ts = trees(&["((A_1,A_2),(A_3,A_4));"]);
        let options = BuildOptions {
            delimiter: Some("_".to_string()),
            remove_in_paralogs: true,
            ..Default::default()
        };
        let (_, init) = build_initializer::<f64>(&ts, &options).unwrap();
        assert_eq!(init.num_nodes(), 1);
        assert!(init.partitions[0].nodes[0].is_leaf());
        assert_eq!(init.partitions[0].occurrences[0], vec![0]);
    }

    #[test]
    fn test_clade_merge() {
        assert_eq!(Clade::Empty.merge(Clade::Single(2)), Clade::Single(2));
        assert_eq!(Clade::Single(2).merge(Clade::Empty), Clade::Single(2));
        assert_eq!(Clade::Single(2).merge(Clade::Single(2)), Clade::Single(2));
        assert_eq!(Clade::Single(2).merge(Clade::Single(3)), Clade::Mixed);
        assert_eq!(Clade::Mixed.merge(Clade::Empty), Clade::Mixed);
    }

    #[test]
    fn test_balanced_sharding() {
        let ts = trees(&[
            "((A,B),(C,D));",
            "((A,C),(B,D));",
            "(A,(B,(C,D)));",
            "((A,B),C);",
            "(A,B);",
        ]);
        let options = BuildOptions {
            sharding: Sharding::Balanced(2),
            ..Default::default()
        };
        let (_, init) = build_initializer::<f64>(&ts, &options).unwrap();
        assert_eq!(init.partitions.len(), 2);
        assert_eq!(init.num_nodes(), 7 + 7 + 7 + 5 + 3);
        let roots: usize = init.partitions.iter().map(|p| p.roots().count()).sum();
        assert_eq!(roots, 5);

        let per_tree = build_initializer::<f64>(&ts, &BuildOptions::default()).unwrap().1;
        assert_eq!(per_tree.partitions.len(), 5);
    }

    #[test]
    fn test_sharding_does_not_change_score() {
        let ts = trees(&[
            "((A:1,B:1):0.5,(C:1,D:1):0.4);",
            "((A:1,C:1):0.3,(B:1,D:1):0.7);",
            "(A:1,(B:1,(C:1,D:1):0.2):0.9);",
        ]);
        let assignment = [
            Some(Class::First),
            Some(Class::Second),
            Some(Class::First),
            Some(Class::Third),
        ];
        let score = |sharding| {
            let options = BuildOptions {
                sharding,
                ..Default::default()
            };
            let (_, init) = build_initializer::<f64>(&ts, &options).unwrap();
            let mut engine = Tripartition::new(init);
            engine.apply(&assignment);
            engine.score()
        };
        let per_tree = score(Sharding::PerTree);
        assert_relative_eq!(per_tree, score(Sharding::Balanced(1)), epsilon = 1e-12);
        assert_relative_eq!(per_tree, score(Sharding::Balanced(2)), epsilon = 1e-12);
    }

    #[test]
    fn test_build_errors() {
        assert_eq!(
            build_initializer::<f64>(&[], &BuildOptions::default()).unwrap_err(),
            BuildError::NoTrees
        );

        let ts = trees(&["((A,B),C);"]);
        let options = BuildOptions {
            sharding: Sharding::Balanced(0),
            ..Default::default()
        };
        assert_eq!(
            build_initializer::<f64>(&ts, &options).unwrap_err(),
            BuildError::ZeroShards
        );

        let index = TaxonIndex::from_names(vec!["A".into(), "B".into()], None);
        assert_eq!(
            build_with_index::<f64>(&ts, &index, &BuildOptions::default()).unwrap_err(),
            BuildError::UnknownTaxon("C".into())
        );
    }
}
