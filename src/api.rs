//! Python binding layer for tripartition scoring.
//!
//! Exposes a stateful `TripartitionScorer` built from gene trees; Python
//! callers move species between classes and read the score after each move.

use phylotree::tree::Tree as PhyloTree;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::builder::{build_initializer, BuildOptions, Sharding, TaxonIndex, WeightScheme};
use crate::class::Class;
use crate::io::read_gene_trees;
use crate::tripartition::Tripartition;

fn parse_weights(weights: &str) -> PyResult<WeightScheme> {
    match weights.to_ascii_lowercase().as_str() {
        "unit" => Ok(WeightScheme::Unit),
        "length" => Ok(WeightScheme::Length),
        "decay" => Ok(WeightScheme::Decay),
        other => Err(PyValueError::new_err(format!(
            "Unknown weight scheme '{other}', expected 'unit', 'length' or 'decay'"
        ))),
    }
}

fn build_options(
    delimiter: Option<String>,
    weights: &str,
    shards: usize,
    remove_in_paralogs: bool,
) -> PyResult<BuildOptions> {
    Ok(BuildOptions {
        delimiter,
        weights: parse_weights(weights)?,
        sharding: match shards {
            0 => Sharding::PerTree,
            n => Sharding::Balanced(n),
        },
        remove_in_paralogs,
    })
}

/// Incremental tripartition score over a fixed set of gene trees.
///
/// Args:
///     newick_trees: List of Newick strings, one gene tree each
///     delimiter: Leaf labels are cut at this string to get the species name (default: None)
///     weights: Branch weighting, one of 'unit', 'length', 'decay' (default: 'length')
///     shards: Number of partitions to balance the trees into, 0 for one per tree (default: 0)
///     remove_in_paralogs: Reduce clades of a single species to one leaf (default: False)
///
/// Raises:
///     ValueError: If a tree cannot be parsed or no species are found
#[pyclass]
pub struct TripartitionScorer {
    index: TaxonIndex,
    engine: Tripartition<f64>,
}

impl TripartitionScorer {
    fn from_trees(trees: &[PhyloTree], options: &BuildOptions) -> PyResult<Self> {
        let (index, init) = build_initializer::<f64>(trees, options)
            .map_err(|e| PyValueError::new_err(format!("Failed to build scorer: {e}")))?;
        Ok(TripartitionScorer {
            index,
            engine: Tripartition::new(init),
        })
    }
}

#[pymethods]
impl TripartitionScorer {
    #[new]
    #[pyo3(signature = (
        newick_trees,
        delimiter=None,
        weights="length",
        shards=0,
        remove_in_paralogs=false
    ))]
    fn new(
        newick_trees: Vec<String>,
        delimiter: Option<String>,
        weights: &str,
        shards: usize,
        remove_in_paralogs: bool,
    ) -> PyResult<Self> {
        let trees = newick_trees
            .iter()
            .enumerate()
            .map(|(i, nwk)| {
                PhyloTree::from_newick(nwk.trim())
                    .map_err(|e| PyValueError::new_err(format!("Failed to parse tree {i}: {e}")))
            })
            .collect::<PyResult<Vec<_>>>()?;
        Self::from_trees(&trees, &build_options(delimiter, weights, shards, remove_in_paralogs)?)
    }

    /// Build a scorer from a Newick or NEXUS gene tree file.
    #[staticmethod]
    #[pyo3(signature = (
        path,
        delimiter=None,
        weights="length",
        shards=0,
        remove_in_paralogs=false
    ))]
    fn from_file(
        path: String,
        delimiter: Option<String>,
        weights: &str,
        shards: usize,
        remove_in_paralogs: bool,
    ) -> PyResult<Self> {
        let (_, trees): (Vec<String>, Vec<PhyloTree>) = read_gene_trees(&path)
            .map_err(|e| PyValueError::new_err(e.to_string()))?
            .into_iter()
            .unzip();
        Self::from_trees(&trees, &build_options(delimiter, weights, shards, remove_in_paralogs)?)
    }

    /// Move a species to class 0, 1 or 2, or unassign it with None.
    #[pyo3(signature = (taxon, cls=None))]
    fn update(&mut self, taxon: &str, cls: Option<i64>) -> PyResult<()> {
        let id = self
            .index
            .id(taxon)
            .ok_or_else(|| PyValueError::new_err(format!("Unknown taxon '{taxon}'")))?;
        let class = cls
            .map(Class::from_index)
            .transpose()
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        self.engine.update(id, class);
        Ok(())
    }

    /// Current class of a species, or None.
    fn class_of(&self, taxon: &str) -> PyResult<Option<usize>> {
        let id = self
            .index
            .id(taxon)
            .ok_or_else(|| PyValueError::new_err(format!("Unknown taxon '{taxon}'")))?;
        Ok(self.engine.class_of(id).map(Class::index))
    }

    fn score(&self) -> f64 {
        self.engine.score()
    }

    fn partition_scores(&self) -> Vec<f64> {
        self.engine.partition_scores()
    }

    /// Species names in taxon id order.
    fn taxa(&self) -> Vec<String> {
        self.index.names().to_vec()
    }
}

#[pymodule]
fn tripartition_score(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<TripartitionScorer>()?;
    Ok(())
}
