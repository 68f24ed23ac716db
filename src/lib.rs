//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `score`: numeric trait the engine is generic over (`f64`, `f32`).
//! - `class`: the three classes a taxon can be assigned to.
//! - `stats`: per-node statistics and the recurrence that combines them.
//! - `forest`: node tables and occurrence lists fed into the engine.
//! - `partition`: incremental scoring of one forest.
//! - `tripartition`: all partitions updated together, in parallel with rayon.
//! - `builder`: gene trees (`phylotree`) to forests, taxon naming, sharding.
//! - `io`: reading gene trees and assignments, writing score tables.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod builder;
pub mod class;
pub mod forest;
pub mod io;
pub mod partition;
pub mod score;
pub mod stats;
pub mod tripartition;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use builder::{build_initializer, BuildError, BuildOptions, Sharding, TaxonIndex, WeightScheme};
pub use class::{Class, ClassError};
pub use forest::{ForestInit, ForestNode, NodeId, TaxonId, TripartitionInit};
pub use io::{read_assignment, read_gene_trees, write_scores_tsv, TreeIoError};
pub use partition::Partition;
pub use score::Score;
pub use stats::NodeStats;
pub use tripartition::{Parallelism, Tripartition};
