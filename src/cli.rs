use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tripartition_score::builder::{BuildOptions, Sharding, WeightScheme};
use tripartition_score::Parallelism;

/// Score a three-class assignment of species against a set of gene trees.
///
/// Gene trees are read from a Newick (one tree per line) or NEXUS file, the
/// assignment from a `taxon<TAB>class` table. The total score is printed on
/// stdout.
#[derive(Parser, Debug)]
#[command(name = "tripartition-score", version, about = "Tripartition scores for gene trees")]
pub struct Cli {
    /// Gene trees: Newick, one tree per line, or NEXUS; `.gz` accepted
    #[arg(short, long, value_name = "PATH")]
    pub input: PathBuf,

    /// Class assignment: `taxon<TAB>class` with class 0, 1, 2 or `-`
    #[arg(short, long, value_name = "PATH")]
    pub assignment: PathBuf,

    /// Write per-partition scores and the total as TSV (`-` for stdout, `.gz` to compress)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Leaf labels are cut at this delimiter to get the species name
    #[arg(short, long, value_name = "STR")]
    pub delimiter: Option<String>,

    /// How branch lengths become branch weights
    #[arg(long, value_enum, default_value_t = WeightArg::Length)]
    pub weights: WeightArg,

    /// Number of partitions the gene trees are balanced into (0 = one per tree)
    #[arg(long, value_name = "NUM", default_value_t = 0)]
    pub shards: usize,

    /// Reduce every clade made only of copies of one species to a single leaf
    #[arg(long)]
    pub remove_in_paralogs: bool,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, value_name = "NUM")]
    pub threads: Option<usize>,

    /// Update partitions one after another instead of in parallel
    #[arg(long)]
    pub sequential: bool,

    /// Recompute the score from scratch and fail if it differs
    #[arg(long)]
    pub verify: bool,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum WeightArg {
    Unit,
    Length,
    Decay,
}

impl From<WeightArg> for WeightScheme {
    fn from(arg: WeightArg) -> Self {
        match arg {
            WeightArg::Unit => WeightScheme::Unit,
            WeightArg::Length => WeightScheme::Length,
            WeightArg::Decay => WeightScheme::Decay,
        }
    }
}

impl Cli {
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            delimiter: self.delimiter.clone(),
            weights: self.weights.into(),
            sharding: match self.shards {
                0 => Sharding::PerTree,
                n => Sharding::Balanced(n),
            },
            remove_in_paralogs: self.remove_in_paralogs,
        }
    }

    pub fn parallelism(&self) -> Parallelism {
        if self.sequential {
            Parallelism::Sequential
        } else {
            self.threads.map_or(Parallelism::Parallel, Parallelism::from_threads)
        }
    }
}
