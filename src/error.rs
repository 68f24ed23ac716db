use std::path::PathBuf;
use thiserror::Error;
use tripartition_score::builder::BuildError;
use tripartition_score::io::TreeIoError;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Input(#[from] TreeIoError),

    #[error("Failed to build the scoring forests: {0}")]
    Build(#[from] BuildError),

    #[error("Failed to write '{path}': {source}", path = path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Incremental score {incremental} differs from recomputed score {recomputed}")]
    Verify { incremental: f64, recomputed: f64 },

    #[error("Failed to configure the thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
