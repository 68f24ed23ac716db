mod cli;
mod error;
mod logging;

use clap::Parser;
use cli::Cli;
use error::{CliError, Result};
use std::process;
use std::time::Instant;
use tracing::{error, info};
use tripartition_score::builder::{build_initializer, Sharding};
use tripartition_score::io::{read_assignment, read_gene_trees, write_scores_tsv};
use tripartition_score::Tripartition;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.clone()) {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    if let Err(e) = run(&cli) {
        error!("{e}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    if let Some(n) = cli.threads {
        rayon::ThreadPoolBuilder::new().num_threads(n).build_global()?;
    }

    let t0 = Instant::now();
    let named_trees = read_gene_trees(&cli.input)?;
    let (tree_names, trees): (Vec<String>, Vec<_>) = named_trees.into_iter().unzip();
    info!("Reading gene trees {:.3}s", t0.elapsed().as_secs_f64());

    let t1 = Instant::now();
    let options = cli.build_options();
    let (index, init) = build_initializer::<f64>(&trees, &options)?;
    let mut engine = Tripartition::new(init).with_parallelism(cli.parallelism());
    info!(
        "Building {} partitions over {} taxa {:.3}s",
        engine.num_partitions(),
        index.len(),
        t1.elapsed().as_secs_f64()
    );

    let t2 = Instant::now();
    let assignment = read_assignment(&cli.assignment, &index)?;
    engine.apply(&assignment);
    let total = engine.score();
    info!("Applying assignment {:.3}s", t2.elapsed().as_secs_f64());

    if cli.verify {
        let recomputed = engine.rescore();
        if (recomputed - total).abs() > 1e-9 * (1.0 + total.abs()) {
            return Err(CliError::Verify {
                incremental: total,
                recomputed,
            });
        }
        info!("Verified incremental score against full recomputation");
    }

    println!("{total}");

    if let Some(path) = &cli.output {
        let mut names = match options.sharding {
            Sharding::PerTree => tree_names,
            Sharding::Balanced(_) => (1..=engine.num_partitions())
                .map(|k| format!("shard_{k}"))
                .collect(),
        };
        names.push("total".to_string());
        let mut scores = engine.partition_scores();
        scores.push(total);

        let t3 = Instant::now();
        write_scores_tsv(path, &names, &scores).map_err(|source| CliError::Output {
            path: path.clone(),
            source,
        })?;
        info!("Writing scores to {} {:.3}s", path.display(), t3.elapsed().as_secs_f64());
    }

    Ok(())
}
