//! ARMA node classification on a citation network.
//!
//! ```text
//! citation-arma --data-dir data/cora --dataset cora
//! citation-arma --synthetic --epochs 200
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use citegnn::cli::{init_tracing, Args};
use citegnn::experiment::ExperimentConfig;

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = args
        .experiment(ExperimentConfig::arma())
        .context("invalid experiment configuration")?;
    let report = config.run().context("ARMA experiment failed")?;

    if let Some(path) = &args.history {
        report
            .history
            .save_json(path)
            .with_context(|| format!("writing history to {}", path.display()))?;
        info!(path = %path.display(), "history written");
    }

    println!("{}", report.summary);
    println!("{}", report.headline());
    Ok(())
}
