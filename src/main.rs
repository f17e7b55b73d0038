use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use train_eval::{logging, TrainingRunner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Train and evaluate an ElasticNet model with experiment tracking", long_about = None)]
struct Args {
    #[arg(
        long,
        value_name = "PATH",
        default_value = "params.yaml",
        help = "Path to the run configuration"
    )]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init();

    let record = TrainingRunner::new()
        .execute(&args.config)
        .with_context(|| format!("training run for {} failed", args.config.display()))?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
