use boxchain::{cli, logging};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    logging::init_logging()?;

    match args.command {
        cli::Commands::Build(a) => cli::build::run(a),
        cli::Commands::Batch(a) => cli::batch::run(a),
        cli::Commands::Probe(a) => cli::probe::run(a).await,
        cli::Commands::Merge(a) => cli::merge::run(a),
    }
}
