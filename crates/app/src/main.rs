mod cli;
mod config;
mod supervisor;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use dart_vision::{DartboardModel, Registries};

use crate::{
    cli::{Cli, Command, SchemaArgs, ScoreArgs},
    config::RunConfig,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    match Cli::parse().command {
        Command::Run(args) => supervisor::run(RunConfig::try_from(args)?),
        Command::Schema(args) => print_schema(args),
        Command::Score(args) => print_score(args),
    }
}

fn print_schema(args: SchemaArgs) -> Result<()> {
    let registries = Registries::default();
    let schema = registries
        .procedures
        .build_tagged(&args.procedure, Default::default())?
        .get_config(&registries)?;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn print_score(args: ScoreArgs) -> Result<()> {
    let score = DartboardModel.get_score([args.x, args.y]);
    println!("{} ({})", score.label(), score.value());
    Ok(())
}
