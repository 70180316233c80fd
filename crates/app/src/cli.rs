//! Command line surface of `dartcount`.

use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "dartcount", version, about = "Multi-camera dart detection")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every camera pipeline and the dartboard collector from a setup file.
    Run(RunArgs),
    /// Print the configurable parameters of a procedure as JSON.
    Schema(SchemaArgs),
    /// Score a point on the board model (millimetres, origin at the bull, y up).
    Score(ScoreArgs),
}

/// CLI arguments accepted by the `run` subcommand.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON setup file describing the dartboard and its cameras.
    #[arg(long = "setup", value_name = "PATH")]
    pub setup: PathBuf,
    /// Override the procedure of every camera, e.g. `DebugRecorder`.
    #[arg(long = "procedure", value_name = "TAG")]
    pub procedure: Option<String>,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
    /// Serve Prometheus metrics on this address.
    #[arg(long = "metrics-addr", value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Registered procedure tag.
    #[arg(default_value = "StandardProcedure")]
    pub procedure: String,
}

#[derive(Debug, Args)]
pub struct ScoreArgs {
    #[arg(allow_negative_numbers = true)]
    pub x: f64,
    #[arg(allow_negative_numbers = true)]
    pub y: f64,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_takes_a_setup_file_and_telemetry_flags() {
        let cli = Cli::parse_from([
            "dartcount",
            "run",
            "--setup",
            "board.json",
            "--chrome-trace",
            "trace.json",
            "--metrics-addr",
            "127.0.0.1:9000",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.setup, PathBuf::from("board.json"));
        assert_eq!(args.chrome_trace, Some(PathBuf::from("trace.json")));
        assert_eq!(args.metrics_addr, Some("127.0.0.1:9000".parse().unwrap()));
        assert!(args.procedure.is_none());
    }

    #[test]
    fn score_accepts_negative_coordinates() {
        let cli = Cli::parse_from(["dartcount", "score", "-10.5", "-80"]);
        let Command::Score(args) = cli.command else {
            panic!("expected score");
        };
        assert_eq!((args.x, args.y), (-10.5, -80.0));
    }
}
