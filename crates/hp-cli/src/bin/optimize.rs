//! hp-optimize CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

use hp_cli::{run, write_output, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout carries the driver's forwarded output and the result JSON.
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli).and_then(|pipeline| write_output(&pipeline, cli.output.as_deref())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
