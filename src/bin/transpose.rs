//! Transpose an n x n matrix with a naive and a tiled kernel.
//!
//! ```bash
//! transpose 0 1024 16
//! ```

use clap::Parser;
use offload_rs::apps::transpose;
use offload_rs::cli::{self, CommonArgs};
use offload_rs::Result;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "transpose", version, about)]
struct Cli {
    /// Index of the platform to run on
    platform: usize,

    /// Matrix side length
    n: usize,

    /// Side of the square work-group (and of the tile)
    work_group_size: usize,

    /// Seed for the matrix generator
    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let cli: Cli = cli::parse_args();
    cli.common.init_logging();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => cli::fail(&e),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.common.config().platform_index(cli.platform).build()?;
    let context = cli::open_host(&config)?;

    let checks = transpose::run(&context, &config.build_options, cli.n, cli.work_group_size, cli.seed)?;
    for check in &checks {
        println!("{}", check);
    }
    // the report covers the tiled run, the last one
    if let Some(check) = checks.last() {
        cli::export_report(&cli.common, &check.report("transpose", &context, cli.n * cli.n))?;
    }
    Ok(())
}
