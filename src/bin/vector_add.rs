//! `c = a + b` on one queue.

use clap::Parser;
use offload_rs::apps::vector_add;
use offload_rs::cli::{self, CommonArgs};
use offload_rs::Result;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "vector_add", version, about)]
struct Cli {
    /// Index of the platform to run on
    #[arg(long, default_value_t = 0)]
    platform: usize,

    /// Number of elements
    #[arg(long, default_value_t = vector_add::DEFAULT_ELEMENTS)]
    elements: usize,

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

    let check = vector_add::run(&context, &config.build_options, cli.elements)?;
    println!("{}", check);
    cli::export_report(&cli.common, &check.report("vector_add", &context, cli.elements))
}
