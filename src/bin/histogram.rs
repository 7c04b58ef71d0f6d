//! 256-bin histogram of an image's red channel.

use clap::Parser;
use offload_rs::apps::histogram;
use offload_rs::cli::{self, CommonArgs};
use offload_rs::image::RgbaImage;
use offload_rs::Result;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "histogram", version, about)]
struct Cli {
    /// Input image (JPEG, PNG or PPM)
    image: PathBuf,

    /// Index of the platform to run on
    #[arg(long, default_value_t = 0)]
    platform: usize,

    /// Print only non-empty bins
    #[arg(long)]
    nonzero: bool,

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
    let image = RgbaImage::open(&cli.image)?;
    let config = cli.common.config().platform_index(cli.platform).build()?;
    let context = cli::open_host(&config)?;

    let (bins, check) = histogram::run(&context, &config.build_options, &image)?;
    for (bin, count) in bins.iter().enumerate() {
        if !cli.nonzero || *count != 0 {
            println!("{}: {}", bin, count);
        }
    }
    println!("{}", check);
    cli::export_report(&cli.common, &check.report("histogram", &context, image.pixels()))
}
