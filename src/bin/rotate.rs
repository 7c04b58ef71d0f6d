//! Rotate an image around its centre.

use clap::Parser;
use offload_rs::apps::rotate;
use offload_rs::cli::{self, CommonArgs};
use offload_rs::image::RgbaImage;
use offload_rs::Result;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "rotate", version, about)]
struct Cli {
    /// Input image (JPEG, PNG or PPM)
    input: PathBuf,

    /// Where to write the rotated image; the extension picks the format
    output: PathBuf,

    /// Rotation angle in degrees
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    degrees: f32,

    /// Index of the platform to run on
    #[arg(long, default_value_t = 0)]
    platform: usize,

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
    let image = RgbaImage::open(&cli.input)?;
    let config = cli.common.config().platform_index(cli.platform).build()?;
    let context = cli::open_host(&config)?;

    let (rotated, check) =
        rotate::run(&context, &config.build_options, &image, cli.degrees.to_radians())?;
    rotated.save(&cli.output)?;
    println!("{}", check);
    println!("[INFO] Wrote {}", cli.output.display());
    cli::export_report(&cli.common, &check.report("rotate", &context, image.pixels()))
}
