//! Spread an element-wise kernel over several in-order command queues.
//!
//! ```bash
//! multi_queue 0 10000 512 4 --seed 42 --json report.json
//! ```

use clap::Parser;
use offload_rs::apps::multi_queue;
use offload_rs::cli::{self, CommonArgs};
use offload_rs::partition::RemainderPolicy;
use offload_rs::Result;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "multi_queue", version, about)]
struct Cli {
    /// Index of the platform to run on
    platform: usize,

    /// Total number of elements
    elements: usize,

    /// Work-group size of each lane's launch
    work_group_size: usize,

    /// Number of command queues (lanes)
    queues: usize,

    /// Seed for the input generator
    #[arg(long)]
    seed: Option<u64>,

    /// Kernel source to build instead of the bundled one
    #[arg(long, value_name = "PATH")]
    kernel: Option<PathBuf>,

    /// Fail instead of giving leftover elements to the last lane
    #[arg(long)]
    reject_remainder: bool,

    /// Run on a real OpenCL platform instead of the host
    #[arg(long)]
    opencl: bool,

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
    let mut builder = cli
        .common
        .config()
        .platform_index(cli.platform)
        .elements(cli.elements)
        .work_group_size(cli.work_group_size)
        .lanes(cli.queues);
    if let Some(seed) = cli.seed {
        builder = builder.seed(seed);
    }
    if let Some(path) = &cli.kernel {
        builder = builder.kernel_path(path);
    }
    if cli.reject_remainder {
        builder = builder.remainder(RemainderPolicy::Reject);
    }
    let config = builder.build()?;

    if cli.opencl {
        #[cfg(feature = "opencl")]
        return run_opencl(&config);
        #[cfg(not(feature = "opencl"))]
        return Err(offload_rs::Error::config("built without the `opencl` feature"));
    }

    let context = cli::open_host(&config)?;
    let run = multi_queue::run(&context, &config)?;
    println!("{}", run);
    cli::export_report(&cli.common, &run.report(&context, &config))
}

#[cfg(feature = "opencl")]
fn run_opencl(config: &offload_rs::Config) -> Result<()> {
    use offload_rs::apps::random_ints;
    use offload_rs::opencl::OpenClPipeline;
    use offload_rs::verify::verify;
    use std::time::Instant;

    let source = multi_queue::kernel_source(config)?;
    let mut pipeline = OpenClPipeline::new(config, &source, multi_queue::KERNEL_NAME)?;
    println!("[INFO] Device: {}", pipeline.device().name);

    let input = random_ints(config.elements, config.seed);
    let start = Instant::now();
    let reference = multi_queue::host_reference(&input);
    let host_time = start.elapsed();

    let outcome = pipeline.run(&input)?;
    println!("[INFO] Serial time:\t{:.6}ms", host_time.as_secs_f64() * 1e3);
    println!("[INFO] Device time:\t{:.6}ms", outcome.device_time.as_secs_f64() * 1e3);
    for fault in outcome.ledger.faults() {
        println!("[WARN] lane {} {}: {}", fault.lane, fault.stage, fault.error);
    }
    let verification = verify(&reference, &outcome.output, config.tolerance);
    println!("{}", multi_queue::verdict(&outcome.ledger, &verification));
    Ok(())
}
