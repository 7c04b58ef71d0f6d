//! List the platforms and devices this build can run on.

use clap::Parser;
use offload_rs::cli;
use offload_rs::platform::{HostProvider, Platform, PlatformProvider};
use offload_rs::Result;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "devices", version, about)]
struct Cli {
    /// Host compute units to report (defaults to the number of CPUs)
    #[arg(long, value_name = "N")]
    compute_units: Option<usize>,

    /// Print the listing as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli: Cli = cli::parse_args();
    cli::init_logging(cli.verbose, false);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => cli::fail(&e),
    }
}

fn platforms(cli: &Cli) -> Result<Vec<Platform>> {
    let host = match cli.compute_units {
        Some(n) => HostProvider::new(n),
        None => HostProvider::default(),
    };
    #[allow(unused_mut)]
    let mut all = host.platforms()?;

    #[cfg(feature = "opencl")]
    match offload_rs::opencl::OpenClProvider.platforms() {
        Ok(found) => {
            let base = all.len();
            all.extend(found.into_iter().map(|mut p| {
                p.index += base;
                p
            }));
        }
        Err(e) => tracing::warn!(error = %e, "no OpenCL platforms"),
    }
    Ok(all)
}

fn run(cli: &Cli) -> Result<()> {
    let platforms = platforms(cli)?;
    if cli.json {
        let json = serde_json::to_string_pretty(&platforms)
            .map_err(|e| offload_rs::Error::Other(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    for p in &platforms {
        println!("[{}] {} ({}, {})", p.index, p.name, p.vendor, p.version);
        for d in &p.devices {
            println!(
                "    {} [{}] compute units: {}, max work-group: {}",
                d.name, d.kind, d.compute_units, d.max_work_group_size
            );
        }
    }
    Ok(())
}
