//! Shared plumbing for the example binaries.

use crate::config::{Config, ConfigBuilder, DEFAULT_BUILD_OPTIONS};
use crate::context::Context;
use crate::error::Error;
use crate::telemetry::{JsonExporter, ReportExporter, RunReport};
use clap::{Args, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Flags every example binary accepts.
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Host compute units (defaults to the number of CPUs)
    #[arg(long, value_name = "N")]
    pub compute_units: Option<usize>,

    /// Options passed to the program build
    #[arg(long, default_value = DEFAULT_BUILD_OPTIONS, allow_hyphen_values = true)]
    pub build_options: String,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,
}

impl CommonArgs {
    /// A builder preloaded with these flags.
    pub fn config(&self) -> ConfigBuilder {
        let mut builder = Config::builder().build_options(&self.build_options);
        if let Some(n) = self.compute_units {
            builder = builder.compute_units(n);
        }
        builder
    }

    pub fn init_logging(&self) {
        init_logging(self.verbose, self.quiet);
    }
}

pub fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

/// Parse arguments, exiting with status 1 on a usage error.
///
/// `--help` and `--version` still exit with 0.
pub fn parse_args<P: Parser>() -> P {
    match P::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    }
}

/// Report a fatal error on stderr and produce exit status 1.
///
/// Build failures print every device's build log.
pub fn fail(err: &Error) -> ExitCode {
    match err.build_logs() {
        Some(logs) => {
            eprintln!("[FAIL] program build failed");
            for entry in logs {
                eprintln!("[{}]", entry.device);
                eprintln!("{}", entry.log.trim_end());
            }
        }
        None => eprintln!("[FAIL] {}", err),
    }
    error!(%err, "exiting");
    ExitCode::from(1)
}

/// Open the host device, printing what was selected.
pub fn open_host(config: &Config) -> Result<Context, Error> {
    let context = Context::host(config)?;
    println!(
        "[INFO] Platform: {} ({})",
        context.platform().name,
        context.platform().version
    );
    println!("[INFO] Device: {}", context.device().name);
    Ok(context)
}

/// Write `report` as JSON when `--json` was given.
pub fn export_report(common: &CommonArgs, report: &RunReport) -> Result<(), Error> {
    if let Some(path) = &common.json {
        JsonExporter::new(path).export(report)?;
        println!("[INFO] Report written to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Parser)]
    struct Probe {
        #[command(flatten)]
        common: CommonArgs,
    }

    #[test]
    fn test_common_defaults() {
        let probe = Probe::try_parse_from(["probe"]).unwrap();
        assert!(!probe.common.verbose);
        assert_eq!(probe.common.build_options, DEFAULT_BUILD_OPTIONS);
        let config = probe.common.config().build().unwrap();
        assert_eq!(config.compute_units, None);
    }

    #[test]
    fn test_common_flags() {
        let probe = Probe::try_parse_from([
            "probe",
            "-v",
            "--compute-units",
            "3",
            "--build-options",
            "-cl-std=CL1.2",
        ])
        .unwrap();
        assert!(probe.common.verbose);
        let config = probe.common.config().build().unwrap();
        assert_eq!(config.compute_units, Some(3));
        assert_eq!(config.build_options, "-cl-std=CL1.2");
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Probe::try_parse_from(["probe", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_fail_is_status_one() {
        assert_eq!(fail(&Error::config("bad")), ExitCode::from(1));
    }
}
