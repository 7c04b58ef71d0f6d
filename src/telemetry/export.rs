//! Run reports and their exporters.

use super::MetricsSnapshot;
use crate::error::{Error, Result};
use crate::executor::PoolStats;
use serde::Serialize;
use std::path::PathBuf;

/// One fault from a run's error ledger, rendered for export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultRecord {
    pub lane: usize,
    pub stage: String,
    pub error: String,
}

/// Everything one example run measured and concluded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub program: String,
    pub platform: String,
    pub device: String,
    pub elements: usize,
    pub lanes: usize,
    pub work_group_size: usize,
    pub host_time_ms: f64,
    pub device_time_ms: f64,
    pub passed: bool,
    pub verification: String,
    pub faults: Vec<FaultRecord>,
    pub metrics: MetricsSnapshot,
    pub pool: Option<PoolStats>,
}

impl RunReport {
    /// Host time over device time, when both were measured.
    pub fn speedup(&self) -> Option<f64> {
        (self.device_time_ms > 0.0).then(|| self.host_time_ms / self.device_time_ms)
    }
}

pub trait ReportExporter: Send + Sync {
    fn export(&self, report: &RunReport) -> Result<()>;
}

/// Writes the report as pretty-printed JSON.
pub struct JsonExporter {
    output_path: PathBuf,
}

impl JsonExporter {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }
}

impl ReportExporter for JsonExporter {
    fn export(&self, report: &RunReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report)
            .map_err(|e| Error::Other(format!("JSON serialization failed: {}", e)))?;

        std::fs::write(&self.output_path, json).map_err(|e| {
            Error::Io(format!("{}: {}", self.output_path.display(), e))
        })?;

        Ok(())
    }
}

/// Prints a short summary on stdout.
#[derive(Default)]
pub struct ConsoleExporter {
    verbose: bool,
}

impl ConsoleExporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ReportExporter for ConsoleExporter {
    fn export(&self, report: &RunReport) -> Result<()> {
        println!("=== {} on {} ===", report.program, report.device);
        println!("Commands completed: {}", report.metrics.commands_completed());
        println!("Commands failed: {}", report.metrics.commands_failed());
        println!("Faults: {}", report.faults.len());

        if self.verbose {
            for stats in &report.metrics.commands {
                let Some(kind) = stats.kind else { continue };
                if stats.completed + stats.failed == 0 {
                    continue;
                }
                println!(
                    "  {:?}: avg {:.2}us p99 {:.2}us max {:.2}us",
                    kind,
                    stats.avg_ns as f64 / 1_000.0,
                    stats.p99_ns as f64 / 1_000.0,
                    stats.max_ns as f64 / 1_000.0
                );
            }
            for fault in &report.faults {
                println!("  lane {} {}: {}", fault.lane, fault.stage, fault.error);
            }
            if let Some(pool) = &report.pool {
                println!(
                    "  {} compute units, {} batches ({} stolen)",
                    pool.compute_units, pool.batches_executed, pool.batches_stolen
                );
            }
        }

        Ok(())
    }
}
