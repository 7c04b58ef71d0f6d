//! Command metrics and run reports.
//!
//! Per-command latency histograms need the `telemetry` feature; without it
//! `Metrics` is a no-op and snapshots are empty.

pub mod export;

#[cfg(feature = "telemetry")]
pub mod metrics;

pub use export::{ConsoleExporter, FaultRecord, JsonExporter, ReportExporter, RunReport};
pub use metrics::Metrics;

use crate::event::CommandKind;
use serde::Serialize;
use std::time::Duration;

/// Latency and outcome counts of one kind of command.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandStats {
    pub kind: Option<CommandKind>,
    pub completed: u64,
    pub failed: u64,
    pub avg_ns: u64,
    pub p50_ns: u64,
    pub p99_ns: u64,
    pub max_ns: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub commands: Vec<CommandStats>,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
}

impl MetricsSnapshot {
    pub fn for_kind(&self, kind: CommandKind) -> Option<&CommandStats> {
        self.commands.iter().find(|c| c.kind == Some(kind))
    }

    pub fn commands_completed(&self) -> u64 {
        self.commands.iter().map(|c| c.completed).sum()
    }

    pub fn commands_failed(&self) -> u64 {
        self.commands.iter().map(|c| c.failed).sum()
    }
}

// Stub implementation when telemetry is disabled
#[cfg(not(feature = "telemetry"))]
pub mod metrics {
    use super::MetricsSnapshot;
    use crate::event::CommandKind;

    #[derive(Debug, Default)]
    pub struct Metrics;

    impl Metrics {
        pub fn new() -> Self {
            Self
        }
        pub fn record_command(&self, _: CommandKind, _: u64, _: bool) {}
        pub fn record_upload(&self, _: usize) {}
        pub fn record_download(&self, _: usize) {}
        pub fn snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot::default()
        }
        pub fn reset(&self) {}
    }
}
