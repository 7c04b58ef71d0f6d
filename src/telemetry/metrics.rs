//! Per-command latency histograms.

use super::{CommandStats, MetricsSnapshot};
use crate::event::CommandKind;
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const KINDS: [CommandKind; 5] = [
    CommandKind::Write,
    CommandKind::NdRange,
    CommandKind::Read,
    CommandKind::Fill,
    CommandKind::Marker,
];

// one hour in nanoseconds
const MAX_LATENCY_NS: u64 = 3_600_000_000_000;

fn slot(kind: CommandKind) -> usize {
    match kind {
        CommandKind::Write => 0,
        CommandKind::NdRange => 1,
        CommandKind::Read => 2,
        CommandKind::Fill => 3,
        CommandKind::Marker => 4,
    }
}

#[derive(Debug)]
struct KindMetrics {
    completed: AtomicU64,
    failed: AtomicU64,
    // None only if the histogram bounds were rejected
    latency: RwLock<Option<Histogram<u64>>>,
}

impl KindMetrics {
    fn new() -> Self {
        Self {
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            latency: RwLock::new(Histogram::new_with_max(MAX_LATENCY_NS, 3).ok()),
        }
    }

    fn stats(&self, kind: CommandKind) -> CommandStats {
        let latency = self.latency.read();
        let mut stats = CommandStats {
            kind: Some(kind),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            ..CommandStats::default()
        };
        if let Some(hist) = latency.as_ref().filter(|h| h.len() > 0) {
            stats.avg_ns = hist.mean() as u64;
            stats.p50_ns = hist.value_at_quantile(0.50);
            stats.p99_ns = hist.value_at_quantile(0.99);
            stats.max_ns = hist.max();
        }
        stats
    }
}

/// Counters shared by every queue of a context.
#[derive(Debug)]
pub struct Metrics {
    kinds: [KindMetrics; 5],
    bytes_uploaded: AtomicU64,
    bytes_downloaded: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            kinds: std::array::from_fn(|_| KindMetrics::new()),
            bytes_uploaded: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a finished command and how long it executed.
    pub fn record_command(&self, kind: CommandKind, duration_ns: u64, ok: bool) {
        let m = &self.kinds[slot(kind)];
        if ok {
            m.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            m.failed.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(hist) = m.latency.write().as_mut() {
            let _ = hist.record(duration_ns.min(MAX_LATENCY_NS));
        }
    }

    pub fn record_upload(&self, bytes: usize) {
        self.bytes_uploaded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_download(&self, bytes: usize) {
        self.bytes_downloaded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            commands: KINDS
                .iter()
                .map(|&kind| self.kinds[slot(kind)].stats(kind))
                .collect(),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for m in &self.kinds {
            m.completed.store(0, Ordering::Relaxed);
            m.failed.store(0, Ordering::Relaxed);
            if let Some(hist) = m.latency.write().as_mut() {
                hist.reset();
            }
        }
        self.bytes_uploaded.store(0, Ordering::Relaxed);
        self.bytes_downloaded.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
