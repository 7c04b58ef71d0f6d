//! The multi-command-queue example: one element-wise transform spread over
//! N in-order queues, checked against a serial run on the host.

use super::{ms, random_ints, timed};
use crate::config::Config;
use crate::context::Context;
use crate::error::Result;
use crate::kernels::{vector_operation, MULTI_QUEUE_SOURCE};
use crate::pipeline::{ErrorLedger, MultiQueuePipeline, PipelineOutcome};
use crate::program::load_source;
use crate::telemetry::RunReport;
use crate::verify::{verify, Verification};
use std::fmt;
use std::time::Duration;
use tracing::info;

pub const KERNEL_NAME: &str = "vector_operation";

#[derive(Debug, Clone)]
pub struct MultiQueueRun {
    pub input: Vec<i32>,
    pub reference: Vec<i32>,
    pub outcome: PipelineOutcome<i32>,
    pub verification: Verification<i32>,
    pub host_time: Duration,
}

impl MultiQueueRun {
    /// No device faults and the output matches the host reference.
    ///
    /// A faulted lane never writes its slice back, so the output can still
    /// match wherever the reference happens to equal the zeroed buffer.
    pub fn passed(&self) -> bool {
        self.outcome.ledger.is_empty() && self.verification.is_match()
    }

    pub fn speedup(&self) -> Option<f64> {
        let device = self.outcome.device_time.as_secs_f64();
        (device > 0.0).then(|| self.host_time.as_secs_f64() / device)
    }

    pub fn report(&self, context: &Context, config: &Config) -> RunReport {
        RunReport {
            program: "multi_queue".to_string(),
            platform: context.platform().name.clone(),
            device: context.device().name.clone(),
            elements: self.input.len(),
            lanes: config.lanes,
            work_group_size: config.work_group_size,
            host_time_ms: ms(self.host_time),
            device_time_ms: ms(self.outcome.device_time),
            passed: self.passed(),
            verification: self.verification.to_string(),
            faults: self.outcome.ledger.records(),
            metrics: context.metrics(),
            pool: Some(context.pool_stats()),
        }
    }
}

impl fmt::Display for MultiQueueRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[INFO] Serial time:\t{:.6}ms", ms(self.host_time))?;
        writeln!(f, "[INFO] Device time:\t{:.6}ms", ms(self.outcome.device_time))?;
        writeln!(f, "[INFO] Faults: {}", self.outcome.ledger.len())?;
        for fault in self.outcome.ledger.faults() {
            writeln!(f, "[WARN] lane {} {}: {}", fault.lane, fault.stage, fault.error)?;
        }
        write!(f, "{}", verdict(&self.outcome.ledger, &self.verification))?;
        if let (true, Some(s)) = (self.passed(), self.speedup()) {
            write!(f, "\n[INFO] Achieved speedup of {:.2}x", s)?;
        }
        Ok(())
    }
}

/// The closing result line of a run: device faults outrank the comparison.
pub fn verdict(ledger: &ErrorLedger, verification: &Verification<i32>) -> String {
    if ledger.is_empty() {
        return verification.to_string();
    }
    let mut line = format!(
        "[FAIL] Test FAILED! {} device fault(s), output is incomplete",
        ledger.len()
    );
    if !verification.is_match() {
        line.push('\n');
        line.push_str(&verification.to_string());
    }
    line
}

/// Serial host version of the transform.
pub fn host_reference(input: &[i32]) -> Vec<i32> {
    input.iter().map(|&x| vector_operation(x)).collect()
}

/// Kernel source from `config.kernel_path`, or the bundled one.
pub fn kernel_source(config: &Config) -> Result<String> {
    match &config.kernel_path {
        Some(path) => load_source(path),
        None => Ok(MULTI_QUEUE_SOURCE.to_string()),
    }
}

/// Run the example on `context` over freshly generated input.
pub fn run(context: &Context, config: &Config) -> Result<MultiQueueRun> {
    let input = random_ints(config.elements, config.seed);
    run_with_input(context, config, input)
}

pub fn run_with_input(context: &Context, config: &Config, input: Vec<i32>) -> Result<MultiQueueRun> {
    config.validate()?;

    let (reference, host_time) = timed(|| host_reference(&input));

    let source = kernel_source(config)?;
    let program = context.build_program(&source, &config.build_options)?;
    let kernel = program.kernel(KERNEL_NAME)?;

    let mut pipeline = MultiQueuePipeline::new(context, kernel, config)?;
    let outcome = pipeline.run(&input)?;
    let verification = verify(&reference, &outcome.output, config.tolerance);

    info!(
        elements = input.len(),
        lanes = config.lanes,
        matched = verification.is_match(),
        faults = outcome.ledger.len(),
        "multi-queue run finished"
    );

    Ok(MultiQueueRun {
        input,
        reference,
        outcome,
        verification,
        host_time,
    })
}
