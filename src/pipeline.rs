//! Multi-queue pipelined dispatch.
//!
//! The workload is split into one contiguous chunk per lane. Every lane has
//! its own in-order queue and issues upload, compute and download for its
//! chunk, each stage depending only on the lane's previous stage. Lanes
//! never wait on each other, so one lane's transfers overlap another's
//! compute. After all stages are issued the pipeline waits for every queue
//! and collects whatever failed into an [`ErrorLedger`].

use crate::config::Config;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::{Event, EventStatus};
use crate::kernel::{Kernel, NdRange};
use crate::memory::{DeviceBuffer, HostBuffer, MemFlags, Scalar};
use crate::partition::{partition, Chunk, RemainderPolicy, Workload};
use crate::queue::CommandQueue;
use crate::telemetry::FaultRecord;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Stage {
    Upload,
    Compute,
    Download,
    /// The completion barrier on the lane's queue, after all three stages.
    Finish,
}

impl Stage {
    /// The stages a lane issues, in dependency order.
    pub const ALL: [Stage; 3] = [Stage::Upload, Stage::Compute, Stage::Download];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Upload => "upload",
            Stage::Compute => "compute",
            Stage::Download => "download",
            Stage::Finish => "finish",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct LaneFault {
    pub lane: usize,
    pub stage: Stage,
    pub error: Error,
}

/// Every failed stage of a run, in lane then stage order.
///
/// Faults are gathered after all lanes have settled; recording one never
/// stops other lanes from being issued.
#[derive(Debug, Clone, Default)]
pub struct ErrorLedger {
    faults: Vec<LaneFault>,
}

impl ErrorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, lane: usize, stage: Stage, error: Error) {
        self.faults.push(LaneFault { lane, stage, error });
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn len(&self) -> usize {
        self.faults.len()
    }

    pub fn faults(&self) -> &[LaneFault] {
        &self.faults
    }

    pub fn for_lane(&self, lane: usize) -> impl Iterator<Item = &LaneFault> {
        self.faults.iter().filter(move |f| f.lane == lane)
    }

    pub fn get(&self, lane: usize, stage: Stage) -> Option<&Error> {
        self.faults
            .iter()
            .find(|f| f.lane == lane && f.stage == stage)
            .map(|f| &f.error)
    }

    pub fn records(&self) -> Vec<FaultRecord> {
        self.faults
            .iter()
            .map(|f| FaultRecord {
                lane: f.lane,
                stage: f.stage.to_string(),
                error: f.error.to_string(),
            })
            .collect()
    }

    pub(crate) fn sort(&mut self) {
        self.faults.sort_by_key(|f| (f.lane, f.stage));
    }
}

impl fmt::Display for ErrorLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for fault in &self.faults {
            writeln!(f, "lane {} {}: {}", fault.lane, fault.stage, fault.error)?;
        }
        Ok(())
    }
}

/// How one lane's stages went.
#[derive(Debug, Clone, Serialize)]
pub struct LaneSummary {
    pub chunk: Chunk,
    pub upload: Option<Duration>,
    pub compute: Option<Duration>,
    pub download: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome<T> {
    pub output: Vec<T>,
    pub ledger: ErrorLedger,
    pub workload: Workload,
    /// From first enqueue until every queue finished.
    pub device_time: Duration,
    pub lanes: Vec<LaneSummary>,
}

#[derive(Default)]
struct LaneEvents {
    upload: Option<Event>,
    compute: Option<Event>,
    download: Option<Event>,
}

impl LaneEvents {
    fn get(&self, stage: Stage) -> Option<&Event> {
        match stage {
            Stage::Upload => self.upload.as_ref(),
            Stage::Compute => self.compute.as_ref(),
            Stage::Download => self.download.as_ref(),
            Stage::Finish => None,
        }
    }

    fn duration(&self, stage: Stage) -> Option<Duration> {
        self.get(stage)
            .filter(|e| e.is_complete())
            .and_then(|e| e.profile().duration())
    }
}

/// Runs a two-argument `(src, dst)` element-wise kernel over N lanes.
pub struct MultiQueuePipeline {
    context: Context,
    kernel: Kernel,
    queues: Vec<CommandQueue>,
    work_group_size: usize,
    remainder: RemainderPolicy,
}

impl MultiQueuePipeline {
    pub fn new(context: &Context, kernel: Kernel, config: &Config) -> Result<Self> {
        config.validate()?;
        if kernel.arity() != 2 {
            return Err(Error::config(format!(
                "pipeline kernel '{}' must take (src, dst), it takes {} arguments",
                kernel.name(),
                kernel.arity()
            )));
        }

        let queues = (0..config.lanes)
            .map(|_| context.create_queue())
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            context: context.clone(),
            kernel,
            queues,
            work_group_size: config.work_group_size,
            remainder: config.remainder,
        })
    }

    pub fn lanes(&self) -> usize {
        self.queues.len()
    }

    pub fn run<T: Scalar>(&mut self, input: &[T]) -> Result<PipelineOutcome<T>> {
        let workload = partition(input.len(), self.lanes(), self.remainder)?;
        let total = workload.total;

        let src = self.context.create_buffer::<T>(total, MemFlags::ReadOnly);
        let dst = self.context.create_buffer::<T>(total, MemFlags::WriteOnly);
        self.kernel.set_arg(0, &src)?;
        self.kernel.set_arg(1, &dst)?;
        let output = HostBuffer::<T>::new(total);

        let mut ledger = ErrorLedger::new();
        let mut events: Vec<LaneEvents> = Vec::with_capacity(self.lanes());

        info!(
            total,
            lanes = self.lanes(),
            chunk_size = workload.chunk_size,
            remainder = workload.remainder(),
            "starting pipeline"
        );
        let start = Instant::now();

        for (chunk, queue) in workload.chunks.iter().zip(&self.queues) {
            let span = info_span!("lane", lane = chunk.lane, offset = chunk.offset, len = chunk.len);
            let _enter = span.enter();

            let mut lane = LaneEvents::default();
            if !chunk.is_empty() {
                self.issue(chunk, queue, input, &src, &dst, &output, &mut lane, &mut ledger);
            }
            events.push(lane);
        }

        // completion barrier
        for (lane, queue) in self.queues.iter().enumerate() {
            if let Err(e) = queue.finish() {
                ledger.record(lane, Stage::Finish, e);
            }
        }
        let device_time = start.elapsed();

        for (lane, lane_events) in events.iter().enumerate() {
            for stage in Stage::ALL {
                if let Some(EventStatus::Failed(e)) = lane_events.get(stage).map(Event::status) {
                    ledger.record(lane, stage, e);
                }
            }
        }
        ledger.sort();

        if ledger.is_empty() {
            debug!(?device_time, "pipeline finished");
        } else {
            warn!(faults = ledger.len(), "pipeline finished with faults");
        }

        let lanes = workload
            .chunks
            .iter()
            .zip(&events)
            .map(|(chunk, ev)| LaneSummary {
                chunk: *chunk,
                upload: ev.duration(Stage::Upload),
                compute: ev.duration(Stage::Compute),
                download: ev.duration(Stage::Download),
            })
            .collect();

        Ok(PipelineOutcome {
            output: output.to_vec(),
            ledger,
            workload,
            device_time,
            lanes,
        })
    }

    /// Enqueue one lane's three stages. A stage that cannot be enqueued is
    /// recorded, and the stages after it are recorded as never run.
    #[allow(clippy::too_many_arguments)]
    fn issue<T: Scalar>(
        &self,
        chunk: &Chunk,
        queue: &CommandQueue,
        input: &[T],
        src: &DeviceBuffer<T>,
        dst: &DeviceBuffer<T>,
        output: &HostBuffer<T>,
        lane: &mut LaneEvents,
        ledger: &mut ErrorLedger,
    ) {
        let skipped = |ledger: &mut ErrorLedger, after: Stage| {
            for stage in Stage::ALL.into_iter().filter(|s| *s > after) {
                ledger.record(
                    chunk.lane,
                    stage,
                    Error::DependencyFailed(format!("{} was never enqueued", after)),
                );
            }
        };

        let upload = match queue.enqueue_write(src, false, chunk.offset, &input[chunk.range()], &[]) {
            Ok(ev) => ev,
            Err(e) => {
                ledger.record(chunk.lane, Stage::Upload, e);
                skipped(ledger, Stage::Upload);
                return;
            }
        };
        lane.upload = Some(upload.clone());

        let local = self.work_group_size.min(chunk.len);
        let range = NdRange::linear(chunk.len)
            .with_offset([chunk.offset, 0, 0])
            .with_local([local, 1, 1]);
        let compute = match queue.enqueue_nd_range(&self.kernel, range, &[upload]) {
            Ok(ev) => ev,
            Err(e) => {
                ledger.record(chunk.lane, Stage::Compute, e);
                skipped(ledger, Stage::Compute);
                return;
            }
        };
        lane.compute = Some(compute.clone());

        match queue.enqueue_read(dst, false, chunk.offset, chunk.len, output, chunk.offset, &[compute]) {
            Ok(ev) => lane.download = Some(ev),
            Err(e) => ledger.record(chunk.lane, Stage::Download, e),
        }
    }
}

impl fmt::Debug for MultiQueuePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiQueuePipeline")
            .field("kernel", &self.kernel.name())
            .field("lanes", &self.lanes())
            .field("work_group_size", &self.work_group_size)
            .field("remainder", &self.remainder)
            .finish()
    }
}
