//! Real OpenCL devices through `opencl3`.
//!
//! Only compiled with the `opencl` feature. The platform list feeds the
//! same [`select_device`](crate::platform::select_device) as the host
//! backend, and [`OpenClPipeline`] issues the same three stages per lane
//! into the same [`ErrorLedger`].

use crate::config::Config;
use crate::error::{BuildFailure, BuildLog, Error, Result};
use crate::partition::{partition, Chunk, RemainderPolicy};
use crate::pipeline::{ErrorLedger, LaneSummary, PipelineOutcome, Stage};
use crate::platform::{DeviceInfo, DeviceKind, Platform, PlatformProvider};
use opencl3::command_queue::{CommandQueue, CL_QUEUE_PROFILING_ENABLE};
use opencl3::context::Context;
use opencl3::device::{
    Device, CL_DEVICE_TYPE_ACCELERATOR, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU,
};
use opencl3::event::Event;
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_WRITE_ONLY};
use opencl3::platform::get_platforms;
use opencl3::program::Program;
use opencl3::types::{cl_device_id, cl_device_type, cl_int, CL_NON_BLOCKING};
use std::fmt;
use std::ptr;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};

fn cl_err(what: &str, e: impl fmt::Display) -> Error {
    Error::opencl(format!("{}: {}", what, e))
}

fn device_kind(ty: cl_device_type) -> DeviceKind {
    if ty & CL_DEVICE_TYPE_GPU != 0 {
        DeviceKind::Gpu
    } else if ty & CL_DEVICE_TYPE_CPU != 0 {
        DeviceKind::Cpu
    } else if ty & CL_DEVICE_TYPE_ACCELERATOR != 0 {
        DeviceKind::Accelerator
    } else {
        DeviceKind::Other
    }
}

fn describe(id: cl_device_id) -> DeviceInfo {
    let dev = Device::new(id);
    DeviceInfo {
        name: dev.name().unwrap_or_default().trim().to_string(),
        vendor: dev.vendor().unwrap_or_default().trim().to_string(),
        kind: device_kind(dev.dev_type().unwrap_or(0)),
        compute_units: dev.max_compute_units().unwrap_or(1) as usize,
        max_work_group_size: dev.max_work_group_size().unwrap_or(1),
    }
}

/// Platforms reported by the installed OpenCL ICD loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenClProvider;

impl OpenClProvider {
    fn device_ids(index: usize) -> Result<Vec<cl_device_id>> {
        let platforms = get_platforms().map_err(|e| cl_err("clGetPlatformIDs", e))?;
        let available = platforms.len();
        let platform = platforms
            .get(index)
            .ok_or(Error::PlatformNotFound { index, available })?;
        platform
            .get_devices(CL_DEVICE_TYPE_ALL)
            .map_err(|e| cl_err("clGetDeviceIDs", e))
    }
}

impl PlatformProvider for OpenClProvider {
    fn platforms(&self) -> Result<Vec<Platform>> {
        let platforms = get_platforms().map_err(|e| cl_err("clGetPlatformIDs", e))?;
        Ok(platforms
            .iter()
            .enumerate()
            .map(|(index, p)| Platform {
                index,
                name: p.name().unwrap_or_default().trim().to_string(),
                vendor: p.vendor().unwrap_or_default().trim().to_string(),
                version: p.version().unwrap_or_default().trim().to_string(),
                // a platform without devices still shows up, select_device reports it
                devices: p
                    .get_devices(CL_DEVICE_TYPE_ALL)
                    .unwrap_or_default()
                    .into_iter()
                    .map(describe)
                    .collect(),
            })
            .collect())
    }
}

/// The multi-queue pipeline on a real device, for `int` element kernels.
pub struct OpenClPipeline {
    device: DeviceInfo,
    context: Context,
    kernel: Kernel,
    queues: Vec<CommandQueue>,
    work_group_size: usize,
    remainder: RemainderPolicy,
}

impl OpenClPipeline {
    /// Open the first device of `config.platform_index`, build `source` and
    /// create one profiling queue per lane.
    pub fn new(config: &Config, source: &str, kernel_name: &str) -> Result<Self> {
        config.validate()?;
        let ids = OpenClProvider::device_ids(config.platform_index)?;
        let id = *ids
            .first()
            .ok_or_else(|| Error::NoDevice(format!("platform {}", config.platform_index)))?;
        let info = describe(id);
        let device = Device::new(id);

        let context = Context::from_device(&device).map_err(|e| cl_err("clCreateContext", e))?;
        let program = Program::create_and_build_from_source(&context, source, &config.build_options)
            .map_err(|log| {
                Error::Build(BuildFailure {
                    logs: vec![BuildLog {
                        device: info.name.clone(),
                        log,
                    }],
                })
            })?;
        let kernel = Kernel::create(&program, kernel_name).map_err(|e| {
            debug!(error = %e, "clCreateKernel failed");
            Error::KernelNotFound(kernel_name.to_string())
        })?;

        // create_default is the 1.2 entry point, the widest supported
        #[allow(deprecated)]
        let queues = (0..config.lanes)
            .map(|_| {
                CommandQueue::create_default(&context, CL_QUEUE_PROFILING_ENABLE)
                    .map_err(|e| cl_err("clCreateCommandQueue", e))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(device = %info.name, lanes = queues.len(), "opencl pipeline ready");
        Ok(Self {
            device: info,
            context,
            kernel,
            queues,
            work_group_size: config.work_group_size,
            remainder: config.remainder,
        })
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn lanes(&self) -> usize {
        self.queues.len()
    }

    pub fn run(&mut self, input: &[i32]) -> Result<PipelineOutcome<i32>> {
        let workload = partition(input.len(), self.lanes(), self.remainder)?;
        let total = workload.total;
        let mut ledger = ErrorLedger::new();

        // zero-sized buffers are invalid in OpenCL
        let alloc = total.max(1);
        let mut src = unsafe {
            Buffer::<cl_int>::create(&self.context, CL_MEM_READ_ONLY, alloc, ptr::null_mut())
                .map_err(|e| cl_err("clCreateBuffer", e))?
        };
        let dst = unsafe {
            Buffer::<cl_int>::create(&self.context, CL_MEM_WRITE_ONLY, alloc, ptr::null_mut())
                .map_err(|e| cl_err("clCreateBuffer", e))?
        };

        // reads land here and must stay put until their events have completed
        let mut staging: Vec<Vec<cl_int>> = workload.chunks.iter().map(|c| vec![0; c.len]).collect();
        let mut events: Vec<[Option<Event>; 3]> = Vec::with_capacity(self.lanes());

        let start = Instant::now();
        for ((chunk, queue), out) in workload.chunks.iter().zip(&self.queues).zip(staging.iter_mut()) {
            let span = info_span!("lane", lane = chunk.lane, offset = chunk.offset, len = chunk.len);
            let _enter = span.enter();

            let mut lane = [None, None, None];
            if !chunk.is_empty() {
                self.issue(chunk, queue, input, &mut src, &dst, out, &mut lane, &mut ledger);
            }
            events.push(lane);
        }

        for (lane, queue) in self.queues.iter().enumerate() {
            if let Err(e) = queue.finish() {
                ledger.record(lane, Stage::Finish, cl_err("clFinish", e));
            }
        }
        let device_time = start.elapsed();

        // a download whose wait failed may still be writing into its staging
        let mut settled = vec![true; events.len()];
        for (lane, lane_events) in events.iter().enumerate() {
            for (stage, event) in Stage::ALL.into_iter().zip(lane_events) {
                if let Some(Err(e)) = event.as_ref().map(Event::wait) {
                    ledger.record(lane, stage, cl_err("command failed", e));
                    if stage == Stage::Download {
                        settled[lane] = false;
                    }
                }
            }
        }
        ledger.sort();
        if !ledger.is_empty() {
            warn!(faults = ledger.len(), "pipeline finished with faults");
        }

        let output = gather(total, &workload.chunks, staging, &settled);

        let lanes = workload
            .chunks
            .iter()
            .zip(&events)
            .map(|(chunk, ev)| LaneSummary {
                chunk: *chunk,
                upload: ev[0].as_ref().and_then(elapsed),
                compute: ev[1].as_ref().and_then(elapsed),
                download: ev[2].as_ref().and_then(elapsed),
            })
            .collect();

        Ok(PipelineOutcome {
            output,
            ledger,
            workload,
            device_time,
            lanes,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn issue(
        &self,
        chunk: &Chunk,
        queue: &CommandQueue,
        input: &[i32],
        src: &mut Buffer<cl_int>,
        dst: &Buffer<cl_int>,
        out: &mut [cl_int],
        lane: &mut [Option<Event>; 3],
        ledger: &mut ErrorLedger,
    ) {
        let bytes = chunk.offset * std::mem::size_of::<cl_int>();
        let skipped = |ledger: &mut ErrorLedger, after: Stage| {
            for stage in Stage::ALL.into_iter().filter(|s| *s > after) {
                ledger.record(
                    chunk.lane,
                    stage,
                    Error::DependencyFailed(format!("{} was never enqueued", after)),
                );
            }
        };

        let upload = unsafe {
            queue.enqueue_write_buffer(src, CL_NON_BLOCKING, bytes, &input[chunk.range()], &[])
        };
        let upload = match upload {
            Ok(ev) => ev,
            Err(e) => {
                ledger.record(chunk.lane, Stage::Upload, cl_err("clEnqueueWriteBuffer", e));
                skipped(ledger, Stage::Upload);
                return;
            }
        };

        let local = self.work_group_size.min(chunk.len).min(self.device.max_work_group_size);
        let compute = unsafe {
            ExecuteKernel::new(&self.kernel)
                .set_arg(&*src)
                .set_arg(dst)
                .set_global_work_offset(chunk.offset)
                .set_global_work_size(chunk.len)
                .set_local_work_size(local)
                .set_wait_event(&upload)
                .enqueue_nd_range(queue)
        };
        lane[0] = Some(upload);
        let compute = match compute {
            Ok(ev) => ev,
            Err(e) => {
                ledger.record(chunk.lane, Stage::Compute, cl_err("clEnqueueNDRangeKernel", e));
                skipped(ledger, Stage::Compute);
                return;
            }
        };

        let download =
            unsafe { queue.enqueue_read_buffer(dst, CL_NON_BLOCKING, bytes, out, &[compute.get()]) };
        lane[1] = Some(compute);
        match download {
            Ok(ev) => lane[2] = Some(ev),
            Err(e) => ledger.record(chunk.lane, Stage::Download, cl_err("clEnqueueReadBuffer", e)),
        }
    }
}

/// Assemble the output from each lane's staging vector.
///
/// Unsettled lanes keep their zeroed slice and their staging memory is
/// leaked, since the device may still hold a pointer into it.
fn gather(total: usize, chunks: &[Chunk], staging: Vec<Vec<cl_int>>, settled: &[bool]) -> Vec<i32> {
    let mut output = vec![0; total];
    for ((chunk, data), &ok) in chunks.iter().zip(staging).zip(settled) {
        if ok {
            output[chunk.range()].copy_from_slice(&data);
        } else {
            warn!(lane = chunk.lane, len = data.len(), "leaking staging of an unsettled read");
            std::mem::forget(data);
        }
    }
    output
}

fn elapsed(event: &Event) -> Option<Duration> {
    let start = event.profiling_command_start().ok()?;
    let end = event.profiling_command_end().ok()?;
    Some(Duration::from_nanos(end.saturating_sub(start)))
}

impl fmt::Debug for OpenClPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenClPipeline")
            .field("device", &self.device.name)
            .field("lanes", &self.lanes())
            .field("work_group_size", &self.work_group_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_kind_bits() {
        assert_eq!(device_kind(CL_DEVICE_TYPE_GPU), DeviceKind::Gpu);
        assert_eq!(device_kind(CL_DEVICE_TYPE_CPU), DeviceKind::Cpu);
        assert_eq!(device_kind(0), DeviceKind::Other);
    }

    #[test]
    fn test_gather_skips_unsettled_lanes() {
        let workload = partition(6, 3, RemainderPolicy::LastLane).unwrap();
        let staging = vec![vec![1, 2], vec![3, 4], vec![5, 6]];
        let output = gather(6, &workload.chunks, staging, &[true, false, true]);
        assert_eq!(output, vec![1, 2, 0, 0, 5, 6]);
    }

    #[test]
    fn test_provider_never_panics() {
        // machines without an ICD loader report an error, not a crash
        let _ = OpenClProvider.platforms();
    }
}
