pub use crate::config::{Config, ConfigBuilder};
pub use crate::context::Context;
pub use crate::error::{Error, Result};
pub use crate::event::{wait_for_events, Event, EventStatus};
pub use crate::kernel::{HostKernel, Kernel, KernelArgs, NdRange, WorkGroup, WorkItem};
pub use crate::memory::{DeviceBuffer, HostBuffer, MemFlags, Scalar};
pub use crate::partition::RemainderPolicy;
pub use crate::pipeline::{ErrorLedger, MultiQueuePipeline, PipelineOutcome, Stage};
pub use crate::program::{KernelRegistry, Program};
pub use crate::queue::CommandQueue;
pub use crate::verify::{verify, Tolerance, Verification};

pub use crate::telemetry::MetricsSnapshot;

#[cfg(feature = "opencl")]
pub use crate::opencl::{OpenClPipeline, OpenClProvider};
