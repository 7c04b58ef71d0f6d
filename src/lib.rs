//! offload-rs - multi-queue compute offload
//!
//! OpenCL-style platforms, contexts, in-order command queues, events and
//! programs, with a host backend that runs kernels on a work-stealing pool
//! of compute units. On top of that sits the multi-queue pipeline: a
//! workload split across N lanes, each lane uploading, computing and
//! downloading its chunk on its own queue so that lanes overlap.
//!
//! # Quick Start
//!
//! ```no_run
//! use offload_rs::prelude::*;
//!
//! let config = Config::builder().elements(10_000).lanes(4).seed(42).build().unwrap();
//! let context = Context::host(&config).unwrap();
//!
//! let run = offload_rs::apps::multi_queue::run(&context, &config).unwrap();
//! println!("{}", run);
//! ```
//!
//! # Features
//!
//! - **Pipelined dispatch**: upload, compute and download chained by events per lane
//! - **Error ledger**: every failed stage collected after all lanes settle
//! - **Host device**: kernels as Rust code behind OpenCL C entry points
//! - **Telemetry**: per-command latency histograms (optional, default on)
//! - **OpenCL**: the same pipeline on real devices through `opencl3` (optional)

pub mod apps;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod executor;
pub mod image;
pub mod kernel;
pub mod kernels;
pub mod memory;
pub mod partition;
pub mod pipeline;
pub mod platform;
pub mod prelude;
pub mod program;
pub mod queue;
pub mod telemetry;
pub mod verify;

#[cfg(feature = "opencl")]
pub mod opencl;

pub use config::{Config, ConfigBuilder};
pub use context::Context;
pub use error::{Error, Result};
pub use pipeline::{ErrorLedger, MultiQueuePipeline, PipelineOutcome, Stage};
