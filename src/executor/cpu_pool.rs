use super::launch::{BatchGuard, LaunchLatch};
use super::panic_handler::PanicHandler;
use super::task::Batch;
use super::worker::{Worker, WorkerId, WorkerState};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::kernel::{HostKernel, KernelArgs, NdRange};
use crossbeam_deque::{Injector, Stealer};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{trace, warn};

/// Batches queued per compute unit for one launch, so that stealing can
/// even out groups of uneven cost.
const BATCHES_PER_UNIT: usize = 4;

#[cfg(target_os = "linux")]
fn pin_thread_to_core(core_id: usize) {
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core_id % libc::CPU_SETSIZE as usize, &mut cpuset);
        let result = libc::sched_setaffinity(
            0, // current thread
            std::mem::size_of::<libc::cpu_set_t>(),
            &cpuset,
        );
        if result != 0 {
            warn!(
                thread = std::thread::current().name().unwrap_or("unknown"),
                core = core_id,
                "failed to pin compute unit"
            );
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub compute_units: usize,
    pub batches_executed: u64,
    pub batches_stolen: u64,
    pub busy_time_ns: u64,
    pub kernel_panics: usize,
}

/// The compute units of the host device.
pub struct CpuPool {
    workers: Vec<WorkerHandle>,
    injector: Arc<Injector<Batch>>,
    shutdown: Arc<AtomicBool>,
    num_threads: usize,
    pending_batches: Arc<AtomicUsize>,
    panic_handler: Arc<PanicHandler>,
}

struct WorkerHandle {
    id: WorkerId,
    thread: Option<JoinHandle<()>>,
    unparker: thread::Thread,
    state: Arc<WorkerState>,
}

impl CpuPool {
    pub fn new(config: &Config) -> Result<Self> {
        let num_threads = config.compute_unit_count();
        if num_threads == 0 {
            return Err(Error::config("need at least 1 compute unit"));
        }

        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let pending_batches = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(num_threads);
        let mut stealers: Vec<Stealer<Batch>> = Vec::with_capacity(num_threads);

        for id in 0..num_threads {
            let worker = Worker::new(id);
            stealers.push(worker.local_queue.stealer());
            workers.push(worker);
        }

        let mut handles = Vec::with_capacity(num_threads);

        for worker in workers {
            let id = worker.id;
            let state = Arc::clone(&worker.state);
            let stealers_clone = stealers.clone();
            let injector_clone = injector.clone();
            let shutdown_clone = shutdown.clone();
            let pending = pending_batches.clone();
            let name = format!("{}-{}", config.thread_name_prefix, id);

            let mut builder = thread::Builder::new().name(name);

            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let pin_workers = config.pin_workers;
            let thread = builder
                .spawn(move || {
                    #[cfg(target_os = "linux")]
                    if pin_workers {
                        pin_thread_to_core(id);
                    }
                    #[cfg(not(target_os = "linux"))]
                    let _ = pin_workers;

                    worker.run(stealers_clone, injector_clone, shutdown_clone, pending);
                })
                .map_err(|e| Error::execution(format!("failed to spawn compute unit: {}", e)))?;

            let unparker = thread.thread().clone();

            handles.push(WorkerHandle {
                id,
                thread: Some(thread),
                unparker,
                state,
            });
        }

        Ok(Self {
            workers: handles,
            injector,
            shutdown,
            num_threads,
            pending_batches,
            panic_handler: Arc::new(PanicHandler::new()),
        })
    }

    pub(crate) fn submit(&self, batch: Batch) {
        self.pending_batches.fetch_add(1, Ordering::Relaxed);
        self.injector.push(batch);

        for worker in &self.workers {
            worker.unparker.unpark();
        }
    }

    pub fn pending_batches(&self) -> usize {
        self.pending_batches.load(Ordering::Relaxed)
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Execute every work-group of `range` and block until all are done.
    ///
    /// Once a group fails, batches that have not started their next group
    /// stop early; the first failure is returned.
    pub fn run_nd_range(
        &self,
        kernel: Arc<dyn HostKernel>,
        args: Arc<KernelArgs>,
        range: NdRange,
    ) -> Result<()> {
        let groups = range.group_count();
        if groups == 0 {
            return Ok(());
        }

        let batch_size = groups.div_ceil(self.num_threads * BATCHES_PER_UNIT).max(1);
        let batches = groups.div_ceil(batch_size);
        let latch = Arc::new(LaunchLatch::new(batches));
        let name: Arc<str> = Arc::from(kernel.name());

        trace!(
            kernel = kernel.name(),
            groups,
            batches,
            "dispatching work-groups"
        );

        for batch in 0..batches {
            let start = batch * batch_size;
            let end = (start + batch_size).min(groups);
            let kernel = Arc::clone(&kernel);
            let args = Arc::clone(&args);
            let latch = Arc::clone(&latch);
            let panics = Arc::clone(&self.panic_handler);

            self.submit(Batch::new(Arc::clone(&name), start..end, move || {
                let _guard = BatchGuard(&latch);
                for g in start..end {
                    if latch.failed() {
                        break;
                    }
                    let group = range.group(g);
                    let outcome = panics
                        .execute(|| kernel.run_group(&group, &args))
                        .map_err(Error::from)
                        .and_then(|r| r);
                    if let Err(e) = outcome {
                        latch.fail(e);
                        break;
                    }
                }
            }));
        }

        latch.wait()
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            compute_units: self.num_threads,
            kernel_panics: self.panic_handler.panic_count(),
            ..PoolStats::default()
        };
        for worker in &self.workers {
            stats.batches_executed += worker.state.batches_executed.load(Ordering::Relaxed);
            stats.batches_stolen += worker.state.batches_stolen.load(Ordering::Relaxed);
            stats.busy_time_ns += worker.state.busy_time_ns.load(Ordering::Relaxed);
        }
        stats
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);

        // wake everyone up to check shutdown flag
        for worker in &self.workers {
            worker.unparker.unpark();
        }

        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    warn!(unit = worker.id, "compute unit exited with a panic");
                }
            }
        }
    }
}

impl Drop for CpuPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CpuPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuPool")
            .field("compute_units", &self.num_threads)
            .field("pending_batches", &self.pending_batches())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::kernel::{ArgKind, Kernel, WorkItem};
    use crate::memory::{DeviceBuffer, MemFlags};

    struct Fill;

    impl HostKernel for Fill {
        fn name(&self) -> &str {
            "fill"
        }

        fn signature(&self) -> &[ArgKind] {
            &[ArgKind::Buffer("int"), ArgKind::Int]
        }

        fn run_item(&self, item: &WorkItem, args: &KernelArgs) -> Result<()> {
            let out = args.buffer::<i32>(0)?;
            let poison = args.int(1)?;
            let i = item.global_id(0);
            if poison >= 0 && i == poison as usize {
                panic!("poisoned item {}", i);
            }
            out.set(i, i as i32 * 2);
            Ok(())
        }
    }

    fn pool(units: usize) -> CpuPool {
        let config = Config::builder().compute_units(units).build().unwrap();
        CpuPool::new(&config).unwrap()
    }

    fn launch(pool: &CpuPool, len: usize, poison: i32) -> (DeviceBuffer<i32>, Result<()>) {
        let out = DeviceBuffer::<i32>::new(len, MemFlags::WriteOnly);
        let mut k = Kernel::new(Arc::new(Fill));
        k.set_arg(0, &out).unwrap();
        k.set_arg(1, poison).unwrap();
        let args = Arc::new(k.bind().unwrap());
        let range = NdRange::linear(len).with_local([7, 1, 1]);
        let result = pool.run_nd_range(Arc::clone(k.body()), args, range);
        (out, result)
    }

    #[test]
    fn test_pool_creation() {
        let pool = pool(4);
        assert_eq!(pool.num_threads(), 4);
    }

    #[test]
    fn test_run_covers_every_item() {
        let pool = pool(3);
        let (out, result) = launch(&pool, 1000, -1);
        assert!(result.is_ok());
        let expected: Vec<i32> = (0..1000).map(|i| i * 2).collect();
        assert_eq!(out.to_vec(), expected);
        assert!(pool.stats().batches_executed > 0);
    }

    #[test]
    fn test_kernel_panic_becomes_error() {
        let pool = pool(2);
        let (_, result) = launch(&pool, 100, 42);
        assert!(matches!(result, Err(Error::Execution(_))));
        assert_eq!(pool.stats().kernel_panics, 1);

        // the pool keeps working afterwards
        let (_, result) = launch(&pool, 100, -1);
        assert!(result.is_ok());
    }

    #[test]
    fn test_empty_range_is_noop() {
        let pool = pool(1);
        let (_, result) = launch(&pool, 0, -1);
        assert!(result.is_ok());
    }
}
