// compute unit thread
use super::task::Batch;
use crossbeam_deque::{Injector, Steal, Stealer, Worker as WorkerQueue};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, trace};

pub type WorkerId = usize;

// stats for each compute unit
pub struct WorkerState {
    pub batches_executed: AtomicU64,
    pub batches_stolen: AtomicU64,
    pub busy_time_ns: AtomicU64,
}

impl WorkerState {
    fn new() -> Self {
        Self {
            batches_executed: AtomicU64::new(0),
            batches_stolen: AtomicU64::new(0),
            busy_time_ns: AtomicU64::new(0),
        }
    }
}

pub(crate) struct Worker {
    pub id: WorkerId,
    pub local_queue: WorkerQueue<Batch>,
    pub state: Arc<WorkerState>,
}

impl Worker {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            local_queue: WorkerQueue::new_fifo(),
            state: Arc::new(WorkerState::new()),
        }
    }

    // main loop
    pub fn run(
        &self,
        stealers: Vec<Stealer<Batch>>,
        injector: Arc<Injector<Batch>>,
        shutdown: Arc<AtomicBool>,
        pending_batches: Arc<AtomicUsize>,
    ) {
        let mut backoff_cnt = 0;

        loop {
            if shutdown.load(Ordering::Acquire) {
                break;
            }

            // local -> global -> steal
            if let Some(batch) = self.find_batch(&stealers, &injector) {
                backoff_cnt = 0;
                self.run_batch(batch);
                pending_batches.fetch_sub(1, Ordering::Relaxed);
            } else {
                self.backoff(&mut backoff_cnt);
            }
        }
    }

    fn find_batch(&self, stealers: &[Stealer<Batch>], injector: &Injector<Batch>) -> Option<Batch> {
        if let Some(batch) = self.local_queue.pop() {
            return Some(batch);
        }

        loop {
            match injector.steal_batch_and_pop(&self.local_queue) {
                Steal::Success(batch) => return Some(batch),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }

        self.try_steal_from_workers(stealers)
    }

    fn try_steal_from_workers(&self, stealers: &[Stealer<Batch>]) -> Option<Batch> {
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        if stealers.len() < 2 {
            return None;
        }

        let mut indices: Vec<usize> = (0..stealers.len()).collect();
        indices.shuffle(&mut thread_rng());

        for &idx in &indices {
            if idx == self.id {
                continue;
            }

            loop {
                match stealers[idx].steal_batch_and_pop(&self.local_queue) {
                    Steal::Success(batch) => {
                        self.state.batches_stolen.fetch_add(1, Ordering::Relaxed);
                        return Some(batch);
                    }
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }

        None
    }

    fn run_batch(&self, batch: Batch) {
        let kernel = Arc::clone(&batch.kernel);
        let groups = batch.groups.clone();
        trace!(unit = self.id, kernel = %kernel, groups = batch.len(), "running batch");
        let start = Instant::now();

        // launches catch kernel panics themselves; this only guards the unit
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            batch.execute();
        }));
        if result.is_err() {
            error!(unit = self.id, kernel = %kernel, ?groups, "batch panicked outside a kernel");
        }

        self.state
            .busy_time_ns
            .fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
        self.state.batches_executed.fetch_add(1, Ordering::Relaxed);
    }

    fn backoff(&self, count: &mut u32) {
        const MAX_SPINS: u32 = 10;
        const MAX_YIELDS: u32 = 20;

        *count += 1;

        if *count <= MAX_SPINS {
            let spins = (*count).min(6);
            for _ in 0..(1 << spins) {
                std::hint::spin_loop();
            }
        } else if *count <= MAX_YIELDS {
            thread::yield_now();
        } else {
            thread::park_timeout(Duration::from_micros(100));
        }
    }
}
