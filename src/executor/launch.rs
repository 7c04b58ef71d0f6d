//! Completion tracking for one kernel launch spread over the compute units.

use crate::error::Error;
use parking_lot::{Condvar, Mutex};

struct LatchState {
    remaining: usize,
    error: Option<Error>,
}

/// Counts outstanding work-group batches and keeps the first failure.
pub(crate) struct LaunchLatch {
    state: Mutex<LatchState>,
    done: Condvar,
}

impl LaunchLatch {
    pub fn new(batches: usize) -> Self {
        Self {
            state: Mutex::new(LatchState {
                remaining: batches,
                error: None,
            }),
            done: Condvar::new(),
        }
    }

    pub fn failed(&self) -> bool {
        self.state.lock().error.is_some()
    }

    pub fn fail(&self, error: Error) {
        self.state.lock().error.get_or_insert(error);
    }

    pub fn count_down(&self) {
        let mut state = self.state.lock();
        state.remaining = state.remaining.saturating_sub(1);
        if state.remaining == 0 {
            drop(state);
            self.done.notify_all();
        }
    }

    /// Block until every batch has finished.
    pub fn wait(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        while state.remaining > 0 {
            self.done.wait(&mut state);
        }
        state.error.take().map_or(Ok(()), Err)
    }
}

/// Counts its batch down even if the batch unwinds.
pub(crate) struct BatchGuard<'a>(pub &'a LaunchLatch);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_latch_waits_for_all_batches() {
        let latch = Arc::new(LaunchLatch::new(3));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let latch = Arc::clone(&latch);
                thread::spawn(move || {
                    let _guard = BatchGuard(&latch);
                })
            })
            .collect();

        assert!(latch.wait().is_ok());
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_latch_keeps_first_error() {
        let latch = LaunchLatch::new(2);
        latch.fail(Error::execution("first"));
        latch.fail(Error::execution("second"));
        assert!(latch.failed());
        latch.count_down();
        latch.count_down();
        match latch.wait() {
            Err(Error::Execution(msg)) => assert_eq!(msg, "first"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
