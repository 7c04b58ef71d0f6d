use std::ops::Range;
use std::sync::Arc;

/// A run of consecutive work-groups of one launch, queued on the compute units.
pub(crate) struct Batch {
    pub(crate) kernel: Arc<str>,
    pub(crate) groups: Range<usize>,
    func: Box<dyn FnOnce() + Send + 'static>,
}

impl Batch {
    pub(crate) fn new<F>(kernel: Arc<str>, groups: Range<usize>, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Batch {
            kernel,
            groups,
            func: Box::new(f),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.groups.len()
    }

    pub(crate) fn execute(self) {
        (self.func)();
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("kernel", &self.kernel)
            .field("groups", &self.groups)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_batch_runs_once_and_reports_its_groups() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let batch = Batch::new(Arc::from("vecadd"), 4..9, move || {
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(batch.len(), 5);
        assert_eq!(format!("{:?}", batch), "Batch { kernel: \"vecadd\", groups: 4..9 }");
        batch.execute();
        assert!(ran.load(Ordering::SeqCst));
    }
}
