//! Host implementations of the bundled kernels, and their OpenCL C sources.

mod histogram;
mod image;
mod transpose;
mod vector;

pub use histogram::{histogram_bin, Histogram, HIST_BINS};
pub use self::image::{blur_pixel, rotate_source, BlurConvFilter, Rotate, GAUSSIAN_5X5};
pub use transpose::{TransposePerElement, TransposeTiled};
pub use vector::{vector_operation, VecAdd, VectorOperation};

use crate::kernel::HostKernel;
use std::sync::Arc;

pub const MULTI_QUEUE_SOURCE: &str = include_str!("../../kernels/multi_queue.cl");
pub const VECADD_SOURCE: &str = include_str!("../../kernels/vecadd.cl");
pub const TRANSPOSE_SOURCE: &str = include_str!("../../kernels/transpose.cl");
pub const HISTOGRAM_SOURCE: &str = include_str!("../../kernels/histogram.cl");
pub const ROTATE_SOURCE: &str = include_str!("../../kernels/rotate.cl");
pub const BLUR_SOURCE: &str = include_str!("../../kernels/blur.cl");

/// Every bundled kernel, ready to register.
pub fn builtins() -> Vec<Arc<dyn HostKernel>> {
    vec![
        Arc::new(VectorOperation),
        Arc::new(VecAdd),
        Arc::new(TransposePerElement),
        Arc::new(TransposeTiled),
        Arc::new(Histogram),
        Arc::new(Rotate),
        Arc::new(BlurConvFilter),
    ]
}
