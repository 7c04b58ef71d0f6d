//! `C = A + B` over integer vectors.

use super::{timed, Check};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::kernel::NdRange;
use crate::kernels::VECADD_SOURCE;
use crate::memory::MemFlags;
use crate::verify::{verify, Tolerance};

pub const DEFAULT_ELEMENTS: usize = 2048 * 16;

/// The inputs of the original example: `A[i] = B[i] = i`.
pub fn default_inputs(len: usize) -> (Vec<i32>, Vec<i32>) {
    let a: Vec<i32> = (0..len as i32).collect();
    (a.clone(), a)
}

pub fn host(a: &[i32], b: &[i32]) -> Vec<i32> {
    a.iter().zip(b).map(|(x, y)| x.wrapping_add(*y)).collect()
}

pub fn device(context: &Context, options: &str, a: &[i32], b: &[i32]) -> Result<Vec<i32>> {
    if a.len() != b.len() {
        return Err(Error::config(format!(
            "vector lengths differ: {} and {}",
            a.len(),
            b.len()
        )));
    }
    let len = a.len();

    let program = context.build_program(VECADD_SOURCE, options)?;
    let mut kernel = program.kernel("vecadd")?;
    let queue = context.create_queue()?;

    let buf_a = context.create_buffer::<i32>(len, MemFlags::ReadOnly);
    let buf_b = context.create_buffer::<i32>(len, MemFlags::ReadOnly);
    let buf_c = context.create_buffer::<i32>(len, MemFlags::WriteOnly);

    let wa = queue.enqueue_write(&buf_a, false, 0, a, &[])?;
    let wb = queue.enqueue_write(&buf_b, false, 0, b, &[])?;

    kernel.set_arg(0, &buf_a)?;
    kernel.set_arg(1, &buf_b)?;
    kernel.set_arg(2, &buf_c)?;

    let run = queue.enqueue_nd_range(&kernel, NdRange::linear(len), &[wa, wb])?;
    // surface a kernel failure itself rather than the skipped read
    run.wait()?;
    queue.read_to_vec(&buf_c, 0, len, &[])
}

pub fn run(context: &Context, options: &str, len: usize) -> Result<Check<i32>> {
    let (a, b) = default_inputs(len);
    let (expected, host_time) = timed(|| host(&a, &b));
    let (output, device_time) = timed(|| device(context, options, &a, &b));

    Ok(Check {
        label: format!("vecadd over {} elements", len),
        verification: verify(&expected, &output?, Tolerance::Exact),
        host_time,
        device_time,
    })
}
