//! Square matrix transpose, per element and through local-memory tiles.

use super::{random_floats, timed, Check};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::kernel::{KernelArg, NdRange};
use crate::kernels::TRANSPOSE_SOURCE;
use crate::memory::MemFlags;
use crate::verify::{verify, Tolerance};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransposeKernel {
    PerElement,
    Tiled,
}

impl TransposeKernel {
    pub fn entry_point(&self) -> &'static str {
        match self {
            TransposeKernel::PerElement => "transpose_parallel_per_element",
            TransposeKernel::Tiled => "transpose_parallel_per_element_tiled",
        }
    }
}

/// `out[i * n + j] = input[j * n + i]`
pub fn host(input: &[f32], n: usize) -> Vec<f32> {
    let mut out = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            out[i * n + j] = input[j * n + i];
        }
    }
    out
}

/// Transpose on the device with `wg x wg` work-groups.
pub fn device(
    context: &Context,
    options: &str,
    which: TransposeKernel,
    input: &[f32],
    n: usize,
    wg: usize,
) -> Result<Vec<f32>> {
    if input.len() != n * n {
        return Err(Error::config(format!(
            "{} values do not form a {}x{} matrix",
            input.len(),
            n,
            n
        )));
    }

    let program = context.build_program(TRANSPOSE_SOURCE, options)?;
    let mut kernel = program.kernel(which.entry_point())?;
    let queue = context.create_queue()?;

    let src = context.create_buffer::<f32>(n * n, MemFlags::ReadOnly);
    let dst = context.create_buffer::<f32>(n * n, MemFlags::WriteOnly);
    kernel.set_arg(0, &src)?;
    kernel.set_arg(1, &dst)?;
    if which == TransposeKernel::Tiled {
        kernel.set_arg(2, KernelArg::local(wg * wg * std::mem::size_of::<f32>()))?;
    }

    queue.enqueue_write(&src, true, 0, input, &[])?;
    let range = NdRange::grid(n, n).with_local([wg, wg, 1]);
    let run = queue.enqueue_nd_range(&kernel, range, &[])?;
    queue.read_to_vec(&dst, 0, n * n, &[run])
}

/// Both kernels on one random matrix, each checked against the host.
pub fn run(context: &Context, options: &str, n: usize, wg: usize, seed: Option<u64>) -> Result<Vec<Check<f32>>> {
    let input = random_floats(n * n, seed);
    let (expected, host_time) = timed(|| host(&input, n));

    [TransposeKernel::PerElement, TransposeKernel::Tiled]
        .into_iter()
        .map(|which| {
            let (output, device_time) = timed(|| device(context, options, which, &input, n, wg));
            Ok(Check {
                label: which.entry_point().to_string(),
                verification: verify(&expected, &output?, Tolerance::Exact),
                host_time,
                device_time,
            })
        })
        .collect()
}
