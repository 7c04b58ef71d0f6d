//! 256-bin histogram of an image's red channel.

use super::{timed, Check};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::image::RgbaImage;
use crate::kernel::NdRange;
use crate::kernels::{histogram_bin, HISTOGRAM_SOURCE, HIST_BINS};
use crate::memory::MemFlags;
use crate::verify::{verify, Tolerance};

pub const LOCAL_SIZE: usize = 256;

pub fn host(values: &[i32]) -> Vec<i32> {
    let mut hist = vec![0; HIST_BINS];
    for &v in values {
        hist[histogram_bin(v)] += 1;
    }
    hist
}

pub fn device(context: &Context, options: &str, values: &[i32]) -> Result<Vec<i32>> {
    let count = i32::try_from(values.len())
        .map_err(|_| Error::config(format!("{} samples exceed the kernel's int count", values.len())))?;

    let program = context.build_program(HISTOGRAM_SOURCE, options)?;
    let mut kernel = program.kernel("histogram")?;
    let queue = context.create_queue()?;

    let data = context.create_buffer::<i32>(values.len(), MemFlags::ReadOnly);
    let hist = context.create_buffer::<i32>(HIST_BINS, MemFlags::WriteOnly);

    let write = queue.enqueue_write(&data, false, 0, values, &[])?;
    let zero = queue.enqueue_fill(&hist, 0, 0, HIST_BINS, &[])?;

    kernel.set_arg(0, &data)?;
    kernel.set_arg(1, count)?;
    kernel.set_arg(2, &hist)?;

    let local = LOCAL_SIZE.min(values.len().max(1));
    let range = NdRange::linear(values.len()).with_local([local, 1, 1]);
    let run = queue.enqueue_nd_range(&kernel, range, &[write, zero])?;
    run.wait()?;
    queue.read_to_vec(&hist, 0, HIST_BINS, &[])
}

/// Histogram of the red channel, checked against the host count.
pub fn run(context: &Context, options: &str, image: &RgbaImage) -> Result<(Vec<i32>, Check<i32>)> {
    let red = image.red_channel();
    let (expected, host_time) = timed(|| host(&red));
    let (output, device_time) = timed(|| device(context, options, &red));
    let output = output?;

    let check = Check {
        label: format!("histogram of {}x{} image", image.width(), image.height()),
        verification: verify(&expected, &output, Tolerance::Exact),
        host_time,
        device_time,
    };
    Ok((output, check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_histogram_counts_every_pixel() {
        let config = Config::builder().compute_units(3).build().unwrap();
        let ctx = Context::host(&config).unwrap();
        let image = RgbaImage::from_fn(61, 17, |x, y| [((x * 7 + y * 3) % 256) as i32, 0, 0]);

        let (hist, check) = run(&ctx, "", &image).unwrap();
        assert!(check.passed());
        assert_eq!(hist.iter().sum::<i32>(), 61 * 17);
    }

    #[test]
    fn test_empty_input() {
        let config = Config::builder().compute_units(1).build().unwrap();
        let ctx = Context::host(&config).unwrap();
        assert_eq!(device(&ctx, "", &[]).unwrap(), vec![0; HIST_BINS]);
    }
}
