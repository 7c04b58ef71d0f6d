//! 5x5 Gaussian blur with clamp-to-edge sampling.

use super::rotate::dims;
use super::{timed, Check};
use crate::context::Context;
use crate::error::Result;
use crate::image::{RgbaImage, CHANNELS};
use crate::kernel::NdRange;
use crate::kernels::{blur_pixel, BLUR_SOURCE, GAUSSIAN_5X5};
use crate::memory::MemFlags;
use crate::verify::{verify, Tolerance};

pub const LOCAL_SIZE: [usize; 3] = [4, 4, 1];

pub fn host(image: &RgbaImage) -> RgbaImage {
    let (w, h) = (image.width(), image.height());
    let src = image.data();
    let mut data = vec![0; w * h * CHANNELS];
    for y in 0..h {
        for x in 0..w {
            for ch in 0..CHANNELS {
                data[(y * w + x) * CHANNELS + ch] = blur_pixel(
                    |sx, sy| src[(sy * w + sx) * CHANNELS + ch],
                    x,
                    y,
                    w,
                    h,
                    &GAUSSIAN_5X5,
                );
            }
        }
    }
    RgbaImage::from_raw(w, h, data).unwrap_or_else(|_| RgbaImage::new(w, h))
}

pub fn device(context: &Context, options: &str, image: &RgbaImage) -> Result<RgbaImage> {
    let (w, h) = dims(image)?;
    let program = context.build_program(BLUR_SOURCE, options)?;
    let mut kernel = program.kernel("blurConvFilter")?;
    let queue = context.create_queue()?;

    let src = context.create_buffer::<i32>(image.data().len(), MemFlags::ReadOnly);
    let dst = context.create_buffer::<i32>(image.data().len(), MemFlags::WriteOnly);
    let filter = context.create_buffer::<f32>(GAUSSIAN_5X5.len(), MemFlags::ReadOnly);

    let write_img = queue.enqueue_write(&src, false, 0, image.data(), &[])?;
    let write_filter = queue.enqueue_write(&filter, false, 0, &GAUSSIAN_5X5, &[])?;

    kernel.set_arg(0, &src)?;
    kernel.set_arg(1, &dst)?;
    kernel.set_arg(2, w)?;
    kernel.set_arg(3, h)?;
    kernel.set_arg(4, &filter)?;

    let range = NdRange::grid(image.width(), image.height()).with_local(LOCAL_SIZE);
    let run = queue.enqueue_nd_range(&kernel, range, &[write_img, write_filter])?;
    run.wait()?;
    let data = queue.read_to_vec(&dst, 0, image.data().len(), &[])?;
    RgbaImage::from_raw(image.width(), image.height(), data)
}

pub fn run(context: &Context, options: &str, image: &RgbaImage) -> Result<(RgbaImage, Check<i32>)> {
    let (expected, host_time) = timed(|| host(image));
    let (output, device_time) = timed(|| device(context, options, image));
    let output = output?;

    let check = Check {
        label: "blurConvFilter 5x5".to_string(),
        verification: verify(expected.data(), output.data(), Tolerance::Exact),
        host_time,
        device_time,
    };
    Ok((output, check))
}
