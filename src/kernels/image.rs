use crate::error::{Error, Result};
use crate::kernel::{ArgKind, HostKernel, KernelArgs, WorkItem};

const K: f32 = 273.0;

/// 5x5 Gaussian weights, row-major, summing to one.
#[rustfmt::skip]
pub const GAUSSIAN_5X5: [f32; 25] = [
    1.0 / K,  4.0 / K,  7.0 / K,  4.0 / K, 1.0 / K,
    4.0 / K, 16.0 / K, 26.0 / K, 16.0 / K, 4.0 / K,
    7.0 / K, 26.0 / K, 41.0 / K, 26.0 / K, 7.0 / K,
    4.0 / K, 16.0 / K, 26.0 / K, 16.0 / K, 4.0 / K,
    1.0 / K,  4.0 / K,  7.0 / K,  4.0 / K, 1.0 / K,
];

const CHANNELS: usize = 4;

/// Source pixel that output pixel `(x, y)` samples when an image of
/// `width` x `height` is rotated by `theta` radians around its centre.
pub fn rotate_source(x: usize, y: usize, width: usize, height: usize, theta: f32) -> Option<(usize, usize)> {
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let (s, c) = theta.sin_cos();
    let dx = x as f32 - cx;
    let dy = y as f32 - cy;

    let xs = (c * dx + s * dy + cx).round();
    let ys = (-s * dx + c * dy + cy).round();
    if xs >= 0.0 && ys >= 0.0 && (xs as usize) < width && (ys as usize) < height {
        Some((xs as usize, ys as usize))
    } else {
        None
    }
}

/// One channel of one output pixel of the 5x5 convolution, clamping
/// samples to the image edge. `fetch(x, y)` returns that channel's value.
pub fn blur_pixel<F>(fetch: F, x: usize, y: usize, width: usize, height: usize, filter: &[f32]) -> i32
where
    F: Fn(usize, usize) -> i32,
{
    let mut sum = 0.0f32;
    for fy in 0..5 {
        let sy = (y + fy).saturating_sub(2).min(height - 1);
        for fx in 0..5 {
            let sx = (x + fx).saturating_sub(2).min(width - 1);
            sum += fetch(sx, sy) as f32 * filter[fy * 5 + fx];
        }
    }
    sum as i32
}

fn dimensions(kernel: &str, args: &KernelArgs, pixels: usize) -> Result<(usize, usize)> {
    let w = args.int(2)?;
    let h = args.int(3)?;
    if w < 0 || h < 0 || (w as usize) * (h as usize) * CHANNELS > pixels {
        return Err(Error::execution(format!(
            "{}: a {}x{} image does not fit a buffer of {} ints",
            kernel, w, h, pixels
        )));
    }
    Ok((w as usize, h as usize))
}

pub struct Rotate;

impl HostKernel for Rotate {
    fn name(&self) -> &str {
        "rrotate"
    }

    fn signature(&self) -> &[ArgKind] {
        &[
            ArgKind::Buffer("int"),
            ArgKind::Buffer("int"),
            ArgKind::Int,
            ArgKind::Int,
            ArgKind::Float,
        ]
    }

    fn run_item(&self, item: &WorkItem, args: &KernelArgs) -> Result<()> {
        let src = args.buffer::<i32>(0)?;
        let dst = args.buffer::<i32>(1)?;
        let (w, h) = dimensions(self.name(), args, src.len().min(dst.len()))?;
        let theta = args.float(4)?;

        let (x, y) = (item.global_id(0), item.global_id(1));
        if x >= w || y >= h {
            return Ok(());
        }

        let out = (y * w + x) * CHANNELS;
        match rotate_source(x, y, w, h, theta) {
            Some((xs, ys)) => {
                let at = (ys * w + xs) * CHANNELS;
                for ch in 0..CHANNELS {
                    dst.set(out + ch, src.get(at + ch));
                }
            }
            None => {
                for ch in 0..CHANNELS {
                    dst.set(out + ch, 0);
                }
            }
        }
        Ok(())
    }
}

pub struct BlurConvFilter;

impl HostKernel for BlurConvFilter {
    fn name(&self) -> &str {
        "blurConvFilter"
    }

    fn signature(&self) -> &[ArgKind] {
        &[
            ArgKind::Buffer("int"),
            ArgKind::Buffer("int"),
            ArgKind::Int,
            ArgKind::Int,
            ArgKind::Buffer("float"),
        ]
    }

    fn run_item(&self, item: &WorkItem, args: &KernelArgs) -> Result<()> {
        let src = args.buffer::<i32>(0)?;
        let dst = args.buffer::<i32>(1)?;
        let (w, h) = dimensions(self.name(), args, src.len().min(dst.len()))?;
        let filter = args.buffer::<f32>(4)?;
        if filter.len() < 25 {
            return Err(Error::execution(format!(
                "{}: filter needs 25 weights, got {}",
                self.name(),
                filter.len()
            )));
        }
        let weights = filter.to_vec();

        let (x, y) = (item.global_id(0), item.global_id(1));
        if x >= w || y >= h {
            return Ok(());
        }

        for ch in 0..CHANNELS {
            let value = blur_pixel(
                |sx, sy| src.get((sy * w + sx) * CHANNELS + ch),
                x,
                y,
                w,
                h,
                &weights,
            );
            dst.set((y * w + x) * CHANNELS + ch, value);
        }
        Ok(())
    }
}
