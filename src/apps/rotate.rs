//! Rotation of an RGBA image around its centre.

use super::{timed, Check};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::image::{RgbaImage, CHANNELS};
use crate::kernel::NdRange;
use crate::kernels::{rotate_source, ROTATE_SOURCE};
use crate::memory::MemFlags;
use crate::verify::{verify, Tolerance};

pub const LOCAL_SIZE: [usize; 3] = [4, 4, 1];

pub fn host(image: &RgbaImage, theta: f32) -> RgbaImage {
    let (w, h) = (image.width(), image.height());
    let mut data = vec![0; w * h * CHANNELS];
    for y in 0..h {
        for x in 0..w {
            if let Some((xs, ys)) = rotate_source(x, y, w, h, theta) {
                let out = (y * w + x) * CHANNELS;
                data[out..out + CHANNELS].copy_from_slice(&image.pixel(xs, ys));
            }
        }
    }
    // dimensions are taken from a valid image
    RgbaImage::from_raw(w, h, data).unwrap_or_else(|_| RgbaImage::new(w, h))
}

pub(crate) fn dims(image: &RgbaImage) -> Result<(i32, i32)> {
    match (i32::try_from(image.width()), i32::try_from(image.height())) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(Error::image("image dimensions exceed the kernel's int range")),
    }
}

pub fn device(context: &Context, options: &str, image: &RgbaImage, theta: f32) -> Result<RgbaImage> {
    let (w, h) = dims(image)?;
    let program = context.build_program(ROTATE_SOURCE, options)?;
    let mut kernel = program.kernel("rrotate")?;
    let queue = context.create_queue()?;

    let src = context.create_buffer_from(image.data(), MemFlags::ReadOnly);
    let dst = context.create_buffer::<i32>(image.data().len(), MemFlags::WriteOnly);

    kernel.set_arg(0, &src)?;
    kernel.set_arg(1, &dst)?;
    kernel.set_arg(2, w)?;
    kernel.set_arg(3, h)?;
    kernel.set_arg(4, theta)?;

    let range = NdRange::grid(image.width(), image.height()).with_local(LOCAL_SIZE);
    let run = queue.enqueue_nd_range(&kernel, range, &[])?;
    run.wait()?;
    let data = queue.read_to_vec(&dst, 0, image.data().len(), &[])?;
    RgbaImage::from_raw(image.width(), image.height(), data)
}

pub fn run(context: &Context, options: &str, image: &RgbaImage, theta: f32) -> Result<(RgbaImage, Check<i32>)> {
    let (expected, host_time) = timed(|| host(image, theta));
    let (output, device_time) = timed(|| device(context, options, image, theta));
    let output = output?;

    let check = Check {
        label: format!("rotate by {} rad", theta),
        verification: verify(expected.data(), output.data(), Tolerance::Exact),
        host_time,
        device_time,
    };
    Ok((output, check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn ctx() -> Context {
        let config = Config::builder().compute_units(2).build().unwrap();
        Context::host(&config).unwrap()
    }

    fn gradient() -> RgbaImage {
        RgbaImage::from_fn(13, 9, |x, y| [x as i32 * 10, y as i32 * 20, 100])
    }

    #[test]
    fn test_zero_rotation_is_identity() {
        let img = gradient();
        let out = device(&ctx(), "", &img, 0.0).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_quarter_turn_matches_host() {
        let img = gradient();
        let (out, check) = run(&ctx(), "", &img, std::f32::consts::FRAC_PI_4).unwrap();
        assert!(check.passed());
        // corners fall outside the source after 45 degrees
        assert_eq!(out.pixel(0, 0), [0, 0, 0, 0]);
    }
}
