//! RGBA images as the image kernels see them.
//!
//! Pixels are stored row-major as four interleaved `i32` channels. Files are
//! decoded and encoded with the `image` crate (JPEG, PNG and PNM), with the
//! format taken from the path extension. Decoded images carry alpha 0 and
//! encoding drops alpha.

use crate::error::{Error, Result};
use ::image::{DynamicImage, ImageError, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;

pub const CHANNELS: usize = 4;

impl From<ImageError> for Error {
    fn from(err: ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    width: usize,
    height: usize,
    data: Vec<i32>,
}

impl RgbaImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * CHANNELS],
        }
    }

    pub fn from_raw(width: usize, height: usize, data: Vec<i32>) -> Result<Self> {
        if data.len() != width * height * CHANNELS {
            return Err(Error::image(format!(
                "{}x{} RGBA image needs {} values, got {}",
                width,
                height,
                width * height * CHANNELS,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build an image from a function of the pixel position.
    pub fn from_fn<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> [i32; 3],
    {
        let mut data = Vec::with_capacity(width * height * CHANNELS);
        for y in 0..height {
            for x in 0..width {
                let [r, g, b] = f(x, y);
                data.extend_from_slice(&[r, g, b, 0]);
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> usize {
        self.width * self.height
    }

    pub fn data(&self) -> &[i32] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<i32> {
        self.data
    }

    pub fn pixel(&self, x: usize, y: usize) -> [i32; 4] {
        let i = (y * self.width + x) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// The first channel of every pixel, row-major.
    pub fn red_channel(&self) -> Vec<i32> {
        self.data.iter().step_by(CHANNELS).copied().collect()
    }

    /// Widen an 8-bit RGB raster, whatever its source format was.
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        let mut data = Vec::with_capacity(rgb.len() / 3 * CHANNELS);
        for px in rgb.pixels() {
            let [r, g, b] = px.0;
            data.extend_from_slice(&[r as i32, g as i32, b as i32, 0]);
        }
        Self {
            width: rgb.width() as usize,
            height: rgb.height() as usize,
            data,
        }
    }

    /// Narrow to 8-bit RGB, clamping channel values.
    pub fn to_rgb8(&self) -> Result<RgbImage> {
        let width = u32::try_from(self.width)
            .map_err(|_| Error::image(format!("width {} too large to encode", self.width)))?;
        let height = u32::try_from(self.height)
            .map_err(|_| Error::image(format!("height {} too large to encode", self.height)))?;
        let raw = self
            .data
            .chunks_exact(CHANNELS)
            .flat_map(|px| px[..3].iter().map(|&v| v.clamp(0, 255) as u8))
            .collect();
        RgbImage::from_raw(width, height, raw)
            .ok_or_else(|| Error::image("raster does not match its dimensions"))
    }

    /// Decode an in-memory file, guessing the format from its contents.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_dynamic(&::image::load_from_memory(bytes)?))
    }

    pub fn encode(&self, format: ImageFormat) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(self.to_rgb8()?).write_to(&mut out, format)?;
        Ok(out.into_inner())
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let decoded = ::image::open(path).map_err(|e| match e {
            ImageError::IoError(io) => Error::Io(format!("{}: {}", path.display(), io)),
            other => Error::image(format!("{}: {}", path.display(), other)),
        })?;
        Ok(Self::from_dynamic(&decoded))
    }

    /// Write to `path` in the format its extension names.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let format = ImageFormat::from_path(path)
            .map_err(|e| Error::image(format!("{}: {}", path.display(), e)))?;
        self.to_rgb8()?.save_with_format(path, format).map_err(|e| match e {
            ImageError::IoError(io) => Error::Io(format!("{}: {}", path.display(), io)),
            other => Error::image(format!("{}: {}", path.display(), other)),
        })
    }
}
