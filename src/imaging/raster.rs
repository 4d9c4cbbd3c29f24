use std::io::Cursor;

use image::io::{Limits, Reader};
use image::{DynamicImage, ImageError};
use ndarray::Array3;

use crate::error::PreprocessError;

/// Largest accepted width or height of an encoded upload.
pub const MAX_IMAGE_SIDE: u32 = 8192;
/// Cap on the decoder's own allocations.
pub const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;

/// An in-memory image, laid out as `(height, width, channels)`.
///
/// Values are on the 8-bit scale (0–255) regardless of the source depth.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pixels: Array3<f32>,
}

impl RasterImage {
    /// Wraps an array, rejecting any zero-length dimension.
    pub fn new(pixels: Array3<f32>) -> Result<Self, PreprocessError> {
        let (height, width, channels) = pixels.dim();
        if height == 0 || width == 0 || channels == 0 {
            return Err(PreprocessError::EmptyImage { height, width, channels });
        }
        Ok(RasterImage { pixels })
    }

    /// Builds an image from a flat interleaved buffer (row-major, channels last).
    pub fn from_interleaved(
        height: usize,
        width: usize,
        channels: usize,
        data: Vec<f32>,
    ) -> Result<Self, PreprocessError> {
        let len = data.len();
        let pixels = Array3::from_shape_vec((height, width, channels), data)
            .map_err(|_| PreprocessError::Shape { len, height, width, channels })?;
        RasterImage::new(pixels)
    }

    /// Decodes PNG/JPEG/GIF/BMP/TIFF bytes within the default limits.
    ///
    /// The channel layout of the source is kept (L, LA, RGB or RGBA); deeper
    /// sources are converted down to 8 bits per channel by the decoder.
    pub fn decode(bytes: &[u8]) -> Result<Self, PreprocessError> {
        Self::decode_within(bytes, MAX_IMAGE_SIDE, MAX_DECODE_ALLOC)
    }

    /// Decodes with explicit bounds. The header is checked against
    /// `max_side` before any pixel buffer is allocated.
    pub fn decode_within(bytes: &[u8], max_side: u32, max_alloc: u64) -> Result<Self, PreprocessError> {
        let mut reader = Reader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PreprocessError::Decode(e.to_string()))?;

        let mut limits = Limits::default();
        limits.max_image_width = Some(max_side);
        limits.max_image_height = Some(max_side);
        limits.max_alloc = Some(max_alloc);
        reader.limits(limits);

        let img = reader.decode().map_err(|e| match e {
            ImageError::Limits(limit) => PreprocessError::TooLarge(limit.to_string()),
            other => PreprocessError::Decode(other.to_string()),
        })?;
        Self::from_dynamic(&img)
    }

    pub fn from_dynamic(img: &DynamicImage) -> Result<Self, PreprocessError> {
        let height = img.height() as usize;
        let width = img.width() as usize;

        let (channels, raw): (usize, Vec<u8>) = match img.color().channel_count() {
            1 => (1, img.to_luma8().into_raw()),
            2 => (2, img.to_luma_alpha8().into_raw()),
            3 => (3, img.to_rgb8().into_raw()),
            4 => (4, img.to_rgba8().into_raw()),
            n => return Err(PreprocessError::UnsupportedChannels(n as usize)),
        };

        let data = raw.into_iter().map(f32::from).collect();
        Self::from_interleaved(height, width, channels, data)
    }

    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    pub fn channels(&self) -> usize {
        self.pixels.dim().2
    }

    pub fn pixels(&self) -> &Array3<f32> {
        &self.pixels
    }

    pub fn into_pixels(self) -> Array3<f32> {
        self.pixels
    }
}
