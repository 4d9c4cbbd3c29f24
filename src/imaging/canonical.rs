//! Canonicalization of raster images into the classifier input tensor.
//!
//! Steps, in order: decode (for encoded bytes), channel averaging, square
//! center crop, resize to `TARGET_SIZE x TARGET_SIZE`, and intensity scaling
//! from the 8-bit range to [-1024, 1024].
//!
//! Every step before the resize is linear, so the work happens in unit space
//! ([0, 1]) where `imageops::resize` does not clamp, and the signed scale is
//! applied last.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use ndarray::{s, Array2, Array3, Axis};

use super::raster::RasterImage;
use crate::error::PreprocessError;

/// Side length of the square tensor the classifier consumes.
pub const TARGET_SIZE: usize = 224;

/// Upper bound of the input intensity scale.
const INPUT_MAX: f32 = 255.0;
/// Half-range of the output intensity scale.
const OUTPUT_SCALE: f32 = 1024.0;

/// What the canonicalizer accepts.
pub enum ImageInput<'a> {
    /// Already-decoded pixels (the DICOM path).
    Raster(RasterImage),
    /// Encoded PNG/JPEG/... bytes (the direct upload path).
    Encoded(&'a [u8]),
}

/// Single-channel `[1, H, W]` float tensor in [-1024, 1024].
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTensor {
    data: Array3<f32>,
}

impl CanonicalTensor {
    /// Wraps a `[1, H, W]` array; any other channel count is rejected.
    pub fn new(data: Array3<f32>) -> Result<Self, PreprocessError> {
        let (channels, height, width) = data.dim();
        if channels != 1 {
            return Err(PreprocessError::UnsupportedChannels(channels));
        }
        if height == 0 || width == 0 {
            return Err(PreprocessError::EmptyImage { height, width, channels });
        }
        Ok(CanonicalTensor { data })
    }

    /// `[channels, height, width]`.
    pub fn shape(&self) -> [usize; 3] {
        let (c, h, w) = self.data.dim();
        [c, h, w]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn view(&self) -> ndarray::ArrayView3<'_, f32> {
        self.data.view()
    }

    /// Values in row-major order.
    pub fn to_flat(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }
}

/// Canonicalizes to the default `TARGET_SIZE`.
pub fn canonicalize(input: ImageInput<'_>) -> Result<CanonicalTensor, PreprocessError> {
    canonicalize_with(input, TARGET_SIZE)
}

pub fn canonicalize_with(input: ImageInput<'_>, target: usize) -> Result<CanonicalTensor, PreprocessError> {
    let raster = match input {
        ImageInput::Raster(raster) => raster,
        ImageInput::Encoded(bytes) => RasterImage::decode(bytes)?,
    };
    if raster.channels() > 4 {
        return Err(PreprocessError::UnsupportedChannels(raster.channels()));
    }
    if target == 0 {
        return Err(PreprocessError::EmptyImage { height: 0, width: 0, channels: 1 });
    }

    let unit = raster.into_pixels().mapv(|v| (v / INPUT_MAX).clamp(0.0, 1.0));
    let gray = average_channels(unit);
    let square = center_crop(gray);
    let resized = resize_square(square, target)?;
    let signed = resized.mapv(|u| (2.0 * u - 1.0) * OUTPUT_SCALE);

    CanonicalTensor::new(signed.insert_axis(Axis(0)))
}

/// Anti-aliased bilinear (triangle filter) resize of a unit-range square.
fn resize_square(square: Array2<f32>, target: usize) -> Result<Array2<f32>, PreprocessError> {
    let (side, _) = square.dim();
    let side_px = u32::try_from(side).map_err(|_| PreprocessError::TooLarge(format!("{side}px side")))?;
    let target_px = u32::try_from(target).map_err(|_| PreprocessError::TooLarge(format!("{target}px target")))?;

    let raw: Vec<f32> = square.iter().copied().collect();
    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_raw(side_px, side_px, raw)
        .ok_or(PreprocessError::Shape { len: side * side, height: side, width: side, channels: 1 })?;

    let resized = imageops::resize(&buffer, target_px, target_px, FilterType::Triangle).into_raw();
    let len = resized.len();
    Array2::from_shape_vec((target, target), resized)
        .map_err(|_| PreprocessError::Shape { len, height: target, width: target, channels: 1 })
}

/// `(h, w, c)` -> `(h, w)` by the per-pixel channel mean.
fn average_channels(pixels: Array3<f32>) -> Array2<f32> {
    if pixels.dim().2 == 1 {
        return pixels.index_axis_move(Axis(2), 0);
    }
    // mean_axis only returns None for an empty axis, which RasterImage forbids.
    pixels
        .mean_axis(Axis(2))
        .unwrap_or_else(|| Array2::zeros((pixels.dim().0, pixels.dim().1)))
}

/// Crops the largest centered square. No padding.
fn center_crop(img: Array2<f32>) -> Array2<f32> {
    let (h, w) = img.dim();
    let side = h.min(w);
    let top = h / 2 - side / 2;
    let left = w / 2 - side / 2;
    img.slice(s![top..top + side, left..left + side]).to_owned()
}
