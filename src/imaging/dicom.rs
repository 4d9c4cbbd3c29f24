//! DICOM to 8-bit raster conversion.
//!
//! The pixel buffer is min-max rescaled onto 0..=255 and truncated. A flat
//! buffer (max == min) has no meaningful rescale and is rejected.

use dicom_pixeldata::{DecodedPixelData, PixelDecoder, PixelRepresentation, PlanarConfiguration};

use super::raster::RasterImage;
use crate::error::DicomDecodeError;

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

/// Parses a DICOM Part 10 byte stream and returns its first frame as an
/// 8-bit-scale raster with the source rows, columns and samples per pixel.
pub fn normalize(bytes: &[u8]) -> Result<RasterImage, DicomDecodeError> {
    let stream = strip_preamble(bytes)?;

    let obj = dicom_object::from_reader(stream).map_err(|e| DicomDecodeError::Parse(e.to_string()))?;
    let decoded = obj
        .decode_pixel_data()
        .map_err(|e| DicomDecodeError::PixelData(e.to_string()))?;

    let rows = decoded.rows() as usize;
    let cols = decoded.columns() as usize;
    let samples = decoded.samples_per_pixel() as usize;

    let frame_len = rows * cols * samples;
    if frame_len == 0 {
        return Err(DicomDecodeError::EmptyPixelData);
    }

    let mut values: Vec<f32> = if samples > 1 && decoded.planar_configuration() != PlanarConfiguration::Standard {
        // The converter refuses colour-by-plane data, so take raw samples.
        let planes = planar_samples(&decoded)?;
        if planes.len() < frame_len {
            return Err(DicomDecodeError::EmptyPixelData);
        }
        interleave_planes(&planes[..frame_len], samples)
    } else {
        decoded
            .to_vec::<f32>()
            .map_err(|e| DicomDecodeError::PixelData(e.to_string()))?
    };

    if values.len() < frame_len {
        return Err(DicomDecodeError::EmptyPixelData);
    }
    values.truncate(frame_len);

    let scaled = rescale_to_u8_range(&values)?;
    RasterImage::from_interleaved(rows, cols, samples, scaled)
        .map_err(|e| DicomDecodeError::PixelData(e.to_string()))
}

/// Raw first-frame samples of colour-by-plane pixel data.
fn planar_samples(decoded: &DecodedPixelData<'_>) -> Result<Vec<f32>, DicomDecodeError> {
    let pixel_data = |e: dicom_pixeldata::Error| DicomDecodeError::PixelData(e.to_string());
    let signed = decoded.pixel_representation() == PixelRepresentation::Signed;
    match decoded.bits_allocated() {
        8 => {
            let raw = decoded.frame_data(0).map_err(pixel_data)?;
            Ok(if signed {
                raw.iter().map(|&b| f32::from(b as i8)).collect()
            } else {
                raw.iter().map(|&b| f32::from(b)).collect()
            })
        }
        16 => {
            let raw = decoded.frame_data_ow(0).map_err(pixel_data)?;
            Ok(if signed {
                raw.iter().map(|&w| f32::from(w as i16)).collect()
            } else {
                raw.iter().map(|&w| f32::from(w)).collect()
            })
        }
        bits => Err(DicomDecodeError::PixelData(format!(
            "unsupported bits allocated for planar pixel data: {bits}"
        ))),
    }
}

/// Reorders `[c][pixel]` planes into `[pixel][c]` interleaved samples.
pub fn interleave_planes(planes: &[f32], samples: usize) -> Vec<f32> {
    let plane_len = planes.len() / samples;
    (0..plane_len)
        .flat_map(|p| (0..samples).map(move |c| planes[c * plane_len + p]))
        .collect()
}

/// `floor((v - min) / (max - min) * 255)`, clamped to 0..=255.
pub fn rescale_to_u8_range(values: &[f32]) -> Result<Vec<f32>, DicomDecodeError> {
    if values.is_empty() {
        return Err(DicomDecodeError::EmptyPixelData);
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DicomDecodeError::NonFinite);
    }

    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if max == min {
        return Err(DicomDecodeError::FlatImage(min));
    }

    let range = max - min;
    Ok(values
        .iter()
        .map(|&v| ((v - min) / range * 255.0).floor().clamp(0.0, 255.0))
        .collect())
}

/// Skips the 128-byte preamble when present; the stream must then start
/// with the `DICM` magic code.
fn strip_preamble(bytes: &[u8]) -> Result<&[u8], DicomDecodeError> {
    if bytes.len() >= PREAMBLE_LEN + MAGIC.len() && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] == MAGIC {
        return Ok(&bytes[PREAMBLE_LEN..]);
    }
    if bytes.starts_with(MAGIC) {
        return Ok(bytes);
    }
    Err(DicomDecodeError::NotDicom("missing DICM magic code".into()))
}
