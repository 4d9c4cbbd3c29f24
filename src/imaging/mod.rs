//! Image ingestion: raster decoding, DICOM normalization, and
//! canonicalization into the classifier's input tensor.

pub mod canonical;
pub mod dicom;
pub mod raster;

pub use canonical::{canonicalize, canonicalize_with, CanonicalTensor, ImageInput, TARGET_SIZE};
pub use raster::RasterImage;
