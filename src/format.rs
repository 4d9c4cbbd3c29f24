//! Upload format detection.
//!
//! The extension of the declared filename is the only signal used; the
//! declared content type is never trusted over it.

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Every extension accepted by `/analyze`, in the order shown to clients.
pub const ALLOWED_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "gif", "bmp", "tiff", "dcm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Decodable by the `image` crate.
    Raster,
    /// DICOM Part 10 file.
    Dicom,
    /// Missing or unsupported extension.
    Rejected,
}

impl FileKind {
    pub fn is_accepted(self) -> bool {
        self != FileKind::Rejected
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Classifies an uploaded filename by its extension (case-insensitive).
///
/// A filename without a `.` is always rejected.
pub fn classify(filename: &str) -> FileKind {
    let ext = match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return FileKind::Rejected,
    };

    match ext.as_str() {
        "dcm" => FileKind::Dicom,
        "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tiff" => FileKind::Raster,
        _ => FileKind::Rejected,
    }
}

/// `"png, jpg, ..."`, as shown in validation error messages.
pub fn allowed_list() -> String {
    ALLOWED_EXTENSIONS.join(", ")
}
