//! Error taxonomy for the analysis pipeline.
//!
//! Each stage has its own error enum. `AnalyzeError` is what the request
//! handler matches on to choose a status code and a client-safe message.

use std::time::Duration;

/// Failure while turning an uploaded DICOM file into a raster.
#[derive(Debug, thiserror::Error)]
pub enum DicomDecodeError {
    #[error("not a DICOM Part 10 stream: {0}")]
    NotDicom(String),
    #[error("failed to parse DICOM dataset: {0}")]
    Parse(String),
    #[error("failed to decode pixel data: {0}")]
    PixelData(String),
    #[error("pixel data is empty or truncated")]
    EmptyPixelData,
    #[error("pixel data contains non-finite values")]
    NonFinite,
    #[error("image has no contrast (every pixel equals {0})")]
    FlatImage(f32),
}

/// Failure while decoding or canonicalizing a raster image.
#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("image has zero size ({height}x{width}x{channels})")]
    EmptyImage {
        height: usize,
        width: usize,
        channels: usize,
    },
    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(usize),
    #[error("image exceeds decoding limits: {0}")]
    TooLarge(String),
    #[error("pixel buffer length {len} does not match {height}x{width}x{channels}")]
    Shape {
        len: usize,
        height: usize,
        width: usize,
        channels: usize,
    },
}

/// Failure inside (or around) the classifier.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("tensor shape mismatch: expected {expected} values, got {actual}")]
    Shape { expected: usize, actual: usize },
    #[error("model returned {actual} scores for {expected} pathologies")]
    OutputArity { expected: usize, actual: usize },
    #[error("model returned an invalid score for {label}: {score}")]
    InvalidScore { label: String, score: f32 },
    #[error("model exposes no pathologies")]
    EmptyVocabulary,
    #[error("inference did not finish within {0:?}")]
    Timeout(Duration),
    #[error("inference worker failed: {0}")]
    Worker(String),
    #[error("{limit} inference workers are still running")]
    Saturated { limit: usize },
}

/// Failure while loading the classifier at startup.
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("cannot read model file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse model file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid model: {0}")]
    Invalid(String),
}

/// Every way a request to `/analyze` can end without a prediction.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("{error}")]
    Validation {
        error: String,
        message: Option<String>,
    },
    #[error(transparent)]
    DicomDecode(#[from] DicomDecodeError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Inference(InferenceError),
    #[error("inference timed out after {0:?}")]
    InferenceTimeout(Duration),
    #[error("inference capacity exhausted: {0}")]
    InferenceBusy(InferenceError),
    #[error("rate limit exceeded")]
    RateLimitExceeded { retry_after: u64 },
    #[error("payload of {actual} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64, actual: u64 },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<InferenceError> for AnalyzeError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Timeout(after) => AnalyzeError::InferenceTimeout(after),
            busy @ InferenceError::Saturated { .. } => AnalyzeError::InferenceBusy(busy),
            other => AnalyzeError::Inference(other),
        }
    }
}

impl AnalyzeError {
    pub fn validation(error: impl Into<String>) -> Self {
        AnalyzeError::Validation { error: error.into(), message: None }
    }

    pub fn validation_with(error: impl Into<String>, message: impl Into<String>) -> Self {
        AnalyzeError::Validation {
            error: error.into(),
            message: Some(message.into()),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            AnalyzeError::Validation { .. }
            | AnalyzeError::DicomDecode(_)
            | AnalyzeError::Preprocess(_) => 400,
            AnalyzeError::PayloadTooLarge { .. } => 413,
            AnalyzeError::RateLimitExceeded { .. } => 429,
            AnalyzeError::InferenceTimeout(_) | AnalyzeError::InferenceBusy(_) => 503,
            AnalyzeError::Inference(_) | AnalyzeError::Unexpected(_) => 500,
        }
    }

    /// `(error, message)` as shown to the client. 5xx internals never leak.
    pub fn client_message(&self) -> (String, Option<String>) {
        match self {
            AnalyzeError::Validation { error, message } => (error.clone(), message.clone()),
            AnalyzeError::DicomDecode(e) => ("Invalid DICOM file".into(), Some(e.to_string())),
            AnalyzeError::Preprocess(e) => ("Could not process image".into(), Some(e.to_string())),
            AnalyzeError::Inference(_) => ("Failed to analyze image".into(), None),
            AnalyzeError::InferenceTimeout(_) => (
                "Analysis timed out".into(),
                Some("The model did not respond in time, try again later".into()),
            ),
            AnalyzeError::InferenceBusy(_) => (
                "Service busy".into(),
                Some("Too many analyses are still running, try again later".into()),
            ),
            AnalyzeError::RateLimitExceeded { retry_after } => (
                "Rate limit exceeded".into(),
                Some(format!("Retry after {retry_after}s")),
            ),
            AnalyzeError::PayloadTooLarge { limit, .. } => (
                "File too large".into(),
                Some(format!("Maximum upload size is {limit} bytes")),
            ),
            AnalyzeError::Unexpected(_) => ("Internal server error".into(), None),
        }
    }

    pub fn is_server_fault(&self) -> bool {
        self.status() >= 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_map_to_400() {
        assert_eq!(AnalyzeError::validation("No image file provided").status(), 400);
        assert_eq!(AnalyzeError::from(DicomDecodeError::EmptyPixelData).status(), 400);
        assert_eq!(AnalyzeError::from(PreprocessError::Decode("bad".into())).status(), 400);
        assert_eq!(AnalyzeError::from(PreprocessError::TooLarge("9000x9000".into())).status(), 400);
    }

    #[test]
    fn throttling_and_size_have_distinct_codes() {
        assert_eq!(AnalyzeError::RateLimitExceeded { retry_after: 60 }.status(), 429);
        assert_eq!(AnalyzeError::PayloadTooLarge { limit: 10, actual: 11 }.status(), 413);
    }

    #[test]
    fn timeout_is_split_from_other_inference_errors() {
        let timeout: AnalyzeError = InferenceError::Timeout(Duration::from_secs(3)).into();
        assert!(matches!(timeout, AnalyzeError::InferenceTimeout(_)));
        assert_eq!(timeout.status(), 503);

        let busy: AnalyzeError = InferenceError::Saturated { limit: 4 }.into();
        assert!(matches!(busy, AnalyzeError::InferenceBusy(_)));
        assert_eq!(busy.status(), 503);
        assert_eq!(busy.client_message().0, "Service busy");

        let shape: AnalyzeError = InferenceError::Shape { expected: 4, actual: 2 }.into();
        assert_eq!(shape.status(), 500);
    }

    #[test]
    fn server_faults_hide_details() {
        let err = AnalyzeError::Unexpected("index out of bounds at foo.rs:12".into());
        let (error, message) = err.client_message();
        assert_eq!(error, "Internal server error");
        assert!(message.is_none());

        let err: AnalyzeError = InferenceError::Worker("panicked at model.rs".into()).into();
        let (error, message) = err.client_message();
        assert_eq!(error, "Failed to analyze image");
        assert!(message.is_none());
    }

    #[test]
    fn client_errors_keep_specific_message() {
        let err = AnalyzeError::validation_with("Invalid file type", "Allowed file types: png");
        assert_eq!(
            err.client_message(),
            ("Invalid file type".to_owned(), Some("Allowed file types: png".to_owned()))
        );
    }
}
