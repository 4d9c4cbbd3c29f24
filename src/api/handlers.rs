use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::json;

use super::request::ApiRequest;
use super::response::ApiResponse;
use super::state::AppState;
use crate::error::AnalyzeError;
use crate::findings::significant;
use crate::format::{self, FileKind};
use crate::imaging::{self, dicom, ImageInput};
use crate::model::PathologyScores;
use crate::rate_limit::Admission;

/// Multipart field carrying the upload.
pub const IMAGE_FIELD: &str = "image";

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

pub fn health() -> ApiResponse {
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    ApiResponse::json(200, &json!({ "status": "healthy", "timestamp": timestamp }))
}

// ---------------------------------------------------------------------------
// GET /pathologies
// ---------------------------------------------------------------------------

pub fn pathologies(state: &AppState) -> ApiResponse {
    match state.adapter.pathologies() {
        Ok(labels) => ApiResponse::json(
            200,
            &json!({ "success": true, "pathologies": labels, "count": labels.len() }),
        ),
        Err(e) => {
            tracing::error!(error = %e, model = state.adapter.model_name(), "pathology list unavailable");
            ApiResponse::error(500, "Failed to load pathologies", None)
        }
    }
}

// ---------------------------------------------------------------------------
// POST /analyze
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ModelInfo<'a> {
    model_name: &'a str,
    total_pathologies: usize,
}

#[derive(Serialize)]
struct AnalysisBody<'a> {
    success: bool,
    predictions: &'a PathologyScores,
    pathologies_detected: &'a PathologyScores,
    model_info: ModelInfo<'a>,
}

pub fn analyze(state: &AppState, request: &ApiRequest) -> ApiResponse {
    match run_analysis(state, request) {
        Ok(response) => response,
        Err(err) => failure(&err),
    }
}

fn run_analysis(state: &AppState, request: &ApiRequest) -> Result<ApiResponse, AnalyzeError> {
    let upload = request
        .uploaded_file(IMAGE_FIELD)
        .ok_or_else(|| AnalyzeError::validation("No image file provided"))?;
    if upload.filename.is_empty() {
        return Err(AnalyzeError::validation("No file selected"));
    }
    let kind = format::classify(&upload.filename);
    if !kind.is_accepted() {
        return Err(AnalyzeError::validation_with(
            "Invalid file type",
            format!("Allowed file types: {}", format::allowed_list()),
        ));
    }
    tracing::debug!(filename = %upload.filename, ?kind, bytes = upload.bytes.len(), "validated upload");

    if let Admission::Rejected { retry_after } = state.limiter.admit(&request.client) {
        return Err(AnalyzeError::RateLimitExceeded { retry_after });
    }

    let input = match kind {
        FileKind::Dicom => ImageInput::Raster(dicom::normalize(&upload.bytes)?),
        _ => ImageInput::Encoded(&upload.bytes),
    };
    let tensor = imaging::canonicalize(input)?;
    tracing::debug!(shape = ?tensor.shape(), "canonicalized");

    let predictions = state.adapter.predict(tensor)?;
    let detected = significant(&predictions, state.threshold);
    tracing::info!(
        filename = %upload.filename,
        detected = detected.len(),
        total = predictions.len(),
        "analysis complete"
    );

    Ok(ApiResponse::json(
        200,
        &AnalysisBody {
            success: true,
            predictions: &predictions,
            pathologies_detected: &detected,
            model_info: ModelInfo {
                model_name: state.adapter.model_name(),
                total_pathologies: predictions.len(),
            },
        },
    ))
}

/// Logs `err` at the level its status deserves and renders it.
pub fn failure(err: &AnalyzeError) -> ApiResponse {
    if err.is_server_fault() {
        tracing::error!(error = %err, status = err.status(), "request failed");
    } else {
        tracing::warn!(error = %err, status = err.status(), "request rejected");
    }
    ApiResponse::from_error(err)
}

// ---------------------------------------------------------------------------
// GET /random-image
// ---------------------------------------------------------------------------

pub fn random_image(state: &AppState) -> ApiResponse {
    let dir = &state.samples_dir;
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "sample directory missing");
        return ApiResponse::error(404, &format!("Images folder not found: {}", dir.display()), None);
    }

    let candidates = match sample_images(dir) {
        Ok(files) => files,
        Err(e) => {
            tracing::error!(error = %e, dir = %dir.display(), "cannot list sample directory");
            return ApiResponse::error(500, "Internal server error", None);
        }
    };
    let Some(path) = candidates.choose(&mut rand::thread_rng()) else {
        return ApiResponse::error(404, &format!("No images available in {}", dir.display()), None);
    };

    match fs::read(path) {
        Ok(bytes) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            tracing::debug!(file = %path.display(), "serving sample image");
            ApiResponse::new(200, mime.essence_str(), bytes)
        }
        Err(e) => {
            tracing::error!(error = %e, file = %path.display(), "cannot read sample image");
            ApiResponse::error(500, "Internal server error", None)
        }
    }
}

/// Regular files in `dir` whose extension is a raster format.
fn sample_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_raster = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| format::classify(n) == FileKind::Raster);
        if is_raster && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use serde_json::Value;
    use tiny_http::Method;

    use super::*;
    use crate::config::ServiceConfig;
    use crate::error::InferenceError;
    use crate::imaging::dicom::tests::dicom_bytes;
    use crate::imaging::{CanonicalTensor, TARGET_SIZE};
    use crate::model::{Classifier, DenseClassifier};

    pub(crate) const BOUNDARY: &str = "lungscanTestBoundary";

    pub(crate) const LABELS: [&str; 14] = [
        "Atelectasis",
        "Consolidation",
        "Infiltration",
        "Pneumothorax",
        "Edema",
        "Emphysema",
        "Fibrosis",
        "Effusion",
        "Pneumonia",
        "Pleural_Thickening",
        "Cardiomegaly",
        "Nodule",
        "Mass",
        "Hernia",
    ];

    /// Even labels score sigmoid(2) ≈ 0.88, odd labels sigmoid(-2) ≈ 0.12.
    pub(crate) fn state_with(config: ServiceConfig) -> AppState {
        let biases = (0..LABELS.len()).map(|i| if i % 2 == 0 { 2.0 } else { -2.0 }).collect();
        let classifier = DenseClassifier::constant(
            "test-densenet",
            TARGET_SIZE,
            LABELS.iter().map(|s| s.to_string()).collect(),
            biases,
        )
        .unwrap();
        AppState::new(&config, Arc::new(classifier))
    }

    pub(crate) fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Jpeg(90))
            .unwrap();
        out
    }

    pub(crate) fn multipart(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        out.extend_from_slice(data);
        out.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        out
    }

    fn upload(field: &str, filename: &str, data: &[u8]) -> ApiRequest {
        ApiRequest::new(Method::Post, "/analyze")
            .with_body(format!("multipart/form-data; boundary={BOUNDARY}"), multipart(field, filename, data))
            .with_client("10.0.0.1")
    }

    fn json_of(resp: &ApiResponse) -> Value {
        serde_json::from_slice(&resp.body).unwrap()
    }

    #[test]
    fn health_reports_utc_timestamp() {
        let resp = health();
        assert_eq!(resp.status, 200);
        let body = json_of(&resp);
        assert_eq!(body["status"], "healthy");
        let ts = body["timestamp"].as_str().unwrap();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00Z".len());
    }

    #[test]
    fn pathologies_lists_vocabulary_in_order() {
        let state = state_with(ServiceConfig::default());
        let body = json_of(&pathologies(&state));
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 14);
        assert_eq!(body["pathologies"][0], "Atelectasis");
        assert_eq!(body["pathologies"][13], "Hernia");
    }

    struct Unlabelled;

    impl Classifier for Unlabelled {
        fn model_name(&self) -> &str {
            "unlabelled"
        }

        fn pathologies(&self) -> &[String] {
            &[]
        }

        fn predict(&self, _: &CanonicalTensor) -> Result<PathologyScores, InferenceError> {
            Ok(PathologyScores::new())
        }
    }

    #[test]
    fn empty_vocabulary_is_a_server_error() {
        let state = AppState::new(&ServiceConfig::default(), Arc::new(Unlabelled));
        let resp = pathologies(&state);
        assert_eq!(resp.status, 500);
        assert_eq!(json_of(&resp)["success"], false);
    }

    #[test]
    fn jpeg_upload_scores_every_label() {
        let state = state_with(ServiceConfig::default());
        let resp = analyze(&state, &upload("image", "chest.jpg", &jpeg(300, 200)));
        assert_eq!(resp.status, 200, "{}", String::from_utf8_lossy(&resp.body));

        let body = json_of(&resp);
        assert_eq!(body["success"], true);
        let predictions = body["predictions"].as_object().unwrap();
        assert_eq!(predictions.len(), 14);
        for (_, score) in predictions {
            let s = score.as_f64().unwrap();
            assert!((0.0..=1.0).contains(&s));
        }
        let detected = body["pathologies_detected"].as_object().unwrap();
        assert_eq!(detected.len(), 7);
        assert!(detected.contains_key("Atelectasis"));
        assert!(!detected.contains_key("Consolidation"));
        assert_eq!(body["model_info"]["model_name"], "test-densenet");
        assert_eq!(body["model_info"]["total_pathologies"], 14);
    }

    #[test]
    fn predictions_keep_vocabulary_order() {
        let state = state_with(ServiceConfig::default());
        let resp = analyze(&state, &upload("image", "chest.jpg", &jpeg(64, 64)));
        let raw = String::from_utf8(resp.body).unwrap();
        let first = raw.find("\"Atelectasis\"").unwrap();
        let last = raw.find("\"Hernia\"").unwrap();
        assert!(first < last);
    }

    #[test]
    fn dicom_upload_is_analyzed() {
        let state = state_with(ServiceConfig::default());
        let pixels: Vec<u16> = (0..64 * 48).map(|i| (i % 4096) as u16).collect();
        let resp = analyze(&state, &upload("image", "scan.DCM", &dicom_bytes(48, 64, &pixels)));
        assert_eq!(resp.status, 200, "{}", String::from_utf8_lossy(&resp.body));
        assert_eq!(json_of(&resp)["predictions"].as_object().unwrap().len(), 14);
    }

    #[test]
    fn flat_dicom_is_rejected() {
        let state = state_with(ServiceConfig::default());
        let resp = analyze(&state, &upload("image", "flat.dcm", &dicom_bytes(8, 8, &[500; 64])));
        assert_eq!(resp.status, 400);
        assert_eq!(json_of(&resp)["error"], "Invalid DICOM file");
    }

    #[test]
    fn garbage_dicom_is_rejected() {
        let state = state_with(ServiceConfig::default());
        let resp = analyze(&state, &upload("image", "scan.dcm", b"definitely not dicom"));
        assert_eq!(resp.status, 400);
        assert_eq!(json_of(&resp)["error"], "Invalid DICOM file");
    }

    #[test]
    fn undecodable_raster_is_a_client_error() {
        let state = state_with(ServiceConfig::default());
        let resp = analyze(&state, &upload("image", "chest.png", b"not a png"));
        assert_eq!(resp.status, 400);
        assert_eq!(json_of(&resp)["error"], "Could not process image");
    }

    #[test]
    fn validation_messages() {
        let state = state_with(ServiceConfig::default());

        let resp = analyze(&state, &upload("file", "chest.jpg", b"x"));
        assert_eq!(resp.status, 400);
        assert_eq!(json_of(&resp)["error"], "No image file provided");

        let resp = analyze(&state, &upload("image", "", b""));
        assert_eq!(json_of(&resp)["error"], "No file selected");

        let resp = analyze(&state, &upload("image", "notes.txt", b"hello"));
        let body = json_of(&resp);
        assert_eq!(body["error"], "Invalid file type");
        assert_eq!(body["message"], "Allowed file types: png, jpg, jpeg, gif, bmp, tiff, dcm");
    }

    #[test]
    fn invalid_requests_do_not_consume_rate_limit() {
        let state = state_with(ServiceConfig::default());
        for _ in 0..20 {
            analyze(&state, &upload("image", "notes.txt", b"hello"));
        }
        let resp = analyze(&state, &upload("image", "chest.jpg", &jpeg(32, 32)));
        assert_eq!(resp.status, 200);
    }

    #[test]
    fn eleventh_request_is_rate_limited() {
        let state = state_with(ServiceConfig::default());
        let image = jpeg(32, 32);
        for _ in 0..10 {
            assert_eq!(analyze(&state, &upload("image", "chest.jpg", &image)).status, 200);
        }
        let resp = analyze(&state, &upload("image", "chest.jpg", &image));
        assert_eq!(resp.status, 429);
        assert!(resp.header("Retry-After").is_some());

        let other = upload("image", "chest.jpg", &image).with_client("10.0.0.2");
        assert_eq!(analyze(&state, &other).status, 200);
    }

    #[test]
    fn missing_sample_directory_is_404() {
        let mut config = ServiceConfig::default();
        config.samples_dir = PathBuf::from("/nonexistent/lungscan-samples");
        let resp = random_image(&state_with(config));
        assert_eq!(resp.status, 404);
        assert_eq!(
            json_of(&resp)["error"],
            "Images folder not found: /nonexistent/lungscan-samples"
        );
    }

    #[test]
    fn empty_sample_directory_is_404() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.txt"), b"no images here").unwrap();
        let mut config = ServiceConfig::default();
        config.samples_dir = dir.path().to_path_buf();
        let resp = random_image(&state_with(config));
        assert_eq!(resp.status, 404);
        assert!(json_of(&resp)["error"].as_str().unwrap().starts_with("No images available in"));
    }

    #[test]
    fn random_image_serves_a_sample() {
        let dir = tempfile::tempdir().unwrap();
        let image = jpeg(8, 8);
        fs::write(dir.path().join("a.jpg"), &image).unwrap();
        fs::write(dir.path().join("notes.txt"), b"skip").unwrap();
        fs::write(dir.path().join("scan.dcm"), b"skip").unwrap();
        let mut config = ServiceConfig::default();
        config.samples_dir = dir.path().to_path_buf();

        let resp = random_image(&state_with(config));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("Content-Type"), Some("image/jpeg"));
        assert_eq!(resp.body, image);
    }
}
