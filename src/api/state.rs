use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::model::{Classifier, InferenceAdapter};
use crate::rate_limit::RateLimiter;

/// Shared state handed to every request thread.
///
/// Only the rate limiter is mutated per request (behind its own lock); the
/// classifier is read-only after startup.
pub struct AppState {
    pub adapter: InferenceAdapter,
    pub limiter: RateLimiter,
    pub threshold: f32,
    pub samples_dir: PathBuf,
    pub max_upload_bytes: u64,
}

impl AppState {
    pub fn new(config: &ServiceConfig, classifier: Arc<dyn Classifier>) -> Self {
        let adapter = InferenceAdapter::new(classifier)
            .with_policy(config.execution_policy)
            .with_timeout(config.inference_timeout);
        AppState {
            adapter,
            limiter: RateLimiter::new(config.rate_limit),
            threshold: config.threshold,
            samples_dir: config.samples_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Handle cloned into each request thread.
pub type SharedState = Arc<AppState>;
