pub mod api;
pub mod config;
pub mod error;
pub mod findings;
pub mod format;
pub mod imaging;
pub mod model;
pub mod rate_limit;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

// Convenience re-exports
pub use api::{serve, AppState};
pub use config::ServiceConfig;
pub use error::AnalyzeError;
pub use imaging::{canonicalize, CanonicalTensor, ImageInput};
pub use model::{Classifier, DenseClassifier, InferenceAdapter, PathologyScores};
pub use rate_limit::{RateLimit, RateLimiter};

/// Installs the global `tracing` subscriber. `RUST_LOG` overrides the
/// default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

/// Loads configuration and the model, binds the listener and serves until
/// the listener closes.
pub fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = ServiceConfig::from_env()?;
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let classifier = DenseClassifier::load_json(&config.model_path)?;
    tracing::info!(
        model = classifier.model_name(),
        pathologies = classifier.pathologies().len(),
        path = %config.model_path.display(),
        "model loaded"
    );

    let state = Arc::new(AppState::new(&config, Arc::new(classifier)));
    let addr = config.bind_addr();
    let server = tiny_http::Server::http(&addr)?;

    tracing::info!(
        %addr,
        rate_limit = %config.rate_limit,
        threshold = config.threshold,
        samples = %config.samples_dir.display(),
        policy = ?config.execution_policy,
        "listening"
    );
    serve(server, state);
    Ok(())
}
