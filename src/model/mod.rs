pub mod activation;
pub mod adapter;
pub mod classifier;
pub mod layer;
pub mod matrix;
pub mod network;

pub use adapter::{ExecutionPolicy, InferenceAdapter};
pub use classifier::{Classifier, PathologyScores};
pub use network::{DenseClassifier, DenseNetwork};
