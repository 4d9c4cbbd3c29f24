use std::path::Path;

use serde::{Deserialize, Serialize};

use super::activation::ActivationFunction;
use super::classifier::{Classifier, PathologyScores};
use super::layer::Layer;
use super::matrix::Matrix;
use crate::error::{InferenceError, ModelLoadError};
use crate::imaging::{CanonicalTensor, TARGET_SIZE};

/// On-disk model description: weights plus the metadata the service reports.
///
/// ```json
/// {
///   "name": "densenet121-res224-all",
///   "input_size": 224,
///   "pathologies": ["Atelectasis", "..."],
///   "layers": [{ "weights": {...}, "biases": {...}, "activation": "Sigmoid" }]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetwork {
    pub name: String,
    /// Side length of the square input tensor.
    #[serde(default = "default_input_size")]
    pub input_size: usize,
    pub pathologies: Vec<String>,
    pub layers: Vec<Layer>,
}

fn default_input_size() -> usize {
    TARGET_SIZE
}

impl DenseNetwork {
    /// Forward pass through every layer.
    fn forward(&self, input: Vec<f32>) -> Result<Vec<f32>, InferenceError> {
        let mut current = input;
        for layer in &self.layers {
            let expected = layer.input_size();
            let actual = current.len();
            current = layer
                .forward(&current)
                .ok_or(InferenceError::Shape { expected, actual })?;
        }
        Ok(current)
    }

    /// Checks that layers chain, that the first layer takes the flattened
    /// input tensor, and that the last layer yields one probability per
    /// pathology.
    fn validate(&self) -> Result<(), String> {
        if self.pathologies.is_empty() {
            return Err("model declares no pathologies".into());
        }
        let (first, last) = match (self.layers.first(), self.layers.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err("model has no layers".into()),
        };
        for (i, layer) in self.layers.iter().enumerate() {
            layer.validate().map_err(|e| format!("layer {i}: {e}"))?;
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[0].size() != pair[1].input_size() {
                return Err(format!(
                    "layer {} outputs {} values but layer {} expects {}",
                    i,
                    pair[0].size(),
                    i + 1,
                    pair[1].input_size()
                ));
            }
        }
        let input_len = self.input_size * self.input_size;
        if first.input_size() != input_len {
            return Err(format!(
                "first layer expects {} inputs, a {}x{} tensor has {}",
                first.input_size(),
                self.input_size,
                self.input_size,
                input_len
            ));
        }
        if last.size() != self.pathologies.len() {
            return Err(format!(
                "last layer has {} outputs for {} pathologies",
                last.size(),
                self.pathologies.len()
            ));
        }
        if !last.activation.is_probability() {
            return Err(format!("last layer activation {:?} does not yield probabilities", last.activation));
        }
        Ok(())
    }
}

/// `Classifier` backed by a `DenseNetwork` loaded from JSON.
#[derive(Debug)]
pub struct DenseClassifier {
    network: DenseNetwork,
}

impl DenseClassifier {
    /// Loads and validates a model file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<DenseClassifier, ModelLoadError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let file = std::fs::File::open(path).map_err(|source| ModelLoadError::Io { path: display.clone(), source })?;
        let reader = std::io::BufReader::new(file);
        let network: DenseNetwork =
            serde_json::from_reader(reader).map_err(|source| ModelLoadError::Json { path: display, source })?;
        DenseClassifier::from_network(network)
    }

    pub fn from_network(network: DenseNetwork) -> Result<DenseClassifier, ModelLoadError> {
        network.validate().map_err(ModelLoadError::Invalid)?;
        Ok(DenseClassifier { network })
    }

    /// Single sigmoid layer with zero weights and the given per-label biases.
    ///
    /// Every input produces `sigmoid(bias)` for each label, which makes it
    /// useful for smoke runs and tests where real weights are unavailable.
    pub fn constant(
        name: impl Into<String>,
        input_size: usize,
        pathologies: Vec<String>,
        biases: Vec<f32>,
    ) -> Result<DenseClassifier, ModelLoadError> {
        let outputs = pathologies.len();
        let layer = Layer {
            weights: Matrix::zeros(input_size * input_size, outputs),
            biases: Matrix { rows: 1, cols: biases.len(), data: biases },
            activation: ActivationFunction::Sigmoid,
        };
        DenseClassifier::from_network(DenseNetwork {
            name: name.into(),
            input_size,
            pathologies,
            layers: vec![layer],
        })
    }

    pub fn network(&self) -> &DenseNetwork {
        &self.network
    }
}

impl Classifier for DenseClassifier {
    fn model_name(&self) -> &str {
        &self.network.name
    }

    fn pathologies(&self) -> &[String] {
        &self.network.pathologies
    }

    fn predict(&self, tensor: &CanonicalTensor) -> Result<PathologyScores, InferenceError> {
        let [_, h, w] = tensor.shape();
        let side = self.network.input_size;
        if h != side || w != side {
            return Err(InferenceError::Shape { expected: side * side, actual: h * w });
        }

        let output = self.network.forward(tensor.to_flat())?;
        if output.len() != self.network.pathologies.len() {
            return Err(InferenceError::OutputArity {
                expected: self.network.pathologies.len(),
                actual: output.len(),
            });
        }

        Ok(self.network.pathologies.iter().cloned().zip(output).collect())
    }
}
