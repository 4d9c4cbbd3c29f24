use serde::{Deserialize, Serialize};

use super::activation::ActivationFunction;
use super::matrix::Matrix;

/// Fully connected layer: `a = f(x W + b)`.
///
/// `weights` is `input_size x size`, `biases` is `1 x size`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub weights: Matrix,
    pub biases: Matrix,
    pub activation: ActivationFunction,
}

impl Layer {
    pub fn input_size(&self) -> usize {
        self.weights.rows
    }

    pub fn size(&self) -> usize {
        self.weights.cols
    }

    /// Checks internal shape consistency; returns a description of the
    /// first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if !self.weights.is_consistent() {
            return Err(format!(
                "weights declare {}x{} but hold {} values",
                self.weights.rows,
                self.weights.cols,
                self.weights.data.len()
            ));
        }
        if !self.biases.is_consistent() || self.biases.rows != 1 || self.biases.cols != self.size() {
            return Err(format!(
                "biases must be 1x{}, got {}x{}",
                self.size(),
                self.biases.rows,
                self.biases.cols
            ));
        }
        Ok(())
    }

    /// Forward pass. `None` when `input` has the wrong length.
    pub fn forward(&self, input: &[f32]) -> Option<Vec<f32>> {
        let mut z = self.weights.left_mul(input)?;
        for (v, b) in z.iter_mut().zip(&self.biases.data) {
            *v += b;
        }
        self.activation.apply(&mut z);
        Some(z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> Layer {
        Layer {
            weights: Matrix::from_rows(vec![vec![1.0, -1.0], vec![2.0, 0.0]]).unwrap(),
            biases: Matrix::from_rows(vec![vec![0.5, 0.0]]).unwrap(),
            activation: ActivationFunction::ReLU,
        }
    }

    #[test]
    fn forward_applies_weights_bias_and_activation() {
        // [1 1] * W = [3, -1]; + b = [3.5, -1]; relu = [3.5, 0]
        assert_eq!(layer().forward(&[1.0, 1.0]).unwrap(), vec![3.5, 0.0]);
    }

    #[test]
    fn forward_rejects_wrong_input_length() {
        assert!(layer().forward(&[1.0]).is_none());
    }

    #[test]
    fn validate_catches_bias_mismatch() {
        let mut l = layer();
        l.biases = Matrix::zeros(1, 3);
        assert!(l.validate().unwrap_err().contains("biases"));
    }
}
