use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Sigmoid,
    ReLU,
    Identity,
    /// Vector-valued; applied to the whole layer output by `apply`.
    Softmax,
    Tanh,
    LeakyReLU { alpha: f32 },
}

impl ActivationFunction {
    /// Applies the activation to a full layer output in place.
    pub fn apply(&self, values: &mut [f32]) {
        match self {
            ActivationFunction::Softmax => softmax(values),
            other => values.iter_mut().for_each(|v| *v = other.scalar(*v)),
        }
    }

    fn scalar(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationFunction::ReLU => x.max(0.0),
            ActivationFunction::Identity => x,
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { x } else { alpha * x },
            // Handled as a vector in `apply`.
            ActivationFunction::Softmax => x,
        }
    }

    /// Whether every output of this activation lies in [0, 1].
    pub fn is_probability(&self) -> bool {
        matches!(self, ActivationFunction::Sigmoid | ActivationFunction::Softmax)
    }
}

/// Numerically stable softmax (max subtracted before exponentiation).
fn softmax(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        values.iter_mut().for_each(|v| *v /= sum);
    }
}
