use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::InferenceError;
use crate::imaging::CanonicalTensor;

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// Ordered `label -> score` mapping produced by one prediction.
///
/// Iteration (and JSON serialization) follows insertion order, which is the
/// classifier's vocabulary order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathologyScores {
    entries: Vec<(String, f32)>,
}

impl PathologyScores {
    pub fn new() -> Self {
        PathologyScores::default()
    }

    /// Appends an entry. A repeated label replaces the earlier score in place.
    pub fn insert(&mut self, label: impl Into<String>, score: f32) {
        let label = label.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = score,
            None => self.entries.push((label, score)),
        }
    }

    pub fn get(&self, label: &str) -> Option<f32> {
        self.entries.iter().find(|(l, _)| l == label).map(|(_, s)| *s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries.iter().map(|(l, s)| (l.as_str(), *s))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<L: Into<String>> FromIterator<(L, f32)> for PathologyScores {
    fn from_iter<I: IntoIterator<Item = (L, f32)>>(iter: I) -> Self {
        let mut scores = PathologyScores::new();
        for (label, score) in iter {
            scores.insert(label, score);
        }
        scores
    }
}

impl Serialize for PathologyScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, score) in &self.entries {
            map.serialize_entry(label, score)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Classifier seam
// ---------------------------------------------------------------------------

/// The pretrained model, as seen by the request pipeline.
///
/// Implementations are loaded once at startup and shared read-only between
/// request threads; `predict` must not mutate model state.
pub trait Classifier: Send + Sync {
    /// Identifier reported in `model_info.model_name`.
    fn model_name(&self) -> &str;

    /// Ordered vocabulary of labels `predict` scores.
    fn pathologies(&self) -> &[String];

    fn predict(&self, tensor: &CanonicalTensor) -> Result<PathologyScores, InferenceError>;
}
