//! Boundary between the request pipeline and the classifier.
//!
//! The classifier is shared read-only by every request thread. Whether
//! calls into it may overlap is a policy decision made here, not an
//! assumption about the backend: `ExecutionPolicy::Serialized` (the default)
//! funnels every prediction through a single-slot gate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use super::classifier::{Classifier, PathologyScores};
use crate::error::InferenceError;
use crate::imaging::CanonicalTensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionPolicy {
    /// At most one prediction runs at a time.
    #[default]
    Serialized,
    /// Predictions may overlap; the classifier must be reentrant.
    Concurrent,
}

/// Timed-out workers allowed to keep running before new calls are refused.
pub const DEFAULT_MAX_WORKERS: usize = 4;

#[derive(Clone)]
pub struct InferenceAdapter {
    classifier: Arc<dyn Classifier>,
    gate: Arc<Mutex<()>>,
    policy: ExecutionPolicy,
    timeout: Option<Duration>,
    workers: Arc<AtomicUsize>,
    max_workers: usize,
}

/// Holds one worker slot; released when the worker thread ends, even by
/// panic, or when the thread never starts.
struct WorkerSlot(Arc<AtomicUsize>);

impl WorkerSlot {
    fn acquire(count: &Arc<AtomicUsize>, max: usize) -> Option<WorkerSlot> {
        count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| WorkerSlot(Arc::clone(count)))
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl InferenceAdapter {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        InferenceAdapter {
            classifier,
            gate: Arc::new(Mutex::new(())),
            policy: ExecutionPolicy::default(),
            timeout: None,
            workers: Arc::new(AtomicUsize::new(0)),
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// With a timeout, each prediction runs on a worker thread. A timed-out
    /// worker is not cancelled; it finishes in the background (and, under
    /// `Serialized`, keeps the gate until it does).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bounds the worker threads alive at once, including timed-out ones.
    /// Calls beyond the bound fail with `InferenceError::Saturated`.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Worker threads currently running.
    pub fn workers_in_flight(&self) -> usize {
        self.workers.load(Ordering::Acquire)
    }

    pub fn model_name(&self) -> &str {
        self.classifier.model_name()
    }

    /// The model vocabulary. An empty vocabulary is a collaborator failure.
    pub fn pathologies(&self) -> Result<&[String], InferenceError> {
        let labels = self.classifier.pathologies();
        if labels.is_empty() {
            return Err(InferenceError::EmptyVocabulary);
        }
        Ok(labels)
    }

    pub fn predict(&self, tensor: CanonicalTensor) -> Result<PathologyScores, InferenceError> {
        let scores = match self.timeout {
            None => run_gated(self.classifier.as_ref(), &self.gate, self.policy, &tensor)?,
            Some(limit) => self.predict_with_timeout(tensor, limit)?,
        };
        check_scores(self.classifier.pathologies(), &scores)?;
        Ok(scores)
    }

    fn predict_with_timeout(&self, tensor: CanonicalTensor, limit: Duration) -> Result<PathologyScores, InferenceError> {
        let slot = WorkerSlot::acquire(&self.workers, self.max_workers)
            .ok_or(InferenceError::Saturated { limit: self.max_workers })?;
        let (tx, rx) = mpsc::channel();
        let classifier = Arc::clone(&self.classifier);
        let gate = Arc::clone(&self.gate);
        let policy = self.policy;

        std::thread::Builder::new()
            .name("inference".into())
            .spawn(move || {
                let _slot = slot;
                let result = run_gated(classifier.as_ref(), &gate, policy, &tensor);
                // The receiver is gone if the caller already timed out.
                let _ = tx.send(result);
            })
            .map_err(|e| InferenceError::Worker(e.to_string()))?;

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(InferenceError::Timeout(limit)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(InferenceError::Worker("inference worker exited without a result".into()))
            }
        }
    }
}

fn run_gated(
    classifier: &dyn Classifier,
    gate: &Mutex<()>,
    policy: ExecutionPolicy,
    tensor: &CanonicalTensor,
) -> Result<PathologyScores, InferenceError> {
    match policy {
        ExecutionPolicy::Concurrent => classifier.predict(tensor),
        ExecutionPolicy::Serialized => {
            // The gate guards no data, so a poisoned lock is still usable.
            let _slot = gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            classifier.predict(tensor)
        }
    }
}

/// Every vocabulary label must be scored with a finite value in [0, 1].
fn check_scores(vocabulary: &[String], scores: &PathologyScores) -> Result<(), InferenceError> {
    if scores.len() != vocabulary.len() {
        return Err(InferenceError::OutputArity { expected: vocabulary.len(), actual: scores.len() });
    }
    for label in vocabulary {
        match scores.get(label) {
            Some(score) if score.is_finite() && (0.0..=1.0).contains(&score) => {}
            Some(score) => return Err(InferenceError::InvalidScore { label: label.clone(), score }),
            None => return Err(InferenceError::InvalidScore { label: label.clone(), score: f32::NAN }),
        }
    }
    Ok(())
}
