//! Classifier boundary: audio clip in, per-label probabilities out

use crate::error::AudioError;
use serde::{Deserialize, Serialize};

/// Logits are multiplied by this factor before normalization.
/// Lower values flatten the distribution; the display bars depend on it.
pub const SOFTMAX_TEMPERATURE: f32 = 0.3;

/// Labels of the stock five-class speech emotion model, in output order
pub const DEFAULT_CLASSIFIER_LABELS: [&str; 5] = ["neutral", "happy", "sad", "angry", "other"];

/// Probability assigned to one classifier label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Audio emotion classifier.
///
/// `classify` returns one score per declared label, in `labels()` order.
pub trait Classifier: Send {
    /// Declared label set, in output order
    fn labels(&self) -> &[String];

    fn classify(&mut self, samples: &[f32], sample_rate: u32) -> Result<Vec<LabelScore>, AudioError>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn labels(&self) -> &[String] {
        (**self).labels()
    }

    fn classify(&mut self, samples: &[f32], sample_rate: u32) -> Result<Vec<LabelScore>, AudioError> {
        (**self).classify(samples, sample_rate)
    }
}

/// Raw model producing unnormalized logits for a clip
pub trait LogitModel: Send {
    fn logits(&mut self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>, AudioError>;
}

/// Classifier applying the temperature-scaled softmax to a logit model
pub struct SoftmaxClassifier<M> {
    model: M,
    labels: Vec<String>,
}

impl<M: LogitModel> SoftmaxClassifier<M> {
    pub fn new(model: M, labels: Vec<String>) -> Result<Self, AudioError> {
        if labels.is_empty() {
            return Err(AudioError::Config("Classifier needs at least one label".to_string()));
        }
        Ok(Self { model, labels })
    }

    /// Classifier over the stock five-class label set
    pub fn with_default_labels(model: M) -> Self {
        Self {
            model,
            labels: DEFAULT_CLASSIFIER_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl<M: LogitModel> Classifier for SoftmaxClassifier<M> {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn classify(&mut self, samples: &[f32], sample_rate: u32) -> Result<Vec<LabelScore>, AudioError> {
        if samples.is_empty() {
            return Err(AudioError::ClassifierFailure("Empty audio clip".to_string()));
        }

        let logits = self.model.logits(samples, sample_rate)?;
        if logits.len() != self.labels.len() {
            return Err(AudioError::ClassifierFailure(format!(
                "Model produced {} logits for {} labels",
                logits.len(),
                self.labels.len()
            )));
        }

        let probabilities = softmax_with_temperature(&logits, SOFTMAX_TEMPERATURE)?;
        Ok(self
            .labels
            .iter()
            .zip(probabilities)
            .map(|(label, p)| LabelScore {
                label: label.clone(),
                score: round_score(p),
            })
            .collect())
    }
}

/// `softmax(logits * scale)`, shifted by the max for numerical stability
pub fn softmax_with_temperature(logits: &[f32], scale: f32) -> Result<Vec<f32>, AudioError> {
    if logits.is_empty() {
        return Err(AudioError::ClassifierFailure("No logits".to_string()));
    }
    if logits.iter().any(|l| !l.is_finite()) {
        return Err(AudioError::ClassifierFailure("Non-finite logit".to_string()));
    }

    let scaled: Vec<f32> = logits.iter().map(|l| l * scale).collect();
    let max = scaled.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scaled.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    Ok(exps.into_iter().map(|e| e / sum).collect())
}

/// Scores are reported with five decimals
fn round_score(p: f32) -> f32 {
    (p * 100_000.0).round() / 100_000.0
}

/// Zero-mean, unit-variance normalization applied before inference
pub fn normalize_samples(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let n = samples.len() as f32;
    let mean = samples.iter().sum::<f32>() / n;
    let variance = samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / n;
    let denom = (variance + 1e-7).sqrt();
    samples.iter().map(|s| (s - mean) / denom).collect()
}
