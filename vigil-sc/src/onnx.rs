//! ONNX Runtime backend for the speech emotion model

use crate::classifier::{normalize_samples, LogitModel};
use crate::config::ModelConfig;
use crate::error::AudioError;
use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

/// Emotion model exported to ONNX.
///
/// Takes a `[1, samples]` float waveform and returns `[1, classes]` logits.
pub struct OnnxLogitModel {
    session: Session,
    input_name: String,
    expected_rate: Option<u32>,
}

impl OnnxLogitModel {
    pub fn load(config: &ModelConfig) -> Result<Self, AudioError> {
        let path = config
            .path
            .as_ref()
            .ok_or_else(|| AudioError::Config("No emotion model path configured".to_string()))?;

        if !path.exists() {
            return Err(AudioError::Config(format!(
                "Emotion model not found: {}",
                path.display()
            )));
        }

        let session = Session::builder()
            .and_then(|builder| builder.commit_from_file(path))
            .map_err(|e| AudioError::ClassifierFailure(format!("Failed to load model: {}", e)))?;

        info!("Loaded emotion model from {}", path.display());

        Ok(Self {
            session,
            input_name: config.input_name.clone(),
            expected_rate: None,
        })
    }

    /// Reject clips recorded at a different rate than the model was trained on
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.expected_rate = Some(sample_rate);
        self
    }
}

impl LogitModel for OnnxLogitModel {
    fn logits(&mut self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>, AudioError> {
        if let Some(expected) = self.expected_rate {
            if expected != sample_rate {
                return Err(AudioError::ClassifierFailure(format!(
                    "Model expects {} Hz audio, got {} Hz",
                    expected, sample_rate
                )));
            }
        }

        let waveform = normalize_samples(samples);
        let len = waveform.len();
        let input = Tensor::from_array(([1usize, len], waveform))
            .map_err(|e| AudioError::ClassifierFailure(format!("Failed to build input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| AudioError::ClassifierFailure(format!("Inference failed: {}", e)))?;

        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AudioError::ClassifierFailure(format!("Failed to read logits: {}", e)))?;

        Ok(logits.to_vec())
    }
}
