use std::path::Path;

use crate::{BackendLoader, BoxError, InferenceBackend, ReferenceVoice};

use super::model::OnnxVoiceModel;

/// Parameters for configuring ONNX model loading.
#[derive(Debug, Clone)]
pub struct OnnxModelParams {
    /// Graph file name inside the model directory.
    pub model_file: String,
    /// Number of CPU threads to use for inference.
    /// `None` uses the ORT default (typically all available cores).
    pub num_threads: Option<usize>,
}

impl Default for OnnxModelParams {
    fn default() -> Self {
        Self {
            model_file: "model.onnx".to_string(),
            num_threads: None,
        }
    }
}

/// ONNX-backed synthesis engine.
pub struct OnnxEngine {
    model: OnnxVoiceModel,
}

impl OnnxEngine {
    pub fn load(model_dir: &Path, params: OnnxModelParams) -> Result<Self, BoxError> {
        let model = OnnxVoiceModel::load(model_dir, &params.model_file, params.num_threads)?;
        Ok(Self { model })
    }
}

impl InferenceBackend for OnnxEngine {
    fn sample_rate(&self) -> u32 {
        self.model.sample_rate()
    }

    fn synthesize(
        &mut self,
        text: &str,
        speed: f32,
        voice: Option<&ReferenceVoice>,
    ) -> Result<Vec<f32>, BoxError> {
        Ok(self.model.synthesize_text(text, speed, voice)?)
    }
}

/// Loader that builds an [`OnnxEngine`] on the execution unit's thread.
pub fn loader(params: OnnxModelParams) -> BackendLoader {
    Box::new(move |dir: &Path| -> Result<Box<dyn InferenceBackend>, BoxError> {
        Ok(Box::new(OnnxEngine::load(dir, params)?))
    })
}
