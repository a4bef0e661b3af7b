use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Environment variable overriding the packaged model directory.
pub const MODEL_DIR_ENV: &str = "PHRASE_TTS_MODEL_DIR";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid engine config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings for locating and driving the synthesis model.
///
/// ```rust
/// use phrase_tts::EngineConfigBuilder;
///
/// let config = EngineConfigBuilder::default()
///     .development_model_dir("assets/tts")
///     .warmup_text("Hi!")
///     .build()
///     .unwrap();
/// assert_eq!(config.sentinel_file, "model.onnx");
/// ```
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct EngineConfig {
    /// Model directory shipped alongside a packaged build. Checked first.
    #[builder(setter(into, strip_option))]
    pub packaged_model_dir: Option<PathBuf>,
    /// Model directory used when running from a source checkout.
    #[builder(setter(into, strip_option))]
    pub development_model_dir: Option<PathBuf>,
    /// File whose presence marks a directory as a usable model directory.
    pub sentinel_file: String,
    /// Optional reference recording, relative to the model directory.
    pub reference_voice_file: String,
    /// Throwaway phrase synthesized by `warmup`.
    pub warmup_text: String,
    /// Inference threads. `None` lets the backend decide.
    #[builder(setter(into, strip_option))]
    pub num_threads: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let packaged_model_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("resources/models/tts")));
        Self {
            packaged_model_dir,
            development_model_dir: Some(PathBuf::from("models/tts")),
            sentinel_file: "model.onnx".to_string(),
            reference_voice_file: "reference.wav".to_string(),
            warmup_text: "Hello!".to_string(),
            num_threads: None,
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply `PHRASE_TTS_MODEL_DIR`, if set, as the packaged model directory.
    pub fn apply_env(mut self) -> Self {
        if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
            if !dir.is_empty() {
                log::info!("Using model directory from {MODEL_DIR_ENV}: {dir}");
                self.packaged_model_dir = Some(PathBuf::from(dir));
            }
        }
        self
    }

    /// Candidate model directories in lookup order.
    pub fn candidate_dirs(&self) -> Vec<PathBuf> {
        [&self.packaged_model_dir, &self.development_model_dir]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Find the first candidate directory containing the sentinel file.
    pub fn resolve_model_dir(&self) -> Result<PathBuf, EngineError> {
        let searched = self.candidate_dirs();
        for dir in &searched {
            if dir.join(&self.sentinel_file).is_file() {
                log::info!("Resolved model directory {}", dir.display());
                return Ok(dir.clone());
            }
            log::debug!("No {} in {}", self.sentinel_file, dir.display());
        }
        Err(EngineError::ModelFilesMissing { searched })
    }
}
