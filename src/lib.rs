//! # phrase-tts
//!
//! A non-blocking speech generation engine for short, repeated phrases.
//!
//! ## Features
//!
//! - **Isolated execution**: synthesis runs on a dedicated worker thread, callers only await
//! - **Result cache**: the last 50 distinct `(text, speed)` requests are answered instantly
//! - **Voice cloning**: an optional reference WAV conditions the synthesized voice
//! - **Post-processing**: trailing silence is trimmed and loudness is leveled per phrase
//! - **Graceful degradation**: missing model files make the engine refuse requests cheaply
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! phrase-tts = { version = "2026.2", features = ["onnx"] }
//! ```
//!
//! ```ignore
//! use phrase_tts::{EngineConfig, SpeechEngine};
//!
//! let engine = SpeechEngine::start(EngineConfig::default().apply_env()).await;
//! if engine.is_available() {
//!     engine.warmup().await?;
//!     let result = engine.generate("Heeey.. let's plaay!", 1.0).await?;
//!     println!("{} samples at {}Hz", result.samples.len(), result.sample_rate);
//! }
//! ```

pub mod audio;
pub mod cache;
pub mod config;
pub mod driver;
pub mod engine;
pub mod engines;
pub mod error;
pub mod text;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

use std::path::Path;

pub use audio::{AudioError, ReferenceVoice};
pub use config::{ConfigError, EngineConfig, EngineConfigBuilder};
pub use engine::{EngineStatus, SpeechEngine};
pub use error::{BoxError, EngineError};

/// The result of a phrase generation.
///
/// Contains mono f32 PCM samples, their sample rate and the derived duration.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate of the audio
    pub sample_rate: u32,
    /// Duration in seconds, `samples.len() / sample_rate`
    pub duration: f64,
}

impl GenerationResult {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / sample_rate as f64
        };
        Self {
            samples,
            sample_rate,
            duration,
        }
    }
}

/// Common interface for neural synthesis backends.
///
/// A backend is created and used on the execution unit's thread only, so it
/// needs to be `Send` but never `Sync`.
pub trait InferenceBackend: Send {
    /// Native output sample rate of the model.
    fn sample_rate(&self) -> u32;

    /// Synthesize already-normalized text.
    ///
    /// `voice` is the reference recording for cloning, when one is loaded.
    fn synthesize(
        &mut self,
        text: &str,
        speed: f32,
        voice: Option<&ReferenceVoice>,
    ) -> Result<Vec<f32>, BoxError>;
}

/// Creates the backend from a resolved model directory.
///
/// Called once, on the execution unit's thread.
pub type BackendLoader =
    Box<dyn FnOnce(&Path) -> Result<Box<dyn InferenceBackend>, BoxError> + Send + 'static>;
