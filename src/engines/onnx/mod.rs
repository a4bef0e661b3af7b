//! ONNX Runtime voice-cloning backend.
//!
//! Drives a single-graph synthesis model that maps character tokens, a speed
//! multiplier and (optionally) a reference recording straight to a waveform.
//!
//! # Model Directory Layout
//!
//! ```text
//! models/tts/
//! ├── model.onnx       # Synthesis graph (also the availability sentinel)
//! ├── config.json      # Optional: { "sample_rate": 24000, "vocab": { "a": 43, ... } }
//! └── reference.wav    # Optional: voice to clone
//! ```
//!
//! # Graph Contract
//!
//! | Input | Type | Notes |
//! |---|---|---|
//! | `input_ids` or `tokens` | int64 `[1, T]` | padded with `0` on both ends |
//! | `speed` | float32 or int32 `[1]` | detected at load |
//! | `reference_audio` or `ref_audio` | float32 `[1, N]` | optional |
//!
//! The first output is taken as the mono waveform.
//!
//! # Examples
//!
//! ```rust,no_run
//! use phrase_tts::engines::onnx::{OnnxEngine, OnnxModelParams};
//! use phrase_tts::InferenceBackend;
//! use std::path::Path;
//!
//! let mut engine = OnnxEngine::load(Path::new("models/tts"), OnnxModelParams::default())?;
//! let samples = engine.synthesize("Hello there", 1.0, None)?;
//! println!("{} samples at {}Hz", samples.len(), engine.sample_rate());
//! # Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
//! ```

pub mod engine;
pub mod model;
pub mod vocab;

pub use engine::{loader, OnnxEngine, OnnxModelParams};
pub use model::OnnxError;
