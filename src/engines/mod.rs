//! Inference backends.
//!
//! # Available Backends
//!
//! Enable backends via Cargo features:
//! - `onnx` - ONNX Runtime voice-cloning model

#[cfg(feature = "onnx")]
pub mod onnx;

use crate::config::EngineConfig;
use crate::BackendLoader;

/// Backend loader for the features this crate was built with.
///
/// Without an inference feature the loader always fails, which leaves the
/// engine in [`EngineStatus::ModelLoadFailed`](crate::EngineStatus::ModelLoadFailed).
pub fn default_loader(config: &EngineConfig) -> BackendLoader {
    #[cfg(feature = "onnx")]
    {
        onnx::loader(onnx::OnnxModelParams {
            model_file: config.sentinel_file.clone(),
            num_threads: config.num_threads,
        })
    }

    #[cfg(not(feature = "onnx"))]
    {
        let _ = config;
        Box::new(|dir: &std::path::Path| -> Result<Box<dyn crate::InferenceBackend>, crate::BoxError> {
            Err(format!(
                "no inference backend compiled in (enable the `onnx` feature) for {}",
                dir.display()
            )
            .into())
        })
    }
}
