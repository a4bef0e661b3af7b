use std::path::PathBuf;

/// Boxed error type returned by inference backends and backend loaders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the speech engine to its callers.
///
/// Inference-level errors (`Synthesis`) only affect the request that caused
/// them. Unit-level errors (`EngineCrashed`, and `EngineUnavailable` after it)
/// are permanent for the lifetime of the engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Required model files are missing (searched: {searched:?})")]
    ModelFilesMissing { searched: Vec<PathBuf> },
    #[error("Speech engine is unavailable")]
    EngineUnavailable,
    #[error("Synthesis model is not loaded")]
    ModelUnavailable,
    #[error("Synthesis failed: {0}")]
    Synthesis(String),
    #[error("Speech execution unit crashed: {0}")]
    EngineCrashed(String),
}
