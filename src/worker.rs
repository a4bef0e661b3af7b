//! The isolated execution unit.
//!
//! A single dedicated OS thread owns the inference backend and serves requests
//! strictly one at a time, in arrival order. The coordinator talks to it only
//! through the typed messages below, correlated by request id. Sample buffers
//! move through the channel without copying.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::audio::post_process;
use crate::driver::{InferenceDriver, ModelContext};
use crate::error::EngineError;
use crate::text::normalize_for_inference;
use crate::{BackendLoader, GenerationResult};

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerRequest {
    Generate { id: u64, text: String, speed: f32 },
    Warmup { id: u64 },
    IsAvailable { id: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerResponse {
    /// Sent once, unsolicited, after model loading finished.
    Ready { available: bool },
    Generated { id: u64, result: GenerationResult },
    Failed { id: u64, error: EngineError },
    WarmedUp { id: u64 },
    Availability { id: u64, available: bool },
    /// The unit hit an unrecoverable error and is exiting.
    Fatal { message: String },
}

/// What the unit needs to bring up its model.
#[derive(Debug, Clone)]
pub struct UnitSettings {
    pub model_dir: PathBuf,
    pub reference_voice_file: String,
    pub warmup_text: String,
}

/// Channel endpoints held by the coordinator.
pub struct UnitHandle {
    pub requests: UnboundedSender<WorkerRequest>,
    pub responses: UnboundedReceiver<WorkerResponse>,
}

/// Spawn the execution unit thread.
///
/// The unit exits once every request sender has been dropped and the request
/// it is currently serving (if any) has finished.
pub fn spawn(settings: UnitSettings, loader: BackendLoader) -> std::io::Result<UnitHandle> {
    let (request_tx, request_rx) = unbounded_channel();
    let (response_tx, response_rx) = unbounded_channel();

    std::thread::Builder::new()
        .name("phrase-tts-unit".to_string())
        .spawn(move || run(settings, loader, request_rx, response_tx))?;

    Ok(UnitHandle {
        requests: request_tx,
        responses: response_rx,
    })
}

fn run(
    settings: UnitSettings,
    loader: BackendLoader,
    mut requests: UnboundedReceiver<WorkerRequest>,
    responses: UnboundedSender<WorkerResponse>,
) {
    let mut driver = load_driver(&settings, loader);
    let available = driver.is_some();
    if responses.send(WorkerResponse::Ready { available }).is_err() {
        return;
    }

    while let Some(request) = requests.blocking_recv() {
        let response = match request {
            WorkerRequest::IsAvailable { id } => WorkerResponse::Availability { id, available },
            WorkerRequest::Generate { id, text, speed } => {
                let Some(driver) = driver.as_mut() else {
                    let _ = responses.send(WorkerResponse::Failed {
                        id,
                        error: EngineError::ModelUnavailable,
                    });
                    continue;
                };
                match guarded(|| generate(driver, &text, speed)) {
                    Ok(Ok(result)) => WorkerResponse::Generated { id, result },
                    Ok(Err(error)) => WorkerResponse::Failed { id, error },
                    Err(message) => {
                        log::error!("Speech synthesis panicked: {message}");
                        let _ = responses.send(WorkerResponse::Fatal { message });
                        return;
                    }
                }
            }
            WorkerRequest::Warmup { id } => {
                let Some(driver) = driver.as_mut() else {
                    let _ = responses.send(WorkerResponse::Failed {
                        id,
                        error: EngineError::ModelUnavailable,
                    });
                    continue;
                };
                let started = std::time::Instant::now();
                match guarded(|| generate(driver, &settings.warmup_text, 1.0)) {
                    Ok(Ok(_)) => {
                        log::info!("Warmup finished in {:.2?}", started.elapsed());
                        WorkerResponse::WarmedUp { id }
                    }
                    Ok(Err(error)) => WorkerResponse::Failed { id, error },
                    Err(message) => {
                        log::error!("Warmup panicked: {message}");
                        let _ = responses.send(WorkerResponse::Fatal { message });
                        return;
                    }
                }
            }
        };

        if responses.send(response).is_err() {
            break;
        }
    }

    log::info!("Speech execution unit stopped");
}

fn load_driver(settings: &UnitSettings, loader: BackendLoader) -> Option<InferenceDriver> {
    let started = std::time::Instant::now();
    let dir = settings.model_dir.as_path();
    match guarded(move || loader(dir)) {
        Ok(Ok(backend)) => {
            log::info!(
                "Loaded synthesis model from {} in {:.2?}",
                dir.display(),
                started.elapsed()
            );
            let context = ModelContext::load(dir, &settings.reference_voice_file);
            Some(InferenceDriver::new(backend, context))
        }
        Ok(Err(e)) => {
            log::error!("Failed to load synthesis model from {}: {e}", dir.display());
            None
        }
        Err(message) => {
            log::error!("Synthesis model loader panicked: {message}");
            None
        }
    }
}

/// Normalize, synthesize and post-process one phrase.
pub fn generate(
    driver: &mut InferenceDriver,
    text: &str,
    speed: f32,
) -> Result<GenerationResult, EngineError> {
    let normalized = normalize_for_inference(text);
    log::debug!("Synthesizing {normalized:?} at speed {speed}");
    let raw = driver.synthesize(&normalized, speed)?;
    let samples = post_process(raw.samples, raw.sample_rate);
    Ok(GenerationResult::new(samples, raw.sample_rate))
}

fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic| {
        if let Some(s) = panic.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        }
    })
}
