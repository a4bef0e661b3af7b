use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    BackendLoader, BoxError, EngineConfig, EngineConfigBuilder, InferenceBackend, ReferenceVoice,
};

pub const FAKE_SAMPLE_RATE: u32 = 16_000;

/// Deterministic backend: ~50ms of tone per character, scaled by speed, followed
/// by 200ms of silence. Text containing "reject" fails, "crash" panics.
#[derive(Clone)]
pub struct FakeBackend {
    calls: Arc<AtomicUsize>,
    saw_voice: Arc<AtomicBool>,
    gate: Option<Arc<Mutex<mpsc::Receiver<()>>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            saw_voice: Arc::new(AtomicBool::new(false)),
            gate: None,
        }
    }

    /// Every synthesis blocks until a message is sent on (or the sender drops) the returned channel.
    pub fn gated() -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let mut backend = Self::new();
        backend.gate = Some(Arc::new(Mutex::new(rx)));
        (backend, tx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn saw_voice(&self) -> bool {
        self.saw_voice.load(Ordering::SeqCst)
    }

    pub fn loader(&self) -> BackendLoader {
        let backend = self.clone();
        Box::new(move |_dir: &Path| -> Result<Box<dyn InferenceBackend>, BoxError> {
            Ok(Box::new(backend))
        })
    }
}

impl InferenceBackend for FakeBackend {
    fn sample_rate(&self) -> u32 {
        FAKE_SAMPLE_RATE
    }

    fn synthesize(
        &mut self,
        text: &str,
        speed: f32,
        voice: Option<&ReferenceVoice>,
    ) -> Result<Vec<f32>, BoxError> {
        if let Some(gate) = &self.gate {
            let _ = gate.lock().recv();
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if voice.is_some() {
            self.saw_voice.store(true, Ordering::SeqCst);
        }
        if text.contains("crash") {
            panic!("fake backend crashed");
        }
        if text.contains("reject") {
            return Err("model rejected input".into());
        }

        let voiced = (text.chars().count() as f32 * 800.0 / speed) as usize;
        let silence = FAKE_SAMPLE_RATE as usize / 5;
        let mut samples: Vec<f32> = (0..voiced)
            .map(|i| {
                0.5 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / FAKE_SAMPLE_RATE as f32)
                    .sin()
            })
            .collect();
        samples.extend(std::iter::repeat(0.0).take(silence));
        Ok(samples)
    }
}

pub fn failing_loader() -> BackendLoader {
    Box::new(|dir: &Path| -> Result<Box<dyn InferenceBackend>, BoxError> {
        Err(format!("cannot load model from {}", dir.display()).into())
    })
}

/// A temporary model directory containing the sentinel file.
pub fn provisioned_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("model.onnx"), b"fake").unwrap();
    dir
}

pub fn config_for(dir: &Path) -> EngineConfig {
    EngineConfigBuilder::default()
        .packaged_model_dir(dir)
        .development_model_dir(dir.join("missing"))
        .build()
        .unwrap()
}
