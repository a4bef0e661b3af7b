use std::path::Path;

use crate::audio::ReferenceVoice;
use crate::error::EngineError;
use crate::{GenerationResult, InferenceBackend};

/// Speeds outside `(0, MAX_SPEED]` are rejected before reaching the model.
pub const MAX_SPEED: f32 = 3.0;

/// Immutable state shared by every request of one execution unit.
#[derive(Debug, Clone)]
pub struct ModelContext {
    pub reference_voice: Option<ReferenceVoice>,
}

impl ModelContext {
    /// Build the context for `model_dir`, loading the reference voice if present.
    ///
    /// A missing or unreadable voice file only disables cloning.
    pub fn load(model_dir: &Path, reference_voice_file: &str) -> Self {
        let voice_path = model_dir.join(reference_voice_file);
        let reference_voice = if voice_path.is_file() {
            match ReferenceVoice::load(&voice_path) {
                Ok(voice) => Some(voice),
                Err(e) => {
                    log::warn!(
                        "Ignoring unreadable reference voice {}: {e}",
                        voice_path.display()
                    );
                    None
                }
            }
        } else {
            log::info!("No reference voice at {}, cloning disabled", voice_path.display());
            None
        };

        Self { reference_voice }
    }
}

/// Owns the loaded backend and turns normalized text into raw PCM.
pub struct InferenceDriver {
    backend: Box<dyn InferenceBackend>,
    context: ModelContext,
    invocations: u64,
}

impl InferenceDriver {
    pub fn new(backend: Box<dyn InferenceBackend>, context: ModelContext) -> Self {
        Self {
            backend,
            context,
            invocations: 0,
        }
    }

    /// Number of requests that reached the backend.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Synthesize `text` (already normalized) at `speed`.
    pub fn synthesize(&mut self, text: &str, speed: f32) -> Result<GenerationResult, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::Synthesis(
                "text is empty after normalization".to_string(),
            ));
        }
        if !(speed > 0.0 && speed <= MAX_SPEED) {
            return Err(EngineError::Synthesis(format!(
                "speed {speed} outside (0, {MAX_SPEED}]"
            )));
        }

        self.invocations += 1;
        let samples = self
            .backend
            .synthesize(text, speed, self.context.reference_voice.as_ref())
            .map_err(|e| EngineError::Synthesis(e.to_string()))?;

        if samples.is_empty() {
            return Err(EngineError::Synthesis(format!(
                "model produced no audio for {text:?}"
            )));
        }

        Ok(GenerationResult::new(samples, self.backend.sample_rate()))
    }
}

#[cfg(test)]
mod tests {
    use super::{InferenceDriver, ModelContext};
    use crate::error::EngineError;
    use crate::test_support::FakeBackend;
    use crate::ReferenceVoice;

    fn driver(voice: Option<ReferenceVoice>) -> (InferenceDriver, FakeBackend) {
        let backend = FakeBackend::new();
        let context = ModelContext { reference_voice: voice };
        (InferenceDriver::new(Box::new(backend.clone()), context), backend)
    }

    #[test]
    fn duration_scales_with_text_and_speed() {
        let (mut driver, _) = driver(None);
        let slow = driver.synthesize("Hello there", 1.0).unwrap();
        let fast = driver.synthesize("Hello there", 2.0).unwrap();
        let long = driver.synthesize("Hello there, how are you", 1.0).unwrap();

        assert!(fast.samples.len() < slow.samples.len());
        assert!(long.samples.len() > slow.samples.len());
        assert_eq!(
            slow.duration,
            slow.samples.len() as f64 / slow.sample_rate as f64
        );
        assert_eq!(driver.invocations(), 3);
    }

    #[test]
    fn empty_text_and_bad_speed_are_rejected_without_inference() {
        let (mut driver, backend) = driver(None);
        assert!(matches!(
            driver.synthesize("   ", 1.0),
            Err(EngineError::Synthesis(_))
        ));
        assert!(matches!(
            driver.synthesize("Hi", 0.0),
            Err(EngineError::Synthesis(_))
        ));
        assert!(matches!(
            driver.synthesize("Hi", 3.5),
            Err(EngineError::Synthesis(_))
        ));
        assert!(matches!(
            driver.synthesize("Hi", f32::NAN),
            Err(EngineError::Synthesis(_))
        ));
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn backend_errors_become_synthesis_errors() {
        let (mut driver, _) = driver(None);
        match driver.synthesize("reject this", 1.0) {
            Err(EngineError::Synthesis(msg)) => assert!(msg.contains("rejected")),
            other => panic!("expected synthesis error, got {other:?}"),
        }
    }

    #[test]
    fn reference_voice_is_passed_to_backend() {
        let voice = ReferenceVoice {
            samples: vec![0.1; 10],
            sample_rate: 16_000,
        };
        let (mut driver, backend) = driver(Some(voice));
        driver.synthesize("Hi", 1.0).unwrap();
        assert!(backend.saw_voice());
    }

    #[test]
    fn context_loads_voice_when_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ModelContext::load(dir.path(), "reference.wav");
        assert!(missing.reference_voice.is_none());

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(dir.path().join("reference.wav"), spec).unwrap();
        for _ in 0..160 {
            writer.write_sample(1000i16).unwrap();
        }
        writer.finalize().unwrap();

        let loaded = ModelContext::load(dir.path(), "reference.wav");
        assert_eq!(loaded.reference_voice.map(|v| v.samples.len()), Some(160));
    }
}
