use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

use ndarray::Array2;
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::TensorRef;

use crate::ReferenceVoice;

use super::vocab::{char_vocab, hardcoded_vocab, load_model_config, tokenize};

/// Maximum number of tokens per chunk (before padding).
pub const MAX_TOKENS: usize = 510;

/// Output sample rate when config.json does not say otherwise.
pub const DEFAULT_SAMPLE_RATE: u32 = 24000;

/// Crossfade used when concatenating chunk audio.
const CHUNK_CROSSFADE_MS: u32 = 10;

/// Token IDs of sentence punctuation in the fallback vocab, preferred split points.
const PUNCT_IDS: &[i64] = &[1, 2, 3, 4, 5, 6];

#[derive(thiserror::Error, Debug)]
pub enum OnnxError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Invalid config.json: {0}")]
    Config(String),
    #[error("No tokens produced for {0:?}")]
    NoTokens(String),
}

/// Loaded ONNX session plus what was detected about its inputs.
pub struct OnnxVoiceModel {
    session: Session,
    vocab: HashMap<char, i64>,
    sample_rate: u32,
    /// Detected input name: "input_ids" or "tokens"
    tokens_input_name: String,
    /// True if the speed input expects int32, false for float32
    speed_is_int32: bool,
    /// Name of the reference-audio input, if the graph has one
    reference_input_name: Option<String>,
}

impl OnnxVoiceModel {
    /// Load `model_file` from `model_dir`, along with config.json when present.
    pub fn load(
        model_dir: &Path,
        model_file: &str,
        num_threads: Option<usize>,
    ) -> Result<Self, OnnxError> {
        let onnx_path = model_dir.join(model_file);
        log::info!("Loading synthesis graph from {}", onnx_path.display());

        let session = init_session(&onnx_path, num_threads)?;

        let tokens_input_name = detect_tokens_input(&session);
        let speed_is_int32 = detect_speed_type(&session);
        let reference_input_name = detect_reference_input(&session);

        log::info!(
            "Detected: tokens_input='{}', speed_is_int32={}, reference_input={:?}",
            tokens_input_name,
            speed_is_int32,
            reference_input_name
        );

        let config_path = model_dir.join("config.json");
        let config = if config_path.exists() {
            load_model_config(&config_path)?
        } else {
            log::warn!("config.json not found, using defaults");
            Default::default()
        };

        let vocab = match &config.vocab {
            Some(vocab) => char_vocab(vocab)?,
            None => hardcoded_vocab(),
        };

        Ok(Self {
            session,
            vocab,
            sample_rate: config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
            tokens_input_name,
            speed_is_int32,
            reference_input_name,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Synthesize audio for `text`, conditioning on `voice` when the graph accepts it.
    pub fn synthesize_text(
        &mut self,
        text: &str,
        speed: f32,
        voice: Option<&ReferenceVoice>,
    ) -> Result<Vec<f32>, OnnxError> {
        let ids = tokenize(text, &self.vocab);
        if ids.is_empty() {
            return Err(OnnxError::NoTokens(text.to_string()));
        }

        if let Some(voice) = voice {
            if voice.sample_rate != self.sample_rate {
                log::debug!(
                    "Reference voice is {}Hz, model runs at {}Hz",
                    voice.sample_rate,
                    self.sample_rate
                );
            }
        }
        // A one-sample silence stands in for a missing reference voice.
        let silence = [0.0f32];
        let reference: &[f32] = voice.map(|v| v.samples.as_slice()).unwrap_or(&silence);

        let chunks = if ids.len() > MAX_TOKENS {
            log::debug!(
                "Token sequence exceeded limit ({} > {}), chunking",
                ids.len(),
                MAX_TOKENS
            );
            split_chunks(&ids)
        } else {
            vec![ids]
        };

        let crossfade = (self.sample_rate * CHUNK_CROSSFADE_MS / 1000) as usize;
        let mut combined = Vec::new();
        for chunk_ids in &chunks {
            let audio = self.synthesize_chunk(chunk_ids, speed, reference)?;
            if audio.is_empty() {
                continue;
            }
            if combined.is_empty() {
                combined.extend_from_slice(&audio);
            } else {
                append_with_crossfade(&mut combined, &audio, crossfade);
            }
        }

        Ok(combined)
    }

    /// Run ONNX inference on a single chunk of token IDs.
    fn synthesize_chunk(
        &mut self,
        tokens: &[i64],
        speed: f32,
        reference: &[f32],
    ) -> Result<Vec<f32>, OnnxError> {
        let seq_len = tokens.len() + 2; // +2 for padding tokens

        // Build tokens tensor: [[0, t1..tN, 0]]
        let mut padded = vec![0i64; seq_len];
        padded[1..seq_len - 1].copy_from_slice(tokens);
        let tokens_arr = Array2::from_shape_vec((1, seq_len), padded)?;
        let reference_view = ndarray::ArrayView2::from_shape((1, reference.len()), reference)?;
        let speed_int = ndarray::arr1(&[speed.round() as i32]);
        let speed_float = ndarray::arr1(&[speed]);

        let mut inputs = if self.speed_is_int32 {
            inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "speed" => TensorRef::from_array_view(speed_int.view())?,
            ]
        } else {
            inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "speed" => TensorRef::from_array_view(speed_float.view())?,
            ]
        };
        if let Some(name) = self.reference_input_name.as_deref() {
            inputs.push((
                Cow::from(name),
                SessionInputValue::from(TensorRef::from_array_view(reference_view)?),
            ));
        }

        let output = self.session.run(inputs)?;

        // Extract first output as waveform
        let first_output = output
            .iter()
            .next()
            .ok_or_else(|| OnnxError::Ort(ort::Error::new("No output from model")))?;
        let waveform = first_output.1.try_extract_array::<f32>()?;

        Ok(waveform.iter().copied().collect())
    }
}

fn init_session(onnx_path: &Path, num_threads: Option<usize>) -> Result<Session, OnnxError> {
    let providers = vec![CPUExecutionProvider::default().build()];

    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_execution_providers(providers)?;

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(onnx_path)?)
}

/// Detect the token input name ("input_ids" or "tokens") from session inputs.
fn detect_tokens_input(session: &Session) -> String {
    for input in session.inputs() {
        if input.name() == "input_ids" || input.name() == "tokens" {
            return input.name().to_string();
        }
    }
    "input_ids".to_string()
}

/// Detect whether the speed input expects int32 (true) or float32 (false).
fn detect_speed_type(session: &Session) -> bool {
    for input in session.inputs() {
        if input.name() == "speed" {
            let type_str = format!("{:?}", input.dtype());
            return type_str.contains("Int32") || type_str.contains("int32");
        }
    }
    false
}

fn detect_reference_input(session: &Session) -> Option<String> {
    session
        .inputs()
        .iter()
        .map(|input| input.name())
        .find(|name| *name == "reference_audio" || *name == "ref_audio")
        .map(str::to_string)
}

/// Split token IDs into chunks of at most `MAX_TOKENS`, preferring punctuation.
fn split_chunks(ids: &[i64]) -> Vec<Vec<i64>> {
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < ids.len() {
        let end = (start + MAX_TOKENS).min(ids.len());
        if end == ids.len() {
            chunks.push(ids[start..end].to_vec());
            break;
        }

        let split = ids[start..end]
            .iter()
            .rposition(|id| PUNCT_IDS.contains(id))
            .map(|i| start + i + 1)
            .unwrap_or(end);

        chunks.push(ids[start..split].to_vec());
        start = split;
    }

    chunks
}

fn append_with_crossfade(dst: &mut Vec<f32>, src: &[f32], crossfade_samples: usize) {
    let overlap = crossfade_samples.min(dst.len()).min(src.len());
    if overlap == 0 {
        dst.extend_from_slice(src);
        return;
    }

    let dst_start = dst.len() - overlap;
    for i in 0..overlap {
        let t = (i + 1) as f32 / (overlap as f32 + 1.0);
        dst[dst_start + i] = dst[dst_start + i] * (1.0 - t) + src[i] * t;
    }

    dst.extend_from_slice(&src[overlap..]);
}
