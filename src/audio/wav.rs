use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Unsupported WAV format: {0}")]
    UnsupportedFormat(String),
    #[error("WAV file contains no samples")]
    Empty,
}

/// Reference recording used to condition voice cloning.
///
/// Loaded once when the execution unit starts and shared read-only by every
/// request afterwards. Multi-channel input is averaged down to mono.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceVoice {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl ReferenceVoice {
    /// Load a RIFF/WAVE file (integer PCM up to 32 bits, or 32-bit float).
    pub fn load(path: &Path) -> Result<Self, AudioError> {
        let reader = BufReader::new(File::open(path).map_err(hound::Error::IoError)?);
        let voice = Self::from_reader(reader)?;
        log::info!(
            "Loaded reference voice from {} ({:.2}s @ {}Hz)",
            path.display(),
            voice.duration_secs(),
            voice.sample_rate
        );
        Ok(voice)
    }

    /// Decode a WAV stream.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AudioError> {
        let reader = hound::WavReader::new(reader)?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, 32) => {
                reader.into_samples::<f32>().collect::<Result<_, _>>()?
            }
            (hound::SampleFormat::Int, bits @ 1..=32) => {
                let scale = (1u64 << (bits - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
            (format, bits) => {
                return Err(AudioError::UnsupportedFormat(format!(
                    "{bits}-bit {format:?}"
                )))
            }
        };

        let samples = downmix(interleaved, spec.channels);
        if samples.is_empty() {
            return Err(AudioError::Empty);
        }

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Average interleaved frames down to a single channel.
fn downmix(interleaved: Vec<f32>, channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved;
    }
    interleaved
        .chunks_exact(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{AudioError, ReferenceVoice};
    use std::io::Cursor;

    fn encode<S: hound::Sample + Copy>(spec: hound::WavSpec, samples: &[S]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut buf, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn decodes_16_bit_pcm() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let bytes = encode(spec, &[0i16, 16384, -32768]);

        let voice = ReferenceVoice::from_reader(Cursor::new(bytes)).unwrap();
        assert_eq!(voice.sample_rate, 16_000);
        assert_eq!(voice.samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn decodes_float_stereo_by_averaging_channels() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 24_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let bytes = encode(spec, &[0.5f32, -0.5, 1.0, 0.0, 0.25, 0.75]);

        let voice = ReferenceVoice::from_reader(Cursor::new(bytes)).unwrap();
        assert_eq!(voice.samples, vec![0.0, 0.5, 0.5]);
        assert!((voice.duration_secs() - 3.0 / 24_000.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_empty_and_garbage_input() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 24_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let empty = encode::<i16>(spec, &[]);
        assert!(matches!(
            ReferenceVoice::from_reader(Cursor::new(empty)),
            Err(AudioError::Empty)
        ));

        assert!(matches!(
            ReferenceVoice::from_reader(Cursor::new(b"not a wav file".to_vec())),
            Err(AudioError::Wav(_))
        ));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        std::fs::write(&path, encode(spec, &[100i16; 441])).unwrap();

        let voice = ReferenceVoice::load(&path).unwrap();
        assert_eq!(voice.samples.len(), 441);
        assert!((voice.duration_secs() - 0.02).abs() < 1e-9);
    }
}
