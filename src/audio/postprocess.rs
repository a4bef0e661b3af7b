//! Trailing-silence trimming and peak normalization for generated speech.

/// Longest output kept, in seconds. Anything beyond is dropped.
pub const MAX_DURATION_SECS: f32 = 10.0;

/// RMS window used when scanning for the end of speech.
pub const WINDOW_MS: u32 = 50;

/// Audio kept after the last voiced window so trailing consonants survive.
pub const PADDING_MS: u32 = 100;

/// Windows at or below this RMS energy count as silence.
pub const SILENCE_RMS_THRESHOLD: f32 = 0.01;

/// Peak level every phrase is scaled to.
pub const TARGET_PEAK: f32 = 0.85;

/// Signals quieter than this are left alone.
pub const MIN_PEAK: f32 = 1e-3;

/// Gains inside this band are not worth a full pass over the buffer.
const GAIN_DEAD_BAND: (f32, f32) = (0.9, 1.1);

/// Trim trailing silence, then normalize the peak amplitude.
pub fn post_process(mut samples: Vec<f32>, sample_rate: u32) -> Vec<f32> {
    trim_trailing_silence(&mut samples, sample_rate);
    normalize_peak(&mut samples);
    samples
}

/// Cap the buffer at [`MAX_DURATION_SECS`] and cut everything after the last
/// window whose RMS exceeds the silence threshold (plus padding).
///
/// A buffer with no voiced window is left at its capped length.
pub fn trim_trailing_silence(samples: &mut Vec<f32>, sample_rate: u32) {
    let max_samples = (sample_rate as f32 * MAX_DURATION_SECS) as usize;
    samples.truncate(max_samples);

    let window = ms_to_samples(WINDOW_MS, sample_rate).max(1);
    let padding = ms_to_samples(PADDING_MS, sample_rate);

    let mut end = samples.len();
    while end > 0 {
        let start = end.saturating_sub(window);
        if rms(&samples[start..end]) > SILENCE_RMS_THRESHOLD {
            let keep = (end + padding).min(samples.len());
            if keep < samples.len() {
                log::debug!(
                    "Trimming {} trailing silent samples",
                    samples.len() - keep
                );
            }
            samples.truncate(keep);
            return;
        }
        end = start;
    }
}

/// Scale `samples` so the absolute peak equals [`TARGET_PEAK`].
///
/// Returns the gain that was applied (1.0 if the buffer was left untouched).
pub fn normalize_peak(samples: &mut [f32]) -> f32 {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak < MIN_PEAK {
        return 1.0;
    }

    let gain = TARGET_PEAK / peak;
    if (GAIN_DEAD_BAND.0..=GAIN_DEAD_BAND.1).contains(&gain) {
        return 1.0;
    }

    for s in samples.iter_mut() {
        *s *= gain;
    }
    gain
}

fn rms(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = window.iter().map(|s| s * s).sum();
    (sum_sq / window.len() as f32).sqrt()
}

fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (sample_rate as u64 * ms as u64 / 1000) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 24_000;

    fn sine(secs: f32, amplitude: f32) -> Vec<f32> {
        let n = (SR as f32 * secs) as usize;
        (0..n)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / SR as f32).sin())
            .collect()
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    #[test]
    fn trailing_zeros_are_trimmed_and_peak_normalized() {
        let mut samples = sine(1.0, 0.5);
        let voiced = samples.len();
        samples.extend(std::iter::repeat(0.0).take(ms_to_samples(200, SR)));

        let out = post_process(samples, SR);

        let window = ms_to_samples(WINDOW_MS, SR);
        let padding = ms_to_samples(PADDING_MS, SR);
        assert!(out.len() >= voiced);
        assert!(out.len() <= voiced + padding + window);
        assert!(out.len() < voiced + ms_to_samples(200, SR));
        assert!((peak(&out) - TARGET_PEAK).abs() <= TARGET_PEAK * 0.01);
    }

    #[test]
    fn near_silent_signal_is_left_unchanged() {
        let samples = sine(0.5, 0.0005);
        let out = post_process(samples.clone(), SR);
        assert_eq!(out, samples);
    }

    #[test]
    fn gain_inside_dead_band_is_skipped() {
        let mut samples = sine(0.2, 0.8);
        let before = samples.clone();
        assert_eq!(normalize_peak(&mut samples), 1.0);
        assert_eq!(samples, before);
    }

    #[test]
    fn loud_signal_is_scaled_down() {
        let mut samples = sine(0.2, 1.0);
        let gain = normalize_peak(&mut samples);
        assert!(gain < 1.0);
        assert!((peak(&samples) - TARGET_PEAK).abs() < 1e-3);
    }

    #[test]
    fn output_is_capped_at_max_duration() {
        let samples = sine(12.0, 0.5);
        let out = post_process(samples, SR);
        assert_eq!(out.len(), (SR as f32 * MAX_DURATION_SECS) as usize);
    }

    #[test]
    fn empty_buffer_stays_empty() {
        assert!(post_process(Vec::new(), SR).is_empty());
    }
}
