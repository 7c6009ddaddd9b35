//! Spectral noise reduction.
//!
//! Short-time Fourier analysis with a periodic Hann window at 50% overlap
//! (which sums to one, so plain overlap-add reconstructs the signal).
//! Each frame gets a log-spectral-amplitude (logMMSE) gain:
//!
//! - the noise power spectrum starts as the mean of the first
//!   `initial_noise_frames` frames,
//! - the a-priori SNR is tracked with the decision-directed estimator,
//! - frames whose average log-likelihood ratio is below `noise_threshold`
//!   are treated as speech-free and update the noise estimate.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tracing::{debug, instrument};
use tts_core::{EnhanceConfig, Enhancer, RawAudio, TtsError, TtsResult};

/// Smoothing factor of the decision-directed a-priori SNR estimate.
const DD_ALPHA: f32 = 0.98;
/// Smoothing factor of the noise spectrum update.
const NOISE_MU: f32 = 0.98;
/// Lower bound on the a-priori SNR (-25 dB).
const XI_MIN: f32 = 0.003_162_277_7;
/// Upper bound on the posterior SNR, keeps the exponential integral finite.
const GAMMA_MAX: f32 = 1000.0;
/// Floor for noise power so silent input does not divide by zero.
const NOISE_FLOOR: f32 = 1e-12;
/// Smallest analysis frame in samples.
const MIN_FRAME: usize = 16;

/// logMMSE spectral denoiser.
#[derive(Debug, Clone)]
pub struct SpectralDenoiser {
    config: EnhanceConfig,
}

impl Default for SpectralDenoiser {
    fn default() -> Self {
        Self::new(EnhanceConfig::default())
    }
}

impl SpectralDenoiser {
    /// Create a denoiser with the given parameters.
    pub fn new(config: EnhanceConfig) -> Self {
        Self { config }
    }

    /// Parameters in use.
    pub fn config(&self) -> &EnhanceConfig {
        &self.config
    }

    /// Analysis frame length for a sample rate: even, at least `MIN_FRAME`.
    pub fn frame_len(&self, sample_rate: u32) -> usize {
        let n = (self.config.window_ms / 1000.0 * sample_rate as f32).round() as usize;
        (n.max(MIN_FRAME) + 1) & !1
    }

    /// Denoise a slice of samples.
    pub fn process(&self, samples: &[f32], sample_rate: u32) -> TtsResult<Vec<f32>> {
        if samples.is_empty() {
            return Err(TtsError::enhancement("empty audio buffer"));
        }
        if sample_rate == 0 {
            return Err(TtsError::enhancement("sample rate must be positive"));
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(TtsError::enhancement("input contains non-finite samples"));
        }

        let frame_len = self.frame_len(sample_rate);
        let hop = frame_len / 2;
        let bins = frame_len / 2 + 1;

        // Pad one hop on each side so the first and last samples are covered
        // by two windows, then round up to a whole number of hops.
        let padded_len = (samples.len() + 2 * hop).div_ceil(hop) * hop + hop;
        let mut padded = vec![0.0f32; padded_len];
        padded[hop..hop + samples.len()].copy_from_slice(samples);
        let num_frames = (padded_len - frame_len) / hop + 1;

        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(frame_len);
        let inverse = planner.plan_fft_inverse(frame_len);
        let window = hann_periodic(frame_len);

        let mut spectra = Vec::with_capacity(num_frames);
        for f in 0..num_frames {
            spectra.push(analyze(&padded[f * hop..f * hop + frame_len], &window, &forward));
        }

        let mut noise = initial_noise(&spectra, self.config.initial_noise_frames, bins);
        let mut prev_clean_power = vec![0.0f32; bins];
        let mut output = vec![0.0f32; padded_len];
        let mut noise_updates = 0usize;

        for (f, spectrum) in spectra.iter_mut().enumerate() {
            let mut llr_sum = 0.0f32;
            let mut gains = vec![0.0f32; bins];

            for k in 0..bins {
                let power = spectrum[k].norm_sqr();
                let gamma = (power / noise[k]).min(GAMMA_MAX);
                let xi = if f == 0 {
                    DD_ALPHA + (1.0 - DD_ALPHA) * (gamma - 1.0).max(0.0)
                } else {
                    DD_ALPHA * prev_clean_power[k] / noise[k]
                        + (1.0 - DD_ALPHA) * (gamma - 1.0).max(0.0)
                }
                .max(XI_MIN);

                let gain = logmmse_gain(xi, gamma);
                gains[k] = gain;
                prev_clean_power[k] = gain * gain * power;
                llr_sum += gamma * xi / (1.0 + xi) - (1.0 + xi).ln();
            }

            if llr_sum / (bins as f32) < self.config.noise_threshold {
                for k in 0..bins {
                    let power = spectrum[k].norm_sqr();
                    noise[k] = (NOISE_MU * noise[k] + (1.0 - NOISE_MU) * power).max(NOISE_FLOOR);
                }
                noise_updates += 1;
            }

            apply_gains(spectrum, &gains);
            inverse.process(spectrum);

            let scale = 1.0 / frame_len as f32;
            let start = f * hop;
            for (i, bin) in spectrum.iter().enumerate() {
                output[start + i] += bin.re * scale;
            }
        }

        debug!(frame_len, num_frames, noise_updates, "Spectral denoise done");

        let cleaned: Vec<f32> = output[hop..hop + samples.len()].to_vec();
        if cleaned.iter().any(|s| !s.is_finite()) {
            return Err(TtsError::enhancement("denoiser produced non-finite samples"));
        }
        Ok(cleaned)
    }
}

impl Enhancer for SpectralDenoiser {
    fn name(&self) -> &str {
        "spectral_denoise"
    }

    #[instrument(skip(self, audio), fields(samples = audio.num_samples()))]
    fn enhance(&self, audio: &RawAudio) -> TtsResult<RawAudio> {
        let samples = self.process(&audio.samples, audio.sample_rate)?;
        Ok(RawAudio::new(samples, audio.sample_rate))
    }
}

fn hann_periodic(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos())
        .collect()
}

fn analyze(frame: &[f32], window: &[f32], fft: &Arc<dyn Fft<f32>>) -> Vec<Complex<f32>> {
    let mut buffer: Vec<Complex<f32>> = frame
        .iter()
        .zip(window)
        .map(|(&s, &w)| Complex::new(s * w, 0.0))
        .collect();
    fft.process(&mut buffer);
    buffer
}

fn initial_noise(spectra: &[Vec<Complex<f32>>], frames: usize, bins: usize) -> Vec<f32> {
    let count = frames.clamp(1, spectra.len());
    let mut noise = vec![0.0f32; bins];
    for spectrum in &spectra[..count] {
        for (k, acc) in noise.iter_mut().enumerate() {
            *acc += spectrum[k].norm_sqr();
        }
    }
    noise
        .into_iter()
        .map(|p| (p / count as f32).max(NOISE_FLOOR))
        .collect()
}

/// Scale the positive-frequency bins and mirror them so the inverse
/// transform stays real.
fn apply_gains(spectrum: &mut [Complex<f32>], gains: &[f32]) {
    let n = spectrum.len();
    for (k, &g) in gains.iter().enumerate() {
        spectrum[k] *= g;
        let mirror = (n - k) % n;
        if mirror != k {
            spectrum[mirror] = spectrum[k].conj();
        }
    }
}

/// logMMSE gain: `xi / (1 + xi) * exp(E1(v) / 2)` with `v = xi * gamma / (1 + xi)`.
fn logmmse_gain(xi: f32, gamma: f32) -> f32 {
    let ratio = xi / (1.0 + xi);
    let v = (ratio * gamma).max(1e-8);
    (ratio * (0.5 * exp_integral(v)).exp()).min(1.0)
}

/// Exponential integral E1(x) for x > 0.
///
/// Power series below 1, Abramowitz & Stegun 5.1.56 rational approximation above.
fn exp_integral(x: f32) -> f32 {
    let x = x as f64;
    let value = if x < 1.0 {
        const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
        let mut sum = 0.0;
        let mut term = 1.0;
        for k in 1..=20 {
            term *= -x / k as f64;
            sum -= term / k as f64;
        }
        -EULER_GAMMA - x.ln() + sum
    } else {
        let num = x * x + 2.334_733 * x + 0.250_621;
        let den = x * x + 3.330_657 * x + 1.681_534;
        (-x).exp() / x * num / den
    };
    value as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SR: u32 = 16_000;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn white_noise(len: usize, amp: f32, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(-amp..amp)).collect()
    }

    #[test]
    fn test_exp_integral_known_values() {
        // E1(0.5) = 0.5597736, E1(1) = 0.2193839, E1(2) = 0.0489005
        assert!((exp_integral(0.5) - 0.559_773_6).abs() < 1e-4);
        assert!((exp_integral(1.0) - 0.219_383_9).abs() < 1e-4);
        assert!((exp_integral(2.0) - 0.048_900_5).abs() < 1e-4);
    }

    #[test]
    fn test_gain_bounds() {
        assert!(logmmse_gain(XI_MIN, 0.5) < 0.2);
        assert!(logmmse_gain(100.0, 100.0) > 0.95);
        assert!(logmmse_gain(1e6, GAMMA_MAX) <= 1.0);
    }

    #[test]
    fn test_frame_len_even() {
        let denoiser = SpectralDenoiser::default();
        assert_eq!(denoiser.frame_len(16_000), 800);
        assert_eq!(denoiser.frame_len(48_000), 2400);
        assert_eq!(denoiser.frame_len(10) % 2, 0);
        assert!(denoiser.frame_len(10) >= MIN_FRAME);
    }

    #[test]
    fn test_preserves_length_and_rate() {
        let denoiser = SpectralDenoiser::default();
        let audio = RawAudio::new(white_noise(12_345, 0.1, 1), SR);
        let out = denoiser.enhance(&audio).unwrap();
        assert_eq!(out.num_samples(), audio.num_samples());
        assert_eq!(out.sample_rate, SR);
    }

    #[test]
    fn test_reduces_stationary_noise() {
        let denoiser = SpectralDenoiser::default();
        let len = SR as usize * 2;
        let noise = white_noise(len, 0.05, 7);
        let mut noisy = noise.clone();
        // Tone in the second half only; the first half is noise.
        for (i, s) in noisy.iter_mut().enumerate().skip(len / 2) {
            *s += 0.5 * (2.0 * std::f32::consts::PI * 300.0 * i as f32 / SR as f32).sin();
        }

        let out = denoiser.process(&noisy, SR).unwrap();

        let noise_before = rms(&noisy[SR as usize / 4..len / 2 - 1000]);
        let noise_after = rms(&out[SR as usize / 4..len / 2 - 1000]);
        assert!(
            noise_after < noise_before * 0.5,
            "noise not reduced: {noise_before} -> {noise_after}"
        );

        let tone_before = rms(&noisy[len / 2 + 2000..len - 2000]);
        let tone_after = rms(&out[len / 2 + 2000..len - 2000]);
        assert!(
            tone_after > tone_before * 0.7,
            "tone over-attenuated: {tone_before} -> {tone_after}"
        );
    }

    #[test]
    fn test_silence_stays_finite() {
        let denoiser = SpectralDenoiser::default();
        let out = denoiser.process(&vec![0.0; 4000], SR).unwrap();
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_shorter_than_one_frame() {
        let denoiser = SpectralDenoiser::default();
        let out = denoiser.process(&white_noise(100, 0.1, 3), SR).unwrap();
        assert_eq!(out.len(), 100);
    }

    #[test]
    fn test_rejects_empty_and_non_finite() {
        let denoiser = SpectralDenoiser::default();
        assert!(matches!(
            denoiser.process(&[], SR),
            Err(TtsError::Enhancement(_))
        ));
        assert!(matches!(
            denoiser.process(&[0.1, f32::NAN, 0.2], SR),
            Err(TtsError::Enhancement(_))
        ));
        assert!(denoiser.process(&[0.1; 10], 0).is_err());
    }
}
