//! Best-effort post-processing stage.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use audio_codec::SpectralDenoiser;
use tracing::{debug, warn};
use tts_core::{EnhanceConfig, Enhancer, RawAudio, TtsError, TtsResult};

use crate::metrics::TtsMetrics;

/// Runs an [`Enhancer`] and falls back to the input when it fails.
#[derive(Clone)]
pub struct PostProcessor {
    enhancer: Arc<dyn Enhancer>,
    metrics: TtsMetrics,
}

impl std::fmt::Debug for PostProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostProcessor")
            .field("enhancer", &self.enhancer.name())
            .finish()
    }
}

impl PostProcessor {
    /// Wrap an enhancer.
    pub fn new(enhancer: Arc<dyn Enhancer>) -> Self {
        Self {
            enhancer,
            metrics: TtsMetrics,
        }
    }

    /// Spectral denoiser with the given parameters.
    pub fn denoiser(config: EnhanceConfig) -> Self {
        Self::new(Arc::new(SpectralDenoiser::new(config)))
    }

    /// Enhance `audio`, or hand it back unchanged with a warning on failure.
    pub fn apply(&self, audio: RawAudio) -> RawAudio {
        match self.try_apply(&audio) {
            Ok(enhanced) => {
                debug!(enhancer = self.enhancer.name(), "Enhancement applied");
                enhanced
            }
            Err(e) => {
                warn!(
                    enhancer = self.enhancer.name(),
                    error = %e,
                    "Enhancement failed, using unenhanced audio"
                );
                self.metrics.enhancement_fallback();
                audio
            }
        }
    }

    fn try_apply(&self, audio: &RawAudio) -> TtsResult<RawAudio> {
        let enhanced = panic::catch_unwind(AssertUnwindSafe(|| self.enhancer.enhance(audio)))
            .map_err(|_| TtsError::enhancement("enhancer panicked"))??;
        if enhanced.is_empty() {
            return Err(TtsError::enhancement("enhancer returned an empty buffer"));
        }
        if enhanced.sample_rate != audio.sample_rate {
            return Err(TtsError::enhancement(format!(
                "enhancer changed sample rate from {} to {}",
                audio.sample_rate, enhanced.sample_rate
            )));
        }
        if enhanced.samples.iter().any(|s| !s.is_finite()) {
            return Err(TtsError::enhancement("enhancer produced non-finite samples"));
        }
        Ok(enhanced)
    }
}
