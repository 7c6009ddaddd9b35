//! Trait definitions for the pluggable pipeline stages.

use std::sync::Arc;

use crate::error::TtsResult;
use crate::types::{NormText, RawAudio, VoiceKey};

/// Text normalization trait.
///
/// Implementations turn raw (optionally SSML-tagged) input into canonical
/// plain text plus prosody markers.
pub trait TextNormalizer: Send + Sync {
    /// Normalize the input text.
    ///
    /// # Errors
    /// `MalformedMarkup` for unbalanced tags or invalid directive values,
    /// `Validation` if nothing synthesizable remains.
    fn normalize(&self, input: &str) -> TtsResult<NormText>;
}

/// A loaded voice model.
///
/// Instances are shared read-only between worker threads, so `synthesize`
/// takes `&self`.
pub trait VoiceModel: Send + Sync {
    /// The key this model was loaded for.
    fn key(&self) -> &VoiceKey;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Speakers this model can render.
    fn speakers(&self) -> &[String];

    /// Whether the backend consumes prosody markers.
    ///
    /// Markers are stripped before `synthesize` when this returns `false`.
    fn supports_prosody(&self) -> bool {
        false
    }

    /// Render text with the given speaker. Blocking and long-running.
    fn synthesize(&self, text: &NormText, speaker: &str) -> TtsResult<RawAudio>;
}

/// Factory for voice models.
///
/// Called at most once per key at a time by the synthesis engine.
pub trait ModelLoader: Send + Sync {
    /// Load the backend for `key`.
    ///
    /// # Errors
    /// `ModelLoad` if the backend cannot be initialized.
    fn load(&self, key: &VoiceKey) -> TtsResult<Arc<dyn VoiceModel>>;
}

/// Audio post-processing stage.
///
/// Implementations must be pure: no shared mutable state, safe to call
/// concurrently on independent buffers.
pub trait Enhancer: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Transform a buffer.
    fn enhance(&self, audio: &RawAudio) -> TtsResult<RawAudio>;
}
