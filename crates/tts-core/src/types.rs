//! Core data types for the synthesis pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TtsError;

/// Supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    /// Russian language.
    #[default]
    Ru,
    /// English language.
    En,
    /// German language.
    De,
}

impl Lang {
    /// All supported languages, in manifest order.
    pub const ALL: [Lang; 3] = [Lang::Ru, Lang::En, Lang::De];

    /// ISO 639-1 code.
    pub fn code(&self) -> &'static str {
        match self {
            Lang::Ru => "ru",
            Lang::En => "en",
            Lang::De => "de",
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Lang {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ru" => Ok(Lang::Ru),
            "en" => Ok(Lang::En),
            "de" => Ok(Lang::De),
            _ => Err(TtsError::unknown_voice(format!(
                "Unsupported language. Supported: {:?}",
                Lang::ALL.iter().map(Lang::code).collect::<Vec<_>>()
            ))),
        }
    }
}

/// Identifies one loadable synthesis backend.
///
/// The speaker is deliberately not part of the key: one loaded model serves
/// every speaker it knows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceKey {
    /// Model language.
    #[serde(rename = "language")]
    pub lang: Lang,
    /// Model version identifier, e.g. `v4_ru`.
    #[serde(rename = "model")]
    pub model_id: String,
}

impl VoiceKey {
    /// Create a new voice key.
    pub fn new(lang: Lang, model_id: impl Into<String>) -> Self {
        Self {
            lang,
            model_id: model_id.into(),
        }
    }
}

impl std::fmt::Display for VoiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.lang, self.model_id)
    }
}

/// Emphasis strength for `<emphasis level="...">`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmphasisLevel {
    Strong,
    #[default]
    Moderate,
    Reduced,
    None,
}

/// A recognized prosody directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    /// Silence of the given length.
    Pause { ms: u32 },
    /// Stress the covered text.
    Emphasis { level: EmphasisLevel },
    /// Read the covered text as a particular kind (`characters`, `cardinal`, ...).
    SayAs { interpret_as: String },
    /// Rate and pitch multipliers for the covered text (1.0 = unchanged).
    Prosody { rate: f32, pitch: f32 },
    /// Sentence boundary (`<s>`).
    Sentence,
    /// Paragraph boundary (`<p>`).
    Paragraph,
}

/// A directive anchored in the normalized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProsodyMarker {
    /// Start byte offset in `NormText::text`.
    pub offset: usize,
    /// End byte offset (equal to `offset` for point directives like pauses).
    pub end: usize,
    /// The directive itself.
    pub directive: Directive,
}

impl ProsodyMarker {
    /// Create a point marker (zero-length span).
    pub fn point(offset: usize, directive: Directive) -> Self {
        Self {
            offset,
            end: offset,
            directive,
        }
    }

    /// Whether the marker covers the byte at `pos`.
    pub fn covers(&self, pos: usize) -> bool {
        self.offset <= pos && pos < self.end
    }
}

/// Normalized, synthesizable text with ordered prosody markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormText {
    /// Canonical plain text (NFC, collapsed whitespace, markup removed).
    pub text: String,
    /// Markers sorted by offset.
    pub markers: Vec<ProsodyMarker>,
}

impl NormText {
    /// Create a NormText without markers.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markers: Vec::new(),
        }
    }

    /// Create a NormText with markers.
    pub fn with_markers(text: impl Into<String>, markers: Vec<ProsodyMarker>) -> Self {
        Self {
            text: text.into(),
            markers,
        }
    }

    /// Copy of this text with all markers dropped.
    pub fn without_markers(&self) -> Self {
        Self::new(self.text.clone())
    }

    /// Whether there is nothing to say.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A mono sample buffer produced by a voice model.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudio {
    /// PCM samples (f32, mono, nominally in [-1, 1]).
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl RawAudio {
    /// Create a new buffer.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of samples.
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// A synthesis request as submitted by a client.
///
/// Language and model are optional here; the voice catalog fills in defaults
/// and rejects unknown selections before anything is queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Request identifier for tracing.
    pub id: Uuid,
    /// Raw text, optionally SSML-tagged.
    pub text: String,
    /// Requested language.
    pub lang: Option<Lang>,
    /// Requested model version.
    pub model_id: Option<String>,
    /// Speaker within the model.
    pub speaker: String,
    /// Apply noise reduction before persisting.
    pub enhance_noise: bool,
}

impl SynthesisRequest {
    /// Create a new request with default settings.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            lang: None,
            model_id: None,
            speaker: "xenia".to_string(),
            enhance_noise: true,
        }
    }

    /// Set the language.
    pub fn with_lang(mut self, lang: Lang) -> Self {
        self.lang = Some(lang);
        self
    }

    /// Set the model version.
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Set the speaker.
    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = speaker.into();
        self
    }

    /// Enable or disable noise enhancement.
    pub fn with_enhance_noise(mut self, enhance: bool) -> Self {
        self.enhance_noise = enhance;
        self
    }
}

/// A persisted audio file.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    /// Store-generated file name; the only handle clients receive.
    pub filename: String,
    /// Encoded bytes as written.
    pub bytes: Vec<u8>,
    /// Audio duration in seconds.
    pub duration_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lang_display_and_parse() {
        assert_eq!(Lang::Ru.to_string(), "ru");
        assert_eq!(Lang::De.to_string(), "de");
        assert_eq!("EN".parse::<Lang>().unwrap(), Lang::En);

        let err = "fr".parse::<Lang>().unwrap_err();
        assert!(matches!(err, TtsError::UnknownVoice(_)));
        assert!(err.to_string().contains("Unsupported language"));
    }

    #[test]
    fn test_voice_key_display() {
        let key = VoiceKey::new(Lang::Ru, "v4_ru");
        assert_eq!(key.to_string(), "ru/v4_ru");
    }

    #[test]
    fn test_voice_key_serde() {
        let key: VoiceKey = serde_json::from_str(r#"{"language":"en","model":"v3_en"}"#).unwrap();
        assert_eq!(key, VoiceKey::new(Lang::En, "v3_en"));
    }

    #[test]
    fn test_marker_covers() {
        let marker = ProsodyMarker {
            offset: 2,
            end: 5,
            directive: Directive::Emphasis {
                level: EmphasisLevel::Strong,
            },
        };
        assert!(!marker.covers(1));
        assert!(marker.covers(2));
        assert!(marker.covers(4));
        assert!(!marker.covers(5));

        let pause = ProsodyMarker::point(3, Directive::Pause { ms: 500 });
        assert!(!pause.covers(3));
    }

    #[test]
    fn test_raw_audio_duration() {
        let audio = RawAudio::new(vec![0.0; 24000], 48000);
        assert_eq!(audio.num_samples(), 24000);
        assert!((audio.duration_secs() - 0.5).abs() < f64::EPSILON);

        let silent = RawAudio::new(Vec::new(), 0);
        assert_eq!(silent.duration_secs(), 0.0);
    }

    #[test]
    fn test_synthesis_request_builder() {
        let req = SynthesisRequest::new("Привет")
            .with_lang(Lang::Ru)
            .with_model("v3_1_ru")
            .with_speaker("baya")
            .with_enhance_noise(false);

        assert_eq!(req.text, "Привет");
        assert_eq!(req.lang, Some(Lang::Ru));
        assert_eq!(req.model_id.as_deref(), Some("v3_1_ru"));
        assert_eq!(req.speaker, "baya");
        assert!(!req.enhance_noise);
    }

    #[test]
    fn test_synthesis_request_defaults() {
        let req = SynthesisRequest::new("text");
        assert_eq!(req.speaker, "xenia");
        assert!(req.enhance_noise);
        assert!(req.lang.is_none());
    }
}
