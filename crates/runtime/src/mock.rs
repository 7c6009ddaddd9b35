//! Deterministic stand-in voice backend.
//!
//! Renders each character as a short shaped tone so the rest of the service
//! (caching, worker pool, enhancement, storage, HTTP) runs end to end without
//! neural weights. Output duration depends only on the text, its markers and
//! the sample rate.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::f32::consts::PI;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use audio_codec::{apply_fade_in, apply_fade_out};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};
use tts_core::{
    Directive, EmphasisLevel, ModelLoader, NormText, RawAudio, TtsError, TtsResult, VoiceKey,
    VoiceModel,
};

use crate::catalog::Catalog;

const CHAR_MS: f32 = 70.0;
const SPACE_MS: f32 = 40.0;
const PUNCT_MS: f32 = 150.0;
const SENTENCE_MS: u32 = 250;
const PARAGRAPH_MS: u32 = 500;
const EDGE_FADE_MS: f32 = 5.0;
const NOISE_AMP: f32 = 0.003;
/// Longest output a single call may produce.
pub const MAX_OUTPUT_SECS: f32 = 600.0;

/// Speaker name that picks a voice at random per call.
pub const RANDOM_SPEAKER: &str = "random";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Segment {
    Tone { freq: f32, len: usize, amp: f32 },
    Silence(usize),
}

impl Segment {
    fn len(&self) -> usize {
        match *self {
            Segment::Tone { len, .. } | Segment::Silence(len) => len,
        }
    }
}

/// Per-character rendering parameters from the markers covering it.
#[derive(Debug, Clone, Copy)]
struct Style {
    rate: f32,
    pitch: f32,
    amp: f32,
    stretch: f32,
    spell_out: bool,
}

impl Style {
    fn at(text: &NormText, pos: usize) -> Self {
        let mut style = Style {
            rate: 1.0,
            pitch: 1.0,
            amp: 0.4,
            stretch: 1.0,
            spell_out: false,
        };
        for marker in text.markers.iter().filter(|m| m.covers(pos)) {
            match &marker.directive {
                Directive::Prosody { rate, pitch } => {
                    style.rate *= rate;
                    style.pitch *= pitch;
                }
                Directive::Emphasis { level } => {
                    (style.amp, style.stretch) = match level {
                        EmphasisLevel::Strong => (0.6, 1.15),
                        EmphasisLevel::Moderate => (0.5, 1.05),
                        EmphasisLevel::Reduced => (0.3, 0.9),
                        EmphasisLevel::None => (0.4, 1.0),
                    };
                }
                Directive::SayAs { interpret_as } => {
                    style.spell_out = matches!(interpret_as.as_str(), "characters" | "spell-out");
                }
                _ => {}
            }
        }
        style
    }
}

/// Mock voice model for one catalog key.
#[derive(Debug)]
pub struct MockVoiceModel {
    key: VoiceKey,
    speakers: Vec<String>,
    sample_rate: u32,
}

impl MockVoiceModel {
    /// Create a model serving the given speakers.
    pub fn new(key: VoiceKey, speakers: Vec<String>, sample_rate: u32) -> Self {
        Self {
            key,
            speakers,
            sample_rate,
        }
    }

    fn samples_for(&self, ms: f32) -> usize {
        (ms / 1000.0 * self.sample_rate as f32).round() as usize
    }

    /// Base frequency of a speaker's voice.
    fn timbre(&self, speaker: &str) -> f32 {
        let speaker = if speaker == RANDOM_SPEAKER {
            let named: Vec<&str> = self
                .speakers
                .iter()
                .map(String::as_str)
                .filter(|s| *s != RANDOM_SPEAKER)
                .collect();
            named
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(speaker)
        } else {
            speaker
        };
        100.0 + (hash_of(&speaker) % 140) as f32
    }

    fn plan(&self, text: &NormText, base_freq: f32) -> TtsResult<Vec<Segment>> {
        let budget = (MAX_OUTPUT_SECS * self.sample_rate as f32) as u64;
        let mut segments = Vec::with_capacity(text.text.len() + text.markers.len());
        let mut total: u64 = 0;
        let mut push = |segment: Segment, segments: &mut Vec<Segment>| -> TtsResult<()> {
            total += segment.len() as u64;
            if total > budget {
                return Err(TtsError::synthesis(format!(
                    "output would exceed {MAX_OUTPUT_SECS} s"
                )));
            }
            segments.push(segment);
            Ok(())
        };

        let mut markers = text.markers.iter().peekable();
        let mut chars = text.text.char_indices().peekable();
        loop {
            let pos = chars.peek().map_or(text.text.len(), |(i, _)| *i);

            while let Some(marker) = markers.next_if(|m| m.offset <= pos) {
                let pause_ms = match marker.directive {
                    Directive::Pause { ms } => ms,
                    Directive::Sentence => SENTENCE_MS,
                    Directive::Paragraph => PARAGRAPH_MS,
                    _ => continue,
                };
                push(Segment::Silence(self.samples_for(pause_ms as f32)), &mut segments)?;
            }

            let Some((pos, c)) = chars.next() else {
                break;
            };
            let style = Style::at(text, pos);
            let scale = style.stretch / style.rate;

            let segment = if c.is_whitespace() {
                Segment::Silence(self.samples_for(SPACE_MS * scale))
            } else if c.is_alphanumeric() {
                let step = (u32::from(c) % 12) as f32 / 24.0;
                Segment::Tone {
                    freq: base_freq * style.pitch * (1.0 + step),
                    len: self.samples_for(CHAR_MS * scale),
                    amp: style.amp,
                }
            } else {
                Segment::Silence(self.samples_for(PUNCT_MS * scale))
            };
            push(segment, &mut segments)?;
            if style.spell_out {
                push(Segment::Silence(self.samples_for(SPACE_MS * scale)), &mut segments)?;
            }
        }

        Ok(segments)
    }

    fn render(&self, segments: &[Segment], seed: u64) -> Vec<f32> {
        let total: usize = segments.iter().map(Segment::len).sum();
        let mut samples = Vec::with_capacity(total);
        let sr = self.sample_rate as f32;

        for segment in segments {
            match *segment {
                Segment::Silence(len) => samples.resize(samples.len() + len, 0.0),
                Segment::Tone { freq, len, amp } => {
                    let start = samples.len();
                    samples.extend((0..len).map(|i| {
                        let t = i as f32 / sr;
                        amp * ((2.0 * PI * freq * t).sin() + 0.3 * (4.0 * PI * freq * t).sin())
                            / 1.3
                    }));
                    apply_fade_in(&mut samples[start..], EDGE_FADE_MS, self.sample_rate);
                    apply_fade_out(&mut samples[start..], EDGE_FADE_MS, self.sample_rate);
                }
            }
        }

        let mut rng = StdRng::seed_from_u64(seed);
        for s in &mut samples {
            *s = (*s + rng.gen_range(-NOISE_AMP..NOISE_AMP)).clamp(-1.0, 1.0);
        }
        samples
    }
}

impl VoiceModel for MockVoiceModel {
    fn key(&self) -> &VoiceKey {
        &self.key
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn speakers(&self) -> &[String] {
        &self.speakers
    }

    fn supports_prosody(&self) -> bool {
        true
    }

    fn synthesize(&self, text: &NormText, speaker: &str) -> TtsResult<RawAudio> {
        if !self.speakers.iter().any(|s| s == speaker) {
            return Err(TtsError::synthesis(format!(
                "Unsupported speaker for {}. Supported: {:?}",
                self.key.model_id, self.speakers
            )));
        }
        if text.is_empty() {
            return Err(TtsError::synthesis("nothing to synthesize"));
        }

        let segments = self.plan(text, self.timbre(speaker))?;
        let samples = self.render(&segments, hash_of(&(&text.text, &self.key)));
        debug!(
            key = %self.key,
            speaker,
            segments = segments.len(),
            samples = samples.len(),
            "Mock synthesis complete"
        );
        Ok(RawAudio::new(samples, self.sample_rate))
    }
}

fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Loader producing [`MockVoiceModel`]s for every key in a catalog.
///
/// Counts load calls and can simulate slow or failing loads.
#[derive(Debug)]
pub struct MockModelLoader {
    catalog: Arc<Catalog>,
    sample_rate: u32,
    load_delay: Duration,
    failures: Mutex<HashMap<VoiceKey, usize>>,
    loads: AtomicUsize,
}

impl MockModelLoader {
    /// Create a loader for the catalog's keys.
    pub fn new(catalog: Arc<Catalog>, sample_rate: u32) -> Self {
        Self {
            catalog,
            sample_rate,
            load_delay: Duration::ZERO,
            failures: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every load.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Make the next `count` loads of `key` fail.
    pub fn fail_next_loads(&self, key: VoiceKey, count: usize) {
        self.failures.lock().insert(key, count);
    }

    /// Number of `load` calls so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for MockModelLoader {
    fn load(&self, key: &VoiceKey) -> TtsResult<Arc<dyn VoiceModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }

        if let Some(remaining) = self.failures.lock().get_mut(key).filter(|n| **n > 0) {
            *remaining -= 1;
            return Err(TtsError::model_load(key, "simulated load failure"));
        }

        let speakers = self
            .catalog
            .speakers(key)
            .ok_or_else(|| TtsError::model_load(key, "no such model in catalog"))?;

        info!(key = %key, sample_rate = self.sample_rate, "Mock voice model ready");
        Ok(Arc::new(MockVoiceModel::new(
            key.clone(),
            speakers.to_vec(),
            self.sample_rate,
        )))
    }
}
