//! Recognized SSML elements and their directive values.

use tts_core::{Directive, EmphasisLevel, ProsodyMarker, TtsError, TtsResult};

/// The closed set of elements the normalizer understands.
///
/// Anything else is `Unrecognized`: the tag is dropped and its text kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Speak,
    Paragraph,
    Sentence,
    Break,
    Emphasis,
    SayAs,
    Prosody,
    Unrecognized,
}

impl Tag {
    /// Classify a lowercased tag name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "speak" => Tag::Speak,
            "p" | "paragraph" => Tag::Paragraph,
            "s" | "sentence" => Tag::Sentence,
            "break" => Tag::Break,
            "emphasis" => Tag::Emphasis,
            "say-as" => Tag::SayAs,
            "prosody" => Tag::Prosody,
            _ => Tag::Unrecognized,
        }
    }

    /// Whether the element separates words on both sides.
    pub fn is_block(&self) -> bool {
        matches!(self, Tag::Paragraph | Tag::Sentence | Tag::Break)
    }

    /// Directive emitted where the element opens.
    pub fn opening_directive(&self, attrs: &[(String, String)]) -> TtsResult<Option<Directive>> {
        match self {
            Tag::Break => parse_break(attrs).map(Some),
            Tag::Emphasis => {
                let level = match attr(attrs, "level") {
                    None => EmphasisLevel::default(),
                    Some(v) => parse_emphasis(v)?,
                };
                Ok(Some(Directive::Emphasis { level }))
            }
            Tag::SayAs => {
                let kind = attr(attrs, "interpret-as")
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| TtsError::malformed_markup("<say-as> requires interpret-as"))?;
                Ok(Some(Directive::SayAs {
                    interpret_as: kind.to_ascii_lowercase(),
                }))
            }
            Tag::Prosody => {
                let rate = attr(attrs, "rate").map(parse_rate).transpose()?.unwrap_or(1.0);
                let pitch = attr(attrs, "pitch").map(parse_pitch).transpose()?.unwrap_or(1.0);
                Ok(Some(Directive::Prosody { rate, pitch }))
            }
            Tag::Speak | Tag::Paragraph | Tag::Sentence | Tag::Unrecognized => Ok(None),
        }
    }

    /// Directive emitted where the element closes.
    pub fn closing_directive(&self) -> Option<Directive> {
        match self {
            Tag::Paragraph => Some(Directive::Paragraph),
            Tag::Sentence => Some(Directive::Sentence),
            _ => None,
        }
    }
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn parse_break(attrs: &[(String, String)]) -> TtsResult<Directive> {
    if let Some(time) = attr(attrs, "time") {
        return parse_duration_ms(time).map(|ms| Directive::Pause { ms });
    }
    let ms = match attr(attrs, "strength").unwrap_or("medium") {
        "none" => 0,
        "x-weak" => 100,
        "weak" => 250,
        "medium" => 400,
        "strong" => 700,
        "x-strong" => 1000,
        other => {
            return Err(TtsError::malformed_markup(format!(
                "unsupported break strength '{other}'"
            )));
        }
    };
    Ok(Directive::Pause { ms })
}

/// Maximum pause a single `<break>` may request.
const MAX_BREAK_MS: f64 = 10_000.0;

fn parse_duration_ms(value: &str) -> TtsResult<u32> {
    let value = value.trim();
    let (number, scale) = if let Some(n) = value.strip_suffix("ms") {
        (n, 1.0)
    } else if let Some(n) = value.strip_suffix('s') {
        (n, 1000.0)
    } else {
        (value, 1.0)
    };
    let ms = number
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n * scale)
        .ok_or_else(|| TtsError::malformed_markup(format!("invalid break time '{value}'")))?;
    Ok(ms.min(MAX_BREAK_MS).round() as u32)
}

fn parse_emphasis(value: &str) -> TtsResult<EmphasisLevel> {
    match value.trim() {
        "strong" => Ok(EmphasisLevel::Strong),
        "moderate" => Ok(EmphasisLevel::Moderate),
        "reduced" => Ok(EmphasisLevel::Reduced),
        "none" => Ok(EmphasisLevel::None),
        other => Err(TtsError::malformed_markup(format!(
            "unsupported emphasis level '{other}'"
        ))),
    }
}

fn parse_rate(value: &str) -> TtsResult<f32> {
    let factor = match value.trim() {
        "x-slow" => Some(0.5),
        "slow" => Some(0.75),
        "medium" | "default" => Some(1.0),
        "fast" => Some(1.25),
        "x-fast" => Some(1.75),
        other => parse_relative(other).or_else(|| other.parse::<f32>().ok()),
    };
    factor
        .filter(|f| f.is_finite() && (0.1..=4.0).contains(f))
        .ok_or_else(|| TtsError::malformed_markup(format!("unsupported prosody rate '{value}'")))
}

fn parse_pitch(value: &str) -> TtsResult<f32> {
    let factor = match value.trim() {
        "x-low" => Some(0.7),
        "low" => Some(0.85),
        "medium" | "default" => Some(1.0),
        "high" => Some(1.15),
        "x-high" => Some(1.3),
        other => parse_relative(other),
    };
    factor
        .filter(|f| f.is_finite() && (0.25..=4.0).contains(f))
        .ok_or_else(|| TtsError::malformed_markup(format!("unsupported prosody pitch '{value}'")))
}

/// `80%` → 0.8, `+10%` → 1.1, `-20%` → 0.8.
fn parse_relative(value: &str) -> Option<f32> {
    let number = value.strip_suffix('%')?;
    let pct: f32 = number.trim_start_matches('+').parse().ok()?;
    if number.starts_with('+') || number.starts_with('-') {
        Some(1.0 + pct / 100.0)
    } else {
        Some(pct / 100.0)
    }
}

/// Accumulates normalized text and keeps marker offsets in sync with it.
///
/// Whitespace is collapsed lazily: a run of whitespace becomes one pending
/// space, emitted only when more text follows.
#[derive(Debug, Default)]
pub(crate) struct TextBuilder {
    text: String,
    pending_space: bool,
    markers: Vec<ProsodyMarker>,
}

impl TextBuilder {
    pub(crate) fn push_text(&mut self, run: &str) {
        for c in run.chars() {
            if c.is_whitespace() {
                self.pending_space = true;
            } else {
                if self.pending_space && !self.text.is_empty() {
                    self.text.push(' ');
                }
                self.pending_space = false;
                self.text.push(c);
            }
        }
    }

    /// Force a word boundary before the next text.
    pub(crate) fn word_break(&mut self) {
        self.pending_space = true;
    }

    /// Offset where the next visible character will land.
    pub(crate) fn anchor(&self) -> usize {
        if self.pending_space && !self.text.is_empty() {
            self.text.len() + 1
        } else {
            self.text.len()
        }
    }

    /// Offset just past the last visible character.
    pub(crate) fn len(&self) -> usize {
        self.text.len()
    }

    /// Add a marker; returns its index so span ends can be filled in later.
    pub(crate) fn add_marker(&mut self, offset: usize, directive: Directive) -> usize {
        self.markers.push(ProsodyMarker::point(offset, directive));
        self.markers.len() - 1
    }

    pub(crate) fn close_marker(&mut self, index: usize, end: usize) {
        if let Some(marker) = self.markers.get_mut(index) {
            marker.end = end.max(marker.offset);
        }
    }

    /// Finish: clamp offsets into the final text and order markers.
    pub(crate) fn finish(mut self) -> (String, Vec<ProsodyMarker>) {
        let len = self.text.len();
        for marker in &mut self.markers {
            marker.offset = marker.offset.min(len);
            marker.end = marker.end.clamp(marker.offset, len);
        }
        self.markers.sort_by_key(|m| m.offset);
        (self.text, self.markers)
    }
}
