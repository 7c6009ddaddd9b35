//! # text-normalizer
//!
//! SSML-aware text normalization for the speech service.
//!
//! Turns raw request text into canonical plain text plus ordered prosody
//! markers:
//! - `<speak>`, `<p>`, `<s>` structure (sentence/paragraph boundaries)
//! - `<break>` pauses, `<emphasis>`, `<say-as>`, `<prosody rate/pitch>`
//! - Unrecognized tags are stripped, their text is kept
//! - Unicode NFC, typographic cleanup, whitespace collapsing
//!
//! # Example
//!
//! ```ignore
//! use text_normalizer::Normalizer;
//! use tts_core::TextNormalizer;
//!
//! let normalizer = Normalizer::new();
//! let result = normalizer.normalize("<speak>Hello <break time=\"500ms\"/> world</speak>")?;
//! assert_eq!(result.text, "Hello world");
//! ```

pub mod markup;
mod rules;
pub mod ssml;

use tracing::{debug, instrument, trace};
use tts_core::{Directive, NormText, TextNormalizer, TtsError, TtsResult};

pub use ssml::Tag;

use markup::Token;
use rules::Rule;
use ssml::TextBuilder;

/// An element that has been opened but not yet closed.
#[derive(Debug)]
struct OpenElement {
    name: String,
    tag: Tag,
    marker: Option<usize>,
}

/// Text normalizer: markup handling plus the text cleanup rules.
#[derive(Debug)]
pub struct Normalizer {
    rules: Vec<Box<dyn Rule>>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// Create a new normalizer with default rules.
    pub fn new() -> Self {
        Self {
            rules: rules::default_rules(),
        }
    }

    fn apply_rules(&self, run: &str) -> TtsResult<String> {
        let mut text = run.to_string();
        for rule in &self.rules {
            let next = rule.apply(&text)?;
            if next != text {
                trace!(rule = rule.name(), "Rule rewrote text");
            }
            text = next;
        }
        Ok(text)
    }
}

impl TextNormalizer for Normalizer {
    #[instrument(skip(self, input), fields(input_len = input.len()))]
    fn normalize(&self, input: &str) -> TtsResult<NormText> {
        if input.trim().is_empty() {
            return Err(TtsError::validation("Text is required"));
        }

        let mut builder = TextBuilder::default();
        let mut stack: Vec<OpenElement> = Vec::new();

        for token in markup::tokenize(input)? {
            match token {
                Token::Text(run) => {
                    let run = self.apply_rules(&run)?;
                    builder.push_text(&run);
                }
                Token::Open {
                    name,
                    attrs,
                    self_closing,
                } => {
                    let tag = Tag::from_name(&name);
                    if tag == Tag::Unrecognized {
                        debug!(tag = %name, "Stripping unrecognized tag");
                    }
                    if tag.is_block() {
                        builder.word_break();
                    }

                    let marker = match tag.opening_directive(&attrs)? {
                        Some(directive @ Directive::Pause { .. }) => {
                            let at = builder.len();
                            builder.add_marker(at, directive);
                            None
                        }
                        Some(directive) => {
                            let at = builder.anchor();
                            Some(builder.add_marker(at, directive))
                        }
                        None => None,
                    };

                    if self_closing {
                        if let Some(directive) = tag.closing_directive() {
                            let at = builder.len();
                            builder.add_marker(at, directive);
                        }
                    } else {
                        stack.push(OpenElement { name, tag, marker });
                    }
                }
                Token::Close { name } => {
                    let open = stack.pop().ok_or_else(|| {
                        TtsError::malformed_markup(format!("unexpected closing tag </{name}>"))
                    })?;
                    if open.name != name {
                        return Err(TtsError::malformed_markup(format!(
                            "expected </{}> but found </{name}>",
                            open.name
                        )));
                    }
                    if let Some(index) = open.marker {
                        builder.close_marker(index, builder.len());
                    }
                    if let Some(directive) = open.tag.closing_directive() {
                        builder.add_marker(builder.len(), directive);
                    }
                    if open.tag.is_block() {
                        builder.word_break();
                    }
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(TtsError::malformed_markup(format!(
                "unclosed tag <{}>",
                open.name
            )));
        }

        let (text, markers) = builder.finish();
        if text.is_empty() {
            return Err(TtsError::validation("Text is empty after removing markup"));
        }

        debug!(
            text_len = text.len(),
            markers = markers.len(),
            "Normalized input"
        );
        Ok(NormText::with_markers(text, markers))
    }
}
