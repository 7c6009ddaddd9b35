//! Tolerant tag scanner for SSML-like input.
//!
//! Produces a flat token stream; nesting is checked by the caller. A `<` that
//! cannot start a tag (`a < b`) is kept as text.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use tts_core::{TtsError, TtsResult};

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute pattern is valid")
});

/// One lexical unit of marked-up text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Text with entities decoded.
    Text(String),
    /// Opening or self-closing tag. Names are lowercased.
    Open {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    /// Closing tag.
    Close { name: String },
}

/// Split input into text and tag tokens.
pub fn tokenize(input: &str) -> TtsResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while let Some(rel) = input[pos..].find('<') {
        let lt = pos + rel;
        let rest = &input[lt + 1..];
        let Some(next) = rest.chars().next() else {
            break;
        };

        let consumed = match next {
            '!' => {
                let end = if rest.starts_with("!--") {
                    rest.find("-->").map(|i| i + 3)
                } else {
                    rest.find('>').map(|i| i + 1)
                };
                let end = end.ok_or_else(|| TtsError::malformed_markup("unterminated comment"))?;
                push_text(&mut tokens, &input[text_start..lt]);
                Some(end)
            }
            '?' => {
                let end = rest
                    .find("?>")
                    .map(|i| i + 2)
                    .ok_or_else(|| TtsError::malformed_markup("unterminated processing instruction"))?;
                push_text(&mut tokens, &input[text_start..lt]);
                Some(end)
            }
            '/' => {
                let end = find_tag_end(rest).ok_or_else(|| {
                    TtsError::malformed_markup(format!("unterminated closing tag near '{}'", preview(rest)))
                })?;
                let name = rest[1..end].trim();
                if !is_valid_name(name) {
                    return Err(TtsError::malformed_markup(format!(
                        "invalid closing tag '</{name}>'"
                    )));
                }
                push_text(&mut tokens, &input[text_start..lt]);
                tokens.push(Token::Close {
                    name: name.to_ascii_lowercase(),
                });
                Some(end + 1)
            }
            c if c.is_ascii_alphabetic() => {
                let end = find_tag_end(rest).ok_or_else(|| {
                    TtsError::malformed_markup(format!("unterminated tag near '<{}'", preview(rest)))
                })?;
                let inner = &rest[..end];
                let (inner, self_closing) = match inner.strip_suffix('/') {
                    Some(stripped) => (stripped, true),
                    None => (inner, false),
                };
                let name_len = inner
                    .find(|c: char| c.is_whitespace())
                    .unwrap_or(inner.len());
                let name = &inner[..name_len];
                if !is_valid_name(name) {
                    return Err(TtsError::malformed_markup(format!("invalid tag name '<{name}>'")));
                }
                push_text(&mut tokens, &input[text_start..lt]);
                tokens.push(Token::Open {
                    name: name.to_ascii_lowercase(),
                    attrs: parse_attrs(&inner[name_len..]),
                    self_closing,
                });
                Some(end + 1)
            }
            _ => None,
        };

        match consumed {
            Some(len) => {
                pos = lt + 1 + len;
                text_start = pos;
            }
            // Literal '<', keep scanning after it.
            None => pos = lt + 1,
        }
    }

    push_text(&mut tokens, &input[text_start..]);
    Ok(tokens)
}

/// Decode the predefined XML entities and numeric character references.
///
/// Unknown entities are left untouched.
pub fn decode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{00A0}'),
                _ => entity.strip_prefix('#').and_then(|num| {
                    let code = match num.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }),
            };
            ch.map(|c| (c, semi + 1))
        });

        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &tail[len..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn push_text(tokens: &mut Vec<Token>, raw: &str) {
    if raw.is_empty() {
        return;
    }
    let text = decode_entities(raw).into_owned();
    // Merge with a preceding text token (comments split text runs).
    if let Some(Token::Text(prev)) = tokens.last_mut() {
        prev.push_str(&text);
    } else {
        tokens.push(Token::Text(text));
    }
}

/// Index of the closing `>` in `rest`, skipping quoted attribute values.
fn find_tag_end(rest: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in rest.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(i),
            (None, '<') => return None,
            _ => {}
        }
    }
    None
}

fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(raw)
        .map(|cap| {
            let name = cap[1].to_ascii_lowercase();
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .map(|m| decode_entities(m.as_str()).into_owned())
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}

fn preview(s: &str) -> String {
    s.chars().take(16).collect()
}
