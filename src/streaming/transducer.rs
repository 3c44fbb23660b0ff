//! Pronunciation-correcting stream transducer.
//!
//! Consumes the upstream segmentation JSON as it is generated, in fragments
//! split at arbitrary points, and re-emits it unchanged except for the
//! pronunciation value of each segment inside the segments array, which is
//! replaced with the oracle's context-aware reading.
//!
//! ```text
//!  Seeking ──"segments":[──▶ AwaitingToken ──"token":"…"──▶ AwaitingPronunciationKey
//!     ▲                          ▲                                   │
//!     │                          │                          "pronunciation":"
//!     └──────── ] ───────────────┴──── closing quote ◀── CapturingPronunciationValue
//! ```
//!
//! Only text that could still turn out to be a field label (a short string
//! literal and the `:` after it) is held back, plus the whole pronunciation
//! value while it is being captured. Everything else is forwarded as soon
//! as it is seen.

use super::scanner::{escape_json_string, unescape_json_string, StringScanner};
use crate::pronunciation::{find_token_position, PronunciationMap, PronunciationOracle};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Whitespace tolerated between a label, its colon and its value.
const MAX_LABEL_WHITESPACE: usize = 32;

/// Field names the transducer tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransducerConfig {
    #[serde(default = "default_array_field")]
    pub array_field: String,
    #[serde(default = "default_token_field")]
    pub token_field: String,
    #[serde(default = "default_pronunciation_field")]
    pub pronunciation_field: String,
}

fn default_array_field() -> String {
    "segments".to_string()
}

fn default_token_field() -> String {
    "token".to_string()
}

fn default_pronunciation_field() -> String {
    "pronunciation".to_string()
}

impl Default for TransducerConfig {
    fn default() -> Self {
        Self {
            array_field: default_array_field(),
            token_field: default_token_field(),
            pronunciation_field: default_pronunciation_field(),
        }
    }
}

impl TransducerConfig {
    fn max_label_chars(&self) -> usize {
        [&self.array_field, &self.token_field, &self.pronunciation_field]
            .iter()
            .map(|label| label.chars().count())
            .max()
            .unwrap_or(0)
    }
}

/// Externally visible parse state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransducerState {
    Seeking,
    AwaitingToken,
    AwaitingPronunciationKey,
    CapturingPronunciationValue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransducerStats {
    /// Pronunciation values replaced with the oracle's reading.
    pub corrected: usize,
    /// Pronunciation values forwarded as received.
    pub kept: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Seeking,
    /// Inside the segments array; `depth` 0 is between elements, 1 is
    /// directly inside a segment object.
    InArray { depth: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelKind {
    Array,
    Token,
    Pronunciation,
}

#[derive(Debug)]
enum Mode {
    Plain,
    /// A short string literal that may be a label; withheld.
    Candidate { held: String, text: String },
    /// A string literal that is not a label; forwarded.
    Literal(StringScanner),
    /// A recognized label waiting for `:` and its value; withheld.
    AfterLabel {
        kind: LabelKind,
        held: String,
        colon: bool,
        whitespace: usize,
    },
    /// The token value; forwarded while captured.
    TokenValue { scanner: StringScanner, raw: String },
    /// The pronunciation value; withheld until its closing quote.
    PronunciationValue { scanner: StringScanner, raw: String },
}

enum Correction {
    Replaced(String),
    Kept,
}

/// Sentence-level state used to correct pronunciations in order.
struct PronunciationContext {
    oracle: Arc<PronunciationOracle>,
    map: Option<PronunciationMap>,
    /// Char offset where the next token search starts. Never decreases.
    cursor: usize,
}

impl PronunciationContext {
    fn new(oracle: Arc<PronunciationOracle>, sentence: &str) -> Self {
        let map = match oracle.build_map(sentence) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!(
                    "Pronunciation analysis unavailable, keeping upstream values: {}",
                    e
                );
                None
            }
        };
        Self {
            oracle,
            map,
            cursor: 0,
        }
    }

    fn correct(&mut self, token: &str) -> Correction {
        let Some(map) = &self.map else {
            return Correction::Kept;
        };
        let Some(position) = find_token_position(map.sentence(), token, self.cursor) else {
            debug!(
                "Token '{}' not found in sentence after offset {}",
                token, self.cursor
            );
            return Correction::Kept;
        };

        let resolved = self.oracle.resolve(map, token, position);
        self.cursor = position + token.chars().count();
        if resolved.is_empty() {
            Correction::Kept
        } else {
            Correction::Replaced(resolved)
        }
    }
}

pub struct StreamTransducer {
    config: TransducerConfig,
    max_label_chars: usize,
    context: PronunciationContext,
    phase: Phase,
    mode: Mode,
    token: Option<String>,
    stats: TransducerStats,
}

impl StreamTransducer {
    /// Builds the pronunciation map for `sentence` up front. If analysis
    /// fails, the transducer passes everything through unchanged.
    pub fn new(oracle: Arc<PronunciationOracle>, config: TransducerConfig, sentence: &str) -> Self {
        let max_label_chars = config.max_label_chars();
        Self {
            config,
            max_label_chars,
            context: PronunciationContext::new(oracle, sentence),
            phase: Phase::Seeking,
            mode: Mode::Plain,
            token: None,
            stats: TransducerStats::default(),
        }
    }

    pub fn state(&self) -> TransducerState {
        match (&self.phase, &self.mode) {
            (Phase::Seeking, _) => TransducerState::Seeking,
            (_, Mode::PronunciationValue { .. }) => TransducerState::CapturingPronunciationValue,
            _ if self.token.is_some() => TransducerState::AwaitingPronunciationKey,
            _ => TransducerState::AwaitingToken,
        }
    }

    pub fn stats(&self) -> TransducerStats {
        self.stats
    }

    /// Advances over `fragment` and returns the text that is safe to emit.
    pub fn push(&mut self, fragment: &str) -> String {
        let mut out = String::with_capacity(fragment.len());
        for ch in fragment.chars() {
            self.step(ch, &mut out);
        }
        out
    }

    /// Releases anything still withheld, verbatim.
    pub fn finish(&mut self) -> String {
        let mode = std::mem::replace(&mut self.mode, Mode::Plain);
        match mode {
            Mode::Candidate { held, .. } | Mode::AfterLabel { held, .. } => held,
            Mode::PronunciationValue { raw, .. } => {
                debug!("Stream ended inside a pronunciation value");
                raw
            }
            Mode::Plain | Mode::Literal(_) | Mode::TokenValue { .. } => String::new(),
        }
    }

    fn step(&mut self, ch: char, out: &mut String) {
        let mode = std::mem::replace(&mut self.mode, Mode::Plain);
        self.mode = match mode {
            Mode::Plain => self.plain(ch, out),

            Mode::Candidate { mut held, mut text } => {
                held.push(ch);
                if ch == '"' {
                    self.label_closed(held, &text, out)
                } else if ch == '\\' || text.chars().count() >= self.max_label_chars {
                    // Not a label: forward it and keep scanning the literal.
                    out.push_str(&held);
                    let mut scanner = StringScanner::new();
                    scanner.feed(ch);
                    Mode::Literal(scanner)
                } else {
                    text.push(ch);
                    Mode::Candidate { held, text }
                }
            }

            Mode::Literal(mut scanner) => {
                out.push(ch);
                if scanner.feed(ch) {
                    Mode::Plain
                } else {
                    Mode::Literal(scanner)
                }
            }

            Mode::AfterLabel {
                kind,
                mut held,
                colon,
                whitespace,
            } => self.after_label(kind, &mut held, colon, whitespace, ch, out),

            Mode::TokenValue { mut scanner, mut raw } => {
                out.push(ch);
                if scanner.feed(ch) {
                    let token = unescape_json_string(&raw).unwrap_or(raw);
                    debug!("Captured token '{}'", token);
                    self.token = Some(token);
                    Mode::Plain
                } else {
                    raw.push(ch);
                    Mode::TokenValue { scanner, raw }
                }
            }

            Mode::PronunciationValue { mut scanner, mut raw } => {
                if scanner.feed(ch) {
                    self.emit_pronunciation(&raw, out);
                    out.push(ch);
                    Mode::Plain
                } else {
                    raw.push(ch);
                    Mode::PronunciationValue { scanner, raw }
                }
            }
        };
    }

    fn plain(&mut self, ch: char, out: &mut String) -> Mode {
        if ch == '"' {
            return Mode::Candidate {
                held: ch.to_string(),
                text: String::new(),
            };
        }

        if let Phase::InArray { depth } = self.phase {
            match ch {
                '{' | '[' => {
                    if depth == 0 && ch == '{' {
                        self.token = None;
                    }
                    self.phase = Phase::InArray { depth: depth + 1 };
                }
                ']' if depth == 0 => {
                    debug!("Segments array closed");
                    self.token = None;
                    self.phase = Phase::Seeking;
                }
                '}' | ']' => {
                    self.phase = Phase::InArray {
                        depth: depth.saturating_sub(1),
                    };
                }
                _ => {}
            }
        }

        out.push(ch);
        Mode::Plain
    }

    /// A candidate literal just closed: decide whether it is a label that
    /// matters in the current position.
    fn label_closed(&mut self, held: String, text: &str, out: &mut String) -> Mode {
        let kind = match self.phase {
            Phase::Seeking if text == self.config.array_field => Some(LabelKind::Array),
            Phase::InArray { depth: 1 } if text == self.config.token_field => {
                Some(LabelKind::Token)
            }
            Phase::InArray { depth: 1 }
                if text == self.config.pronunciation_field && self.token.is_some() =>
            {
                Some(LabelKind::Pronunciation)
            }
            _ => None,
        };

        match kind {
            Some(kind) => Mode::AfterLabel {
                kind,
                held,
                colon: false,
                whitespace: 0,
            },
            None => {
                out.push_str(&held);
                Mode::Plain
            }
        }
    }

    fn after_label(
        &mut self,
        kind: LabelKind,
        held: &mut String,
        colon: bool,
        whitespace: usize,
        ch: char,
        out: &mut String,
    ) -> Mode {
        if ch.is_whitespace() && whitespace < MAX_LABEL_WHITESPACE {
            held.push(ch);
            return Mode::AfterLabel {
                kind,
                held: std::mem::take(held),
                colon,
                whitespace: whitespace + 1,
            };
        }
        if ch == ':' && !colon {
            held.push(ch);
            return Mode::AfterLabel {
                kind,
                held: std::mem::take(held),
                colon: true,
                whitespace,
            };
        }

        match (kind, colon, ch) {
            (LabelKind::Array, true, '[') => {
                out.push_str(held);
                out.push(ch);
                debug!("Segments array opened");
                self.phase = Phase::InArray { depth: 0 };
                self.token = None;
                Mode::Plain
            }
            (LabelKind::Token, true, '"') => {
                out.push_str(held);
                out.push(ch);
                Mode::TokenValue {
                    scanner: StringScanner::new(),
                    raw: String::new(),
                }
            }
            (LabelKind::Pronunciation, true, '"') => {
                out.push_str(held);
                out.push(ch);
                Mode::PronunciationValue {
                    scanner: StringScanner::new(),
                    raw: String::new(),
                }
            }
            _ => {
                // Not the shape we track: forward and reinterpret `ch`.
                out.push_str(held);
                self.plain(ch, out)
            }
        }
    }

    fn emit_pronunciation(&mut self, raw: &str, out: &mut String) {
        let Some(token) = self.token.take() else {
            out.push_str(raw);
            return;
        };

        match self.context.correct(&token) {
            Correction::Replaced(corrected) => {
                if corrected != raw {
                    debug!(
                        "Corrected pronunciation of '{}': '{}' -> '{}'",
                        token, raw, corrected
                    );
                }
                self.stats.corrected += 1;
                out.push_str(&escape_json_string(&corrected));
            }
            Correction::Kept => {
                debug!("Keeping upstream pronunciation '{}' for '{}'", raw, token);
                self.stats.kept += 1;
                out.push_str(raw);
            }
        }
    }
}
