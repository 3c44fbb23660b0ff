//! Position-aware pronunciation oracle.
//!
//! A [`PronunciationMap`] is built once per input sentence from whole-sentence
//! analysis, then queried by character offset while the segmentation stream
//! is being corrected. Offsets are `char` offsets into the sentence.

pub mod analyzer;
pub mod tone;

pub use analyzer::{AnalysisError, Lexicon, PinyinAnalyzer, SentenceAnalyzer};
pub use tone::{normalize_pronunciation, to_tone_number, Syllable};

use log::debug;
use std::sync::Arc;

/// Whether `ch` is a CJK ideograph (punctuation and full-width forms are not).
pub fn is_chinese_char(ch: char) -> bool {
    matches!(ch as u32,
        0x4E00..=0x9FFF     // CJK Unified Ideographs
        | 0x3400..=0x4DBF   // Extension A
        | 0x20000..=0x2A6DF // Extension B
        | 0x2A700..=0x2EBEF // Extensions C-F
        | 0x30000..=0x3134F // Extension G
        | 0xF900..=0xFAFF   // Compatibility Ideographs
        | 0x2F800..=0x2FA1F // Compatibility Supplement
        | 0x3007            // 〇
    )
}

/// Tone-number syllables of one sentence, indexed by character offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PronunciationMap {
    sentence: String,
    syllables: Vec<Option<String>>,
}

impl PronunciationMap {
    pub fn sentence(&self) -> &str {
        &self.sentence
    }

    /// Number of characters in the sentence.
    pub fn len(&self) -> usize {
        self.syllables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syllables.is_empty()
    }

    pub fn syllable_at(&self, offset: usize) -> Option<&str> {
        self.syllables.get(offset).and_then(|s| s.as_deref())
    }

    /// Populated offsets in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.syllables
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_deref().map(|s| (i, s)))
    }
}

pub struct PronunciationOracle {
    analyzer: Arc<dyn SentenceAnalyzer>,
}

impl PronunciationOracle {
    pub fn new(analyzer: Arc<dyn SentenceAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Runs whole-sentence analysis once and transliterates each Chinese
    /// character's syllable to tone-number form.
    pub fn build_map(&self, sentence: &str) -> Result<PronunciationMap, AnalysisError> {
        let analyzed = self.analyzer.analyze(sentence)?;
        let chars: Vec<char> = sentence.chars().collect();
        if analyzed.len() != chars.len() {
            return Err(AnalysisError::Engine(format!(
                "analysis returned {} syllables for {} characters",
                analyzed.len(),
                chars.len()
            )));
        }

        let syllables = chars
            .iter()
            .zip(analyzed)
            .map(|(&ch, syllable)| {
                syllable
                    .filter(|_| is_chinese_char(ch))
                    .map(|s| to_tone_number(&s))
                    .filter(|s| !s.is_empty())
            })
            .collect::<Vec<_>>();

        debug!(
            "Built pronunciation map for {} chars ({} populated)",
            syllables.len(),
            syllables.iter().filter(|s| s.is_some()).count()
        );

        Ok(PronunciationMap {
            sentence: sentence.to_string(),
            syllables,
        })
    }

    /// Pronunciation of `token` assuming it starts at char offset `start`.
    ///
    /// Unpopulated positions fall back to the isolated reading of the
    /// character; non-Chinese characters contribute nothing.
    pub fn resolve(&self, map: &PronunciationMap, token: &str, start: usize) -> String {
        token
            .chars()
            .enumerate()
            .filter(|(_, ch)| is_chinese_char(*ch))
            .filter_map(|(i, ch)| match map.syllable_at(start + i) {
                Some(syllable) => Some(syllable.to_string()),
                None => self.isolated(ch),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Context-free tone-number reading of one character.
    pub fn isolated(&self, ch: char) -> Option<String> {
        if !is_chinese_char(ch) {
            return None;
        }
        self.analyzer
            .isolated(ch)
            .map(|s| to_tone_number(&s))
            .filter(|s| !s.is_empty())
    }
}

/// Char offset of the first occurrence of `token` in `sentence` at or after
/// char offset `search_from`. `None` when absent or when `token` is empty.
pub fn find_token_position(sentence: &str, token: &str, search_from: usize) -> Option<usize> {
    if token.is_empty() {
        return None;
    }
    let start_byte = match sentence.char_indices().nth(search_from) {
        Some((byte, _)) => byte,
        None => return None,
    };
    let found = sentence[start_byte..].find(token)?;
    Some(search_from + sentence[start_byte..start_byte + found].chars().count())
}
