//! Whole-sentence pronunciation analysis.
//!
//! [`SentenceAnalyzer`] is the seam for the linguistic engine: given a full
//! sentence it returns one tone-marked syllable per character, already
//! adjusted for context (polyphones, neutral particles, tone sandhi).
//! [`PinyinAnalyzer`] is the bundled engine built on the `pinyin` crate.

use super::is_chinese_char;
use super::tone::Syllable;
use log::debug;
use once_cell::sync::Lazy;
use pinyin::ToPinyin;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_MAX_SENTENCE_CHARS: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("sentence is empty")]
    Empty,
    #[error("sentence has {len} characters, limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("analysis engine failed: {0}")]
    Engine(String),
}

/// External linguistic engine producing context-aware, tone-marked syllables.
pub trait SentenceAnalyzer: Send + Sync {
    /// One entry per character of `sentence` (by `char`), `None` where the
    /// character is not Chinese.
    fn analyze(&self, sentence: &str) -> Result<Vec<Option<String>>, AnalysisError>;

    /// Context-free reading of a single character.
    fn isolated(&self, ch: char) -> Option<String>;
}

/// Word-level readings supplied by a dictionary.
pub trait Lexicon: Send + Sync {
    /// The unambiguous reading of `word`, one syllable per character.
    fn word_reading(&self, word: &str) -> Option<Vec<Syllable>>;

    fn max_word_chars(&self) -> usize {
        8
    }
}

/// Particles read with the neutral tone when they follow another character.
static NEUTRAL_PARTICLES: Lazy<HashSet<char>> = Lazy::new(|| {
    ['吗', '呢', '吧', '啊', '呀', '嘛', '么', '们', '了', '的']
        .into_iter()
        .collect()
});

/// Numerals that keep 一 in its citation tone when adjacent.
static NUMERALS: Lazy<HashSet<char>> = Lazy::new(|| {
    "零〇一二三四五六七八九十百千万亿两"
        .chars()
        .collect()
});

/// Polyphone words: (word, char index, numbered reading).
const POLYPHONE_WORDS: &[(&str, usize, &str)] = &[
    ("银行", 1, "hang2"),
    ("行业", 0, "hang2"),
    ("行情", 0, "hang2"),
    ("行长", 0, "hang2"),
    ("内行", 1, "hang2"),
    ("外行", 1, "hang2"),
    ("銀行", 1, "hang2"),
    ("长大", 0, "zhang3"),
    ("成长", 1, "zhang3"),
    ("生长", 1, "zhang3"),
    ("增长", 1, "zhang3"),
    ("校长", 1, "zhang3"),
    ("市长", 1, "zhang3"),
    ("家长", 1, "zhang3"),
    ("音乐", 1, "yue4"),
    ("乐器", 0, "yue4"),
    ("乐队", 0, "yue4"),
    ("重新", 0, "chong2"),
    ("重复", 0, "chong2"),
    ("着急", 0, "zhao2"),
    ("睡着", 1, "zhao2"),
    ("目的", 1, "di4"),
    ("的确", 0, "di2"),
    ("了解", 0, "liao3"),
    ("了不起", 0, "liao3"),
    ("为了", 0, "wei4"),
    ("为什么", 0, "wei4"),
    ("因为", 1, "wei4"),
    ("成为", 1, "wei2"),
    ("认为", 1, "wei2"),
    ("以为", 1, "wei2"),
    ("作为", 1, "wei2"),
    ("觉得", 1, "de5"),
    ("睡觉", 1, "jiao4"),
    ("数学", 0, "shu4"),
    ("数字", 0, "shu4"),
    ("还是", 0, "hai2"),
    ("还有", 0, "hai2"),
    ("爱好", 1, "hao4"),
    ("什么", 1, "me5"),
    ("东西", 1, "xi5"),
    ("朋友", 1, "you5"),
    ("谢谢", 1, "xie5"),
];

/// Analyzer backed by the `pinyin` crate, an optional dictionary lexicon and
/// built-in context rules.
pub struct PinyinAnalyzer {
    lexicon: Option<Arc<dyn Lexicon>>,
    max_chars: usize,
}

impl Default for PinyinAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl PinyinAnalyzer {
    pub fn new() -> Self {
        Self {
            lexicon: None,
            max_chars: DEFAULT_MAX_SENTENCE_CHARS,
        }
    }

    pub fn with_lexicon(mut self, lexicon: Arc<dyn Lexicon>) -> Self {
        self.lexicon = Some(lexicon);
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    fn analyze_syllables(&self, chars: &[char]) -> Vec<Option<Syllable>> {
        let mut syllables: Vec<Option<Syllable>> =
            chars.iter().map(|&c| base_reading(c)).collect();

        apply_neutral_particles(chars, &mut syllables);
        if let Some(lexicon) = &self.lexicon {
            apply_lexicon(lexicon.as_ref(), chars, &mut syllables);
        }
        apply_polyphone_words(chars, &mut syllables);
        apply_tone_sandhi(chars, &mut syllables);

        syllables
    }
}

impl SentenceAnalyzer for PinyinAnalyzer {
    fn analyze(&self, sentence: &str) -> Result<Vec<Option<String>>, AnalysisError> {
        let chars: Vec<char> = sentence.chars().collect();
        if chars.is_empty() {
            return Err(AnalysisError::Empty);
        }
        if chars.len() > self.max_chars {
            return Err(AnalysisError::TooLong {
                len: chars.len(),
                max: self.max_chars,
            });
        }

        Ok(self
            .analyze_syllables(&chars)
            .into_iter()
            .map(|s| s.map(|s| s.to_marked()))
            .collect())
    }

    fn isolated(&self, ch: char) -> Option<String> {
        base_reading(ch).map(|s| s.to_marked())
    }
}

/// First (most common) reading from the `pinyin` crate.
fn base_reading(ch: char) -> Option<Syllable> {
    if !is_chinese_char(ch) {
        return None;
    }
    let mut buf = [0u8; 4];
    let text: &str = ch.encode_utf8(&mut buf);
    text.to_pinyin()
        .next()
        .flatten()
        .and_then(|p| Syllable::parse(p.with_tone()))
}

fn apply_neutral_particles(chars: &[char], syllables: &mut [Option<Syllable>]) {
    for i in 1..chars.len() {
        if !NEUTRAL_PARTICLES.contains(&chars[i]) || !is_chinese_char(chars[i - 1]) {
            continue;
        }
        if let Some(syllable) = syllables[i].as_mut() {
            syllable.tone = 5;
        }
    }
}

/// Forward maximum matching of dictionary words over runs of Chinese characters.
fn apply_lexicon(lexicon: &dyn Lexicon, chars: &[char], syllables: &mut [Option<Syllable>]) {
    let max_len = lexicon.max_word_chars().max(2);
    let mut i = 0;

    while i < chars.len() {
        if !is_chinese_char(chars[i]) {
            i += 1;
            continue;
        }
        let run_end = chars[i..]
            .iter()
            .position(|&c| !is_chinese_char(c))
            .map_or(chars.len(), |p| i + p);

        let mut matched = 0;
        let longest = max_len.min(run_end - i);
        for len in (2..=longest).rev() {
            let word: String = chars[i..i + len].iter().collect();
            if let Some(reading) = lexicon.word_reading(&word) {
                if reading.len() == len {
                    for (slot, syllable) in syllables[i..i + len].iter_mut().zip(reading) {
                        *slot = Some(syllable);
                    }
                    matched = len;
                    break;
                }
            }
        }
        i += matched.max(1);
    }
}

fn apply_polyphone_words(chars: &[char], syllables: &mut [Option<Syllable>]) {
    for (word, index, reading) in POLYPHONE_WORDS {
        let word_chars: Vec<char> = word.chars().collect();
        if word_chars.len() > chars.len() {
            continue;
        }
        for start in 0..=chars.len() - word_chars.len() {
            if chars[start..start + word_chars.len()] != word_chars[..] {
                continue;
            }
            let target = start + index;
            if syllables[target].is_some() {
                syllables[target] = Syllable::parse(reading);
            }
        }
    }
}

fn tone_at(syllables: &[Option<Syllable>], index: usize) -> Option<u8> {
    syllables.get(index).and_then(|s| s.as_ref()).map(|s| s.tone)
}

fn apply_tone_sandhi(chars: &[char], syllables: &mut [Option<Syllable>]) {
    // 一 and 不 depend on the citation tone of what follows, so they go first.
    for i in 0..chars.len() {
        let next_tone = tone_at(syllables, i + 1);
        let new_tone = match chars[i] {
            '不' => match next_tone {
                Some(4) => Some(2),
                Some(_) => Some(4),
                None => None,
            },
            '一' => yi_tone(chars, syllables, i),
            _ => None,
        };
        if let (Some(tone), Some(syllable)) = (new_tone, syllables[i].as_mut()) {
            if syllable.tone != tone {
                debug!("Tone sandhi: '{}' {} -> {}", chars[i], syllable.tone, tone);
                syllable.tone = tone;
            }
        }
    }

    // Within a run of third tones, every syllable but the last rises.
    let mut run_start: Option<usize> = None;
    for i in 0..=syllables.len() {
        let is_third = tone_at(syllables, i) == Some(3);
        match (is_third, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                for syllable in syllables[start..i - 1].iter_mut().flatten() {
                    syllable.tone = 2;
                }
                run_start = None;
            }
            _ => {}
        }
    }
}

fn yi_tone(chars: &[char], syllables: &[Option<Syllable>], i: usize) -> Option<u8> {
    let prev = i.checked_sub(1).map(|p| chars[p]);
    let next = chars.get(i + 1).copied();

    if let (Some(p), Some(n)) = (prev, next) {
        if p == n && is_chinese_char(p) {
            return Some(5);
        }
    }
    if prev == Some('第')
        || prev.is_some_and(|p| NUMERALS.contains(&p))
        || next.is_some_and(|n| NUMERALS.contains(&n))
    {
        return Some(1);
    }
    match tone_at(syllables, i + 1) {
        Some(4) => Some(2),
        Some(1..=3) => Some(4),
        _ => Some(1),
    }
}
