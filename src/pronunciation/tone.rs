//! Tone-mark / tone-number transliteration for Hanyu Pinyin.
//!
//! The canonical form used everywhere outside the analyzer is the tone-number
//! form: lowercase letters followed by a single digit 1-5 (5 = neutral), with
//! `ü` spelled `u:` (so `lǜ` becomes `lu:4`).

use once_cell::sync::Lazy;
use regex::Regex;

/// Syllables that are already in canonical tone-number form.
static NUMBERED_SYLLABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z:ü]+)([1-5])$").expect("valid syllable pattern"));

const NEUTRAL_TONE: u8 = 5;

/// Diacritic table: (marked vowel, bare vowel, tone).
const TONE_MARKS: &[(char, char, u8)] = &[
    ('ā', 'a', 1),
    ('á', 'a', 2),
    ('ǎ', 'a', 3),
    ('à', 'a', 4),
    ('ē', 'e', 1),
    ('é', 'e', 2),
    ('ě', 'e', 3),
    ('è', 'e', 4),
    ('ī', 'i', 1),
    ('í', 'i', 2),
    ('ǐ', 'i', 3),
    ('ì', 'i', 4),
    ('ō', 'o', 1),
    ('ó', 'o', 2),
    ('ǒ', 'o', 3),
    ('ò', 'o', 4),
    ('ū', 'u', 1),
    ('ú', 'u', 2),
    ('ǔ', 'u', 3),
    ('ù', 'u', 4),
    ('ǖ', 'ü', 1),
    ('ǘ', 'ü', 2),
    ('ǚ', 'ü', 3),
    ('ǜ', 'ü', 4),
    // Syllabic nasals (呣 m̄, 嗯 ń / ň / ǹ)
    ('ḿ', 'm', 2),
    ('ń', 'n', 2),
    ('ň', 'n', 3),
    ('ǹ', 'n', 4),
];

/// Splits a tone-marked vowel into its bare vowel and tone digit.
pub fn split_tone_mark(ch: char) -> Option<(char, u8)> {
    TONE_MARKS
        .iter()
        .find(|(marked, _, _)| *marked == ch)
        .map(|(_, bare, tone)| (*bare, *tone))
}

/// The marked form of `bare` carrying `tone` (1-4), if one exists.
pub fn tone_mark(bare: char, tone: u8) -> Option<char> {
    TONE_MARKS
        .iter()
        .find(|(_, b, t)| *b == bare && *t == tone)
        .map(|(marked, _, _)| *marked)
}

/// Converts one syllable to tone-number form.
///
/// Accepts diacritic form (`hǎo`), digit form (`hao3`, returned unchanged),
/// the `v`/`ü`/`u:` spellings of ü, and bare syllables (`ma`, read as neutral).
pub fn to_tone_number(syllable: &str) -> String {
    let trimmed = syllable.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut letters = String::with_capacity(trimmed.len() + 2);
    let mut tone: Option<u8> = None;

    for ch in trimmed.chars() {
        if let Some((bare, marked_tone)) = split_tone_mark(ch) {
            push_letter(&mut letters, bare);
            tone = Some(marked_tone);
            continue;
        }
        match ch {
            '1'..='5' => tone = ch.to_digit(10).map(|d| d as u8),
            _ => push_letter(&mut letters, ch),
        }
    }

    if letters.is_empty() {
        return trimmed.to_string();
    }

    letters.push(char::from(b'0' + tone.unwrap_or(NEUTRAL_TONE)));
    letters
}

fn push_letter(out: &mut String, ch: char) {
    match ch {
        'ü' | 'v' => out.push_str("u:"),
        'Ü' | 'V' => out.push_str("U:"),
        _ => out.push(ch),
    }
}

/// Normalizes a space-separated pronunciation so every syllable ends in a tone digit.
pub fn normalize_pronunciation(pronunciation: &str) -> String {
    pronunciation
        .split_whitespace()
        .map(to_tone_number)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A single pinyin syllable split into letters and tone.
///
/// `letters` is lowercase and spells ü as `ü` so that tone marks can be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syllable {
    pub letters: String,
    pub tone: u8,
}

impl Syllable {
    pub fn new(letters: impl Into<String>, tone: u8) -> Self {
        Self {
            letters: letters.into(),
            tone,
        }
    }

    /// Parses any accepted spelling (marked, numbered, or bare).
    pub fn parse(syllable: &str) -> Option<Self> {
        let numbered = to_tone_number(syllable);
        let captures = NUMBERED_SYLLABLE.captures(&numbered)?;
        let letters = captures[1].to_lowercase().replace("u:", "ü");
        if letters.contains(':') {
            return None;
        }
        let tone = captures[2].parse().ok()?;
        Some(Self { letters, tone })
    }

    pub fn is_neutral(&self) -> bool {
        self.tone == NEUTRAL_TONE
    }

    /// Tone-number spelling, e.g. `nu:3`.
    pub fn to_numbered(&self) -> String {
        format!("{}{}", self.letters.replace('ü', "u:"), self.tone)
    }

    /// Diacritic spelling, e.g. `nǚ`. Neutral syllables carry no mark.
    pub fn to_marked(&self) -> String {
        if !(1..=4).contains(&self.tone) {
            return self.letters.clone();
        }
        let Some(index) = mark_position(&self.letters) else {
            return self.letters.clone();
        };

        self.letters
            .chars()
            .enumerate()
            .map(|(i, ch)| {
                if i == index {
                    tone_mark(ch, self.tone).unwrap_or(ch)
                } else {
                    ch
                }
            })
            .collect()
    }
}

/// Char index that carries the tone mark: `a` or `e` if present, the `o` of
/// `ou`, otherwise the last vowel. Syllabic nasals mark their first letter.
fn mark_position(letters: &str) -> Option<usize> {
    let chars: Vec<char> = letters.chars().collect();

    if let Some(i) = chars.iter().position(|&c| c == 'a' || c == 'e') {
        return Some(i);
    }
    if let Some(i) = chars.windows(2).position(|w| w == ['o', 'u']) {
        return Some(i);
    }
    if let Some(i) = chars
        .iter()
        .rposition(|&c| matches!(c, 'i' | 'o' | 'u' | 'ü'))
    {
        return Some(i);
    }
    match chars.first() {
        Some('m') | Some('n') => Some(0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_marked_vowel_maps_to_one_digit() {
        for (marked, bare, tone) in TONE_MARKS {
            let converted = to_tone_number(&marked.to_string());
            let expected_letters = if *bare == 'ü' {
                "u:".to_string()
            } else {
                bare.to_string()
            };
            assert_eq!(converted, format!("{}{}", expected_letters, tone));
        }
    }

    #[test]
    fn test_marked_syllables() {
        assert_eq!(to_tone_number("hǎo"), "hao3");
        assert_eq!(to_tone_number("zhōng"), "zhong1");
        assert_eq!(to_tone_number("guó"), "guo2");
        assert_eq!(to_tone_number("lǜ"), "lu:4");
        assert_eq!(to_tone_number("nǚ"), "nu:3");
    }

    #[test]
    fn test_unmarked_is_neutral() {
        assert_eq!(to_tone_number("ma"), "ma5");
        assert_eq!(to_tone_number("lü"), "lu:5");
    }

    #[test]
    fn test_digit_form_is_noop() {
        for syllable in ["ma5", "hao3", "lu:4", "nu:3", "er2", "zhong1"] {
            assert_eq!(to_tone_number(syllable), syllable);
            assert_eq!(to_tone_number(&to_tone_number(syllable)), syllable);
        }
    }

    #[test]
    fn test_v_spelling_normalizes() {
        assert_eq!(to_tone_number("lv4"), "lu:4");
        assert_eq!(to_tone_number("nv3"), "nu:3");
    }

    #[test]
    fn test_normalize_pronunciation() {
        assert_eq!(normalize_pronunciation("nǐ  hǎo"), "ni3 hao3");
        assert_eq!(normalize_pronunciation("Zhong1 guo2"), "Zhong1 guo2");
        assert_eq!(normalize_pronunciation(""), "");
    }

    #[test]
    fn test_syllable_parse_and_render() {
        let syllable = Syllable::parse("lu:4").unwrap();
        assert_eq!(syllable, Syllable::new("lü", 4));
        assert_eq!(syllable.to_marked(), "lǜ");
        assert_eq!(syllable.to_numbered(), "lu:4");

        assert_eq!(Syllable::parse("hǎo").unwrap().to_numbered(), "hao3");
        assert!(Syllable::parse("").is_none());
        assert!(Syllable::parse("，").is_none());
    }

    #[test]
    fn test_mark_placement() {
        assert_eq!(Syllable::new("hao", 3).to_marked(), "hǎo");
        assert_eq!(Syllable::new("guo", 2).to_marked(), "guó");
        assert_eq!(Syllable::new("liu", 2).to_marked(), "liú");
        assert_eq!(Syllable::new("gui", 4).to_marked(), "guì");
        assert_eq!(Syllable::new("dou", 1).to_marked(), "dōu");
        assert_eq!(Syllable::new("xiong", 2).to_marked(), "xióng");
        assert_eq!(Syllable::new("ma", 5).to_marked(), "ma");
        assert_eq!(Syllable::new("n", 2).to_marked(), "ń");
    }
}
