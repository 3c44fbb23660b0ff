//! JSON string-literal scanning.
//!
//! Tracks whether the next character is escaped so that `\"` is never taken
//! for the closing quote, independent of how the input was chunked.

/// Scans the body of a JSON string one character at a time, starting just
/// after the opening quote.
#[derive(Debug, Clone, Default)]
pub struct StringScanner {
    escaped: bool,
}

impl StringScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when `ch` is the unescaped closing quote.
    pub fn feed(&mut self, ch: char) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }
        match ch {
            '\\' => {
                self.escaped = true;
                false
            }
            '"' => true,
            _ => false,
        }
    }

    pub fn in_escape(&self) -> bool {
        self.escaped
    }
}

/// Decodes the raw body of a JSON string (without quotes). `None` if the
/// escapes are malformed.
pub fn unescape_json_string(raw: &str) -> Option<String> {
    if !raw.contains('\\') {
        return Some(raw.to_string());
    }
    serde_json::from_str(&format!("\"{}\"", raw)).ok()
}

/// Encodes `value` as the body of a JSON string (without quotes).
pub fn escape_json_string(value: &str) -> String {
    let quoted = serde_json::to_string(value).unwrap_or_default();
    quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}
