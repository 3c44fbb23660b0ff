//! Incremental UTF-8 decoding across arbitrary byte chunk boundaries.

/// Holds back an incomplete trailing multi-byte sequence until the next chunk.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes as much of `pending + bytes` as is complete. Invalid sequences
    /// become U+FFFD; an incomplete tail is kept for the next call.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        let mut input: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    input = &[];
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - input.len();
        self.pending.drain(..consumed);
        out
    }

    /// Flushes whatever is pending, lossily.
    pub fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
