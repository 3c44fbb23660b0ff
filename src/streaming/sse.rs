//! Server-sent event framing around the transducer.
//!
//! The segmentation JSON arrives as the `data:` payloads of consecutive
//! events. Payloads are fed to the transducer and the corrected text is put
//! back into `data:` lines. Comments, other fields and the `[DONE]` sentinel
//! are forwarded as they came, terminators included.

use super::transducer::StreamTransducer;
use log::debug;

/// Terminal sentinel payload.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded line with the terminator it arrived with (`\n`, `\r\n`, `\r`,
/// or empty for a final unterminated line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub content: String,
    pub terminator: String,
}

/// Splits text into lines across chunk boundaries.
#[derive(Debug, Default)]
pub struct LineDecoder {
    partial: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str) -> Vec<Line> {
        self.partial.push_str(text);
        let mut lines = Vec::new();
        while let Some(pos) = self.partial.find(|c: char| c == '\r' || c == '\n') {
            let after = &self.partial[pos..];
            let terminator = if after.starts_with("\r\n") {
                "\r\n"
            } else if after.starts_with('\n') {
                "\n"
            } else if after.len() > 1 {
                "\r"
            } else {
                // A trailing `\r` may be the first half of `\r\n`.
                break;
            };
            let rest = self.partial.split_off(pos + terminator.len());
            let mut content = std::mem::replace(&mut self.partial, rest);
            content.truncate(pos);
            lines.push(Line {
                content,
                terminator: terminator.to_string(),
            });
        }
        lines
    }

    /// The unterminated remainder, if any. A final lone `\r` still ends it.
    pub fn finish(&mut self) -> Option<Line> {
        if self.partial.is_empty() {
            return None;
        }
        let mut content = std::mem::take(&mut self.partial);
        let terminator = if content.ends_with('\r') {
            content.pop();
            "\r"
        } else {
            ""
        };
        Some(Line {
            content,
            terminator: terminator.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    Comment,
    /// A `data` field; the payload has its single leading space removed.
    Data { prefix: &'a str, payload: &'a str },
    Field,
}

pub fn classify(content: &str) -> LineKind<'_> {
    if content.is_empty() {
        return LineKind::Blank;
    }
    if content.starts_with(':') {
        return LineKind::Comment;
    }
    if content == "data" {
        return LineKind::Data {
            prefix: content,
            payload: "",
        };
    }
    if let Some(value) = content.strip_prefix("data:") {
        let prefix_len = if value.starts_with(' ') { 6 } else { 5 };
        return LineKind::Data {
            prefix: &content[..prefix_len],
            payload: &content[prefix_len..],
        };
    }
    LineKind::Field
}

enum EventLine {
    /// Forwarded exactly as received.
    Verbatim(String),
    /// Where the corrected payload goes: the first data line's prefix and
    /// terminator.
    Data { prefix: String, terminator: String },
}

/// Re-frames a corrected event stream.
pub struct EventStreamCorrector {
    transducer: StreamTransducer,
    lines: LineDecoder,
    event: Vec<EventLine>,
    payload: Option<String>,
    done: bool,
}

impl EventStreamCorrector {
    pub fn new(transducer: StreamTransducer) -> Self {
        Self {
            transducer,
            lines: LineDecoder::new(),
            event: Vec::new(),
            payload: None,
            done: false,
        }
    }

    pub fn transducer(&self) -> &StreamTransducer {
        &self.transducer
    }

    pub fn push(&mut self, text: &str) -> String {
        let mut out = String::new();
        for line in self.lines.push(text) {
            self.line(line, &mut out);
        }
        out
    }

    pub fn finish(&mut self) -> String {
        let mut out = String::new();
        if let Some(line) = self.lines.finish() {
            self.line(line, &mut out);
        }
        if !self.event.is_empty() {
            self.dispatch("", &mut out);
        }
        self.flush_tail(&mut out);
        out
    }

    fn line(&mut self, line: Line, out: &mut String) {
        match classify(&line.content) {
            LineKind::Blank => self.dispatch(&line.terminator, out),
            LineKind::Data { payload, .. } if payload == DONE_SENTINEL => {
                self.done = true;
                let text = format!("{}{}", line.content, line.terminator);
                self.event.push(EventLine::Verbatim(text));
            }
            LineKind::Data { prefix, payload } => match &mut self.payload {
                Some(joined) => {
                    joined.push('\n');
                    joined.push_str(payload);
                }
                None => {
                    self.payload = Some(payload.to_string());
                    self.event.push(EventLine::Data {
                        prefix: prefix.to_string(),
                        terminator: line.terminator.clone(),
                    });
                }
            },
            LineKind::Comment | LineKind::Field => {
                let text = format!("{}{}", line.content, line.terminator);
                self.event.push(EventLine::Verbatim(text));
            }
        }
    }

    /// Emits the buffered event, ending it with `blank` (the upstream's
    /// blank line).
    fn dispatch(&mut self, blank: &str, out: &mut String) {
        let payload = self.payload.take();
        // An empty payload (`data:` keep-alive) is forwarded as an empty line;
        // only a non-empty payload can be withheld.
        let payload_was_empty = payload.as_deref() == Some("");
        let corrected = payload
            .map(|payload| self.transducer.push(&payload))
            .unwrap_or_default();

        if self.done {
            self.done = false;
            self.flush_tail(out);
        }

        let had_lines = !self.event.is_empty();
        let mut emitted = false;
        for line in self.event.drain(..) {
            match line {
                EventLine::Verbatim(text) => {
                    out.push_str(&text);
                    emitted = true;
                }
                EventLine::Data { prefix, terminator } => {
                    if corrected.is_empty() && !payload_was_empty {
                        continue;
                    }
                    for part in corrected.split('\n') {
                        out.push_str(&prefix);
                        out.push_str(part);
                        out.push_str(&terminator);
                    }
                    emitted = true;
                }
            }
        }

        if emitted || !had_lines {
            out.push_str(blank);
        } else {
            debug!("Event payload fully withheld, not emitting it yet");
        }
    }

    /// Emits anything the transducer still withholds as its own event.
    fn flush_tail(&mut self, out: &mut String) {
        let tail = self.transducer.finish();
        if tail.is_empty() {
            return;
        }
        for part in tail.split('\n') {
            out.push_str("data: ");
            out.push_str(part);
            out.push('\n');
        }
        out.push('\n');
    }
}
