//! Splits a token stream into speakable units.
//!
//! A unit is flushed whenever the buffer ends in `.`, `!` or `?` (trailing
//! whitespace allowed).  Before the first unit has gone out, an eagerness
//! rule also applies so the speaker can start talking sooner: once the
//! buffer holds `min_first_chars` characters and either contains a comma or
//! has reached `max_first_chars`, the text up to the last comma is flushed.
//! If there is no comma, or the last one sits closer to the start than
//! `min_comma_offset`, the whole buffer goes instead.
//!
//! At most one unit is produced per fragment.

use crate::config::SpeechConfig;

#[derive(Debug, Clone)]
pub struct SentenceChunker {
    buffer: String,
    flushed_any: bool,
    min_first_chars: usize,
    max_first_chars: usize,
    min_comma_offset: usize,
}

fn ends_sentence(text: &str) -> bool {
    text.trim_end().ends_with(['.', '!', '?'])
}

impl SentenceChunker {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            buffer: String::new(),
            flushed_any: false,
            min_first_chars: config.min_first_chars,
            max_first_chars: config.max_first_chars,
            min_comma_offset: config.min_comma_offset,
        }
    }

    /// Add a fragment; returns a unit when one is ready.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.buffer.push_str(fragment);

        if ends_sentence(&self.buffer) {
            let unit = self.buffer.trim().to_string();
            self.buffer.clear();
            return self.emit(unit);
        }

        if !self.flushed_any {
            return self.early_flush();
        }
        None
    }

    /// Flush whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        let unit = self.buffer.trim().to_string();
        self.buffer.clear();
        self.emit(unit)
    }

    /// Whether any unit has been produced yet.
    #[cfg(test)]
    pub(crate) fn has_flushed(&self) -> bool {
        self.flushed_any
    }

    /// Text waiting for the next boundary.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> &str {
        &self.buffer
    }

    fn early_flush(&mut self) -> Option<String> {
        let len = self.buffer.chars().count();
        if len < self.min_first_chars {
            return None;
        }

        let comma = self.buffer.rfind(',');
        if comma.is_none() && len < self.max_first_chars {
            return None;
        }

        let split = match comma {
            Some(i) if self.buffer[..i].chars().count() >= self.min_comma_offset => i,
            _ => self.buffer.len(),
        };

        let unit = self.buffer[..split].trim().to_string();
        if unit.is_empty() {
            return None;
        }
        let rest = self.buffer[split..]
            .trim_start_matches(',')
            .trim()
            .to_string();
        self.buffer = rest;
        self.emit(unit)
    }

    fn emit(&mut self, unit: String) -> Option<String> {
        if unit.is_empty() {
            return None;
        }
        self.flushed_any = true;
        Some(unit)
    }
}
