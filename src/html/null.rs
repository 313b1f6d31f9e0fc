//! Pass-through backend
//!
//! Emits each chunk as one opaque text event without parsing anything, so
//! the document flows through the pipeline byte-for-byte (modulo charset
//! decoding). Useful as a no-op baseline and for content that must not be
//! touched. Chunks decode as Latin-1: every byte maps to a code point, so
//! nothing is held back and nothing can fail.

use crate::html::decode::decode_latin1;
use crate::html::event::{EventStream, ParseEvent};

/// Backend that forwards content unparsed and unmodified
#[derive(Debug, Default)]
pub struct NullTokenizer;

impl NullTokenizer {
    /// Create a pass-through backend
    pub fn new() -> Self {
        Self
    }
}

impl EventStream for NullTokenizer {
    fn feed(&mut self, chunk: &[u8], emit: &mut dyn FnMut(ParseEvent)) {
        if !chunk.is_empty() {
            emit(ParseEvent::Text {
                data: decode_latin1(chunk),
            });
        }
    }

    fn finish(&mut self, _emit: &mut dyn FnMut(ParseEvent)) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_passes_through_untouched() {
        let mut tokenizer = NullTokenizer::new();
        let mut events = Vec::new();
        tokenizer.feed(b"<a href='/x'>text & more</a>", &mut |ev| events.push(ev));
        tokenizer.finish(&mut |ev| events.push(ev));

        assert_eq!(
            events,
            vec![ParseEvent::Text {
                data: "<a href='/x'>text & more</a>".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_chunk_emits_nothing() {
        let mut tokenizer = NullTokenizer::new();
        let mut events = Vec::new();
        tokenizer.feed(b"", &mut |ev| events.push(ev));
        assert!(events.is_empty());
    }
}
