//! SAX-style backend over the `html5ever` tokenizer
//!
//! Adapts the spec-compliant `html5ever` tokenizer to the shared
//! [`EventStream`] contract. `html5ever` decodes character references in
//! text, so character data is re-escaped before it is emitted as
//! output-ready text; script and style content is left verbatim because the
//! tokenizer is switched into its rawtext states for those elements.

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};

use crate::html::decode::StreamDecoder;
use crate::html::event::{EventStream, ParseEvent};
use crate::html::tag_factory::escape_text;

/// Collects tokens from `html5ever` as backend-agnostic events
#[derive(Debug, Default)]
struct EventSink {
    events: Vec<ParseEvent>,
    /// Inside `<script>`/`<style>`: character data is raw, not markup text
    in_rawtext: bool,
}

impl EventSink {
    fn handle_tag(&mut self, tag: Tag) -> TokenSinkResult<()> {
        let name = tag.name.to_string();
        let attrs = tag
            .attrs
            .into_iter()
            .map(|attr| (attr.name.local.to_string(), Some(attr.value.to_string())))
            .collect();

        match tag.kind {
            TagKind::StartTag if tag.self_closing => {
                self.events.push(ParseEvent::SelfClosingTag { name, attrs });
            }
            TagKind::StartTag => {
                let raw_kind = match name.as_str() {
                    "script" => Some(html5ever::tokenizer::states::RawKind::ScriptData),
                    "style" => Some(html5ever::tokenizer::states::RawKind::Rawtext),
                    _ => None,
                };
                self.events.push(ParseEvent::StartTag { name, attrs });
                if let Some(kind) = raw_kind {
                    self.in_rawtext = true;
                    return TokenSinkResult::RawData(kind);
                }
            }
            TagKind::EndTag => {
                if matches!(name.as_str(), "script" | "style") {
                    self.in_rawtext = false;
                }
                self.events.push(ParseEvent::EndTag { name });
            }
        }

        TokenSinkResult::Continue
    }
}

impl TokenSink for EventSink {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) => return self.handle_tag(tag),
            Token::CharacterTokens(data) => {
                let data = if self.in_rawtext {
                    data.to_string()
                } else {
                    escape_text(&data)
                };
                self.events.push(ParseEvent::Text { data });
            }
            Token::CommentToken(data) => {
                self.events.push(ParseEvent::Comment {
                    data: data.to_string(),
                });
            }
            Token::DoctypeToken(doctype) => {
                self.events.push(ParseEvent::Doctype {
                    name: doctype.name.map(|n| n.to_string()).unwrap_or_default(),
                    public_id: doctype.public_id.map(|id| id.to_string()),
                    system_id: doctype.system_id.map(|id| id.to_string()),
                });
            }
            Token::NullCharacterToken | Token::EOFToken => {}
            Token::ParseError(message) => {
                tracing::trace!(%message, "tokenizer recovered from malformed markup");
            }
        }

        TokenSinkResult::Continue
    }
}

/// `html5ever`-backed tokenizer implementing [`EventStream`]
pub struct SaxTokenizer {
    decoder: StreamDecoder,
    tokenizer: Tokenizer<EventSink>,
    input: BufferQueue,
}

impl SaxTokenizer {
    /// Create a fresh tokenizer
    pub fn new() -> Self {
        Self {
            decoder: StreamDecoder::new(),
            tokenizer: Tokenizer::new(EventSink::default(), TokenizerOpts::default()),
            input: BufferQueue::new(),
        }
    }

    fn drive(&mut self, text: &str, emit: &mut dyn FnMut(ParseEvent)) {
        if !text.is_empty() {
            self.input.push_back(StrTendril::from_slice(text));
            let _ = self.tokenizer.feed(&mut self.input);
        }
        for event in self.tokenizer.sink.events.drain(..) {
            emit(event);
        }
    }
}

impl Default for SaxTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SaxTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaxTokenizer").finish_non_exhaustive()
    }
}

impl EventStream for SaxTokenizer {
    fn feed(&mut self, chunk: &[u8], emit: &mut dyn FnMut(ParseEvent)) {
        let text = self.decoder.decode(chunk);
        self.drive(&text, emit);
    }

    fn finish(&mut self, emit: &mut dyn FnMut(ParseEvent)) {
        let text = self.decoder.finish();
        if !text.is_empty() {
            self.input.push_back(StrTendril::from_slice(&text));
            let _ = self.tokenizer.feed(&mut self.input);
        }
        self.tokenizer.end();
        for event in self.tokenizer.sink.events.drain(..) {
            emit(event);
        }
    }
}
