//! Hand-rolled incremental HTML tokenizer
//!
//! A small, permissive tokenizer built for the streaming pipeline: it never
//! fails, carries any construct split across a chunk boundary over to the
//! next `feed`, and treats `<script>`/`<style>` content as rawtext scanned
//! only for the matching close tag. Text and unrecognised declarations pass
//! through byte-for-byte; attribute values are entity-decoded so the tag
//! factory can re-escape them uniformly.

use crate::html::decode::{decode_entities, StreamDecoder};
use crate::html::event::{Attrs, EventStream, ParseEvent};

/// Incremental tokenizer implementing the shared [`EventStream`] contract
#[derive(Debug, Default)]
pub struct HtmlTokenizer {
    decoder: StreamDecoder,
    buf: String,
    /// Element name whose rawtext content we are currently inside
    rawtext: Option<String>,
}

impl HtmlTokenizer {
    /// Create a fresh tokenizer
    pub fn new() -> Self {
        Self::default()
    }

    fn run(&mut self, at_eof: bool, emit: &mut dyn FnMut(ParseEvent)) {
        loop {
            if let Some(element) = self.rawtext.clone() {
                if !self.run_rawtext(&element, at_eof, emit) {
                    return;
                }
                continue;
            }

            let Some(lt) = self.buf.find('<') else {
                if !self.buf.is_empty() {
                    emit(ParseEvent::Text {
                        data: std::mem::take(&mut self.buf),
                    });
                }
                return;
            };

            if lt > 0 {
                let tail = self.buf.split_off(lt);
                let head = std::mem::replace(&mut self.buf, tail);
                emit(ParseEvent::Text { data: head });
            }

            let rest = self.buf.as_str();

            // Too short to even classify ("<", "<!", "<!-"): wait for more
            if !at_eof && rest.len() < 4 && "<!--".starts_with(rest) {
                return;
            }

            if rest.starts_with("<!--") {
                if let Some(end) = rest.find("-->") {
                    let data = rest[4..end].to_string();
                    self.buf.drain(..end + 3);
                    emit(ParseEvent::Comment { data });
                    continue;
                }
                if at_eof {
                    let data = self.buf[4..].to_string();
                    self.buf.clear();
                    emit(ParseEvent::Comment { data });
                }
                return;
            }

            if rest.starts_with("<!") {
                if let Some(end) = rest.find('>') {
                    let inner = rest[2..end].to_string();
                    self.buf.drain(..end + 1);

                    if inner.len() >= 7 && inner[..7].eq_ignore_ascii_case("doctype") {
                        emit(parse_doctype(&inner[7..]));
                    } else {
                        // CDATA sections and other declarations pass through
                        emit(ParseEvent::Text {
                            data: format!("<!{inner}>"),
                        });
                    }
                    continue;
                }
                return self.flush_raw_at_eof(at_eof, emit);
            }

            if rest.starts_with("<?") {
                if let Some(end) = rest.find('>') {
                    let data = rest[2..end].to_string();
                    self.buf.drain(..end + 1);
                    emit(ParseEvent::ProcessingInstruction { data });
                    continue;
                }
                return self.flush_raw_at_eof(at_eof, emit);
            }

            if rest.starts_with("</") {
                if let Some(end) = rest.find('>') {
                    let name = rest[2..end].trim().to_ascii_lowercase();
                    self.buf.drain(..end + 1);
                    if !name.is_empty() {
                        emit(ParseEvent::EndTag { name });
                    }
                    continue;
                }
                return self.flush_raw_at_eof(at_eof, emit);
            }

            if rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                if let Some(end) = find_tag_end(rest) {
                    let (name, attrs, self_closing) = parse_tag(&rest[1..end]);
                    self.buf.drain(..end + 1);

                    if self_closing {
                        emit(ParseEvent::SelfClosingTag { name, attrs });
                    } else {
                        let enters_rawtext = matches!(name.as_str(), "script" | "style");
                        let rawtext_name = enters_rawtext.then(|| name.clone());
                        emit(ParseEvent::StartTag { name, attrs });
                        self.rawtext = rawtext_name;
                    }
                    continue;
                }
                return self.flush_raw_at_eof(at_eof, emit);
            }

            // A lone '<' that opens nothing
            self.buf.drain(..1);
            emit(ParseEvent::Text {
                data: "<".to_string(),
            });
        }
    }

    /// Inside `<script>`/`<style>`: everything up to the matching close tag
    /// is opaque text. Returns `true` when the close tag was found and
    /// normal tokenizing can resume.
    fn run_rawtext(
        &mut self,
        element: &str,
        at_eof: bool,
        emit: &mut dyn FnMut(ParseEvent),
    ) -> bool {
        let close = format!("</{element}");

        if let Some(pos) = find_ascii_ignore_case(&self.buf, &close) {
            let tail = self.buf.split_off(pos);
            let head = std::mem::replace(&mut self.buf, tail);
            if !head.is_empty() {
                emit(ParseEvent::Text { data: head });
            }
            self.rawtext = None;
            return true;
        }

        if at_eof {
            if !self.buf.is_empty() {
                emit(ParseEvent::Text {
                    data: std::mem::take(&mut self.buf),
                });
            }
            return false;
        }

        // Emit what cannot be part of a split close tag, keep the rest
        let keep = close.len() + 1;
        if self.buf.len() > keep {
            let mut split = self.buf.len() - keep;
            while !self.buf.is_char_boundary(split) {
                split -= 1;
            }
            let tail = self.buf.split_off(split);
            let head = std::mem::replace(&mut self.buf, tail);
            if !head.is_empty() {
                emit(ParseEvent::Text { data: head });
            }
        }
        false
    }

    /// An unterminated construct at end of input passes through verbatim
    fn flush_raw_at_eof(&mut self, at_eof: bool, emit: &mut dyn FnMut(ParseEvent)) {
        if at_eof && !self.buf.is_empty() {
            emit(ParseEvent::Text {
                data: std::mem::take(&mut self.buf),
            });
        }
    }
}

impl EventStream for HtmlTokenizer {
    fn feed(&mut self, chunk: &[u8], emit: &mut dyn FnMut(ParseEvent)) {
        let text = self.decoder.decode(chunk);
        self.buf.push_str(&text);
        self.run(false, emit);
    }

    fn finish(&mut self, emit: &mut dyn FnMut(ParseEvent)) {
        let text = self.decoder.finish();
        self.buf.push_str(&text);
        self.run(true, emit);
    }
}

/// Case-insensitive ASCII substring search returning a byte offset
fn find_ascii_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

/// Find the byte offset of the `>` terminating a tag, skipping quoted
/// attribute values. `None` means the tag is still incomplete.
fn find_tag_end(s: &str) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in s.as_bytes().iter().enumerate() {
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

/// Parse the inside of a start tag (between `<` and `>`) into name,
/// attributes in source order, and the self-closing flag.
fn parse_tag(s: &str) -> (String, Attrs, bool) {
    let mut s = s.trim_end();
    let self_closing = s.ends_with('/');
    if self_closing {
        s = s[..s.len() - 1].trim_end();
    }

    let name_end = s
        .find(|c: char| c.is_whitespace() || c == '/')
        .unwrap_or(s.len());
    let name = s[..name_end].to_ascii_lowercase();

    let mut attrs = Attrs::new();
    let mut rest = &s[name_end..];

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '/');
        if rest.is_empty() {
            break;
        }

        let key_end = rest
            .find(|c: char| c.is_whitespace() || c == '=' || c == '/')
            .unwrap_or(rest.len());
        let key = rest[..key_end].to_ascii_lowercase();
        rest = &rest[key_end..];

        let after = rest.trim_start();
        if let Some(value_part) = after.strip_prefix('=') {
            let value_part = value_part.trim_start();
            let mut chars = value_part.chars();
            match chars.next() {
                Some(q @ ('"' | '\'')) => {
                    let inner = &value_part[1..];
                    let (value, next) = match inner.find(q) {
                        Some(end) => (&inner[..end], &inner[end + 1..]),
                        None => (inner, ""),
                    };
                    if !key.is_empty() {
                        attrs.push((key, Some(decode_entities(value))));
                    }
                    rest = next;
                }
                _ => {
                    let end = value_part
                        .find(char::is_whitespace)
                        .unwrap_or(value_part.len());
                    if !key.is_empty() {
                        attrs.push((key, Some(decode_entities(&value_part[..end]))));
                    }
                    rest = &value_part[end..];
                }
            }
        } else {
            if !key.is_empty() {
                attrs.push((key, None));
            }
            rest = after;
        }
    }

    (name, attrs, self_closing)
}

/// Parse the body of a `<!DOCTYPE ...>` declaration
fn parse_doctype(s: &str) -> ParseEvent {
    let s = s.trim();
    let (name, rest) = match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    };

    let mut quoted = Vec::new();
    let mut scan = rest;
    while let Some(start) = scan.find(['"', '\'']) {
        let quote = scan.as_bytes()[start] as char;
        let tail = &scan[start + 1..];
        let Some(end) = tail.find(quote) else {
            break;
        };
        quoted.push(tail[..end].to_string());
        scan = &tail[end + 1..];
    }

    let upper = rest.to_ascii_uppercase();
    let (public_id, system_id) = if upper.starts_with("PUBLIC") {
        (quoted.first().cloned(), quoted.get(1).cloned())
    } else if upper.starts_with("SYSTEM") {
        (None, quoted.first().cloned())
    } else {
        (None, None)
    };

    ParseEvent::Doctype {
        name: name.to_string(),
        public_id,
        system_id,
    }
}
