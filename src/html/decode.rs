//! Incremental byte decoding
//!
//! Upstream chunks arrive on arbitrary byte boundaries, so a multi-byte
//! UTF-8 sequence can be split across two chunks. The [`StreamDecoder`]
//! carries an incomplete trailing sequence over to the next chunk, and falls
//! back to a single-byte Latin-1 interpretation for bytes that are genuinely
//! invalid UTF-8. Decoding never fails; a broken stream degrades to
//! mojibake, not an aborted request.

/// Decode a byte slice as Latin-1 (every byte maps to its code point)
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Streaming UTF-8 decoder with Latin-1 fallback
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
}

impl StreamDecoder {
    /// Create a fresh decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk, holding back an incomplete trailing sequence
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    // Safe: from_utf8 just validated this prefix
                    out.push_str(unsafe { std::str::from_utf8_unchecked(&rest[..valid_up_to]) });

                    match err.error_len() {
                        // Incomplete sequence at the very end: wait for the
                        // next chunk before deciding it is invalid
                        None => {
                            self.pending = rest[valid_up_to..].to_vec();
                            break;
                        }
                        // Truly invalid bytes: take them as Latin-1
                        Some(bad_len) => {
                            let bad_end = valid_up_to + bad_len;
                            out.push_str(&decode_latin1(&rest[valid_up_to..bad_end]));
                            rest = &rest[bad_end..];
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush: any held-back partial sequence can no longer complete, so it
    /// decodes as Latin-1.
    pub fn finish(&mut self) -> String {
        decode_latin1(&std::mem::take(&mut self.pending))
    }
}

/// Decode character references in attribute values.
///
/// Handles the named references that actually occur in attribute values plus
/// numeric (`&#233;`) and hex (`&#xE9;`) forms. Anything unrecognized stays
/// literal, matching lenient browser behavior.
pub fn decode_entities(value: &str) -> String {
    let Some(first) = value.find('&') else {
        return value.to_string();
    };

    let mut out = String::with_capacity(value.len());
    out.push_str(&value[..first]);
    let mut rest = &value[first..];

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        // A reference is '&' .. ';' with a short body
        let Some(semi) = rest[1..].find(';').filter(|&i| i <= 9).map(|i| i + 1) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };

        let body = &rest[1..semi];
        let decoded = match body {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => body
                .strip_prefix('#')
                .and_then(|num| {
                    num.strip_prefix(['x', 'X'])
                        .map_or_else(|| num.parse::<u32>().ok(), |hex| u32::from_str_radix(hex, 16).ok())
                })
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_utf8_passes_through() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.decode("héllo".as_bytes()), "héllo");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let bytes = "café".as_bytes();
        let (a, b) = bytes.split_at(bytes.len() - 1); // split inside 'é'

        let mut decoder = StreamDecoder::new();
        let first = decoder.decode(a);
        let second = decoder.decode(b);
        assert_eq!(format!("{first}{second}"), "café");
    }

    #[test]
    fn test_invalid_bytes_fall_back_to_latin1() {
        // 0xE9 is 'é' in Latin-1 and invalid as a lone UTF-8 byte
        let mut decoder = StreamDecoder::new();
        let out = decoder.decode(b"caf\xE9 au lait");
        assert_eq!(out, "café au lait");
    }

    #[test]
    fn test_truncated_sequence_flushes_as_latin1() {
        let mut decoder = StreamDecoder::new();
        let out = decoder.decode(b"abc\xC3");
        assert_eq!(out, "abc");
        assert_eq!(decoder.finish(), "Ã");
    }

    #[test]
    fn test_decode_latin1() {
        assert_eq!(decode_latin1(b"\xFFa"), "ÿa");
    }

    #[test]
    fn test_decode_entities_named_and_numeric() {
        assert_eq!(decode_entities("a=1&amp;b=2"), "a=1&b=2");
        assert_eq!(decode_entities("&lt;p&gt; &quot;x&quot;"), "<p> \"x\"");
        assert_eq!(decode_entities("caf&#233; caf&#xE9;"), "café café");
    }

    #[test]
    fn test_decode_entities_leaves_unknown_literal() {
        assert_eq!(decode_entities("a &notareference; b"), "a &notareference; b");
        assert_eq!(decode_entities("AT&T"), "AT&T");
        assert_eq!(decode_entities("trailing &"), "trailing &");
    }
}
