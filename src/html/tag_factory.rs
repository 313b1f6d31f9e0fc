//! Event serialization and attribute rewriting
//!
//! The [`TagFactory`] is the single consumer of [`ParseEvent`]s: it turns
//! them back into markup text, rewriting interesting attributes through the
//! URL rewriter on the way, escaping attribute values on output, and
//! inserting the head injection points around the `<head>` element.

use crate::buffer::StreamingBuffer;
use crate::error::Result;
use crate::html::event::{Attrs, ParseEvent};
use crate::injection::InjectionPoints;
use crate::ruleset::is_interesting_attribute;
use crate::source_set::ImageSourceSet;
use crate::url_rewriter::UrlRewriter;

// From the HTML void-element list; these never emit a separate end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr", // obsolete
    "command", "keygen", "menuitem",
];

/// Whether `tag` is a void element
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Escape text content for markup output
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape an attribute value for double-quoted output
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serializes parse events to text, rewriting URLs as it goes
#[derive(Debug)]
pub struct TagFactory {
    url_rewriter: UrlRewriter,
    injection: InjectionPoints,
}

impl TagFactory {
    /// Create a factory for one document's rewrite
    pub fn new(url_rewriter: UrlRewriter, injection: InjectionPoints) -> Self {
        Self {
            url_rewriter,
            injection,
        }
    }

    /// Serialize one event into the output buffer.
    ///
    /// `head_top` is appended right after the `<head>` start tag and
    /// `head_bottom` right before the `</head>` end tag. End tags for void
    /// elements are dropped so backends that synthesize them (tree-driven
    /// ones) serialize identically to those that never see them.
    pub fn handle_event(&mut self, event: ParseEvent, out: &mut StreamingBuffer) -> Result<()> {
        match event {
            ParseEvent::StartTag { name, attrs } => {
                out.add(self.format_tag(&name, &attrs, false)?);
                if name == "head" {
                    out.add(self.injection.head_top.clone());
                }
            }
            ParseEvent::SelfClosingTag { name, attrs } => {
                out.add(self.format_tag(&name, &attrs, true)?);
            }
            ParseEvent::EndTag { name } => {
                if name == "head" {
                    out.add(self.injection.head_bottom.clone());
                }
                if !is_void_element(&name) {
                    out.add(format!("</{name}>"));
                }
            }
            ParseEvent::Text { data } => out.add(data),
            ParseEvent::Comment { data } => out.add(format!("<!--{data}-->")),
            ParseEvent::Doctype {
                name,
                public_id,
                system_id,
            } => {
                let mut doctype = format!("<!DOCTYPE {name}");
                if let Some(public_id) = public_id {
                    doctype.push_str(&format!(" PUBLIC \"{public_id}\""));
                }
                if let Some(system_id) = system_id {
                    doctype.push_str(&format!(" \"{system_id}\""));
                }
                doctype.push('>');
                out.add(doctype);
            }
            ParseEvent::ProcessingInstruction { data } => out.add(format!("<?{data}>")),
        }

        Ok(())
    }

    fn format_tag(&self, name: &str, attrs: &Attrs, self_closing: bool) -> Result<String> {
        let rel = attrs
            .iter()
            .find(|(key, _)| key == "rel")
            .and_then(|(_, value)| value.as_deref());

        let mut tag = format!("<{name}");

        for (key, value) in attrs {
            match value {
                None => {
                    tag.push(' ');
                    tag.push_str(key);
                }
                Some(value) => {
                    let value = self.rewritten_value(name, key, value, rel)?;
                    tag.push_str(&format!(" {key}=\"{}\"", escape_attribute(&value)));
                }
            }
        }

        tag.push_str(if self_closing { " />" } else { ">" });
        Ok(tag)
    }

    /// Rewrite an attribute value if `(tag, attribute)` is interesting;
    /// otherwise hand back the original.
    fn rewritten_value(&self, tag: &str, attr: &str, value: &str, rel: Option<&str>) -> Result<String> {
        if !is_interesting_attribute(tag, attr) {
            return Ok(value.to_string());
        }

        if attr == "srcset" {
            // Each candidate URL is rewritten independently; descriptors
            // survive re-serialization
            let set = ImageSourceSet::parse(value)
                .try_map_urls(|url| self.url_rewriter.rewrite(tag, Some(attr), url, rel))?;
            return Ok(set.to_string());
        }

        Ok(self
            .url_rewriter
            .rewrite(tag, Some(attr), value, rel)?
            .unwrap_or_else(|| value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::injection::{ClientConfig, InjectionPoints};
    use crate::ruleset::Ruleset;
    use crate::url_rewriter::GatewayRoutes;

    fn factory(injection: InjectionPoints) -> TagFactory {
        let url_rewriter = UrlRewriter::new(
            Arc::new(Ruleset::default()),
            "http://example.com/page",
            "https://gateway.example.org/static/",
            Arc::new(GatewayRoutes::new("https://gateway.example.org")),
            vec![],
        )
        .unwrap();
        TagFactory::new(url_rewriter, injection)
    }

    fn serialize(factory: &mut TagFactory, events: Vec<ParseEvent>) -> String {
        let mut buffer = StreamingBuffer::new(1);
        for event in events {
            factory.handle_event(event, &mut buffer).unwrap();
        }
        let bytes: Vec<u8> = buffer.drain().flatten().collect();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_rewrites_interesting_attribute() {
        let mut factory = factory(InjectionPoints::none());
        let out = serialize(
            &mut factory,
            vec![ParseEvent::StartTag {
                name: "img".to_string(),
                attrs: vec![("src".to_string(), Some("pic.png".to_string()))],
            }],
        );
        assert_eq!(out, "<img src=\"http://example.com/pic.png\">");
    }

    #[test]
    fn test_leaves_uninteresting_attribute_alone() {
        let mut factory = factory(InjectionPoints::none());
        let out = serialize(
            &mut factory,
            vec![ParseEvent::StartTag {
                name: "div".to_string(),
                attrs: vec![("data-url".to_string(), Some("/keep-me".to_string()))],
            }],
        );
        assert_eq!(out, "<div data-url=\"/keep-me\">");
    }

    #[test]
    fn test_srcset_candidates_rewritten_independently() {
        let mut factory = factory(InjectionPoints::none());
        let out = serialize(
            &mut factory,
            vec![ParseEvent::StartTag {
                name: "img".to_string(),
                attrs: vec![(
                    "srcset".to_string(),
                    Some("a.png 1x, b.png 2x".to_string()),
                )],
            }],
        );
        assert_eq!(
            out,
            "<img srcset=\"http://example.com/a.png 1x, http://example.com/b.png 2x\">"
        );
    }

    #[test]
    fn test_rel_drives_classification() {
        let mut factory = factory(InjectionPoints::none());
        let out = serialize(
            &mut factory,
            vec![ParseEvent::StartTag {
                name: "link".to_string(),
                attrs: vec![
                    ("rel".to_string(), Some("stylesheet".to_string())),
                    ("href".to_string(), Some("/main.css".to_string())),
                ],
            }],
        );
        assert!(out.contains("https://gateway.example.org/css?"));
    }

    #[test]
    fn test_head_injection_points() {
        let injection = InjectionPoints {
            head_top: "[TOP]".to_string(),
            head_bottom: "[BOTTOM]".to_string(),
        };
        let mut factory = factory(injection);
        let out = serialize(
            &mut factory,
            vec![
                ParseEvent::StartTag {
                    name: "head".to_string(),
                    attrs: vec![],
                },
                ParseEvent::Text {
                    data: "<title>T</title>".to_string(),
                },
                ParseEvent::EndTag {
                    name: "head".to_string(),
                },
            ],
        );
        assert_eq!(out, "<head>[TOP]<title>T</title>[BOTTOM]</head>");
    }

    #[test]
    fn test_void_element_end_tag_suppressed() {
        let mut factory = factory(InjectionPoints::none());
        let out = serialize(
            &mut factory,
            vec![
                ParseEvent::EndTag {
                    name: "img".to_string(),
                },
                ParseEvent::EndTag {
                    name: "p".to_string(),
                },
            ],
        );
        assert_eq!(out, "</p>");
    }

    #[test]
    fn test_attribute_value_escaped() {
        let mut factory = factory(InjectionPoints::none());
        let out = serialize(
            &mut factory,
            vec![ParseEvent::StartTag {
                name: "div".to_string(),
                attrs: vec![("title".to_string(), Some("a \"b\" <c>".to_string()))],
            }],
        );
        assert_eq!(out, "<div title=\"a &quot;b&quot; &lt;c&gt;\">");
    }

    #[test]
    fn test_comment_and_doctype_serialization() {
        let mut factory = factory(InjectionPoints::none());
        let out = serialize(
            &mut factory,
            vec![
                ParseEvent::Doctype {
                    name: "html".to_string(),
                    public_id: None,
                    system_id: None,
                },
                ParseEvent::Comment {
                    data: " hi ".to_string(),
                },
            ],
        );
        assert_eq!(out, "<!DOCTYPE html><!-- hi -->");
    }

    #[test]
    fn test_bare_attribute_serialized_without_value() {
        let mut factory = factory(InjectionPoints::none());
        let out = serialize(
            &mut factory,
            vec![ParseEvent::SelfClosingTag {
                name: "input".to_string(),
                attrs: vec![("disabled".to_string(), None)],
            }],
        );
        assert_eq!(out, "<input disabled />");
    }

    // Keep the client config import exercised alongside the factory tests
    #[test]
    fn test_full_injection_round() {
        let url_rewriter = UrlRewriter::new(
            Arc::new(Ruleset::default()),
            "http://example.com/page",
            "https://gateway.example.org/static/",
            Arc::new(GatewayRoutes::new("https://gateway.example.org")),
            vec![],
        )
        .unwrap();
        let injection = InjectionPoints::for_document(&url_rewriter, &ClientConfig::default());
        let mut factory = TagFactory::new(url_rewriter, injection);

        let out = serialize(
            &mut factory,
            vec![
                ParseEvent::StartTag {
                    name: "head".to_string(),
                    attrs: vec![],
                },
                ParseEvent::EndTag {
                    name: "head".to_string(),
                },
            ],
        );
        let canonical = out.find("rel=\"canonical\"").unwrap();
        let base = out.find("<base ").unwrap();
        let script = out.find("<script").unwrap();
        assert!(canonical < base && base < script);
    }
}
