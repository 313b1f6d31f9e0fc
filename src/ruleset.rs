//! URL classification rules
//!
//! Every URL reference found in a document is classified by an ordered,
//! immutable [`Ruleset`]: a first-match-wins table mapping
//! `(tag, attribute, extension, relation)` patterns to a [`RewriteAction`].
//! The table is loaded once at process start and shared read-only; it must
//! terminate in an all-wildcard catch-all so classification is total.
//!
//! Rules are matched strictly in declaration order. More specific rules must
//! be declared earlier: an extension rule placed after a tag rule loses to
//! the tag rule even when the extension looks like the better match. This is
//! deliberate (predictable, auditable ordering) and must be preserved.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RewriteError};

/// The classification outcome for one URL reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewriteAction {
    /// Leave the reference exactly as found
    None,
    /// Resolve the URL against the document base
    MakeAbsolute,
    /// Route through the gateway's transparent static proxy, unchanged
    ProxyStatic,
    /// Route through the gateway's HTML rewriting view
    RewriteHtml,
    /// Route through the gateway's CSS rewriting view
    RewriteCss,
    /// Route through the gateway's JS rewriting view
    RewriteJs,
}

/// One field of a rule: always matches, matches one value, or matches a set
#[derive(Debug, Clone, Default)]
pub enum Pattern {
    /// Matches anything, including an absent value
    #[default]
    Wildcard,
    /// Matches exactly one value
    Exact(String),
    /// Matches by set membership
    Set(HashSet<String>),
}

impl Pattern {
    /// Build a set pattern from string values
    pub fn any_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Set(values.into_iter().map(Into::into).collect())
    }

    fn matches(&self, value: Option<&str>) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Exact(expected) => value == Some(expected.as_str()),
            Self::Set(expected) => value.is_some_and(|v| expected.contains(v)),
        }
    }

    fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }
}

impl From<&str> for Pattern {
    fn from(value: &str) -> Self {
        Self::Exact(value.to_string())
    }
}

/// A single classification rule; a candidate matches only if every field does
#[derive(Debug, Clone, Default)]
pub struct Rule {
    tag: Pattern,
    attr: Pattern,
    ext: Pattern,
    rel: Pattern,
}

impl Rule {
    /// An all-wildcard rule (the required catch-all shape)
    pub fn any() -> Self {
        Self::default()
    }

    /// Constrain the tag name
    pub fn tag(mut self, pattern: impl Into<Pattern>) -> Self {
        self.tag = pattern.into();
        self
    }

    /// Constrain the attribute name
    pub fn attr(mut self, pattern: impl Into<Pattern>) -> Self {
        self.attr = pattern.into();
        self
    }

    /// Constrain the URL extension
    pub fn ext(mut self, pattern: impl Into<Pattern>) -> Self {
        self.ext = pattern.into();
        self
    }

    /// Constrain the `rel` relation
    pub fn rel(mut self, pattern: impl Into<Pattern>) -> Self {
        self.rel = pattern.into();
        self
    }

    /// Whether the rule matches the given candidate
    pub fn applies(
        &self,
        tag: Option<&str>,
        attr: Option<&str>,
        ext: Option<&str>,
        rel: Option<&str>,
    ) -> bool {
        self.tag.matches(tag)
            && self.attr.matches(attr)
            && self.ext.matches(ext)
            && self.rel.matches(rel)
    }

    fn is_catch_all(&self) -> bool {
        self.tag.is_wildcard()
            && self.attr.is_wildcard()
            && self.ext.is_wildcard()
            && self.rel.is_wildcard()
    }
}

/// Ordered, immutable classification table consulted first-match-wins
#[derive(Debug, Clone)]
pub struct Ruleset {
    rules: Vec<(Rule, RewriteAction)>,
}

impl Ruleset {
    /// Build a ruleset, validating that the final rule is the catch-all.
    ///
    /// A missing catch-all is a configuration error caught here at load time
    /// rather than surfacing as a runtime classification miss.
    pub fn new(rules: Vec<(Rule, RewriteAction)>) -> Result<Self> {
        match rules.last() {
            Some((rule, _)) if rule.is_catch_all() => Ok(Self { rules }),
            _ => Err(RewriteError::MissingCatchAll),
        }
    }

    /// Load a ruleset from a declarative JSON file.
    ///
    /// The expected shape is
    /// `{"rules": [{"match": {"tag": "a", "attr": "href"}, "action": "REWRITE_HTML"}, ...]}`
    /// where each `match` field is a string, a list of strings, or absent
    /// (wildcard). The file must end with a catch-all entry.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| RewriteError::RulesetLoad {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::from_json(&raw).map_err(|err| match err {
            RewriteError::MissingCatchAll => RewriteError::MissingCatchAll,
            other => RewriteError::RulesetLoad {
                path: path.display().to_string(),
                message: other.to_string(),
            },
        })
    }

    /// Parse a ruleset from JSON text
    pub fn from_json(raw: &str) -> Result<Self> {
        let file: RulesetFile = serde_json::from_str(raw).map_err(|err| {
            RewriteError::RulesetLoad {
                path: "<inline>".to_string(),
                message: err.to_string(),
            }
        })?;

        let rules = file
            .rules
            .into_iter()
            .map(|entry| {
                let rule = Rule {
                    tag: entry.matcher.tag.map(Pattern::from).unwrap_or_default(),
                    attr: entry.matcher.attr.map(Pattern::from).unwrap_or_default(),
                    ext: entry.matcher.ext.map(Pattern::from).unwrap_or_default(),
                    rel: entry.matcher.rel.map(Pattern::from).unwrap_or_default(),
                };
                (rule, entry.action)
            })
            .collect();

        Self::new(rules)
    }

    /// Classify one URL reference.
    ///
    /// The extension is derived from `url` by stripping any query string and
    /// taking the text after the last `.` (absent if there is none). Rules
    /// are consulted in order; the first full match wins. With a validated
    /// ruleset this cannot miss; a miss signals a corrupted configuration
    /// and is returned as a fatal error, never a silent fallback.
    pub fn action_for(
        &self,
        tag: &str,
        attribute: Option<&str>,
        url: &str,
        rel: Option<&str>,
    ) -> Result<RewriteAction> {
        let ext = extension_of(url);

        for (rule, action) in &self.rules {
            if rule.applies(Some(tag), attribute, ext, rel) {
                debug!(tag, attribute, url, action = ?action, "classified URL reference");
                return Ok(*action);
            }
        }

        Err(RewriteError::NoRuleMatched {
            tag: tag.to_string(),
            attribute: attribute.unwrap_or_default().to_string(),
            url: url.to_string(),
        })
    }

    /// Number of rules in the table
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table is empty (never true for a validated ruleset)
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for Ruleset {
    /// The built-in production ruleset.
    ///
    /// Anchors go through HTML rewriting, stylesheets and scripts through
    /// their respective rewriting views, fonts through the static proxy,
    /// images and forms are made absolute, and everything else falls through
    /// to the absolute-URL catch-all.
    fn default() -> Self {
        let font_exts = Pattern::any_of(["woff", "woff2", "ttf", "eot"]);
        let image_exts = Pattern::any_of(["png", "jpg", "jpeg", "gif", "svg"]);

        let rules = vec![
            // Forms submit back through the origin
            (Rule::any().tag("form"), RewriteAction::MakeAbsolute),
            (Rule::any().ext(font_exts), RewriteAction::ProxyStatic),
            // Links
            (Rule::any().tag("a").attr("href"), RewriteAction::RewriteHtml),
            (
                Rule::any().tag("link").rel("stylesheet"),
                RewriteAction::RewriteCss,
            ),
            (
                Rule::any().tag("link").rel("manifest"),
                RewriteAction::ProxyStatic,
            ),
            (
                Rule::any().tag("link").attr("href").ext("css"),
                RewriteAction::RewriteCss,
            ),
            // Javascript
            (
                Rule::any().tag("script").attr("src"),
                RewriteAction::RewriteJs,
            ),
            (Rule::any().ext("js"), RewriteAction::RewriteJs),
            // Bare URLs found inside JS source
            (Rule::any().tag("external-js"), RewriteAction::ProxyStatic),
            // Images
            (Rule::any().ext(image_exts), RewriteAction::MakeAbsolute),
            (
                Rule::any()
                    .tag(Pattern::any_of(["img", "image"]))
                    .attr(Pattern::any_of(["src", "srcset", "data-src"])),
                RewriteAction::MakeAbsolute,
            ),
            (
                Rule::any().tag("input").attr("src"),
                RewriteAction::MakeAbsolute,
            ),
            // Catch-all: guarantees classification is total
            (Rule::any(), RewriteAction::MakeAbsolute),
        ];

        // The built-in table always carries its catch-all
        Self { rules }
    }
}

#[derive(Deserialize)]
struct RulesetFile {
    rules: Vec<RuleEntry>,
}

#[derive(Deserialize)]
struct RuleEntry {
    #[serde(default, rename = "match")]
    matcher: MatchSpec,
    action: RewriteAction,
}

#[derive(Deserialize, Default)]
struct MatchSpec {
    tag: Option<PatternSpec>,
    attr: Option<PatternSpec>,
    ext: Option<PatternSpec>,
    rel: Option<PatternSpec>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PatternSpec {
    One(String),
    Many(Vec<String>),
}

impl From<PatternSpec> for Pattern {
    fn from(spec: PatternSpec) -> Self {
        match spec {
            PatternSpec::One(value) => Pattern::Exact(value),
            PatternSpec::Many(values) => Pattern::any_of(values),
        }
    }
}

/// Derive a URL's extension: strip any query string, then take the text
/// after the last `.` if present.
pub fn extension_of(url: &str) -> Option<&str> {
    let path = match url.split_once('?') {
        Some((path, _)) => path,
        None => url,
    };
    path.rsplit_once('.').map(|(_, ext)| ext)
}

/// Whether `(tag, attribute)` is in the fixed interesting-attributes table.
///
/// Streaming backends only consult the URL rewriter for these pairs; the
/// materializing backend checks its generic traversal against this table so
/// the two code paths cannot silently diverge.
pub fn is_interesting_attribute(tag: &str, attr: &str) -> bool {
    match tag {
        "a" => matches!(attr, "href" | "src"),
        "link" => attr == "href",
        "img" | "image" => matches!(attr, "src" | "srcset" | "data-src"),
        "form" => attr == "action",
        "iframe" | "script" | "input" => attr == "src",
        "blockquote" => attr == "cite",
        "head" => attr == "profile",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("http://x/y.png"), Some("png"));
        assert_eq!(extension_of("http://x/y.png?a=1.2"), Some("png"));
        assert_eq!(extension_of("plain"), None);
    }

    #[test]
    fn test_default_ruleset_is_total() {
        let ruleset = Ruleset::default();
        // Arbitrary junk still classifies via the catch-all
        let action = ruleset
            .action_for("blink", Some("whatever"), "§§§", None)
            .unwrap();
        assert_eq!(action, RewriteAction::MakeAbsolute);
    }

    #[test]
    fn test_first_match_wins_over_later_extension_rule() {
        // An anchor to a .png: the a:href rule is declared before the image
        // extension rule, so the anchor still goes to HTML rewriting.
        let ruleset = Ruleset::new(vec![
            (Rule::any().tag("a").attr("href"), RewriteAction::RewriteHtml),
            (Rule::any().ext("png"), RewriteAction::MakeAbsolute),
            (Rule::any(), RewriteAction::MakeAbsolute),
        ])
        .unwrap();

        let action = ruleset
            .action_for("a", Some("href"), "http://x/y.png", None)
            .unwrap();
        assert_eq!(action, RewriteAction::RewriteHtml);
    }

    #[test]
    fn test_set_membership_matching() {
        let ruleset = Ruleset::default();
        let action = ruleset
            .action_for("img", Some("srcset"), "pic", None)
            .unwrap();
        assert_eq!(action, RewriteAction::MakeAbsolute);

        let action = ruleset
            .action_for("link", Some("href"), "style", Some("stylesheet"))
            .unwrap();
        assert_eq!(action, RewriteAction::RewriteCss);
    }

    #[test]
    fn test_font_extension_proxied_statically() {
        let ruleset = Ruleset::default();
        let action = ruleset
            .action_for("link", Some("href"), "http://x/f.woff2", None)
            .unwrap();
        assert_eq!(action, RewriteAction::ProxyStatic);
    }

    #[test]
    fn test_missing_catch_all_rejected_at_load() {
        let result = Ruleset::new(vec![(
            Rule::any().tag("a"),
            RewriteAction::RewriteHtml,
        )]);
        assert!(matches!(result, Err(RewriteError::MissingCatchAll)));
    }

    #[test]
    fn test_from_json() {
        let ruleset = Ruleset::from_json(
            r#"{
                "rules": [
                    {"match": {"tag": "a", "attr": "href"}, "action": "REWRITE_HTML"},
                    {"match": {"ext": ["woff", "woff2"]}, "action": "PROXY_STATIC"},
                    {"match": {}, "action": "MAKE_ABSOLUTE"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(ruleset.len(), 3);
        assert_eq!(
            ruleset.action_for("a", Some("href"), "/x", None).unwrap(),
            RewriteAction::RewriteHtml
        );
        assert_eq!(
            ruleset.action_for("p", None, "/f.woff", None).unwrap(),
            RewriteAction::ProxyStatic
        );
    }

    #[test]
    fn test_from_json_requires_catch_all() {
        let result = Ruleset::from_json(
            r#"{"rules": [{"match": {"tag": "a"}, "action": "REWRITE_HTML"}]}"#,
        );
        assert!(matches!(result, Err(RewriteError::MissingCatchAll)));
    }

    #[test]
    fn test_interesting_attributes() {
        assert!(is_interesting_attribute("a", "href"));
        assert!(is_interesting_attribute("img", "data-src"));
        assert!(is_interesting_attribute("form", "action"));
        assert!(!is_interesting_attribute("div", "href"));
        assert!(!is_interesting_attribute("img", "alt"));
    }
}
