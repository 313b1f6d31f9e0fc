//! CSS rewriting
//!
//! Stylesheets reference other resources through `url(...)` tokens. Only
//! unquoted, root-relative references are touched: they are the ones that
//! break outright when a stylesheet is served from the gateway origin, and
//! rewriting them to absolute URLs against the source document fixes them
//! without parsing CSS properly.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::url_rewriter::UrlRewriter;

fn url_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)url\(([^)]+)\)").expect("static regex"))
}

/// Rewrites `url(...)` references in stylesheet text
#[derive(Debug)]
pub struct CssRewriter {
    url_rewriter: UrlRewriter,
}

impl CssRewriter {
    /// Create a rewriter for one stylesheet
    pub fn new(url_rewriter: UrlRewriter) -> Self {
        Self { url_rewriter }
    }

    /// Rewrite a complete stylesheet. Infallible: references that cannot be
    /// improved pass through unchanged.
    #[instrument(skip_all, fields(len = css.len()))]
    pub fn rewrite(&self, css: &str) -> String {
        url_token_regex()
            .replace_all(css, |caps: &regex::Captures<'_>| {
                let inner = caps[1].trim();

                // Quoted references are left alone, as are relative and
                // already-absolute ones
                if inner.starts_with('"') || inner.starts_with('\'') || !inner.starts_with('/') {
                    return caps[0].to_string();
                }

                let absolute = self.url_rewriter.make_absolute(inner);
                debug!(from = inner, to = %absolute, "rewrote stylesheet reference");
                format!("url({absolute})")
            })
            .into_owned()
    }
}
