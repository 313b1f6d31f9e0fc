//! Markup injection points
//!
//! Every rewritten HTML document gets auxiliary content injected at two fixed
//! locations: `head_top` (immediately after `<head>`) carries the canonical
//! link back to the real document, a `<base>` pointing at the gateway's
//! rewritten view of it, and a no-referrer meta; `head_bottom` (immediately
//! before `</head>`) carries the annotation client's embed script. The pair
//! is computed once per document and is immutable for the duration of one
//! rewrite.

use serde_json::json;

use crate::html::tag_factory::escape_attribute;
use crate::url_rewriter::UrlRewriter;

/// Embed URL used when none is configured
pub const DEFAULT_EMBED_URL: &str = "https://annotate.example.com/embed.js";

/// Configuration for the injected annotation client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// URL of the client's embed script
    pub embed_url: String,
    /// Client configuration blob, serialized into the page for the embed
    pub settings: serde_json::Value,
}

impl ClientConfig {
    /// Create a client configuration
    pub fn new(embed_url: impl Into<String>, settings: serde_json::Value) -> Self {
        Self {
            embed_url: embed_url.into(),
            settings,
        }
    }

    /// The script body that boots the annotation client inside the page.
    ///
    /// Also installs the window proxy that rewritten inline scripts are
    /// scoped against, so client-side code observes the original document
    /// location instead of the gateway's.
    pub fn embed_script(&self, doc_url: &str) -> String {
        let settings = &self.settings;
        let doc_url_json = json!(doc_url);
        let embed_url_json = json!(self.embed_url);

        format!(
            r#"window.annotatorConfig = {settings};
var gatewayWindowProxy = Object.create(window);
try {{
    Object.defineProperty(gatewayWindowProxy, "location", {{ value: new URL({doc_url_json}) }});
}} catch (e) {{
    gatewayWindowProxy.location = new URL({doc_url_json});
}}
window.gatewayWindowProxy = gatewayWindowProxy;
var gatewayEmbed = document.createElement("script");
gatewayEmbed.src = {embed_url_json};
gatewayEmbed.async = true;
document.head.appendChild(gatewayEmbed);"#
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            embed_url: std::env::var("ANNOGATE_EMBED_URL")
                .unwrap_or_else(|_| DEFAULT_EMBED_URL.to_string()),
            settings: json!({}),
        }
    }
}

/// The two fixed injection locations in the output markup
#[derive(Debug, Clone, Default)]
pub struct InjectionPoints {
    /// Inserted immediately after the serialized `<head>` start tag
    pub head_top: String,
    /// Inserted immediately before the serialized `</head>` end tag
    pub head_bottom: String,
}

impl InjectionPoints {
    /// Empty injection points (raw-copy backends, non-HTML content)
    pub fn none() -> Self {
        Self::default()
    }

    /// Compute the injection pair for one document.
    ///
    /// `head_top` records the real document URL as the canonical link so the
    /// annotation client anchors to the actual resource, then sets `<base>`
    /// to the gateway's rewritten-HTML URL to catch relative links that
    /// escape the rewriter.
    pub fn for_document(url_rewriter: &UrlRewriter, client: &ClientConfig) -> Self {
        let doc_url = url_rewriter.doc_url().as_str().to_string();
        let base_href = url_rewriter.rewrite_html(&doc_url);

        let head_top = format!(
            "\n<link rel=\"canonical\" href=\"{}\">\n<base href=\"{}\">\n\
             <meta name=\"referrer\" content=\"no-referrer\">\n",
            escape_attribute(&doc_url),
            escape_attribute(&base_href),
        );

        let head_bottom = format!(
            "\n<script type=\"text/javascript\">{}</script>\n",
            client.embed_script(&doc_url)
        );

        Self {
            head_top,
            head_bottom,
        }
    }
}
