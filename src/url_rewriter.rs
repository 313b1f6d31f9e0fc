//! Per-classification URL construction
//!
//! [`UrlRewriter`] turns a classified URL reference into its final output
//! form: resolved against the document base, prefixed for the transparent
//! static proxy, or routed to one of the gateway's rewriting view endpoints
//! carrying the absolute target URL and the request's pass-through
//! parameters. One rewriter is built per document and owned by that rewrite.

use std::sync::Arc;

use tracing::trace;
use url::Url;

use crate::error::{Result, RewriteError};
use crate::ruleset::{RewriteAction, Ruleset};

/// The gateway view endpoints a rewritten URL can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEndpoint {
    /// The HTML rewriting view
    Html,
    /// The CSS rewriting view
    Css,
    /// The JS rewriting view
    Js,
}

impl ViewEndpoint {
    /// The endpoint's route name
    pub fn name(self) -> &'static str {
        match self {
            Self::Html => "view_html",
            Self::Css => "view_css",
            Self::Js => "view_js",
        }
    }
}

/// Builds absolute URLs to the gateway's view endpoints.
///
/// Supplied by the surrounding request-routing layer; the engine only knows
/// endpoint names and query parameters.
pub trait ViewUrlBuilder {
    /// Build the absolute URL for `endpoint` carrying `query`
    fn build(&self, endpoint: ViewEndpoint, query: &[(String, String)]) -> String;
}

/// A plain path-per-endpoint [`ViewUrlBuilder`] rooted at a gateway base URL.
///
/// Produces `{base}/html?url=...`, `{base}/css?url=...`, `{base}/js?url=...`.
#[derive(Debug, Clone)]
pub struct GatewayRoutes {
    base: String,
}

impl GatewayRoutes {
    /// Create routes rooted at `base` (trailing slashes are ignored)
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }
}

impl ViewUrlBuilder for GatewayRoutes {
    fn build(&self, endpoint: ViewEndpoint, query: &[(String, String)]) -> String {
        let path = match endpoint {
            ViewEndpoint::Html => "html",
            ViewEndpoint::Css => "css",
            ViewEndpoint::Js => "js",
        };
        let query_string = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish();
        format!("{}/{}?{}", self.base, path, query_string)
    }
}

/// Constructs output URLs for classified references within one document
#[derive(Clone)]
pub struct UrlRewriter {
    ruleset: Arc<Ruleset>,
    doc_url: Url,
    static_prefix: String,
    routes: Arc<dyn ViewUrlBuilder + Send + Sync>,
    params: Vec<(String, String)>,
}

impl UrlRewriter {
    /// Build a rewriter for one document.
    ///
    /// `static_prefix` is the gateway's transparent-proxy URL prefix;
    /// `params` are the current request's pass-through query parameters,
    /// carried onto every view-endpoint URL this rewriter produces.
    pub fn new(
        ruleset: Arc<Ruleset>,
        doc_url: &str,
        static_prefix: impl Into<String>,
        routes: Arc<dyn ViewUrlBuilder + Send + Sync>,
        params: Vec<(String, String)>,
    ) -> Result<Self> {
        let doc_url = Url::parse(doc_url).map_err(|err| RewriteError::InvalidDocumentUrl {
            url: doc_url.to_string(),
            message: err.to_string(),
        })?;

        Ok(Self {
            ruleset,
            doc_url,
            static_prefix: static_prefix.into(),
            routes,
            params,
        })
    }

    /// The document URL this rewriter resolves against
    pub fn doc_url(&self) -> &Url {
        &self.doc_url
    }

    /// Whether the gateway can proxy this URL at all.
    ///
    /// Only `http(s)` content can be fetched and re-served; `data:`, `blob:`,
    /// `mailto:` and friends are left alone.
    pub fn can_proxy(url: &str) -> bool {
        url.starts_with("http:") || url.starts_with("https:")
    }

    /// Resolve `url` against the document base.
    ///
    /// Protocol-relative URLs (`//host/path`) take the document's scheme.
    /// Already-absolute `http(s)` URLs come back unchanged; an unresolvable
    /// URL is returned as-is rather than failing the document.
    pub fn make_absolute(&self, url: &str) -> String {
        if url.starts_with("//") {
            return format!("{}:{}", self.doc_url.scheme(), url);
        }

        match self.doc_url.join(url) {
            Ok(joined) => joined.to_string(),
            Err(_) => url.to_string(),
        }
    }

    /// Route `url` through the gateway's transparent static proxy
    pub fn proxy_static(&self, url: &str) -> String {
        format!("{}{}", self.static_prefix, self.make_absolute(url))
    }

    /// Route `url` through the HTML rewriting view
    pub fn rewrite_html(&self, url: &str) -> String {
        self.view_endpoint(ViewEndpoint::Html, url)
    }

    /// Route `url` through the CSS rewriting view
    pub fn rewrite_css(&self, url: &str) -> String {
        self.view_endpoint(ViewEndpoint::Css, url)
    }

    /// Route `url` through the JS rewriting view
    pub fn rewrite_js(&self, url: &str) -> String {
        self.view_endpoint(ViewEndpoint::Js, url)
    }

    /// Classify one reference and construct its output URL.
    ///
    /// Returns `Ok(None)` when the classification is [`RewriteAction::None`],
    /// meaning the caller must leave the original text untouched. A
    /// classification miss (catch-all missing from the ruleset) is fatal.
    pub fn rewrite(
        &self,
        tag: &str,
        attribute: Option<&str>,
        url: &str,
        rel: Option<&str>,
    ) -> Result<Option<String>> {
        let action = self.ruleset.action_for(tag, attribute, url, rel)?;

        let rewritten = match action {
            RewriteAction::None => None,
            RewriteAction::MakeAbsolute => Some(self.make_absolute(url)),
            RewriteAction::ProxyStatic => Some(self.proxy_static(url)),
            RewriteAction::RewriteHtml => Some(self.rewrite_html(url)),
            RewriteAction::RewriteCss => Some(self.rewrite_css(url)),
            RewriteAction::RewriteJs => Some(self.rewrite_js(url)),
        };

        trace!(tag, attribute, url, rewritten = ?rewritten, "rewrote URL");
        Ok(rewritten)
    }

    /// Resolve to absolute, then build the view-endpoint URL if the scheme
    /// is proxyable; otherwise degrade to the absolute URL.
    fn view_endpoint(&self, endpoint: ViewEndpoint, url: &str) -> String {
        let absolute = self.make_absolute(url);

        if !Self::can_proxy(&absolute) {
            return absolute;
        }

        let mut query = self.params.clone();
        query.push(("url".to_string(), absolute));
        self.routes.build(endpoint, &query)
    }
}

impl std::fmt::Debug for UrlRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlRewriter")
            .field("doc_url", &self.doc_url.as_str())
            .field("static_prefix", &self.static_prefix)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter(doc_url: &str) -> UrlRewriter {
        UrlRewriter::new(
            Arc::new(Ruleset::default()),
            doc_url,
            "https://gateway.example.org/proxy/static/",
            Arc::new(GatewayRoutes::new("https://gateway.example.org")),
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_make_absolute_resolves_relative() {
        let rw = rewriter("http://example.com/dir/page");
        assert_eq!(rw.make_absolute("pic.png"), "http://example.com/dir/pic.png");
        assert_eq!(rw.make_absolute("/root.png"), "http://example.com/root.png");
    }

    #[test]
    fn test_make_absolute_is_idempotent() {
        let rw = rewriter("http://example.com/");
        let once = rw.make_absolute("http://example.com/a");
        let twice = rw.make_absolute(&once);
        assert_eq!(once, "http://example.com/a");
        assert_eq!(twice, "http://example.com/a");
    }

    #[test]
    fn test_make_absolute_protocol_relative_takes_doc_scheme() {
        let rw = rewriter("https://example.com/page");
        assert_eq!(
            rw.make_absolute("//cdn.example.com/x.js"),
            "https://cdn.example.com/x.js"
        );
    }

    #[test]
    fn test_proxy_static_prefixes_absolute_url() {
        let rw = rewriter("http://example.com/");
        assert_eq!(
            rw.proxy_static("/f.woff"),
            "https://gateway.example.org/proxy/static/http://example.com/f.woff"
        );
    }

    #[test]
    fn test_view_endpoint_carries_target_and_params() {
        let rw = UrlRewriter::new(
            Arc::new(Ruleset::default()),
            "http://example.com/page",
            "https://gateway.example.org/proxy/static/",
            Arc::new(GatewayRoutes::new("https://gateway.example.org")),
            vec![("gw.theme".to_string(), "dark".to_string())],
        )
        .unwrap();

        let built = rw.rewrite_html("/foo");
        assert!(built.starts_with("https://gateway.example.org/html?"));
        assert!(built.contains("gw.theme=dark"));
        assert!(built.contains("url=http%3A%2F%2Fexample.com%2Ffoo"));
    }

    #[test]
    fn test_non_http_scheme_degrades_to_absolute() {
        let rw = rewriter("http://example.com/");
        assert_eq!(
            rw.rewrite_html("mailto:someone@example.com"),
            "mailto:someone@example.com"
        );
        assert_eq!(
            rw.rewrite_css("data:text/css,body{}"),
            "data:text/css,body{}"
        );
    }

    #[test]
    fn test_rewrite_consults_ruleset() {
        let rw = rewriter("http://example.com/page");

        // a:href -> RewriteHtml
        let anchor = rw.rewrite("a", Some("href"), "/foo", None).unwrap().unwrap();
        assert!(anchor.contains("/html?"));

        // img:src -> MakeAbsolute
        let img = rw.rewrite("img", Some("src"), "pic.png", None).unwrap().unwrap();
        assert_eq!(img, "http://example.com/pic.png");
    }
}
