//! JavaScript rewriting
//!
//! Scripts served through the gateway run inside a window proxy so that
//! reads of `window` and `location` see the original document's identity
//! rather than the gateway's. `window.location` is a LegacyUnforgeable
//! property that cannot be patched from client-side JS, so each script is
//! wrapped in an IIFE whose `window` and `location` parameters shadow the
//! real ones with the proxy.
//!
//! Wrapping changes top-level `var` declarations from globals into function
//! locals, which breaks scripts that share state through them. A crude scan
//! of the source text finds likely top-level names and re-exports them after
//! the IIFE; the length restriction filters out most minified inner
//! variables.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::url_rewriter::UrlRewriter;

/// Global name of the window proxy installed by the embedded client
const WINDOW_PROXY: &str = "gatewayWindowProxy";

fn quoted_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)["'](https?://[^"']+)["']"#).expect("static regex"))
}

fn var_decl_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"var ([a-zA-Z0-9_$]{3,})").expect("static regex"))
}

/// Rewrites script content for execution under the gateway
#[derive(Debug)]
pub struct JsRewriter {
    url_rewriter: UrlRewriter,
}

impl JsRewriter {
    /// Create a rewriter for one script
    pub fn new(url_rewriter: UrlRewriter) -> Self {
        Self { url_rewriter }
    }

    /// Rewrite a complete script: scan for rewritable URL literals and wrap
    /// the content in the window-proxy IIFE.
    #[instrument(skip_all, fields(len = js.len()))]
    pub fn rewrite(&self, js: &str) -> Result<String> {
        // Detection only. Blind substitution breaks scripts that compare or
        // slice these literals, so matches are logged until the client can
        // intercept the resulting fetches.
        // TODO: substitute the rewritten URL once interception lands
        for caps in quoted_url_regex().captures_iter(js) {
            let url = &caps[1];
            if let Some(new_url) = self.url_rewriter.rewrite("external-js", None, url, None)? {
                if new_url != url {
                    debug!(url, %new_url, "rewritable script URL literal");
                }
            }
        }

        Ok(wrap_in_proxy_iife(js))
    }
}

/// Likely top-level `var` names, in source order
fn exported_vars(js: &str) -> Vec<&str> {
    var_decl_regex()
        .captures_iter(js)
        .map(|caps| caps.get(1).map_or("", |m| m.as_str()))
        .collect()
}

fn wrap_in_proxy_iife(js: &str) -> String {
    let names = exported_vars(js);

    let captures = names
        .iter()
        .map(|name| format!("exportedVars['{name}']=typeof {name} !== 'undefined' ? {name} : undefined"))
        .collect::<Vec<_>>()
        .join(";");

    let re_exports = names
        .iter()
        .map(|name| format!("var {name}; if (exportedVars['{name}']) {{ {name} = exportedVars['{name}'] }}"))
        .collect::<Vec<_>>()
        .join("");

    format!(
        "\nvar exportedVars = {{}};\n(function (window, location) {{\n{js};{captures}\n}}).call({proxy}, {proxy}, {proxy}.location);\n{re_exports}",
        proxy = WINDOW_PROXY,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ruleset::Ruleset;
    use crate::url_rewriter::GatewayRoutes;

    fn rewriter() -> JsRewriter {
        let url_rewriter = UrlRewriter::new(
            Arc::new(Ruleset::default()),
            "http://example.com/app.js",
            "https://gateway.example.org/static/",
            Arc::new(GatewayRoutes::new("https://gateway.example.org")),
            vec![],
        )
        .unwrap();
        JsRewriter::new(url_rewriter)
    }

    #[test]
    fn test_wraps_content_in_iife() {
        let out = rewriter().rewrite("doSomething();").unwrap();
        assert!(out.contains("(function (window, location) {"));
        assert!(out.contains("doSomething();"));
        assert!(out.contains(
            ").call(gatewayWindowProxy, gatewayWindowProxy, gatewayWindowProxy.location);"
        ));
    }

    #[test]
    fn test_top_level_vars_re_exported() {
        let out = rewriter().rewrite("var appState = {};").unwrap();
        assert!(out.contains("exportedVars['appState']"));
        assert!(out.contains("var appState; if (exportedVars['appState'])"));
    }

    #[test]
    fn test_short_var_names_not_exported() {
        // Minified inner variables get short names; the scan skips them
        let out = rewriter().rewrite("var ab = 1;").unwrap();
        assert!(!out.contains("exportedVars['ab']"));
    }

    #[test]
    fn test_url_literals_not_substituted() {
        let src = "fetch(\"http://example.com/api\");";
        let out = rewriter().rewrite(src).unwrap();
        assert!(out.contains(src));
    }
}
