//! Materializing rewriter
//!
//! Parses the whole document into a tree, rewrites interesting attributes in
//! place, injects the client into `<head>`, and re-serializes. Unlike the
//! streaming backends this one sees the full document at once, which lets it
//! enforce structural requirements: a document with no `<head>` element is
//! rejected rather than passed through without the client.

use ego_tree::{NodeId, NodeRef, Tree};
use html5ever::tendril::StrTendril;
use html5ever::QualName;
use scraper::node::Node;
use scraper::Html;
use tracing::{error, instrument};

use crate::error::{Result, RewriteError};
use crate::injection::InjectionPoints;
use crate::ruleset::is_interesting_attribute;
use crate::source_set::ImageSourceSet;
use crate::url_rewriter::UrlRewriter;

/// Whole-document rewriter backed by a parsed tree
#[derive(Debug)]
pub struct MaterializingRewriter {
    url_rewriter: UrlRewriter,
    injection: InjectionPoints,
}

impl MaterializingRewriter {
    /// Create a rewriter for one document
    pub fn new(url_rewriter: UrlRewriter, injection: InjectionPoints) -> Self {
        Self {
            url_rewriter,
            injection,
        }
    }

    /// Rewrite a complete document, returning the serialized result.
    ///
    /// The output always carries an HTML5 doctype, whatever the input
    /// declared.
    #[instrument(skip_all, fields(len = document.len()))]
    pub fn rewrite(&self, document: &str) -> Result<String> {
        let mut html = Html::parse_document(document);

        let head_id = find_element(&html.tree, "head").ok_or(RewriteError::MissingHead)?;

        let edits = self.collect_edits(&html.tree);
        for (node_id, name, value) in edits {
            if let Some(mut node) = html.tree.get_mut(node_id) {
                if let Node::Element(el) = node.value() {
                    el.attrs.insert(name, StrTendril::from_slice(&value));
                }
            }
        }

        if !self.injection.head_top.is_empty() {
            let fragment = Html::parse_fragment(&self.injection.head_top);
            // Prepend in reverse so the fragment's own order survives
            for root in fragment_roots(&fragment).into_iter().rev() {
                copy_subtree(root, &mut html.tree, head_id, true);
            }
        }
        if !self.injection.head_bottom.is_empty() {
            let fragment = Html::parse_fragment(&self.injection.head_bottom);
            for root in fragment_roots(&fragment) {
                copy_subtree(root, &mut html.tree, head_id, false);
            }
        }

        Ok(format!("<!DOCTYPE html>{}", html.root_element().html()))
    }

    /// Walk the tree and decide every attribute rewrite up front; mutation
    /// happens afterwards because the walk borrows the tree.
    fn collect_edits(&self, tree: &Tree<Node>) -> Vec<(NodeId, QualName, String)> {
        let mut edits = Vec::new();

        for node in tree.root().descendants() {
            let Node::Element(el) = node.value() else {
                continue;
            };
            let tag = el.name();
            let rel = el.attr("rel");

            for (name, value) in el.attrs.iter() {
                let attr = name.local.as_ref();
                if !is_interesting_attribute(tag, attr) {
                    continue;
                }

                let rewritten = if attr == "srcset" {
                    ImageSourceSet::parse(value)
                        .try_map_urls(|url| self.url_rewriter.rewrite(tag, Some(attr), url, rel))
                        .map(|set| Some(set.to_string()))
                } else {
                    self.url_rewriter.rewrite(tag, Some(attr), value, rel)
                };

                match rewritten {
                    Ok(Some(new_value)) => edits.push((node.id(), name.clone(), new_value)),
                    Ok(None) => {}
                    Err(err) => {
                        error!(tag, attr, %err, "skipping unrewritable attribute");
                    }
                }
            }
        }

        edits
    }
}

/// First element with the given local name, if any
fn find_element(tree: &Tree<Node>, name: &str) -> Option<NodeId> {
    tree.root()
        .descendants()
        .find(|node| matches!(node.value(), Node::Element(el) if el.name() == name))
        .map(|node| node.id())
}

/// Content nodes of a parsed fragment.
///
/// The fragment parser wraps parsed content in a synthetic `html` element;
/// the interesting nodes are that element's children.
fn fragment_roots(fragment: &Html) -> Vec<NodeRef<'_, Node>> {
    let root = fragment.tree.root();
    let container = root
        .children()
        .find(|child| matches!(child.value(), Node::Element(el) if el.name() == "html"))
        .unwrap_or(root);
    container.children().collect()
}

/// Deep-copy a node and its subtree from the fragment tree into the
/// document tree. The two trees are distinct, so the source stays borrowed
/// immutably while the destination mutates.
fn copy_subtree(src: NodeRef<'_, Node>, tree: &mut Tree<Node>, parent: NodeId, prepend: bool) {
    let value = src.value().clone();
    let new_id = match tree.get_mut(parent) {
        Some(mut parent_mut) => {
            if prepend {
                parent_mut.prepend(value).id()
            } else {
                parent_mut.append(value).id()
            }
        }
        None => return,
    };

    for child in src.children() {
        copy_subtree(child, tree, new_id, false);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::injection::ClientConfig;
    use crate::ruleset::Ruleset;
    use crate::url_rewriter::GatewayRoutes;

    fn rewriter_for(doc_url: &str, injection: InjectionPoints) -> MaterializingRewriter {
        let url_rewriter = UrlRewriter::new(
            Arc::new(Ruleset::default()),
            doc_url,
            "https://gateway.example.org/static/",
            Arc::new(GatewayRoutes::new("https://gateway.example.org")),
            vec![],
        )
        .unwrap();
        MaterializingRewriter::new(url_rewriter, injection)
    }

    #[test]
    fn test_rewrites_attributes_in_tree() {
        let rewriter = rewriter_for("http://example.com/page", InjectionPoints::none());
        let out = rewriter
            .rewrite("<html><head></head><body><img src=\"pic.png\"><a href=\"/next\">n</a></body></html>")
            .unwrap();

        assert!(out.contains("src=\"http://example.com/pic.png\""));
        assert!(out.contains("https://gateway.example.org/html?"));
        assert!(out.contains("url=http%3A%2F%2Fexample.com%2Fnext"));
    }

    #[test]
    fn test_output_carries_html5_doctype() {
        let rewriter = rewriter_for("http://example.com/page", InjectionPoints::none());
        let out = rewriter
            .rewrite("<!DOCTYPE html PUBLIC \"x\"><html><head></head><body></body></html>")
            .unwrap();
        assert!(out.starts_with("<!DOCTYPE html><html"));
    }

    #[test]
    fn test_head_lookup() {
        // parse_document synthesizes a head; fragments genuinely lack one
        let document = Html::parse_document("<p>x</p>");
        assert!(find_element(&document.tree, "head").is_some());

        let fragment = Html::parse_fragment("<p>x</p>");
        assert!(find_element(&fragment.tree, "head").is_none());
    }

    #[test]
    fn test_injection_order_in_head() {
        let url_rewriter = UrlRewriter::new(
            Arc::new(Ruleset::default()),
            "http://example.com/page",
            "https://gateway.example.org/static/",
            Arc::new(GatewayRoutes::new("https://gateway.example.org")),
            vec![],
        )
        .unwrap();
        let injection = InjectionPoints::for_document(&url_rewriter, &ClientConfig::default());
        let rewriter = MaterializingRewriter::new(url_rewriter, injection);

        let out = rewriter
            .rewrite("<html><head><title>T</title></head><body></body></html>")
            .unwrap();

        let canonical = out.find("rel=\"canonical\"").unwrap();
        let base = out.find("<base").unwrap();
        let title = out.find("<title>").unwrap();
        let script = out.find("<script").unwrap();
        assert!(canonical < base && base < title && title < script);
    }

    #[test]
    fn test_srcset_rewritten_per_candidate() {
        let rewriter = rewriter_for("http://example.com/page", InjectionPoints::none());
        let out = rewriter
            .rewrite(
                "<html><head></head><body><img srcset=\"a.png 1x, b.png 2x\"></body></html>",
            )
            .unwrap();
        assert!(out.contains("http://example.com/a.png 1x"));
        assert!(out.contains("http://example.com/b.png 2x"));
    }
}
