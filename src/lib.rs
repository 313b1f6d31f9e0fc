//! Annogate - Document Rewriting & URL Classification Engine
//!
//! This crate is the rewriting core of an annotation content gateway: it
//! takes third-party web documents, rewrites the URLs they reference so
//! navigation and resource loading stay inside the gateway, and injects the
//! annotation client into every HTML page that passes through.
//!
//! # Features
//!
//! - **URL Classification**: Ordered first-match-wins ruleset mapping each
//!   `(tag, attribute, url, rel)` reference to a rewrite action
//! - **URL Construction**: Absolute resolution against the document base,
//!   transparent static proxying, and gateway view-endpoint routing
//! - **Streaming HTML Rewriting**: Incremental tokenizers that rewrite
//!   attributes chunk-by-chunk with bounded memory
//! - **Materializing HTML Rewriting**: Whole-document tree backend for
//!   structure-sensitive rewrites
//! - **Client Injection**: Canonical link, base element, and embed script
//!   inserted into `<head>`
//! - **CSS & JS Rewriting**: `url(...)` reference fixing and window-proxy
//!   IIFE wrapping for scripts served through the gateway
//! - **Backpressure**: Output chunks are produced only as the consumer
//!   pulls, pacing upstream reads
//!
//! # Architecture
//!
//! ```text
//! Fetched Document ──▶ RewriterFactory ──▶ content-type dispatch
//!                            │
//!          ┌─────────────────┼──────────────────┐
//!          ▼                 ▼                  ▼
//!    HTML backends        CssRewriter       JsRewriter
//!    (tokenizer/sax/      url(...) fixes    IIFE wrapping
//!     null/materialize)
//!          │
//!          ▼
//!     ParseEvents ──▶ TagFactory ──▶ StreamingBuffer ──▶ output chunks
//!                      │      ▲
//!                      ▼      │
//!                 UrlRewriter─┘ (Ruleset classification)
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use annogate::{Document, GatewayRoutes, RewriterConfig, RewriterFactory, Ruleset};
//!
//! let config = RewriterConfig::new(
//!     Arc::new(Ruleset::default()),
//!     Arc::new(GatewayRoutes::new("https://gateway.example.org")),
//! );
//! let factory = RewriterFactory::new(config);
//!
//! let document = Document::buffered(
//!     "http://example.com/article",
//!     b"<html><head></head><body><a href=\"/next\">next</a></body></html>".to_vec(),
//! )
//! .with_header("Content-Type", "text/html");
//!
//! let output = factory.rewrite(document, vec![]).unwrap();
//! let html = String::from_utf8(output).unwrap();
//!
//! // Links now route back through the gateway's HTML view
//! assert!(html.contains("https://gateway.example.org/html?"));
//! // And the annotation client is injected into <head>
//! assert!(html.contains("<script"));
//! ```
//!
//! # URL Classification Example
//!
//! ```rust
//! use annogate::{RewriteAction, Ruleset};
//!
//! let ruleset = Ruleset::default();
//!
//! // Anchors navigate through the HTML view
//! assert_eq!(
//!     ruleset.action_for("a", Some("href"), "/page", None).unwrap(),
//!     RewriteAction::RewriteHtml,
//! );
//!
//! // Stylesheets go through the CSS view
//! assert_eq!(
//!     ruleset
//!         .action_for("link", Some("href"), "/main.css", Some("stylesheet"))
//!         .unwrap(),
//!     RewriteAction::RewriteCss,
//! );
//!
//! // Images just need to keep working from the original origin
//! assert_eq!(
//!     ruleset.action_for("img", Some("src"), "pic.png", None).unwrap(),
//!     RewriteAction::MakeAbsolute,
//! );
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod buffer;
pub mod css;
pub mod document;
pub mod error;
pub mod html;
pub mod injection;
pub mod js;
pub mod rewriter;
pub mod ruleset;
pub mod source_set;
pub mod url_rewriter;

// Re-exports for convenience
pub use buffer::{StreamingBuffer, DEFAULT_MIN_CHUNK_SIZE};
pub use css::CssRewriter;
pub use document::{ChunkResult, ChunkStream, Document, DocumentContent};
pub use error::{Result, RewriteError};
pub use injection::{ClientConfig, InjectionPoints};
pub use js::JsRewriter;
pub use rewriter::{Backend, RewriteStream, RewriterConfig, RewriterFactory};
pub use ruleset::{Pattern, RewriteAction, Rule, Ruleset};
pub use source_set::ImageSourceSet;
pub use url_rewriter::{GatewayRoutes, UrlRewriter, ViewEndpoint, ViewUrlBuilder};
