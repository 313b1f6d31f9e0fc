//! Rewriting pipeline facade
//!
//! Ties the pieces together: a [`RewriterFactory`] holds the shared
//! configuration (ruleset, routes, client) and turns each upstream
//! [`Document`] into a [`RewriteStream`] of output chunks, picking the
//! processing path from the document's content type. HTML streams through a
//! tokenizer backend and the tag factory; stylesheets and scripts are
//! rewritten whole; everything else passes through untouched.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use annogate::{
//!     Document, GatewayRoutes, RewriterConfig, RewriterFactory, Ruleset,
//! };
//!
//! let config = RewriterConfig::new(
//!     Arc::new(Ruleset::default()),
//!     Arc::new(GatewayRoutes::new("https://gateway.example.org")),
//! );
//! let factory = RewriterFactory::new(config);
//!
//! let document = Document::buffered(
//!     "http://example.com/page",
//!     b"<html><head></head><body><a href=\"/next\">next</a></body></html>".to_vec(),
//! )
//! .with_header("Content-Type", "text/html");
//!
//! let output = factory.rewrite(document, vec![]).unwrap();
//! assert!(String::from_utf8(output).unwrap().contains("/html?"));
//! ```

use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::buffer::{StreamingBuffer, DEFAULT_MIN_CHUNK_SIZE};
use crate::css::CssRewriter;
use crate::document::{ChunkResult, ChunkStream, Document};
use crate::error::{Result, RewriteError};
use crate::html::decode::StreamDecoder;
use crate::html::event::{EventStream, ParseEvent};
use crate::html::materialize::MaterializingRewriter;
use crate::html::null::NullTokenizer;
use crate::html::sax::SaxTokenizer;
use crate::html::tag_factory::TagFactory;
use crate::html::tokenizer::HtmlTokenizer;
use crate::injection::{ClientConfig, InjectionPoints};
use crate::js::JsRewriter;
use crate::ruleset::Ruleset;
use crate::url_rewriter::{UrlRewriter, ViewUrlBuilder};

/// HTML processing backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Hand-rolled streaming tokenizer (the default)
    #[default]
    Tokenizer,
    /// Streaming `html5ever` tokenizer
    Sax,
    /// Unparsed pass-through
    Null,
    /// Whole-document tree rewriter
    Materialize,
}

impl Backend {
    /// Resolve a backend from its configuration name
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "tokenizer" => Ok(Self::Tokenizer),
            "sax" => Ok(Self::Sax),
            "null" => Ok(Self::Null),
            "materialize" => Ok(Self::Materialize),
            other => Err(RewriteError::UnknownBackend(other.to_string())),
        }
    }

    /// The configuration name of this backend
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tokenizer => "tokenizer",
            Self::Sax => "sax",
            Self::Null => "null",
            Self::Materialize => "materialize",
        }
    }

    fn event_stream(&self) -> Box<dyn EventStream> {
        match self {
            Self::Tokenizer => Box::new(HtmlTokenizer::new()),
            Self::Sax => Box::new(SaxTokenizer::new()),
            Self::Null | Self::Materialize => Box::new(NullTokenizer::new()),
        }
    }
}

impl FromStr for Backend {
    type Err = RewriteError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// Configuration shared by every rewrite a factory performs
#[derive(Clone)]
pub struct RewriterConfig {
    /// URL classification rules
    pub ruleset: Arc<Ruleset>,
    /// Builder for gateway view URLs
    pub routes: Arc<dyn ViewUrlBuilder + Send + Sync>,
    /// Prefix for proxied static resources
    pub static_prefix: String,
    /// Client injection settings
    pub client: ClientConfig,
    /// HTML backend to use
    pub backend: Backend,
    /// Size used when re-slicing a buffered body into input chunks
    pub chunk_size_in: usize,
    /// Minimum output chunk size in bytes
    pub chunk_size_out: usize,
}

/// Default input re-slicing chunk size in bytes
pub const DEFAULT_CHUNK_SIZE_IN: usize = 8 * 1024;

impl RewriterConfig {
    /// Configuration with defaults for everything but the ruleset and routes
    pub fn new(ruleset: Arc<Ruleset>, routes: Arc<dyn ViewUrlBuilder + Send + Sync>) -> Self {
        Self {
            ruleset,
            routes,
            static_prefix: String::new(),
            client: ClientConfig::default(),
            backend: Backend::default(),
            chunk_size_in: DEFAULT_CHUNK_SIZE_IN,
            chunk_size_out: DEFAULT_MIN_CHUNK_SIZE,
        }
    }

    /// Set the static-resource proxy prefix
    pub fn with_static_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.static_prefix = prefix.into();
        self
    }

    /// Set the client injection configuration
    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    /// Select the HTML backend
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the input re-slicing chunk size
    pub fn with_chunk_size_in(mut self, size: usize) -> Self {
        self.chunk_size_in = size;
        self
    }

    /// Set the minimum output chunk size
    pub fn with_chunk_size_out(mut self, size: usize) -> Self {
        self.chunk_size_out = size;
        self
    }
}

impl std::fmt::Debug for RewriterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriterConfig")
            .field("static_prefix", &self.static_prefix)
            .field("backend", &self.backend)
            .field("chunk_size_in", &self.chunk_size_in)
            .field("chunk_size_out", &self.chunk_size_out)
            .finish_non_exhaustive()
    }
}

/// Output of a rewrite: an iterator of byte chunks.
///
/// Chunks are produced lazily from the input stream, so upstream reads are
/// paced by the consumer.
pub struct RewriteStream {
    inner: Box<dyn Iterator<Item = ChunkResult>>,
}

impl RewriteStream {
    fn new(inner: Box<dyn Iterator<Item = ChunkResult>>) -> Self {
        Self { inner }
    }

    fn once(bytes: Vec<u8>) -> Self {
        Self::new(Box::new(std::iter::once(Ok(bytes))))
    }

    /// Collect the whole stream into one byte vector
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for chunk in self {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

impl Iterator for RewriteStream {
    type Item = ChunkResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl std::fmt::Debug for RewriteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriteStream").finish_non_exhaustive()
    }
}

/// Creates per-document rewrites from shared configuration
#[derive(Debug, Clone)]
pub struct RewriterFactory {
    config: RewriterConfig,
}

impl RewriterFactory {
    /// Create a factory
    pub fn new(config: RewriterConfig) -> Self {
        Self { config }
    }

    /// Rewrite one upstream document, buffering the whole output.
    ///
    /// Convenience over [`streaming_rewrite`](Self::streaming_rewrite) for
    /// callers that need the complete body anyway.
    pub fn rewrite(&self, document: Document, params: Vec<(String, String)>) -> Result<Vec<u8>> {
        self.streaming_rewrite(document, params)?.into_bytes()
    }

    /// Rewrite one upstream document as a lazy chunk stream.
    ///
    /// `params` are carried onto every view URL the rewrite produces, so a
    /// reader's session context follows them across navigation.
    #[instrument(skip_all, fields(url = %document.url, backend = self.config.backend.name()))]
    pub fn streaming_rewrite(
        &self,
        document: Document,
        params: Vec<(String, String)>,
    ) -> Result<RewriteStream> {
        let url_rewriter = UrlRewriter::new(
            Arc::clone(&self.config.ruleset),
            &document.url,
            &self.config.static_prefix,
            Arc::clone(&self.config.routes),
            params,
        )?;

        match ContentKind::of(&document) {
            ContentKind::Html => self.rewrite_html(document, url_rewriter),
            ContentKind::Css => {
                let text = decode_whole(document.into_bytes()?);
                Ok(RewriteStream::once(
                    CssRewriter::new(url_rewriter).rewrite(&text).into_bytes(),
                ))
            }
            ContentKind::Js => {
                let text = decode_whole(document.into_bytes()?);
                let rewritten = JsRewriter::new(url_rewriter).rewrite(&text)?;
                Ok(RewriteStream::once(rewritten.into_bytes()))
            }
            ContentKind::Other => {
                debug!("content type not rewritable, passing through");
                Ok(RewriteStream::new(Box::new(
                    document.into_chunks(self.config.chunk_size_in),
                )))
            }
        }
    }

    fn rewrite_html(&self, document: Document, url_rewriter: UrlRewriter) -> Result<RewriteStream> {
        let injection = InjectionPoints::for_document(&url_rewriter, &self.config.client);

        if self.config.backend == Backend::Materialize {
            let text = decode_whole(document.into_bytes()?);
            let rewritten = MaterializingRewriter::new(url_rewriter, injection).rewrite(&text)?;
            return Ok(RewriteStream::once(rewritten.into_bytes()));
        }

        let stream = HtmlStream {
            input: document.into_chunks(self.config.chunk_size_in),
            backend: self.config.backend.event_stream(),
            factory: TagFactory::new(url_rewriter, injection),
            buffer: StreamingBuffer::new(self.config.chunk_size_out),
            state: StreamState::Feeding,
        };
        Ok(RewriteStream::new(Box::new(stream)))
    }
}

/// Decode a full body with the same lenient decoder the streaming path uses
fn decode_whole(bytes: Vec<u8>) -> String {
    let mut decoder = StreamDecoder::new();
    let mut text = decoder.decode(&bytes);
    text.push_str(&decoder.finish());
    text
}

enum ContentKind {
    Html,
    Css,
    Js,
    Other,
}

impl ContentKind {
    fn of(document: &Document) -> Self {
        let Some(content_type) = document.content_type() else {
            return Self::Other;
        };
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match media_type.as_str() {
            "text/html" | "application/xhtml+xml" => Self::Html,
            "text/css" => Self::Css,
            "application/javascript" | "text/javascript" | "application/x-javascript" => Self::Js,
            _ => Self::Other,
        }
    }
}

enum StreamState {
    Feeding,
    Draining,
    Done,
}

/// Lazy driver for the streaming HTML pipeline: pull input, tokenize, let
/// the tag factory fill the output buffer, yield chunks as they reach size.
struct HtmlStream {
    input: ChunkStream,
    backend: Box<dyn EventStream>,
    factory: TagFactory,
    buffer: StreamingBuffer,
    state: StreamState,
}

impl HtmlStream {
    fn process(&mut self, chunk: Option<&[u8]>) -> Result<()> {
        let Self {
            backend,
            factory,
            buffer,
            ..
        } = self;

        let mut first_err: Option<RewriteError> = None;
        let mut emit = |event: ParseEvent| {
            if first_err.is_none() {
                if let Err(err) = factory.handle_event(event, buffer) {
                    first_err = Some(err);
                }
            }
        };

        match chunk {
            Some(bytes) => backend.feed(bytes, &mut emit),
            None => backend.finish(&mut emit),
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Iterator for HtmlStream {
    type Item = ChunkResult;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chunk) = self.buffer.next_chunk() {
                return Some(Ok(chunk));
            }

            match self.state {
                StreamState::Feeding => match self.input.next() {
                    Some(Ok(bytes)) => {
                        if let Err(err) = self.process(Some(&bytes)) {
                            self.state = StreamState::Done;
                            return Some(Err(err));
                        }
                    }
                    Some(Err(err)) => {
                        self.state = StreamState::Done;
                        return Some(Err(err));
                    }
                    None => {
                        if let Err(err) = self.process(None) {
                            self.state = StreamState::Done;
                            return Some(Err(err));
                        }
                        self.state = StreamState::Draining;
                    }
                },
                StreamState::Draining => {
                    self.state = StreamState::Done;
                    let remainder: Vec<u8> = self.buffer.drain().flatten().collect();
                    if !remainder.is_empty() {
                        return Some(Ok(remainder));
                    }
                }
                StreamState::Done => return None,
            }
        }
    }
}
