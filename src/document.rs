//! Fetched document model
//!
//! A [`Document`] is what the gateway's fetch service hands to the rewriting
//! engine: the URL it was fetched from, the origin's response headers, and the
//! body either as a single buffer or as a fallible chunk iterator. Each
//! document is owned by exactly one in-flight rewrite and is consumed by it.

use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

/// A single chunk pulled from the upstream fetch
pub type ChunkResult = Result<Vec<u8>>;

/// Upstream body as a fallible byte-chunk iterator.
///
/// Deliberately not `Send`: a rewrite is single-threaded from upstream read
/// to output chunk, and the SAX backend's parser state is thread-local.
pub type ChunkStream = Box<dyn Iterator<Item = ChunkResult>>;

/// Document body: fully buffered, or streamed from the fetch service
pub enum DocumentContent {
    /// The whole body, already in memory
    Buffered(Vec<u8>),
    /// Chunks pulled lazily from the upstream connection
    Streamed(ChunkStream),
}

/// A fetched third-party document entering the rewrite pipeline
pub struct Document {
    /// The URL the document was fetched from
    pub url: String,
    /// Response headers from the origin
    pub headers: HashMap<String, String>,
    /// The response body
    pub content: DocumentContent,
}

impl Document {
    /// Create a document from a fully buffered body
    pub fn buffered(url: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            content: DocumentContent::Buffered(content),
        }
    }

    /// Create a document whose body is pulled chunk-by-chunk from upstream
    pub fn streamed(url: impl Into<String>, stream: ChunkStream) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            content: DocumentContent::Streamed(stream),
        }
    }

    /// Attach an origin response header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The origin's `Content-Type` header, if present
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }

    /// Collect the whole body into memory, draining the stream if needed.
    ///
    /// An upstream error aborts the collection and is propagated.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self.content {
            DocumentContent::Buffered(bytes) => Ok(bytes),
            DocumentContent::Streamed(stream) => {
                let mut bytes = Vec::new();
                for chunk in stream {
                    bytes.extend_from_slice(&chunk?);
                }
                Ok(bytes)
            }
        }
    }

    /// Turn the body into a chunk iterator, re-slicing a buffered body into
    /// `chunk_size` pieces so both content forms drive the same pipeline.
    pub fn into_chunks(self, chunk_size: usize) -> ChunkStream {
        match self.content {
            DocumentContent::Streamed(stream) => stream,
            DocumentContent::Buffered(bytes) => {
                let chunk_size = chunk_size.max(1);
                let chunks: Vec<ChunkResult> = bytes
                    .chunks(chunk_size)
                    .map(|chunk| Ok(chunk.to_vec()))
                    .collect();
                Box::new(chunks.into_iter())
            }
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let content = match &self.content {
            DocumentContent::Buffered(bytes) => format!("Buffered({} bytes)", bytes.len()),
            DocumentContent::Streamed(_) => "Streamed".to_string(),
        };
        f.debug_struct("Document")
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("content", &content)
            .finish()
    }
}
