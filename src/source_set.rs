//! `srcset` attribute parsing
//!
//! Responsive images carry multiple candidate URLs in one attribute value
//! (`srcset="small.png 480w, big.png 1080w"`). Generic link traversal does
//! not see inside it, so the value is parsed into an [`ImageSourceSet`], each
//! URL rewritten independently, and the set re-serialized with its size
//! descriptors intact.

use std::fmt;

use crate::error::Result;

/// An ordered list of `(url, size descriptor)` pairs from a `srcset` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSourceSet {
    parts: Vec<(String, String)>,
}

impl ImageSourceSet {
    /// Parse a raw `srcset` attribute value.
    ///
    /// Candidates are comma separated; within a candidate the URL is
    /// terminated by the first whitespace and the remainder is the size
    /// descriptor (which may be empty).
    pub fn parse(raw: &str) -> Self {
        let parts = raw
            .split(',')
            .map(|part| {
                let part = part.trim();
                match part.split_once(char::is_whitespace) {
                    Some((url, size)) => (url.to_string(), size.trim().to_string()),
                    None => (part.to_string(), String::new()),
                }
            })
            .filter(|(url, _)| !url.is_empty())
            .collect();

        Self { parts }
    }

    /// Rewrite every URL in the set through `rewrite`.
    ///
    /// A `None` from the rewriter leaves that candidate's URL unchanged; an
    /// error aborts the whole mapping.
    pub fn try_map_urls<F>(mut self, mut rewrite: F) -> Result<Self>
    where
        F: FnMut(&str) -> Result<Option<String>>,
    {
        for (url, _) in &mut self.parts {
            if let Some(new_url) = rewrite(url)? {
                *url = new_url;
            }
        }
        Ok(self)
    }

    /// Number of candidates in the set
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the set holds no candidates
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Iterate over `(url, size descriptor)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parts
            .iter()
            .map(|(url, size)| (url.as_str(), size.as_str()))
    }
}

impl fmt::Display for ImageSourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (url, size) in &self.parts {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            if size.is_empty() {
                write!(f, "{url}")?;
            } else {
                write!(f, "{url} {size}")?;
            }
        }
        Ok(())
    }
}
