//! Error types for the rewriting engine
//!
//! All fallible operations in this crate return [`RewriteError`] through the
//! crate-wide [`Result`] alias. Configuration problems (a ruleset without its
//! catch-all rule, an unknown backend name) are separated from per-request
//! failures (a document that cannot receive the client injection, an upstream
//! stream that died mid-transfer) so callers can map them onto the right
//! response class.

use thiserror::Error;

/// Errors produced by the rewriting engine
#[derive(Error, Debug)]
pub enum RewriteError {
    // =========================================================================
    // Configuration errors
    // =========================================================================
    /// The ruleset does not end in an all-wildcard rule
    #[error("ruleset has no catch-all rule; the final rule must match everything")]
    MissingCatchAll,

    /// A ruleset file could not be read or parsed
    #[error("could not load ruleset from '{path}': {message}")]
    RulesetLoad {
        /// Path of the ruleset file
        path: String,
        /// Underlying read or parse failure
        message: String,
    },

    /// An unrecognised rewriter backend name was requested
    #[error("unknown rewriter backend '{0}'")]
    UnknownBackend(String),

    /// The document URL the rewriter was built for is not a valid URL
    #[error("invalid document URL '{url}': {message}")]
    InvalidDocumentUrl {
        /// The offending URL
        url: String,
        /// Parser diagnostic
        message: String,
    },

    // =========================================================================
    // Classification errors
    // =========================================================================
    /// No rule matched a classification request. With a valid ruleset this is
    /// unreachable; hitting it means the catch-all went missing after load.
    #[error("no rewrite rule matched <{tag}:{attribute}> {url}")]
    NoRuleMatched {
        /// Tag the URL was found on
        tag: String,
        /// Attribute the URL was found in (empty for bare URLs)
        attribute: String,
        /// The unclassifiable URL
        url: String,
    },

    // =========================================================================
    // Per-document errors
    // =========================================================================
    /// The materializing backend found no `<head>` to inject into
    #[error("document has no <head> element to receive the client injection")]
    MissingHead,

    /// The upstream content iterator failed mid-stream
    #[error("upstream content stream failed: {0}")]
    Upstream(String),
}

/// Result type for rewriting operations
pub type Result<T> = std::result::Result<T, RewriteError>;
