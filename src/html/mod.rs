//! HTML backends
//!
//! All streaming backends speak one contract: raw byte chunks in,
//! [`event::ParseEvent`]s out through a consumer callback. The
//! [`tag_factory::TagFactory`] turns those events back into markup text
//! while rewriting interesting attributes and injecting the client at the
//! head injection points. Three interchangeable tokenizers implement the
//! contract: a hand-rolled incremental one, a SAX-style adapter over
//! `html5ever`, and a pass-through for raw-copy comparisons. The
//! [`materialize`] backend stands apart: it parses the whole document into a
//! tree instead of streaming.

pub mod decode;
pub mod event;
pub mod materialize;
pub mod null;
pub mod sax;
pub mod tag_factory;
pub mod tokenizer;
