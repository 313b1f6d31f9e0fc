//! Backend-agnostic parse events
//!
//! Every tokenizer backend reduces markup to this one event vocabulary; the
//! tag factory only ever sees [`ParseEvent`]s, which is what keeps the
//! backends behaviorally interchangeable.

/// Ordered attribute list; `None` values are bare (valueless) attributes
pub type Attrs = Vec<(String, Option<String>)>;

/// One unit of parsed markup structure.
///
/// `Text` data is carried in serialized form: whatever a backend emits here
/// is written to the output verbatim. Backends that decode character
/// references (like the SAX adapter) re-escape before emitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// An opening tag with its attributes in source order
    StartTag {
        /// Lowercased tag name
        name: String,
        /// Attributes in source order
        attrs: Attrs,
    },
    /// A closing tag
    EndTag {
        /// Lowercased tag name
        name: String,
    },
    /// A tag closed in place (`<br/>`)
    SelfClosingTag {
        /// Lowercased tag name
        name: String,
        /// Attributes in source order
        attrs: Attrs,
    },
    /// Character data, ready to serialize
    Text {
        /// Output-ready text
        data: String,
    },
    /// A comment, without the `<!--`/`-->` delimiters
    Comment {
        /// Comment body
        data: String,
    },
    /// A doctype declaration
    Doctype {
        /// Root element name (empty if the declaration had none)
        name: String,
        /// PUBLIC identifier
        public_id: Option<String>,
        /// SYSTEM identifier
        system_id: Option<String>,
    },
    /// A processing instruction, without the `<?`/`>` delimiters
    ProcessingInstruction {
        /// Instruction body
        data: String,
    },
}

/// The streaming tokenizer contract shared by every backend.
///
/// `feed` may emit zero or more events per chunk; any construct split across
/// a chunk boundary is carried internally until it completes. `finish`
/// flushes whatever the backend still holds.
pub trait EventStream {
    /// Consume one upstream chunk, emitting completed events
    fn feed(&mut self, chunk: &[u8], emit: &mut dyn FnMut(ParseEvent));

    /// Signal end of input and flush remaining state
    fn finish(&mut self, emit: &mut dyn FnMut(ParseEvent));
}
