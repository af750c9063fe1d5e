//! Lossy two-way codec between linear chat transcripts and the HTML
//! conversation export dialect.
//!
//! Decoding never fails: malformed markup only means less content is
//! extracted, and turns that end up empty are dropped. Encoding always
//! writes one content block per turn and skips system messages.
//!
//! Markup parsing lives in [`markup`]; text extraction is written against the
//! [`MarkupNode`] capability trait rather than a concrete tree type.

mod decode;
pub mod dialect;
mod encode;
mod entities;
mod extract;
pub mod markup;

pub use decode::decode;
pub use encode::{encode, escape_html};
pub use extract::extract_markdown;
pub use markup::{parse_document, Element, MarkupNode, Node};

/// Speaker of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranscriptRole {
    User,
    Assistant,
    System,
}

impl TranscriptRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One flat turn of a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptRecord {
    pub id: String,
    pub role: TranscriptRole,
    pub content: String,
}

impl TranscriptRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, role: TranscriptRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
        }
    }
}
