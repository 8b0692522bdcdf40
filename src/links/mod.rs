//! Link and transclusion extraction.
//!
//! Two kinds of references connect memory bank documents:
//! - markdown links `[text](target.md#section)`
//! - transclusion directives `{{include:target.md#section}}`
//!
//! Both are normalised to a bare file name plus an optional section anchor.

pub mod parser;

use serde::{Deserialize, Serialize};

pub use parser::{normalize_target, LinkParser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    MarkdownLink,
    Transclusion,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::MarkdownLink => "markdown_link",
            LinkKind::Transclusion => "transclusion",
        }
    }
}

/// Byte range of a reference in its source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A directed reference from one document to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: String,
    /// Bare file name of the referenced document
    pub target: String,
    pub target_section: Option<String>,
    pub kind: LinkKind,
    /// Line number (1-based)
    pub line: usize,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseWarningKind {
    /// `{{include:` without a closing `}}` on the same line
    UnterminatedDirective,
    /// Directive with nothing to include
    EmptyTarget,
}

impl ParseWarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseWarningKind::UnterminatedDirective => "unterminated_directive",
            ParseWarningKind::EmptyTarget => "empty_target",
        }
    }
}

/// A malformed directive that was skipped during parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub line: usize,
    pub kind: ParseWarningKind,
    pub message: String,
}

/// Everything the parser found in one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedLinks {
    pub markdown_links: Vec<Link>,
    pub transclusions: Vec<Link>,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedLinks {
    /// Markdown links followed by transclusions.
    pub fn all(&self) -> impl Iterator<Item = &Link> {
        self.markdown_links.iter().chain(self.transclusions.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.markdown_links.is_empty() && self.transclusions.is_empty()
    }
}
