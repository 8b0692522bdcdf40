//! Markdown link and `{{include:...}}` directive parser.
//!
//! Parsing is pure and never fails: malformed directives are skipped and
//! reported as [`ParseWarning`]s.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::markdown::{fenced_block_ranges, in_ranges};

use super::{Link, LinkKind, ParseWarning, ParseWarningKind, ParsedLinks, Span};

static MARKDOWN_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(!?)\[[^\]\n]*\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"\n]*")?\s*\)"#)
        .expect("markdown link pattern is valid")
});

static INCLUDE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*include\s*:").expect("include pattern is valid"));

/// Reduce a link target to a bare file name: relative prefixes and
/// directories are dropped.
pub fn normalize_target(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

/// Split `target.md#section` into the normalised target and the anchor.
fn split_anchor(raw: &str) -> (String, Option<String>) {
    let (path, section) = match raw.split_once('#') {
        Some((path, section)) => (path, Some(section.trim())),
        None => (raw, None),
    };
    let section = section.filter(|s| !s.is_empty()).map(|s| s.to_string());
    (normalize_target(path), section)
}

fn is_external(target: &str) -> bool {
    target.contains("://") || target.starts_with("mailto:")
}

fn is_markdown_path(path: &str) -> bool {
    path.to_lowercase().ends_with(".md")
}

/// Line lookup for byte offsets.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(content: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(content.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// 1-based line containing `offset`.
    fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }
}

pub struct LinkParser;

impl LinkParser {
    /// Extract markdown links and transclusion directives from a document.
    pub fn parse(document_name: &str, content: &str) -> ParsedLinks {
        let fenced = fenced_block_ranges(content);
        let lines = LineIndex::new(content);

        let markdown_links = Self::extract_markdown_links(document_name, content, &fenced, &lines);
        let (transclusions, warnings) =
            Self::extract_transclusions(document_name, content, &fenced, &lines);

        ParsedLinks {
            markdown_links,
            transclusions,
            warnings,
        }
    }

    fn extract_markdown_links(
        source: &str,
        content: &str,
        fenced: &[Range<usize>],
        lines: &LineIndex,
    ) -> Vec<Link> {
        let mut links = Vec::new();

        for caps in MARKDOWN_LINK.captures_iter(content) {
            let Some(whole) = caps.get(0) else { continue };
            if in_ranges(fenced, whole.start()) {
                continue;
            }
            // Images are not document references
            if caps.get(1).is_some_and(|m| !m.as_str().is_empty()) {
                continue;
            }
            let Some(raw) = caps.get(2).map(|m| m.as_str()) else {
                continue;
            };
            if is_external(raw) {
                continue;
            }
            let path = raw.split('#').next().unwrap_or("");
            if path.is_empty() || !is_markdown_path(path) {
                continue;
            }

            let (target, target_section) = split_anchor(raw);
            links.push(Link {
                source: source.to_string(),
                target,
                target_section,
                kind: LinkKind::MarkdownLink,
                line: lines.line_of(whole.start()),
                span: Span {
                    start: whole.start(),
                    end: whole.end(),
                },
            });
        }

        links
    }

    fn extract_transclusions(
        source: &str,
        content: &str,
        fenced: &[Range<usize>],
        lines: &LineIndex,
    ) -> (Vec<Link>, Vec<ParseWarning>) {
        let mut links = Vec::new();
        let mut warnings = Vec::new();

        for open in INCLUDE_OPEN.find_iter(content) {
            if in_ranges(fenced, open.start()) {
                continue;
            }
            let line = lines.line_of(open.start());
            let rest = &content[open.end()..];
            let line_rest = rest.split('\n').next().unwrap_or("");

            let Some(close) = line_rest.find("}}") else {
                warnings.push(ParseWarning {
                    line,
                    kind: ParseWarningKind::UnterminatedDirective,
                    message: format!("unterminated include directive on line {}", line),
                });
                continue;
            };

            let inner = &line_rest[..close];
            if inner.contains("{{") {
                warnings.push(ParseWarning {
                    line,
                    kind: ParseWarningKind::UnterminatedDirective,
                    message: format!("include directive on line {} is not closed before the next one", line),
                });
                continue;
            }

            let (target, target_section) = split_anchor(inner);
            if target.is_empty() {
                warnings.push(ParseWarning {
                    line,
                    kind: ParseWarningKind::EmptyTarget,
                    message: format!("include directive without a target on line {}", line),
                });
                continue;
            }

            links.push(Link {
                source: source.to_string(),
                target,
                target_section,
                kind: LinkKind::Transclusion,
                line,
                span: Span {
                    start: open.start(),
                    end: open.end() + close + 2,
                },
            });
        }

        (links, warnings)
    }
}
