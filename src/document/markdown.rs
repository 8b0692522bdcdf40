//! Small markdown scanning helpers shared by the section extractor and the
//! link parser.

use std::ops::Range;

/// An ATX heading found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingLine {
    pub level: u8,
    pub text: String,
    /// Byte offset of the first character of the heading line
    pub start: usize,
    /// Byte offset just past the heading line (including its newline)
    pub end: usize,
}

/// Iterates lines together with their byte offset. The yielded line keeps
/// no trailing newline; the second offset points past it.
pub fn lines_with_offsets(content: &str) -> impl Iterator<Item = (usize, usize, &str)> {
    let mut offset = 0;
    content.split_inclusive('\n').map(move |raw| {
        let start = offset;
        offset += raw.len();
        let line = raw.trim_end_matches('\n').trim_end_matches('\r');
        (start, offset, line)
    })
}

/// Byte ranges covered by fenced code blocks (``` or ~~~). An unclosed fence
/// runs to the end of the content.
pub fn fenced_block_ranges(content: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut open: Option<(usize, &str)> = None;

    for (start, end, line) in lines_with_offsets(content) {
        let trimmed = line.trim_start();
        let fence = if trimmed.starts_with("```") {
            Some("```")
        } else if trimmed.starts_with("~~~") {
            Some("~~~")
        } else {
            None
        };

        match (open, fence) {
            (None, Some(marker)) => open = Some((start, marker)),
            (Some((block_start, marker)), Some(found)) if marker == found => {
                ranges.push(block_start..end);
                open = None;
            }
            _ => {}
        }
    }

    if let Some((block_start, _)) = open {
        ranges.push(block_start..content.len());
    }

    ranges
}

pub fn in_ranges(ranges: &[Range<usize>], offset: usize) -> bool {
    ranges.iter().any(|r| r.contains(&offset))
}

/// Extract ATX headings, skipping fenced code blocks and everything before
/// `from` (used to skip front matter).
pub fn extract_headings(content: &str, from: usize) -> Vec<HeadingLine> {
    let fenced = fenced_block_ranges(content);
    let mut headings = Vec::new();

    for (start, end, line) in lines_with_offsets(content) {
        if start < from || in_ranges(&fenced, start) {
            continue;
        }
        let trimmed = line.trim_start();
        if !trimmed.starts_with('#') {
            continue;
        }
        let level = trimmed.chars().take_while(|&c| c == '#').count();
        if level > 6 {
            continue;
        }
        let rest = &trimmed[level..];
        if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
            continue;
        }
        let text = rest.trim().trim_end_matches('#').trim_end().to_string();
        if text.is_empty() {
            continue;
        }
        headings.push(HeadingLine {
            level: level as u8,
            text,
            start,
            end,
        });
    }

    headings
}

/// GitHub-style anchor slug: lowercase, punctuation dropped, spaces to `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.trim().chars() {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() {
            slug.push('-');
        }
    }
    slug
}

/// Splits a leading `---` YAML block off the content. Returns the YAML text
/// and the byte offset where the body starts.
pub fn split_front_matter(content: &str) -> Option<(&str, usize)> {
    let mut lines = lines_with_offsets(content);
    let (_, first_end, first) = lines.next()?;
    if first.trim_end() != "---" {
        return None;
    }

    for (start, end, line) in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            return Some((&content[first_end..start], end));
        }
    }

    None
}
