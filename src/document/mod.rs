//! Memory bank documents.
//!
//! A [`Document`] is a read-only snapshot of one markdown file: its content,
//! the sections it is split into, its token cost and the metadata the scorer
//! consumes. Documents are handed to the core through a [`DocumentStore`].

pub mod loader;
pub mod markdown;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::tokens::TokenCounter;

pub use loader::BankLoader;

/// A heading-delimited slice of a document.
///
/// A section spans from its heading line up to the next heading of the same
/// or higher level, or the end of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Heading text without the leading `#` markers
    pub heading: String,
    /// Heading level (1-6)
    pub level: u8,
    /// Byte offset of the heading line
    pub start_offset: usize,
    /// Byte offset just past the heading line
    pub body_offset: usize,
    /// Byte offset where the section ends (exclusive)
    pub end_offset: usize,
}

impl Section {
    pub fn slug(&self) -> String {
        markdown::slugify(&self.heading)
    }
}

/// Optional YAML front matter recognised at the top of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    /// Documents that must load before this one
    pub depends_on: Vec<String>,
    /// Quality score on a 0-100 scale
    pub quality: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique key, the bare file name (e.g. `activeContext.md`)
    pub name: String,
    /// Full text including any front matter
    pub content: String,
    pub sections: Vec<Section>,
    pub token_count: usize,
    /// Unix timestamp in seconds
    pub last_modified: Option<u64>,
    /// Quality on a 0-100 scale
    pub quality_score: Option<f64>,
    /// Static dependencies declared in front matter
    pub depends_on: Vec<String>,
    /// xxh3 hash of `content`
    pub content_hash: u64,
    body_offset: usize,
}

impl Document {
    pub fn new(name: impl Into<String>, content: impl Into<String>, counter: &dyn TokenCounter) -> Self {
        let name = name.into();
        let content = content.into();

        let (front_matter, body_offset) = match markdown::split_front_matter(&content) {
            Some((yaml, offset)) => match serde_yaml::from_str::<FrontMatter>(yaml) {
                Ok(fm) => (fm, offset),
                Err(e) => {
                    // Unparseable blocks stay part of the body
                    tracing::warn!("Ignoring invalid front matter in {}: {}", name, e);
                    (FrontMatter::default(), 0)
                }
            },
            None => (FrontMatter::default(), 0),
        };

        let headings = markdown::extract_headings(&content, body_offset);
        let sections = headings
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let end_offset = headings
                    .iter()
                    .skip(i + 1)
                    .find(|next| next.level <= h.level)
                    .map(|next| next.start)
                    .unwrap_or(content.len());
                Section {
                    heading: h.text.clone(),
                    level: h.level,
                    start_offset: h.start,
                    body_offset: h.end,
                    end_offset,
                }
            })
            .collect();

        let token_count = counter.count_tokens(&content[body_offset..]);
        let content_hash = xxh3_64(content.as_bytes());

        Self {
            name,
            sections,
            token_count,
            last_modified: None,
            quality_score: front_matter.quality,
            depends_on: front_matter.depends_on,
            content_hash,
            body_offset,
            content,
        }
    }

    pub fn with_last_modified(mut self, unix_secs: u64) -> Self {
        self.last_modified = Some(unix_secs);
        self
    }

    /// Overrides any quality declared in front matter.
    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality_score = Some(quality);
        self
    }

    /// Content without front matter.
    pub fn body(&self) -> &str {
        &self.content[self.body_offset..]
    }

    /// Find a section by anchor: exact heading, then case-insensitive heading,
    /// then GitHub-style slug.
    pub fn section(&self, anchor: &str) -> Option<&Section> {
        let anchor = anchor.trim();
        if anchor.is_empty() {
            return None;
        }
        if let Some(s) = self.sections.iter().find(|s| s.heading == anchor) {
            return Some(s);
        }
        let lower = anchor.to_lowercase();
        if let Some(s) = self.sections.iter().find(|s| s.heading.to_lowercase() == lower) {
            return Some(s);
        }
        let slug = markdown::slugify(anchor);
        self.sections.iter().find(|s| s.slug() == slug)
    }

    /// Section text with the heading line stripped and surrounding
    /// whitespace trimmed. This is what a `#section` transclusion inserts.
    pub fn section_body(&self, section: &Section) -> &str {
        self.content[section.body_offset..section.end_offset].trim()
    }

    /// Sections at or above `max_level` (1 = only `#` headings).
    pub fn sections_up_to(&self, max_level: u8) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(move |s| s.level <= max_level)
    }
}

/// Read access to documents by name.
pub trait DocumentStore {
    fn get(&self, name: &str) -> Option<&Document>;

    /// Names in a stable order.
    fn names(&self) -> Vec<&str>;
}

/// Insertion-ordered in-memory document store.
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    documents: Vec<Document>,
    index: HashMap<String, usize>,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let mut set = Self::new();
        for doc in documents {
            set.insert(doc);
        }
        set
    }

    /// Inserts or replaces a document. A replaced document keeps its position.
    pub fn insert(&mut self, document: Document) -> Option<Document> {
        match self.index.get(&document.name) {
            Some(&idx) => Some(std::mem::replace(&mut self.documents[idx], document)),
            None => {
                self.index.insert(document.name.clone(), self.documents.len());
                self.documents.push(document);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Document> {
        let idx = self.index.remove(name)?;
        let removed = self.documents.remove(idx);
        for doc in &self.documents[idx..] {
            if let Some(slot) = self.index.get_mut(&doc.name) {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl DocumentStore for DocumentSet {
    fn get(&self, name: &str) -> Option<&Document> {
        self.index.get(name).map(|&idx| &self.documents[idx])
    }

    fn names(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.name.as_str()).collect()
    }
}
