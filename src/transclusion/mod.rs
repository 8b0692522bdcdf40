//! Transclusion resolver.
//!
//! Expands `{{include:target.md}}` and `{{include:target.md#section}}`
//! directives recursively. Content problems never fail a resolution: a
//! missing target or section, a cycle or an exceeded depth leaves a visible
//! `<!-- transclusion error: ... -->` marker in the output and an entry in
//! [`TransclusionResult::errors`].
//!
//! Section includes insert the section body only: the heading line is
//! stripped and surrounding whitespace trimmed. Whole-document includes
//! insert the body without front matter, trimmed the same way.

mod cache;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::document::DocumentStore;
use crate::error::{require_name, MemoryBankError, Result};
use crate::links::LinkParser;

use cache::{names_fingerprint, CacheKey, CachedResolution, ResolutionCache};
pub use cache::CacheStats;

/// Default include nesting limit.
pub const DEFAULT_MAX_DEPTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    TargetNotFound,
    SectionNotFound,
    CycleDetected,
    DepthLimitExceeded,
}

impl UnresolvedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnresolvedReason::TargetNotFound => "target_not_found",
            UnresolvedReason::SectionNotFound => "section_not_found",
            UnresolvedReason::CycleDetected => "cycle_detected",
            UnresolvedReason::DepthLimitExceeded => "depth_limit_exceeded",
        }
    }
}

/// One directive that could not be expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransclusionError {
    /// Document containing the directive
    pub source: String,
    pub target: String,
    pub section: Option<String>,
    pub reason: UnresolvedReason,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransclusionResult {
    pub resolved_content: String,
    /// Every document whose content was inserted, directly or transitively
    pub included_files: BTreeSet<String>,
    /// Deepest include level reached (0 when nothing was included)
    pub depth_reached: usize,
    pub errors: Vec<TransclusionError>,
}

impl TransclusionResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Per-call resolution state.
struct Expansion<'s> {
    store: &'s dyn DocumentStore,
    max_depth: usize,
    including: Vec<String>,
    included: BTreeSet<String>,
    looked_up: Vec<(String, Option<u64>)>,
    /// Set once a missing target has been matched against the store's names
    suggested_from: Option<u64>,
    errors: Vec<TransclusionError>,
    depth_reached: usize,
}

impl Expansion<'_> {
    fn record_lookup(&mut self, name: &str, hash: Option<u64>) {
        if !self.looked_up.iter().any(|(n, _)| n == name) {
            self.looked_up.push((name.to_string(), hash));
        }
    }

    fn fail(
        &mut self,
        source: &str,
        target: &str,
        section: Option<&str>,
        reason: UnresolvedReason,
        message: String,
    ) -> String {
        let marker = match reason {
            UnresolvedReason::TargetNotFound => format!("{} not found", target),
            UnresolvedReason::SectionNotFound => format!(
                "section '{}' not found in {}",
                section.unwrap_or_default(),
                target
            ),
            UnresolvedReason::CycleDetected => format!("cycle detected involving {}", target),
            UnresolvedReason::DepthLimitExceeded => {
                format!("max depth {} exceeded including {}", self.max_depth, target)
            }
        };
        tracing::debug!("Unresolved include in {}: {}", source, message);
        self.errors.push(TransclusionError {
            source: source.to_string(),
            target: target.to_string(),
            section: section.map(String::from),
            reason,
            message,
        });
        format!("<!-- transclusion error: {} -->", marker)
    }

    /// Closest document name to a missing target. The cached result then
    /// depends on the whole name set, not just the target.
    fn suggestion(&mut self, target: &str) -> Option<String> {
        if self.suggested_from.is_none() {
            self.suggested_from = Some(names_fingerprint(self.store));
        }
        self.store
            .names()
            .into_iter()
            .map(|name| (strsim::jaro_winkler(target, name), name))
            .filter(|(similarity, _)| *similarity >= 0.85)
            .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(a.1)))
            .map(|(_, name)| name.to_string())
    }

    fn expand(&mut self, current: &str, content: &str, depth: usize) -> String {
        let parsed = LinkParser::parse(current, content);
        if parsed.transclusions.is_empty() {
            return content.to_string();
        }

        let mut out = String::with_capacity(content.len());
        let mut cursor = 0;

        for directive in &parsed.transclusions {
            out.push_str(&content[cursor..directive.span.start]);
            cursor = directive.span.end;

            let target = directive.target.as_str();
            let section = directive.target_section.as_deref();

            if self.including.iter().any(|name| name == target) {
                let message = format!(
                    "{} includes {} which is already being included ({})",
                    current,
                    target,
                    self.including.join(" -> ")
                );
                let marker = self.fail(current, target, section, UnresolvedReason::CycleDetected, message);
                out.push_str(&marker);
                continue;
            }

            if depth + 1 > self.max_depth {
                let message = format!(
                    "including {} from {} would exceed the maximum depth of {}",
                    target, current, self.max_depth
                );
                let marker = self.fail(current, target, section, UnresolvedReason::DepthLimitExceeded, message);
                out.push_str(&marker);
                continue;
            }

            let store = self.store;
            let Some(document) = store.get(target) else {
                self.record_lookup(target, None);
                let message = match self.suggestion(target) {
                    Some(similar) => format!("{} not found (did you mean {}?)", target, similar),
                    None => format!("{} not found", target),
                };
                let marker = self.fail(current, target, section, UnresolvedReason::TargetNotFound, message);
                out.push_str(&marker);
                continue;
            };
            self.record_lookup(target, Some(document.content_hash));

            let slice = match section {
                Some(anchor) => match document.section(anchor) {
                    Some(found) => document.section_body(found),
                    None => {
                        let message = format!("section '{}' not found in {}", anchor, target);
                        let marker =
                            self.fail(current, target, section, UnresolvedReason::SectionNotFound, message);
                        out.push_str(&marker);
                        continue;
                    }
                },
                None => document.body().trim(),
            };

            self.included.insert(target.to_string());
            self.depth_reached = self.depth_reached.max(depth + 1);
            self.including.push(target.to_string());
            let expanded = self.expand(target, slice, depth + 1);
            self.including.pop();
            out.push_str(&expanded);
        }

        out.push_str(&content[cursor..]);
        out
    }
}

/// Resolves transclusions and caches results per resolver instance.
///
/// Results are cached by `(document, content hash, max_depth)`. A cached
/// entry also remembers the hash of every document it looked up, including
/// misses, and is discarded as soon as any of them changes.
#[derive(Debug, Default)]
pub struct TransclusionResolver {
    cache: ResolutionCache,
}

impl TransclusionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve all directives in `content`, which belongs to `document_name`.
    ///
    /// Only an empty document name is an error; content problems are
    /// reported in the result.
    pub fn resolve(
        &mut self,
        store: &dyn DocumentStore,
        document_name: &str,
        content: &str,
        max_depth: usize,
    ) -> Result<TransclusionResult> {
        require_name(document_name, "document name")?;

        let key = CacheKey {
            document: document_name.to_string(),
            content_hash: xxh3_64(content.as_bytes()),
            max_depth,
        };
        self.cache.evict_stale_roots(&key);
        if let Some(hit) = self.cache.lookup(&key, store) {
            return Ok(hit);
        }

        let mut expansion = Expansion {
            store,
            max_depth,
            including: vec![document_name.to_string()],
            included: BTreeSet::new(),
            looked_up: Vec::new(),
            suggested_from: None,
            errors: Vec::new(),
            depth_reached: 0,
        };
        let resolved_content = expansion.expand(document_name, content, 0);

        let result = TransclusionResult {
            resolved_content,
            included_files: expansion.included,
            depth_reached: expansion.depth_reached,
            errors: expansion.errors,
        };

        self.cache.insert(
            key,
            CachedResolution {
                result: result.clone(),
                dependencies: expansion.looked_up,
                names: expansion.suggested_from,
            },
        );

        Ok(result)
    }

    /// Resolve a stored document's body (front matter stripped).
    pub fn resolve_document(
        &mut self,
        store: &dyn DocumentStore,
        document_name: &str,
        max_depth: usize,
    ) -> Result<TransclusionResult> {
        require_name(document_name, "document name")?;
        let document = store
            .get(document_name)
            .ok_or_else(|| MemoryBankError::UnknownDocument(document_name.to_string()))?;
        self.resolve(store, document_name, document.body(), max_depth)
    }

    /// Drop every cached resolution rooted at or depending on `name`.
    pub fn invalidate(&mut self, name: &str) -> usize {
        self.cache.invalidate(name)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
