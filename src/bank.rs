//! `MemoryBank` ties the store, parser, graph, resolver and optimizer
//! together over one set of documents.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::BankConfig;
use crate::document::{BankLoader, Document, DocumentSet, DocumentStore};
use crate::error::{require_name, MemoryBankError, Result};
use crate::graph::{DependencyGraph, GraphStats};
use crate::links::{normalize_target, LinkParser, ParsedLinks};
use crate::optimizer::{ContextOptimizer, OptimizationResult, Strategy};
use crate::relevance::{Candidate, CandidateMetadata, RelevanceScorer};
use crate::tokens::{HeuristicTokenCounter, TokenCounter};
use crate::transclusion::{CacheStats, TransclusionResolver, TransclusionResult};
use crate::validate::{self, ValidationReport};

/// Unit of selection offered to the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateGranularity {
    #[default]
    Document,
    Section,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankStats {
    pub documents: usize,
    pub total_tokens: usize,
    pub graph: GraphStats,
    pub cache: CacheStats,
}

pub struct MemoryBank {
    config: BankConfig,
    counter: Box<dyn TokenCounter>,
    documents: DocumentSet,
    links: HashMap<String, ParsedLinks>,
    graph: DependencyGraph,
    resolver: TransclusionResolver,
}

impl MemoryBank {
    /// Build a bank from already loaded documents.
    pub fn from_documents(documents: impl IntoIterator<Item = Document>, config: BankConfig) -> Result<Self> {
        config.validate()?;
        let counter = HeuristicTokenCounter::new(config.tokens.chars_per_token);
        let mut bank = Self {
            graph: DependencyGraph::new().with_max_cycles(config.graph.max_cycles),
            documents: DocumentSet::from_documents(documents),
            links: HashMap::new(),
            resolver: TransclusionResolver::new(),
            counter: Box::new(counter),
            config,
        };
        bank.reparse_all();
        bank.rebuild_graph()?;
        Ok(bank)
    }

    /// Open a bank directory, reading `memory-bank.toml` from it when present.
    pub fn open(dir: &Path) -> Result<Self> {
        let config = BankConfig::load_or_default(dir)?;
        Self::open_with_config(dir, config)
    }

    pub fn open_with_config(dir: &Path, config: BankConfig) -> Result<Self> {
        config.validate()?;
        let counter = HeuristicTokenCounter::new(config.tokens.chars_per_token);
        let documents = BankLoader::new(&counter).load(dir)?;
        Self::from_documents(documents, config)
    }

    /// Replace the token counter used for candidates built from now on.
    /// Every candidate cost, whole document or section, comes from it.
    pub fn with_token_counter(mut self, counter: Box<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn config(&self) -> &BankConfig {
        &self.config
    }

    pub fn token_counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    pub fn documents(&self) -> &DocumentSet {
        &self.documents
    }

    pub fn document(&self, name: &str) -> Option<&Document> {
        self.documents.get(name)
    }

    pub fn parsed_links(&self, name: &str) -> Option<&ParsedLinks> {
        self.links.get(name)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Insert or replace a document, then rebuild the graph.
    pub fn update_document(&mut self, document: Document) -> Result<Option<Document>> {
        require_name(&document.name, "document name")?;
        let name = document.name.clone();
        let parsed = LinkParser::parse(&name, &document.content);
        let previous = self.documents.insert(document);
        self.links.insert(name.clone(), parsed);

        let dropped = self.resolver.invalidate(&name);
        tracing::debug!("Updated {} ({} cached resolutions dropped)", name, dropped);
        self.rebuild_graph()?;
        Ok(previous)
    }

    pub fn remove_document(&mut self, name: &str) -> Result<Option<Document>> {
        require_name(name, "document name")?;
        let removed = self.documents.remove(name);
        if removed.is_some() {
            self.links.remove(name);
            self.resolver.invalidate(name);
            self.rebuild_graph()?;
        }
        Ok(removed)
    }

    fn reparse_all(&mut self) {
        let documents: Vec<&Document> = self.documents.iter().collect();
        self.links = documents
            .par_iter()
            .map(|doc| (doc.name.clone(), LinkParser::parse(&doc.name, &doc.content)))
            .collect();
    }

    /// Static declarations from config merged with front-matter `depends_on`.
    fn declared_dependencies(&self) -> BTreeMap<String, Vec<String>> {
        let mut declared = self.config.static_dependencies.clone();
        for doc in self.documents.iter() {
            if doc.depends_on.is_empty() {
                continue;
            }
            let entry = declared.entry(doc.name.clone()).or_default();
            for dep in &doc.depends_on {
                let dep = normalize_target(dep);
                if !dep.is_empty() && !entry.contains(&dep) {
                    entry.push(dep);
                }
            }
        }
        declared
    }

    fn rebuild_graph(&mut self) -> Result<()> {
        let declared = self.declared_dependencies();
        let empty = ParsedLinks::default();
        let links: Vec<(&str, &ParsedLinks)> = self
            .documents
            .iter()
            .map(|doc| (doc.name.as_str(), self.links.get(&doc.name).unwrap_or(&empty)))
            .collect();
        self.graph.rebuild(links, &declared)
    }

    /// Loading order for the whole bank, or for what `roots` reach.
    pub fn loading_order(&self, roots: &[&str]) -> Result<Vec<String>> {
        if roots.is_empty() {
            self.graph.compute_loading_order(None)
        } else {
            self.graph.compute_loading_order(Some(roots))
        }
    }

    /// Resolve a document's transclusions. `max_depth` defaults to the
    /// configured limit.
    pub fn resolve(&mut self, name: &str, max_depth: Option<usize>) -> Result<TransclusionResult> {
        let depth = max_depth.unwrap_or(self.config.transclusion.max_depth);
        self.resolver.resolve_document(&self.documents, name, depth)
    }

    pub fn candidates(&self, granularity: CandidateGranularity) -> Vec<Candidate> {
        let mut out = Vec::new();
        for doc in self.documents.iter() {
            let metadata = CandidateMetadata {
                last_modified: doc.last_modified,
                quality_score: doc.quality_score,
            };
            let chunks = match granularity {
                CandidateGranularity::Document => Vec::new(),
                CandidateGranularity::Section => self.section_chunks(doc),
            };

            if chunks.is_empty() {
                let tokens = self.counter.count_tokens(doc.body());
                out.push(
                    Candidate::new(doc.name.clone(), None, doc.body(), tokens)
                        .with_metadata(metadata),
                );
                continue;
            }
            for (heading, text) in chunks {
                let tokens = self.counter.count_tokens(text);
                out.push(
                    Candidate::new(doc.name.clone(), Some(heading), text, tokens)
                        .with_metadata(metadata.clone()),
                );
            }
        }
        out
    }

    /// Body split at level 1 and 2 headings into non-overlapping chunks.
    fn section_chunks<'d>(&self, doc: &'d Document) -> Vec<(String, &'d str)> {
        let boundaries: Vec<_> = doc.sections_up_to(2).collect();
        let body_start = doc.content.len() - doc.body().len();

        boundaries
            .iter()
            .enumerate()
            .map(|(i, section)| {
                let start = if i == 0 { body_start } else { section.start_offset };
                let end = boundaries
                    .get(i + 1)
                    .map(|next| next.start_offset)
                    .unwrap_or(doc.content.len());
                (section.heading.clone(), doc.content[start..end].trim())
            })
            .collect()
    }

    pub fn optimize(
        &self,
        task_description: &str,
        token_budget: i64,
        strategy: Strategy,
        granularity: CandidateGranularity,
    ) -> Result<OptimizationResult> {
        if task_description.trim().is_empty() {
            return Err(MemoryBankError::contract("task description must not be empty"));
        }
        let candidates = self.candidates(granularity);
        let scorer = RelevanceScorer::new(self.config.scoring.clone());
        let optimizer = ContextOptimizer::new(self.config.optimizer.clone(), scorer);
        Ok(optimizer.optimize(task_description, &candidates, &self.graph, token_budget, strategy))
    }

    pub fn validate(&self) -> ValidationReport {
        validate::validate(self)
    }

    pub fn stats(&self) -> BankStats {
        BankStats {
            documents: self.documents.len(),
            total_tokens: self.documents.iter().map(|d| d.token_count).sum(),
            graph: self.graph.stats(),
            cache: self.resolver.cache_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;

    fn bank(docs: &[(&str, &str)]) -> MemoryBank {
        let counter = HeuristicTokenCounter::default();
        MemoryBank::from_documents(
            docs.iter().map(|(n, c)| Document::new(*n, *c, &counter)),
            BankConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_graph_combines_links_and_declarations() {
        let b = bank(&[
            ("a.md", "[b](b.md) {{include:c.md}}"),
            ("b.md", "---\ndepends_on: [./c.md]\n---\nB"),
            ("c.md", "C"),
        ]);
        let edges = b.graph().edges();
        assert!(edges.contains(&("a.md", "b.md", EdgeKind::MarkdownLink)));
        assert!(edges.contains(&("a.md", "c.md", EdgeKind::Transclusion)));
        assert!(edges.contains(&("b.md", "c.md", EdgeKind::Static)));
        assert_eq!(b.loading_order(&[]).unwrap(), vec!["c.md", "b.md", "a.md"]);
    }

    #[test]
    fn test_update_document_rebuilds_and_invalidates() {
        let counter = HeuristicTokenCounter::default();
        let mut b = bank(&[("a.md", "{{include:b.md}}"), ("b.md", "old")]);
        assert_eq!(b.resolve("a.md", None).unwrap().resolved_content, "old");

        b.update_document(Document::new("b.md", "new [a](a.md)", &counter)).unwrap();
        assert_eq!(b.resolve("a.md", None).unwrap().resolved_content, "new [a](a.md)");
        assert!(b.graph().has_cycles());

        b.remove_document("b.md").unwrap();
        assert!(!b.graph().has_cycles());
        assert!(b.documents().get("b.md").is_none());
    }

    #[test]
    fn test_section_candidates_partition_body() {
        let b = bank(&[
            ("a.md", "---\nquality: 70\n---\n# Title\nintro\n## One\nfirst\n### Deep\nx\n## Two\nsecond\n"),
            ("plain.md", "no headings"),
        ]);
        let candidates = b.candidates(CandidateGranularity::Section);
        let labels: Vec<String> = candidates.iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["a.md#Title", "a.md#One", "a.md#Two", "plain.md"]);
        assert_eq!(candidates[0].content, "# Title\nintro");
        assert_eq!(candidates[1].content, "## One\nfirst\n### Deep\nx");
        assert_eq!(candidates[0].metadata.quality_score, Some(70.0));
    }

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count_tokens(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    #[test]
    fn test_custom_counter_prices_every_granularity() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda";
        let b = bank(&[("words.md", text), ("split.md", "# One
first part
## Two
second part here
")])
            .with_token_counter(Box::new(WordCounter));

        let docs = b.candidates(CandidateGranularity::Document);
        assert_eq!(docs[0].token_count, 11);
        assert_ne!(docs[0].token_count, b.document("words.md").unwrap().token_count);
        assert_eq!(docs[1].token_count, 9);

        let sections = b.candidates(CandidateGranularity::Section);
        assert_eq!(sections[0].token_count, 11);
        assert_eq!(sections[1].token_count, 4);
        assert_eq!(sections[2].token_count, 5);
    }

    #[test]
    fn test_optimize_respects_budget() {
        let b = bank(&[
            ("bug.md", "The login bug happens when the session expires"),
            ("other.md", "Unrelated deployment notes for staging servers"),
        ]);
        let result = b
            .optimize("login bug", 15, Strategy::Priority, CandidateGranularity::Document)
            .unwrap();
        assert!(result.total_tokens <= 15);
        assert!(result.is_selected("bug.md", None));
        assert!(b.optimize("  ", 100, Strategy::Priority, CandidateGranularity::Document).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = BankConfig::default();
        config.tokens.chars_per_token = 0;
        assert!(MemoryBank::from_documents(Vec::new(), config).is_err());
    }
}
