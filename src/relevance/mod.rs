//! Relevance scoring of candidate documents and sections against a task.
//!
//! Signals:
//! - keyword overlap: share of task terms found in the candidate (primary)
//! - recency: exponential decay of `last_modified` age
//! - quality: externally supplied 0-100 quality, normalised
//! - dependency boost: flat bonus for direct dependencies of candidates whose
//!   base score reaches `boost_threshold`
//!
//! Scoring is deterministic for a fixed reference time.

pub mod terms;

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::ScorerWeights;
use crate::graph::DependencyGraph;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetadata {
    /// Unix timestamp in seconds
    pub last_modified: Option<u64>,
    /// Quality on a 0-100 scale
    pub quality_score: Option<f64>,
}

/// A unit the optimizer may select: a whole document or one section of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub document: String,
    pub section: Option<String>,
    pub content: String,
    /// Cost supplied by the token counter
    pub token_count: usize,
    pub metadata: CandidateMetadata,
}

impl Candidate {
    pub fn new(
        document: impl Into<String>,
        section: Option<String>,
        content: impl Into<String>,
        token_count: usize,
    ) -> Self {
        Self {
            document: document.into(),
            section,
            content: content.into(),
            token_count,
            metadata: CandidateMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: CandidateMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// `document` or `document#section`.
    pub fn label(&self) -> String {
        match &self.section {
            Some(section) => format!("{}#{}", self.document, section),
            None => self.document.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RelevanceSignals {
    pub keyword_overlap: f64,
    pub recency: f64,
    pub quality: f64,
    pub dependency_boost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub document: String,
    pub section: Option<String>,
    /// Final score in `[0, 1]`
    pub score: f64,
    pub signals: RelevanceSignals,
}

pub struct RelevanceScorer {
    weights: ScorerWeights,
    reference_time: u64,
}

impl RelevanceScorer {
    /// Scorer measuring recency against the current time.
    pub fn new(weights: ScorerWeights) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            weights,
            reference_time: now,
        }
    }

    /// Pin the "now" used by the recency signal.
    pub fn with_reference_time(mut self, unix_secs: u64) -> Self {
        self.reference_time = unix_secs;
        self
    }

    pub fn weights(&self) -> &ScorerWeights {
        &self.weights
    }

    /// Score every candidate. The output is aligned with `candidates`.
    pub fn score(
        &self,
        task_description: &str,
        candidates: &[Candidate],
        graph: &DependencyGraph,
    ) -> Vec<RelevanceScore> {
        let task_terms: BTreeSet<String> = terms::terms(task_description).into_iter().collect();

        let base: Vec<(RelevanceSignals, f64)> = candidates
            .iter()
            .map(|c| {
                let signals = RelevanceSignals {
                    keyword_overlap: Self::keyword_overlap(&task_terms, c),
                    recency: self.recency(c.metadata.last_modified),
                    quality: self.quality(c.metadata.quality_score),
                    dependency_boost: 0.0,
                };
                let score = self.weighted(&signals);
                (signals, score)
            })
            .collect();

        // Dependencies of strong candidates get a bounded boost
        let mut boosted: BTreeSet<&str> = BTreeSet::new();
        for (candidate, (_, score)) in candidates.iter().zip(&base) {
            if *score < self.weights.boost_threshold {
                continue;
            }
            for dep in graph.get_dependencies(&candidate.document) {
                if dep != candidate.document {
                    boosted.insert(dep);
                }
            }
        }

        candidates
            .iter()
            .zip(base)
            .map(|(candidate, (mut signals, score))| {
                if boosted.contains(candidate.document.as_str()) {
                    signals.dependency_boost = self.weights.dependency_boost;
                }
                RelevanceScore {
                    document: candidate.document.clone(),
                    section: candidate.section.clone(),
                    score: (score + signals.dependency_boost).clamp(0.0, 1.0),
                    signals,
                }
            })
            .collect()
    }

    fn keyword_overlap(task_terms: &BTreeSet<String>, candidate: &Candidate) -> f64 {
        if task_terms.is_empty() {
            return 0.0;
        }
        let mut text = String::with_capacity(candidate.content.len() + 64);
        text.push_str(&candidate.document);
        text.push(' ');
        if let Some(section) = &candidate.section {
            text.push_str(section);
            text.push(' ');
        }
        text.push_str(&candidate.content);

        let candidate_terms: BTreeSet<String> = terms::terms(&text).into_iter().collect();
        let matched = task_terms.intersection(&candidate_terms).count();
        matched as f64 / task_terms.len() as f64
    }

    fn recency(&self, last_modified: Option<u64>) -> f64 {
        let Some(modified) = last_modified else {
            return 0.0;
        };
        let age_days = self.reference_time.saturating_sub(modified) as f64 / SECONDS_PER_DAY;
        0.5_f64.powf(age_days / self.weights.recency_half_life_days)
    }

    fn quality(&self, quality_score: Option<f64>) -> f64 {
        match quality_score {
            Some(q) if q.is_finite() => (q / 100.0).clamp(0.0, 1.0),
            _ => self.weights.default_quality,
        }
    }

    fn weighted(&self, s: &RelevanceSignals) -> f64 {
        let w = &self.weights;
        let total = w.keyword + w.recency + w.quality;
        if total <= 0.0 {
            return 0.0;
        }
        (s.keyword_overlap * w.keyword + s.recency * w.recency + s.quality * w.quality) / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;

    const NOW: u64 = 1_700_000_000;

    fn scorer() -> RelevanceScorer {
        RelevanceScorer::new(ScorerWeights::default()).with_reference_time(NOW)
    }

    fn candidate(doc: &str, content: &str) -> Candidate {
        Candidate::new(doc, None, content, content.len() / 4)
    }

    #[test]
    fn test_keyword_overlap_is_primary_signal() {
        let candidates = vec![
            candidate("a.md", "The parser fails on nested lists, a known bug"),
            candidate("b.md", "Deployment notes for staging"),
        ];
        let scores = scorer().score("fix parser bug", &candidates, &DependencyGraph::new());

        assert_eq!(scores[0].signals.keyword_overlap, 2.0 / 3.0);
        assert_eq!(scores[1].signals.keyword_overlap, 0.0);
        assert!(scores[0].score > scores[1].score);
    }

    #[test]
    fn test_document_name_counts_as_content() {
        let candidates = vec![candidate("techContext.md", "Rust 1.80")];
        let scores = scorer().score("tech context", &candidates, &DependencyGraph::new());
        assert_eq!(scores[0].signals.keyword_overlap, 1.0);
    }

    #[test]
    fn test_recency_decays_by_half_life() {
        let week = 7 * 86_400;
        let s = scorer();
        assert_eq!(s.recency(Some(NOW)), 1.0);
        assert!((s.recency(Some(NOW - week)) - 0.5).abs() < 1e-9);
        assert_eq!(s.recency(Some(NOW + 100)), 1.0);
        assert_eq!(s.recency(None), 0.0);
    }

    #[test]
    fn test_quality_normalised() {
        let s = scorer();
        assert_eq!(s.quality(Some(80.0)), 0.8);
        assert_eq!(s.quality(Some(250.0)), 1.0);
        assert_eq!(s.quality(None), 0.5);
    }

    #[test]
    fn test_dependency_boost_for_strong_dependents() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("bug.md", "glossary.md", EdgeKind::MarkdownLink).unwrap();
        graph.add_edge("other.md", "unrelated.md", EdgeKind::MarkdownLink).unwrap();

        let meta = CandidateMetadata {
            last_modified: Some(NOW),
            quality_score: Some(100.0),
        };
        let candidates = vec![
            candidate("bug.md", "login bug crash").with_metadata(meta.clone()),
            candidate("glossary.md", "terms"),
            candidate("unrelated.md", "terms"),
        ];
        let scores = scorer().score("login bug crash", &candidates, &graph);

        assert_eq!(scores[0].score, 1.0);
        assert_eq!(scores[1].signals.dependency_boost, 0.1);
        assert_eq!(scores[2].signals.dependency_boost, 0.0);
        assert!(scores[1].score > scores[2].score);
    }

    #[test]
    fn test_scores_are_bounded_and_deterministic() {
        let weights = ScorerWeights {
            dependency_boost: 0.9,
            ..ScorerWeights::default()
        };
        let s = RelevanceScorer::new(weights).with_reference_time(NOW);
        let mut graph = DependencyGraph::new();
        graph.add_edge("a.md", "b.md", EdgeKind::Transclusion).unwrap();
        graph.add_edge("b.md", "a.md", EdgeKind::Transclusion).unwrap();

        let meta = CandidateMetadata {
            last_modified: Some(NOW),
            quality_score: Some(100.0),
        };
        let candidates = vec![
            candidate("a.md", "alpha beta").with_metadata(meta.clone()),
            candidate("b.md", "alpha beta").with_metadata(meta),
        ];
        let first = s.score("alpha beta", &candidates, &graph);
        let second = s.score("alpha beta", &candidates, &graph);

        assert_eq!(first, second);
        assert!(first.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[test]
    fn test_empty_task_scores_metadata_only() {
        let candidates = vec![candidate("a.md", "anything")];
        let scores = scorer().score("the and of", &candidates, &DependencyGraph::new());
        assert_eq!(scores[0].signals.keyword_overlap, 0.0);
        // quality default 0.5 weighted 0.25 of 1.0
        assert!((scores[0].score - 0.125).abs() < 1e-9);
    }
}
