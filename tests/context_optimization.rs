//! Integration tests for relevance scoring and token-budgeted selection.

use std::fs;

use tempfile::TempDir;

use memory_bank::config::{OptimizerConfig, ScorerWeights};
use memory_bank::graph::{DependencyGraph, EdgeKind};
use memory_bank::{
    Candidate, CandidateGranularity, ContextOptimizer, ExclusionReason, MemoryBank,
    OptimizationResult, RelevanceScorer, Strategy,
};

// ============================================================================
// Test Helpers
// ============================================================================

const NOW: u64 = 1_700_000_000;

fn optimizer() -> ContextOptimizer {
    ContextOptimizer::new(
        OptimizerConfig::default(),
        RelevanceScorer::new(ScorerWeights::default()).with_reference_time(NOW),
    )
}

fn candidate(doc: &str, tokens: usize) -> Candidate {
    Candidate::new(doc, None, format!("{} body", doc), tokens)
}

fn assert_invariants(result: &OptimizationResult, candidate_count: usize) {
    let total: usize = result.selected.iter().map(|s| s.tokens).sum();
    assert_eq!(total, result.total_tokens);
    assert!(result.total_tokens as i64 <= result.budget.max(0));
    assert!(result.excluded.iter().all(|e| !e.message.is_empty()));
    assert_eq!(result.selected.len() + result.excluded.len(), candidate_count);
}

fn create_bank(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    for (name, content) in files {
        fs::write(temp_dir.path().join(name), content).expect("Failed to write document");
    }
    temp_dir
}

// ============================================================================
// Selection Tests
// ============================================================================

mod selection {
    use super::*;

    #[test]
    fn test_priority_excludes_what_does_not_fit() {
        let candidates = vec![candidate("a", 500), candidate("b", 800)];
        let result = optimizer().optimize_scored(
            &candidates,
            &[0.9, 0.5],
            &DependencyGraph::new(),
            600,
            Strategy::Priority,
        );

        assert_eq!(result.selected.len(), 1);
        assert_eq!(result.selected[0].document, "a");
        assert_eq!(result.excluded.len(), 1);
        assert_eq!(result.excluded[0].document, "b");
        assert_eq!(result.excluded[0].reason, ExclusionReason::BudgetExhausted);
        assert_eq!(result.excluded[0].reason.as_str(), "budget_exhausted");
    }

    #[test]
    fn test_budget_invariant_for_all_strategies() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("c0", "c1", EdgeKind::MarkdownLink).unwrap();
        graph.add_edge("c1", "c2", EdgeKind::Transclusion).unwrap();
        graph.add_edge("c3", "c4", EdgeKind::Static).unwrap();
        graph.add_edge("c5", "c0", EdgeKind::MarkdownLink).unwrap();

        let candidates: Vec<Candidate> = (0..8)
            .map(|i| candidate(&format!("c{}", i), 40 + i * 35))
            .collect();
        let scores: Vec<f64> = (0..8).map(|i| 1.0 - i as f64 * 0.11).collect();

        for strategy in [Strategy::Priority, Strategy::Dependency, Strategy::Hybrid] {
            for budget in [-10, 0, 1, 50, 150, 333, 600, 10_000] {
                let result =
                    optimizer().optimize_scored(&candidates, &scores, &graph, budget, strategy);
                assert_invariants(&result, candidates.len());
            }
        }
    }

    #[test]
    fn test_dependency_strategy_keeps_closures_whole() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("feature.md", "architecture.md", EdgeKind::MarkdownLink).unwrap();

        let candidates = vec![candidate("feature.md", 100), candidate("architecture.md", 100)];
        let result = optimizer().optimize_scored(
            &candidates,
            &[0.9, 0.2],
            &graph,
            150,
            Strategy::Dependency,
        );

        assert!(result.selected.iter().all(|s| s.document != "feature.md"));
        let feature = result
            .excluded
            .iter()
            .find(|e| e.document == "feature.md")
            .unwrap();
        assert_eq!(feature.reason, ExclusionReason::BudgetExhausted);
    }

    #[test]
    fn test_optimization_is_deterministic() {
        let candidates = vec![
            Candidate::new("a.md", None, "parser bug in tables", 30),
            Candidate::new("b.md", None, "parser overview", 30),
            Candidate::new("c.md", None, "tables and lists", 30),
        ];
        let graph = DependencyGraph::new();

        let first = optimizer().optimize("parser bug", &candidates, &graph, 70, Strategy::Hybrid);
        let second = optimizer().optimize("parser bug", &candidates, &graph, 70, Strategy::Hybrid);
        assert_eq!(first, second);
        assert_eq!(first.selected[0].document, "a.md");
    }
}

// ============================================================================
// Memory Bank Tests
// ============================================================================

mod memory_bank_selection {
    use super::*;

    #[test]
    fn test_section_granularity_selects_relevant_section() {
        let dir = create_bank(&[(
            "systemPatterns.md",
            "# System Patterns\n## Caching\nResolution cache keyed by content hash.\n## Logging\nStructured tracing output everywhere in every module.\n",
        )]);
        let bank = MemoryBank::open(dir.path()).unwrap();

        let result = bank
            .optimize("cache hash", 20, Strategy::Priority, CandidateGranularity::Section)
            .unwrap();
        assert!(result.is_selected("systemPatterns.md", Some("Caching")));
        assert!(!result.is_selected("systemPatterns.md", Some("Logging")));
        assert!(result.total_tokens <= 20);
    }

    #[test]
    fn test_dependency_strategy_through_bank() {
        let dir = create_bank(&[
            ("activeContext.md", "Working on the login bug, see [patterns](systemPatterns.md)"),
            ("systemPatterns.md", "Sessions are stored server side"),
            ("progress.md", "Release notes"),
        ]);
        let bank = MemoryBank::open(dir.path()).unwrap();

        let result = bank
            .optimize("login bug", 1000, Strategy::Dependency, CandidateGranularity::Document)
            .unwrap();
        let docs: Vec<&str> = result.selected.iter().map(|s| s.document.as_str()).collect();
        let patterns = docs.iter().position(|d| *d == "systemPatterns.md").unwrap();
        let active = docs.iter().position(|d| *d == "activeContext.md").unwrap();
        assert!(patterns < active);
    }

    #[test]
    fn test_result_serializes_with_reason_codes() {
        let dir = create_bank(&[("a.md", "alpha"), ("b.md", "beta")]);
        let bank = MemoryBank::open(dir.path()).unwrap();

        let result = bank
            .optimize("alpha", 0, Strategy::Hybrid, CandidateGranularity::Document)
            .unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["selected"].as_array().unwrap().len(), 0);
        assert_eq!(json["excluded"][0]["reason"], "budget_exhausted");
        assert_eq!(json["strategy_used"], "hybrid");
    }
}
