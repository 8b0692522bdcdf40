//! Token-budgeted context selection.
//!
//! Candidates are visited by descending score (ties: graph insertion order,
//! then candidate order) and selected atomically: a section or a whole
//! document is either fully in or out. The selection never exceeds the
//! budget, and every candidate left out carries a reason code.
//!
//! Strategies:
//! - `priority`: first-fit greedy by score
//! - `dependency`: each selected candidate first pulls in its dependency
//!   closure, charged against the same budget
//! - `hybrid`: `priority`, then a closure backfill for selected candidates
//!   when enough budget is left over

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::OptimizerConfig;
use crate::graph::DependencyGraph;
use crate::relevance::{Candidate, RelevanceScorer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Priority,
    Dependency,
    Hybrid,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Priority => "priority",
            Strategy::Dependency => "dependency",
            Strategy::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "priority" => Ok(Strategy::Priority),
            "dependency" | "dependencies" => Ok(Strategy::Dependency),
            "hybrid" => Ok(Strategy::Hybrid),
            other => Err(format!(
                "unknown strategy '{}' (expected priority, dependency or hybrid)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    BudgetExhausted,
    BelowThreshold,
    DependencyClosureExceedsBudget,
    /// Overlaps content already selected from the same document
    CoveredBySelection,
}

impl ExclusionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionReason::BudgetExhausted => "budget_exhausted",
            ExclusionReason::BelowThreshold => "below_threshold",
            ExclusionReason::DependencyClosureExceedsBudget => "dependency_closure_exceeds_budget",
            ExclusionReason::CoveredBySelection => "covered_by_selection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InclusionKind {
    /// Selected on its own score
    Relevance,
    /// Pulled in as a dependency of another selection
    Dependency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedItem {
    pub document: String,
    pub section: Option<String>,
    pub content: String,
    pub tokens: usize,
    pub score: f64,
    pub inclusion: InclusionKind,
    /// Candidate whose dependency closure brought this item in
    pub required_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub document: String,
    pub section: Option<String>,
    pub reason: ExclusionReason,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub selected: Vec<SelectedItem>,
    pub total_tokens: usize,
    pub budget: i64,
    pub excluded: Vec<Exclusion>,
    pub strategy_used: Strategy,
}

impl OptimizationResult {
    pub fn remaining_budget(&self) -> i64 {
        self.budget - self.total_tokens as i64
    }

    /// Share of the budget used, in `[0, 1]`.
    pub fn utilization(&self) -> f64 {
        if self.budget <= 0 {
            return 0.0;
        }
        self.total_tokens as f64 / self.budget as f64
    }

    pub fn is_selected(&self, document: &str, section: Option<&str>) -> bool {
        self.selected
            .iter()
            .any(|s| s.document == document && s.section.as_deref() == section)
    }
}

/// Mutable state of one optimisation run.
struct Selection<'a> {
    candidates: &'a [Candidate],
    scores: Vec<f64>,
    budget: usize,
    used: usize,
    order: Vec<usize>,
    chosen: Vec<bool>,
    inclusion: Vec<(InclusionKind, Option<String>)>,
    reasons: Vec<Option<(ExclusionReason, String)>>,
}

impl<'a> Selection<'a> {
    fn new(candidates: &'a [Candidate], scores: &[f64], budget: usize) -> Self {
        let n = candidates.len();
        Self {
            candidates,
            scores: (0..n).map(|i| scores.get(i).copied().unwrap_or(0.0)).collect(),
            budget,
            used: 0,
            order: Vec::new(),
            chosen: vec![false; n],
            inclusion: vec![(InclusionKind::Relevance, None); n],
            reasons: vec![None; n],
        }
    }

    fn remaining(&self) -> usize {
        self.budget - self.used
    }

    fn tokens(&self, idx: usize) -> usize {
        self.candidates[idx].token_count
    }

    fn exclude(&mut self, idx: usize, reason: ExclusionReason, message: String) {
        tracing::debug!(
            "Excluding {}: {} ({})",
            self.candidates[idx].label(),
            reason.as_str(),
            message
        );
        self.reasons[idx] = Some((reason, message));
    }

    fn choose(&mut self, idx: usize, kind: InclusionKind, required_by: Option<String>) {
        self.used += self.tokens(idx);
        self.chosen[idx] = true;
        self.inclusion[idx] = (kind, required_by);
        self.reasons[idx] = None;
        self.order.push(idx);
    }

    /// Chosen candidate of the same document that overlaps `idx`.
    fn overlapping(&self, idx: usize) -> Option<usize> {
        let c = &self.candidates[idx];
        (0..self.candidates.len()).find(|&other| {
            let o = &self.candidates[other];
            self.chosen[other]
                && other != idx
                && o.document == c.document
                && (o.section.is_none() || c.section.is_none() || o.section == c.section)
        })
    }

    /// Candidates that would bring `document` into the selection.
    fn document_units(&self, document: &str) -> Vec<usize> {
        let of_doc: Vec<usize> = (0..self.candidates.len())
            .filter(|&i| self.candidates[i].document == document)
            .collect();

        if of_doc.iter().any(|&i| self.chosen[i] && self.candidates[i].section.is_none()) {
            return Vec::new();
        }
        let any_section_chosen = of_doc.iter().any(|&i| self.chosen[i]);
        if !any_section_chosen {
            if let Some(&whole) = of_doc.iter().find(|&&i| self.candidates[i].section.is_none()) {
                return vec![whole];
            }
        }
        of_doc
            .into_iter()
            .filter(|&i| !self.chosen[i] && self.candidates[i].section.is_some())
            .collect()
    }

    /// Unselected units of the dependency closure of candidate `idx`.
    fn closure_units(&self, idx: usize, graph: &DependencyGraph, depth: usize) -> Vec<usize> {
        let document = &self.candidates[idx].document;
        let mut units: Vec<usize> = Vec::new();
        for dep in graph.dependency_closure(document, depth) {
            if dep == *document {
                continue;
            }
            let found = self.document_units(&dep);
            if found.is_empty() && !(0..self.candidates.len()).any(|i| self.candidates[i].document == dep) {
                tracing::debug!("Dependency {} of {} is not among the candidates", dep, document);
            }
            for unit in found {
                if unit != idx && !units.contains(&unit) {
                    units.push(unit);
                }
            }
        }
        units
    }

    fn into_result(self, budget: i64, strategy: Strategy) -> OptimizationResult {
        let selected = self
            .order
            .iter()
            .map(|&idx| {
                let c = &self.candidates[idx];
                let (inclusion, required_by) = self.inclusion[idx].clone();
                SelectedItem {
                    document: c.document.clone(),
                    section: c.section.clone(),
                    content: c.content.clone(),
                    tokens: c.token_count,
                    score: self.scores[idx],
                    inclusion,
                    required_by,
                }
            })
            .collect();

        let excluded = (0..self.candidates.len())
            .filter(|&idx| !self.chosen[idx])
            .map(|idx| {
                let c = &self.candidates[idx];
                let (reason, message) = self.reasons[idx].clone().unwrap_or((
                    ExclusionReason::BudgetExhausted,
                    "not reached before the budget ran out".to_string(),
                ));
                Exclusion {
                    document: c.document.clone(),
                    section: c.section.clone(),
                    reason,
                    message,
                }
            })
            .collect();

        OptimizationResult {
            selected,
            total_tokens: self.used,
            budget,
            excluded,
            strategy_used: strategy,
        }
    }
}

pub struct ContextOptimizer {
    config: OptimizerConfig,
    scorer: RelevanceScorer,
}

impl ContextOptimizer {
    pub fn new(config: OptimizerConfig, scorer: RelevanceScorer) -> Self {
        Self { config, scorer }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Score candidates against the task and select within `token_budget`.
    pub fn optimize(
        &self,
        task_description: &str,
        candidates: &[Candidate],
        graph: &DependencyGraph,
        token_budget: i64,
        strategy: Strategy,
    ) -> OptimizationResult {
        let scores: Vec<f64> = self
            .scorer
            .score(task_description, candidates, graph)
            .into_iter()
            .map(|s| s.score)
            .collect();
        self.optimize_scored(candidates, &scores, graph, token_budget, strategy)
    }

    /// Select with precomputed scores aligned with `candidates`.
    pub fn optimize_scored(
        &self,
        candidates: &[Candidate],
        scores: &[f64],
        graph: &DependencyGraph,
        token_budget: i64,
        strategy: Strategy,
    ) -> OptimizationResult {
        let budget = usize::try_from(token_budget).unwrap_or(0);
        let mut selection = Selection::new(candidates, scores, budget);

        if budget == 0 {
            for idx in 0..candidates.len() {
                selection.exclude(
                    idx,
                    ExclusionReason::BudgetExhausted,
                    format!("token budget is {}", token_budget),
                );
            }
            return selection.into_result(token_budget, strategy);
        }

        let ranked = Self::rank(candidates, &selection.scores, graph);
        match strategy {
            Strategy::Priority => self.priority_pass(&mut selection, &ranked),
            Strategy::Dependency => self.dependency_pass(&mut selection, &ranked, graph),
            Strategy::Hybrid => {
                self.priority_pass(&mut selection, &ranked);
                let slack = self.config.hybrid_slack * budget as f64;
                if selection.remaining() as f64 >= slack {
                    self.backfill_pass(&mut selection, graph);
                }
            }
        }

        let result = selection.into_result(token_budget, strategy);
        tracing::debug!(
            "Selected {} of {} candidates ({} / {} tokens, {})",
            result.selected.len(),
            candidates.len(),
            result.total_tokens,
            token_budget,
            strategy
        );
        result
    }

    fn rank(candidates: &[Candidate], scores: &[f64], graph: &DependencyGraph) -> Vec<usize> {
        let mut ranked: Vec<usize> = (0..candidates.len()).collect();
        ranked.sort_by(|&a, &b| {
            let rank = |i: usize| graph.insertion_rank(&candidates[i].document).unwrap_or(usize::MAX);
            scores[b]
                .total_cmp(&scores[a])
                .then_with(|| rank(a).cmp(&rank(b)))
                .then_with(|| a.cmp(&b))
        });
        ranked
    }

    /// Shared admission checks. Returns false when the candidate was skipped.
    fn admissible(&self, selection: &mut Selection<'_>, idx: usize) -> bool {
        if selection.chosen[idx] {
            return false;
        }
        let score = selection.scores[idx];
        if score < self.config.min_score {
            selection.exclude(
                idx,
                ExclusionReason::BelowThreshold,
                format!("score {:.3} is below the minimum {:.3}", score, self.config.min_score),
            );
            return false;
        }
        if let Some(other) = selection.overlapping(idx) {
            let label = selection.candidates[other].label();
            selection.exclude(
                idx,
                ExclusionReason::CoveredBySelection,
                format!("overlaps already selected {}", label),
            );
            return false;
        }
        true
    }

    fn priority_pass(&self, selection: &mut Selection<'_>, ranked: &[usize]) {
        for &idx in ranked {
            if !self.admissible(selection, idx) {
                continue;
            }
            let tokens = selection.tokens(idx);
            if tokens > selection.remaining() {
                let message = format!(
                    "needs {} tokens but only {} of {} remain",
                    tokens,
                    selection.remaining(),
                    selection.budget
                );
                selection.exclude(idx, ExclusionReason::BudgetExhausted, message);
                continue;
            }
            selection.choose(idx, InclusionKind::Relevance, None);
        }
    }

    fn dependency_pass(&self, selection: &mut Selection<'_>, ranked: &[usize], graph: &DependencyGraph) {
        for &idx in ranked {
            if !self.admissible(selection, idx) {
                continue;
            }

            let units = selection.closure_units(idx, graph, self.config.dependency_depth);
            let closure_cost: usize = units.iter().map(|&u| selection.tokens(u)).sum();
            let tokens = selection.tokens(idx);
            let remaining = selection.remaining();

            if closure_cost > remaining {
                let message = format!(
                    "dependency closure of {} needs {} tokens but only {} remain",
                    selection.candidates[idx].label(),
                    closure_cost,
                    remaining
                );
                selection.exclude(idx, ExclusionReason::DependencyClosureExceedsBudget, message);
                continue;
            }
            if closure_cost + tokens > remaining {
                let message = format!(
                    "needs {} tokens plus {} for dependencies but only {} remain",
                    tokens, closure_cost, remaining
                );
                selection.exclude(idx, ExclusionReason::BudgetExhausted, message);
                continue;
            }

            let label = selection.candidates[idx].label();
            for unit in units {
                selection.choose(unit, InclusionKind::Dependency, Some(label.clone()));
            }
            selection.choose(idx, InclusionKind::Relevance, None);
        }
    }

    /// Pull dependency closures of already selected candidates into the
    /// leftover budget, placing each dependency before its dependent.
    fn backfill_pass(&self, selection: &mut Selection<'_>, graph: &DependencyGraph) {
        let primaries: Vec<usize> = selection.order.clone();
        for primary in primaries {
            let units = selection.closure_units(primary, graph, self.config.dependency_depth);
            let label = selection.candidates[primary].label();
            for unit in units {
                if selection.chosen[unit] || selection.overlapping(unit).is_some() {
                    continue;
                }
                if selection.tokens(unit) > selection.remaining() {
                    continue;
                }
                selection.choose(unit, InclusionKind::Dependency, Some(label.clone()));

                // choose() appended; move it in front of its dependent
                selection.order.pop();
                let at = selection
                    .order
                    .iter()
                    .position(|&i| i == primary)
                    .unwrap_or(selection.order.len());
                selection.order.insert(at, unit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScorerWeights;
    use crate::graph::EdgeKind;

    fn optimizer() -> ContextOptimizer {
        ContextOptimizer::new(
            OptimizerConfig::default(),
            RelevanceScorer::new(ScorerWeights::default()).with_reference_time(0),
        )
    }

    fn cand(doc: &str, tokens: usize) -> Candidate {
        Candidate::new(doc, None, format!("content of {}", doc), tokens)
    }

    fn section(doc: &str, section: &str, tokens: usize) -> Candidate {
        Candidate::new(doc, Some(section.to_string()), format!("{}#{}", doc, section), tokens)
    }

    fn reason_of(result: &OptimizationResult, doc: &str) -> Option<ExclusionReason> {
        result.excluded.iter().find(|e| e.document == doc).map(|e| e.reason)
    }

    #[test]
    fn test_priority_selects_within_budget() {
        let candidates = vec![cand("a", 500), cand("b", 800)];
        let result = optimizer().optimize_scored(
            &candidates,
            &[0.9, 0.5],
            &DependencyGraph::new(),
            600,
            Strategy::Priority,
        );

        assert_eq!(result.selected.len(), 1);
        assert_eq!(result.selected[0].document, "a");
        assert_eq!(result.total_tokens, 500);
        assert_eq!(reason_of(&result, "b"), Some(ExclusionReason::BudgetExhausted));
        assert_eq!(result.strategy_used, Strategy::Priority);
    }

    #[test]
    fn test_priority_is_first_fit() {
        let candidates = vec![cand("big", 900), cand("small", 100), cand("top", 500)];
        let result = optimizer().optimize_scored(
            &candidates,
            &[0.8, 0.2, 0.9],
            &DependencyGraph::new(),
            700,
            Strategy::Priority,
        );
        let docs: Vec<&str> = result.selected.iter().map(|s| s.document.as_str()).collect();
        assert_eq!(docs, vec!["top", "small"]);
        assert_eq!(reason_of(&result, "big"), Some(ExclusionReason::BudgetExhausted));
    }

    #[test]
    fn test_ties_follow_graph_insertion_order() {
        let mut graph = DependencyGraph::new();
        graph.add_node("second").unwrap();
        graph.add_node("first").unwrap();
        let candidates = vec![cand("first", 10), cand("second", 10)];
        let result =
            optimizer().optimize_scored(&candidates, &[0.5, 0.5], &graph, 100, Strategy::Priority);
        assert_eq!(result.selected[0].document, "second");
    }

    #[test]
    fn test_zero_or_negative_budget_selects_nothing() {
        let candidates = vec![cand("a", 0), cand("b", 10)];
        for budget in [0, -5] {
            let result = optimizer().optimize_scored(
                &candidates,
                &[1.0, 0.01],
                &DependencyGraph::new(),
                budget,
                Strategy::Hybrid,
            );
            assert!(result.selected.is_empty());
            assert_eq!(result.excluded.len(), 2);
            assert!(result
                .excluded
                .iter()
                .all(|e| e.reason == ExclusionReason::BudgetExhausted));
        }
    }

    #[test]
    fn test_below_threshold() {
        let candidates = vec![cand("a", 10)];
        let result = optimizer().optimize_scored(
            &candidates,
            &[0.01],
            &DependencyGraph::new(),
            100,
            Strategy::Priority,
        );
        assert_eq!(reason_of(&result, "a"), Some(ExclusionReason::BelowThreshold));
        assert!(!result.excluded[0].message.is_empty());
    }

    #[test]
    fn test_dependency_strategy_loads_closure_first() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("task", "glossary", EdgeKind::MarkdownLink).unwrap();
        graph.add_edge("glossary", "brief", EdgeKind::Static).unwrap();

        let candidates = vec![cand("task", 100), cand("glossary", 50), cand("brief", 30)];
        let result = optimizer().optimize_scored(
            &candidates,
            &[0.9, 0.01, 0.01],
            &graph,
            200,
            Strategy::Dependency,
        );

        let docs: Vec<&str> = result.selected.iter().map(|s| s.document.as_str()).collect();
        assert_eq!(docs, vec!["brief", "glossary", "task"]);
        assert_eq!(result.selected[0].inclusion, InclusionKind::Dependency);
        assert_eq!(result.selected[0].required_by.as_deref(), Some("task"));
        assert_eq!(result.total_tokens, 180);
        assert!(result.excluded.is_empty());
    }

    #[test]
    fn test_dependency_closure_exceeding_budget() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("task", "huge", EdgeKind::MarkdownLink).unwrap();

        let candidates = vec![cand("task", 10), cand("huge", 500), cand("other", 20)];
        let result = optimizer().optimize_scored(
            &candidates,
            &[0.9, 0.3, 0.5],
            &graph,
            100,
            Strategy::Dependency,
        );

        assert_eq!(
            reason_of(&result, "task"),
            Some(ExclusionReason::DependencyClosureExceedsBudget)
        );
        assert_eq!(reason_of(&result, "huge"), Some(ExclusionReason::BudgetExhausted));
        assert!(result.is_selected("other", None));
    }

    #[test]
    fn test_hybrid_backfills_with_slack() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("task", "context", EdgeKind::Transclusion).unwrap();

        let candidates = vec![cand("task", 100), cand("context", 50)];
        let result = optimizer().optimize_scored(
            &candidates,
            &[0.9, 0.01],
            &graph,
            1000,
            Strategy::Hybrid,
        );

        let docs: Vec<&str> = result.selected.iter().map(|s| s.document.as_str()).collect();
        assert_eq!(docs, vec!["context", "task"]);
        assert_eq!(result.selected[0].inclusion, InclusionKind::Dependency);
        assert!(result.excluded.is_empty());
    }

    #[test]
    fn test_hybrid_skips_backfill_without_slack() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("task", "context", EdgeKind::Transclusion).unwrap();

        let candidates = vec![cand("task", 95), cand("context", 5)];
        let result =
            optimizer().optimize_scored(&candidates, &[0.9, 0.01], &graph, 100, Strategy::Hybrid);

        assert_eq!(result.selected.len(), 1);
        assert_eq!(reason_of(&result, "context"), Some(ExclusionReason::BelowThreshold));
    }

    #[test]
    fn test_sections_do_not_overlap_whole_document() {
        let candidates = vec![cand("a", 100), section("a", "Intro", 20), section("a", "Usage", 20)];
        let result = optimizer().optimize_scored(
            &candidates,
            &[0.9, 0.8, 0.7],
            &DependencyGraph::new(),
            1000,
            Strategy::Priority,
        );
        assert_eq!(result.selected.len(), 1);
        assert_eq!(result.excluded.len(), 2);
        assert!(result
            .excluded
            .iter()
            .all(|e| e.reason == ExclusionReason::CoveredBySelection));
    }

    #[test]
    fn test_dependency_on_sectioned_document_pulls_sections() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("task", "rules", EdgeKind::MarkdownLink).unwrap();

        let candidates = vec![cand("task", 10), section("rules", "A", 5), section("rules", "B", 5)];
        let result = optimizer().optimize_scored(
            &candidates,
            &[0.9, 0.0, 0.0],
            &graph,
            100,
            Strategy::Dependency,
        );
        assert_eq!(result.selected.len(), 3);
        assert_eq!(result.selected[2].document, "task");
        assert_eq!(result.total_tokens, 20);
    }

    #[test]
    fn test_scored_end_to_end_is_deterministic() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("bug.md", "arch.md", EdgeKind::MarkdownLink).unwrap();
        let candidates = vec![
            Candidate::new("bug.md", None, "login bug in session handling", 40),
            Candidate::new("arch.md", None, "session architecture overview", 60),
            Candidate::new("misc.md", None, "unrelated notes", 30),
        ];
        let opt = optimizer();
        let first = opt.optimize("fix login bug", &candidates, &graph, 120, Strategy::Hybrid);
        let second = opt.optimize("fix login bug", &candidates, &graph, 120, Strategy::Hybrid);

        assert_eq!(first, second);
        assert!(first.total_tokens <= 120);
        assert!(first.is_selected("bug.md", None));
        let accounted = first.selected.len() + first.excluded.len();
        assert_eq!(accounted, candidates.len());
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Hybrid".parse::<Strategy>().unwrap(), Strategy::Hybrid);
        assert_eq!("dependency".parse::<Strategy>().unwrap(), Strategy::Dependency);
        assert!("random".parse::<Strategy>().is_err());
    }
}
