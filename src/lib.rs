pub mod bank;
pub mod config;
pub mod document;
pub mod error;
pub mod graph;
pub mod links;
pub mod optimizer;
pub mod relevance;
pub mod tokens;
pub mod transclusion;
pub mod validate;

pub use bank::{BankStats, CandidateGranularity, MemoryBank};
pub use config::{BankConfig, OptimizerConfig, ScorerWeights};
pub use document::{BankLoader, Document, DocumentSet, DocumentStore, FrontMatter, Section};
pub use error::{MemoryBankError, Result};
pub use graph::{DependencyGraph, EdgeKind, GraphDict, GraphStats};
pub use links::{Link, LinkKind, LinkParser, ParseWarning, ParseWarningKind, ParsedLinks};
pub use optimizer::{
    ContextOptimizer, Exclusion, ExclusionReason, InclusionKind, OptimizationResult, SelectedItem,
    Strategy,
};
pub use relevance::{Candidate, CandidateMetadata, RelevanceScore, RelevanceScorer, RelevanceSignals};
pub use tokens::{HeuristicTokenCounter, TokenCounter};
pub use transclusion::{TransclusionError, TransclusionResolver, TransclusionResult, UnresolvedReason};
pub use validate::{IssueCode, Severity, ValidationIssue, ValidationReport};
