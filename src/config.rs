//! Memory bank configuration.
//!
//! All knobs live in typed structs with documented defaults. A bank
//! directory may carry a `memory-bank.toml` that overrides any subset.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryBankError, Result};

/// File name looked up by [`BankConfig::load_or_default`].
pub const CONFIG_FILE_NAME: &str = "memory-bank.toml";

/// Core files every memory bank is expected to carry.
pub const DEFAULT_REQUIRED_DOCUMENTS: &[&str] = &[
    "projectbrief.md",
    "productContext.md",
    "activeContext.md",
    "systemPatterns.md",
    "techContext.md",
    "progress.md",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    pub tokens: TokenConfig,
    pub transclusion: TransclusionConfig,
    pub graph: GraphConfig,
    pub scoring: ScorerWeights,
    pub optimizer: OptimizerConfig,
    pub validation: ValidationConfig,
    /// Forced ordering: document -> documents that must load before it.
    pub static_dependencies: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Characters per token for the heuristic counter
    pub chars_per_token: usize,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransclusionConfig {
    /// Maximum nesting of `{{include:...}}` directives
    pub max_depth: usize,
}

impl Default for TransclusionConfig {
    fn default() -> Self {
        Self { max_depth: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Upper bound on simple cycles enumerated by cycle detection
    pub max_cycles: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { max_cycles: 1000 }
    }
}

/// Weights and knobs of the relevance scorer.
///
/// The final score is the weighted mean of keyword overlap, recency and
/// quality (weights need not sum to one), plus a bounded dependency boost,
/// clamped to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerWeights {
    /// Weight of task/content term overlap (primary signal). Default 0.6
    pub keyword: f64,
    /// Weight of the recency signal. Default 0.15
    pub recency: f64,
    /// Weight of externally supplied quality. Default 0.25
    pub quality: f64,
    /// Additive boost for dependencies of high scorers. Default 0.1
    pub dependency_boost: f64,
    /// Base score a candidate needs before it boosts its dependencies. Default 0.5
    pub boost_threshold: f64,
    /// Age in days at which the recency signal halves. Default 7
    pub recency_half_life_days: f64,
    /// Quality assumed when a document carries none, in `[0, 1]`. Default 0.5
    pub default_quality: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self {
            keyword: 0.6,
            recency: 0.15,
            quality: 0.25,
            dependency_boost: 0.1,
            boost_threshold: 0.5,
            recency_half_life_days: 7.0,
            default_quality: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Candidates scoring below this are excluded as `below_threshold`
    pub min_score: f64,
    /// Remaining budget fraction that triggers the hybrid backfill pass
    pub hybrid_slack: f64,
    /// Depth bound of dependency closures
    pub dependency_depth: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_score: 0.05,
            hybrid_slack: 0.15,
            dependency_depth: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub required_documents: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            required_documents: DEFAULT_REQUIRED_DOCUMENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl BankConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: BankConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load `memory-bank.toml` from a bank directory, or defaults when absent.
    pub fn load_or_default(bank_dir: &Path) -> Result<Self> {
        let path = bank_dir.join(CONFIG_FILE_NAME);
        if path.is_file() {
            tracing::debug!("Loading config from {}", path.display());
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tokens.chars_per_token == 0 {
            return Err(MemoryBankError::Config(
                "tokens.chars_per_token must be at least 1".to_string(),
            ));
        }

        let s = &self.scoring;
        for (name, value) in [
            ("scoring.keyword", s.keyword),
            ("scoring.recency", s.recency),
            ("scoring.quality", s.quality),
            ("scoring.dependency_boost", s.dependency_boost),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MemoryBankError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if s.recency_half_life_days <= 0.0 || !s.recency_half_life_days.is_finite() {
            return Err(MemoryBankError::Config(
                "scoring.recency_half_life_days must be positive".to_string(),
            ));
        }

        for (name, value) in [
            ("scoring.boost_threshold", s.boost_threshold),
            ("scoring.default_quality", s.default_quality),
            ("optimizer.min_score", self.optimizer.min_score),
            ("optimizer.hybrid_slack", self.optimizer.hybrid_slack),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MemoryBankError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        for (source, targets) in &self.static_dependencies {
            if source.trim().is_empty() {
                return Err(MemoryBankError::Config(
                    "static_dependencies keys must be document names, got an empty key".to_string(),
                ));
            }
            if targets.iter().any(|t| t.trim().is_empty()) {
                return Err(MemoryBankError::Config(format!(
                    "static_dependencies.\"{}\" lists an empty document name",
                    source
                )));
            }
        }

        Ok(())
    }
}
