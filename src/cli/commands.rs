use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use memory_bank::error::Result;
use memory_bank::{BankConfig, CandidateGranularity, MemoryBank, Severity, Strategy};

#[derive(Parser)]
#[command(name = "memory-bank")]
#[command(about = "Dependency-aware loading, transclusion and context selection for markdown memory banks")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Show the dependency graph as Mermaid
    memory-bank graph

    # Loading order for everything activeContext.md needs
    memory-bank order activeContext.md

    # Expand {{include:...}} directives of a document
    memory-bank resolve systemPatterns.md --max-depth 3

    # Select context for a task within 4000 tokens
    memory-bank optimize --task "fix login bug" --budget 4000 --strategy hybrid

    # Same, choosing individual sections
    memory-bank optimize --task "fix login bug" --budget 4000 --sections

    # Check the bank for broken references and cycles
    memory-bank validate --format json

    # Use another bank directory
    memory-bank --bank docs/memory stats
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the memory bank directory
    #[arg(long, default_value = "memory-bank")]
    pub bank: PathBuf,

    /// Config file (defaults to memory-bank.toml inside the bank)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the dependency graph
    Graph {
        /// Output format: mermaid or json
        #[arg(long, default_value = "mermaid", value_parser = ["mermaid", "json"])]
        format: String,
    },

    /// Print a dependency-respecting loading order
    Order {
        /// Restrict to documents reachable from these roots
        roots: Vec<String>,
    },

    /// List dependency cycles
    Cycles,

    /// Resolve transclusions of a document
    Resolve {
        /// Document name (e.g. activeContext.md)
        name: String,

        /// Maximum include depth (defaults to the configured limit)
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Select context for a task within a token budget
    Optimize {
        /// Task description to score documents against
        #[arg(long)]
        task: String,

        /// Token budget
        #[arg(long, allow_negative_numbers = true)]
        budget: i64,

        /// Selection strategy: priority, dependency or hybrid
        #[arg(long, default_value = "hybrid")]
        strategy: Strategy,

        /// Select individual sections instead of whole documents
        #[arg(long)]
        sections: bool,

        /// Output format: text or json
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Check links, transclusions, cycles and core files
    Validate {
        /// Output format: text or json
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Show bank statistics
    Stats,
}

pub fn open_bank(bank_dir: &Path, config_path: Option<&Path>) -> Result<MemoryBank> {
    match config_path {
        Some(path) => {
            let config = BankConfig::load(path)?;
            MemoryBank::open_with_config(bank_dir, config)
        }
        None => MemoryBank::open(bank_dir),
    }
}

pub fn show_graph(bank: &MemoryBank, format: &str) -> Result<()> {
    if format == "json" {
        let json = bank.graph().to_json()?;
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        print!("{}", bank.graph().to_mermaid());
    }
    Ok(())
}

pub fn show_loading_order(bank: &MemoryBank, roots: &[String]) -> Result<()> {
    let roots: Vec<&str> = roots.iter().map(String::as_str).collect();
    let order = bank.loading_order(&roots)?;
    for (i, name) in order.iter().enumerate() {
        let marker = if bank.document(name).is_some() { "" } else { " (missing)" };
        println!("{:>3}. {}{}", i + 1, name, marker);
    }
    Ok(())
}

pub fn show_cycles(bank: &MemoryBank) -> Result<()> {
    let cycles = bank.graph().detect_cycles();
    if cycles.is_empty() {
        println!("No dependency cycles");
        return Ok(());
    }

    println!("Found {} dependency cycle(s):", cycles.len());
    for cycle in &cycles {
        let mut path = cycle.clone();
        if let Some(first) = cycle.first() {
            path.push(first.clone());
        }
        println!("  {}", path.join(" -> "));
    }
    Ok(())
}

pub fn resolve_document(bank: &mut MemoryBank, name: &str, max_depth: Option<usize>) -> Result<()> {
    let result = bank.resolve(name, max_depth)?;
    print!("{}", result.resolved_content);
    if !result.resolved_content.ends_with('\n') {
        println!();
    }

    for error in &result.errors {
        eprintln!("warning: {} ({})", error.message, error.reason.as_str());
    }
    tracing::info!(
        "Resolved {}: {} file(s) included, depth {}",
        name,
        result.included_files.len(),
        result.depth_reached
    );
    Ok(())
}

pub fn optimize_context(
    bank: &MemoryBank,
    task: &str,
    budget: i64,
    strategy: Strategy,
    sections: bool,
    format: &str,
) -> Result<()> {
    let granularity = if sections {
        CandidateGranularity::Section
    } else {
        CandidateGranularity::Document
    };
    let result = bank.optimize(task, budget, strategy, granularity)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!(
        "Selected {} item(s), {} / {} tokens ({:.0}%, {})",
        result.selected.len(),
        result.total_tokens,
        result.budget,
        result.utilization() * 100.0,
        result.strategy_used
    );
    for item in &result.selected {
        let label = match &item.section {
            Some(section) => format!("{}#{}", item.document, section),
            None => item.document.clone(),
        };
        match &item.required_by {
            Some(dependent) => println!(
                "  + {} ({} tokens, score {:.3}, required by {})",
                label, item.tokens, item.score, dependent
            ),
            None => println!("  + {} ({} tokens, score {:.3})", label, item.tokens, item.score),
        }
    }

    if !result.excluded.is_empty() {
        println!("\nExcluded:");
        for exclusion in &result.excluded {
            let label = match &exclusion.section {
                Some(section) => format!("{}#{}", exclusion.document, section),
                None => exclusion.document.clone(),
            };
            println!("  - {} [{}] {}", label, exclusion.reason.as_str(), exclusion.message);
        }
    }
    Ok(())
}

/// Prints the report and returns whether the bank is valid.
pub fn validate_bank(bank: &MemoryBank, format: &str) -> Result<bool> {
    let report = bank.validate();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.is_valid());
    }

    if report.issues.is_empty() {
        println!("Memory bank is valid, no issues found");
        return Ok(true);
    }

    for issue in &report.issues {
        let location = match issue.line {
            Some(line) => format!("{}:{}", issue.document, line),
            None => issue.document.clone(),
        };
        println!(
            "{:<7} {} [{}] {}",
            issue.severity.as_str(),
            location,
            issue.code.as_str(),
            issue.message
        );
    }
    println!(
        "\n{} error(s), {} warning(s), {} info",
        report.count(Severity::Error),
        report.count(Severity::Warning),
        report.count(Severity::Info)
    );
    Ok(report.is_valid())
}

pub fn show_stats(bank: &MemoryBank) -> Result<()> {
    let stats = bank.stats();

    println!("Memory Bank Statistics:");
    println!("  Documents: {}", stats.documents);
    println!("  Total tokens: {}", stats.total_tokens);
    println!("  Graph nodes: {}", stats.graph.nodes);
    println!("  Graph edges: {}", stats.graph.edges);

    if !stats.graph.entry_points.is_empty() {
        println!("\n  Entry points:");
        for name in &stats.graph.entry_points {
            println!("    {}", name);
        }
    }

    if !stats.graph.orphans.is_empty() {
        println!("\n  Orphans:");
        for name in &stats.graph.orphans {
            println!("    {}", name);
        }
    }

    Ok(())
}
