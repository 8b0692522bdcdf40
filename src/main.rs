mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memory_bank=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let mut bank = cli::open_bank(&cli.bank, cli.config.as_deref())?;

    match cli.command {
        Commands::Graph { format } => {
            cli::show_graph(&bank, &format)?;
        }
        Commands::Order { roots } => {
            cli::show_loading_order(&bank, &roots)?;
        }
        Commands::Cycles => {
            cli::show_cycles(&bank)?;
        }
        Commands::Resolve { name, max_depth } => {
            cli::resolve_document(&mut bank, &name, max_depth)?;
        }
        Commands::Optimize {
            task,
            budget,
            strategy,
            sections,
            format,
        } => {
            cli::optimize_context(&bank, &task, budget, strategy, sections, &format)?;
        }
        Commands::Validate { format } => {
            if !cli::validate_bank(&bank, &format)? {
                anyhow::bail!("memory bank validation failed");
            }
        }
        Commands::Stats => {
            cli::show_stats(&bank)?;
        }
    }

    Ok(())
}
