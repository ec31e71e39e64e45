//! Lot Pricing CLI
//!
//! Two modes:
//! - quote: price one snapshot for one lot without committing anything
//! - replay: run a recorded sequence of snapshots for many lots through a registry

mod replay;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use pricing_engine::{
    CompetitorQuote, EngineConfig, FeatureSnapshot, LotRegistry, PriceResult, PricingEngine,
    PricingRequest, PricingState, StrategyKind,
};
use tracing::{info, Level};

use crate::replay::{run_replay, ReplayInput};

#[derive(Parser)]
#[command(name = "pricing-cli")]
#[command(about = "Quote and replay parking lot prices from local snapshot files")]
#[command(version = "0.1.0")]
struct Cli {
    /// TOML engine configuration; PRICING_<PARAMETER> environment variables
    /// override it and other PRICING_* variables are ignored
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Price a single snapshot
    Quote {
        /// Feature snapshot JSON file
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Competitor quotes JSON file (array)
        #[arg(long)]
        competitors: Option<PathBuf>,

        /// Lot base price
        #[arg(short, long)]
        base_price: f64,

        /// Lot current price (defaults to the base price)
        #[arg(long)]
        current_price: Option<f64>,

        /// linear, demand or competitive (defaults to the configured strategy)
        #[arg(long)]
        strategy: Option<StrategyKind>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay recorded snapshots for many lots
    Replay {
        /// Replay JSON file with "lots" and "events"
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();

    let config = load_config(cli.config.as_deref())?;
    info!("Loaded configuration (default strategy: {})", config.default_strategy);
    let engine = PricingEngine::new(config).context("Invalid engine configuration")?;

    match cli.command {
        Commands::Quote { snapshot, competitors, base_price, current_price, strategy, json } => {
            let features: FeatureSnapshot = read_json(&snapshot)?;
            let quotes: Vec<CompetitorQuote> = match competitors {
                Some(path) => read_json(&path)?,
                None => Vec::new(),
            };
            let state =
                PricingState::with_current_price(base_price, current_price.unwrap_or(base_price))
                    .context("Invalid lot prices")?;

            let mut request = PricingRequest::new(&features).with_competitors(&quotes);
            request.strategy = strategy;
            let result = engine.quote(&state, &request).context("Pricing rejected")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&state, &result);
            }
        }
        Commands::Replay { input } => {
            let input: ReplayInput = read_json(&input)?;
            let registry = Arc::new(LotRegistry::new(Arc::new(engine)));
            let outcomes = run_replay(registry, input).await?;

            println!("{}", "Replay summary".cyan().bold());
            println!("===================================");
            for outcome in outcomes {
                let rejected = if outcome.rejected > 0 {
                    outcome.rejected.to_string().red().bold()
                } else {
                    outcome.rejected.to_string().normal()
                };
                println!(
                    "  {:<16} {:>10} (committed: {}, rejected: {})",
                    outcome.lot_id.bold(),
                    format!("{:.2}", outcome.final_state.current_price).green(),
                    outcome.committed,
                    rejected
                );
                if let Some(reroute) = outcome.last_result.and_then(|r| r.reroute_suggestion) {
                    println!("    {} {}", "reroute to".yellow(), reroute);
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?
            .with_env_overrides(std::env::vars())?,
        None => EngineConfig::from_env()?,
    };
    Ok(config)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_result(state: &PricingState, result: &PriceResult) {
    println!("{}", format!("{} pricing", result.strategy_used).cyan().bold());
    println!("===================================");
    println!("  Base price:     {:.2}", state.base_price);
    println!("  Current price:  {:.2}", state.current_price);
    println!("  Raw price:      {:.4}", result.raw_price);
    println!("  Final price:    {}", format!("{:.2}", result.price).green().bold());
    println!("  Multiplier:     {:.4}", result.applied_multiplier);
    if let Some(reroute) = &result.reroute_suggestion {
        println!("  Reroute to:     {}", reroute.yellow().bold());
    }

    println!();
    println!("{}", "Contributions".blue().bold());
    for (signal, value) in &result.diagnostics.contributions {
        println!("  {:<28} {:>10.4}", signal, value);
    }
    if !result.diagnostics.warnings.is_empty() {
        println!();
        println!("{}", "Warnings".yellow().bold());
        for warning in &result.diagnostics.warnings {
            println!("  - {}", warning);
        }
    }
}
