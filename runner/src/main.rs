// ============ Fee Distribution Check Runner ============
// Runs a campaign of randomized lock / claim / deposit programs against
// freshly deployed simulated chains and verifies the fair-share invariant
// after each one.
//
// Usage:
//   cargo run -p vefee-runner
//   cargo run -p vefee-runner -- --config harness.toml --cases 64 --output report.json
//
// Exits with status 1 when a counterexample is found; the shrunk program
// is printed and, with --output, written to the JSON report.

use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use vefee_checker::{run_sim_campaign, HarnessConfig, Outcome};

#[derive(Parser, Debug)]
#[command(name = "vefee-check")]
#[command(about = "Stateful fee distribution invariant check")]
struct Cli {
    /// Harness configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of generated programs
    #[arg(long)]
    cases: Option<u32>,

    /// Maximum rules per program
    #[arg(long)]
    steps: Option<usize>,

    /// Generator seed
    #[arg(long)]
    seed: Option<u64>,

    /// Write the campaign report as JSON
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HarnessConfig::default(),
    };

    if let Some(cases) = cli.cases {
        config.campaign.cases = cases;
    }
    if let Some(steps) = cli.steps {
        config.campaign.step_count = steps;
    }
    if let Some(seed) = cli.seed {
        config.campaign.seed = seed;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    println!("=== Fee Distribution Check ===");
    println!("Cases:     {}", config.campaign.cases);
    println!("Steps:     up to {}", config.campaign.step_count);
    println!("Seed:      {}", config.campaign.seed);
    println!("Accounts:  {}", config.scenario.funded_accounts);
    println!();

    let report = run_sim_campaign(&config)?;

    match &report.outcome {
        Outcome::Passed {
            runs,
            max_residual,
            total_deposited,
        } => {
            println!("PASSED  {} programs", runs);
            println!("  fees deposited:    {}", total_deposited);
            println!(
                "  largest residual:  {} (threshold {})",
                max_residual, config.scenario.dust_threshold
            );
        }
        Outcome::Counterexample { reason, program } => {
            println!("FAILED  {}", reason);
            println!();
            println!("Minimal program ({} rules):", program.len());
            for (i, rule) in program.rules().enumerate() {
                println!("  {:>2}. {:?}", i + 1, rule);
            }
        }
    }

    if let Some(path) = &cli.output {
        let json = report.to_json().context("serializing report")?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!("report written to {}", path.display());
    }

    if !report.passed() {
        process::exit(1);
    }
    Ok(())
}
