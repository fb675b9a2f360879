//! Flood Skill - notification criteria assessment
//!
//! Reads reanalysis discharge, return-period thresholds and a tree of
//! forecast files, then:
//! 1. Detects observed flood onsets at every station
//! 2. Turns each model's forecasts into exceedance probabilities
//! 3. Scores every probability × persistence × leadtime combination
//! 4. Selects the best notification criteria (optionally cross-validated)
//!
//! Usage:
//!   flood_skill --config assess.toml events
//!   flood_skill --config assess.toml assess --forecasts /data/forecasts
//!
//! Environment:
//!   FLOOD_SKILL_CONFIG - configuration file when --config is omitted
//!   RUST_LOG           - log filter (env_logger)

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use flood_skill::config::{SkillConfig, resolve_config_path};
use flood_skill::criteria::optimize::CriteriaSelection;
use flood_skill::ingest::reanalysis::{load_discharge, load_station_areas, load_thresholds};
use flood_skill::pipeline::{Assessor, write_assessment};
use flood_skill::report;
use flood_skill::table::LabeledTable;

#[derive(Parser)]
#[command(name = "flood_skill", version, about = "Skill assessment of flood notification criteria")]
struct Cli {
    /// Configuration file (TOML); defaults to $FLOOD_SKILL_CONFIG
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect observed flood events only
    Events(InputArgs),
    /// Run the full assessment and criteria selection
    Assess(InputArgs),
}

#[derive(Args)]
struct InputArgs {
    /// Reanalysis discharge CSV
    #[arg(long)]
    discharge: Option<PathBuf>,
    /// Return-period thresholds CSV
    #[arg(long)]
    thresholds: Option<PathBuf>,
    /// Root of the forecast file tree
    #[arg(long)]
    forecasts: Option<PathBuf>,
    /// Station catchment areas CSV
    #[arg(long)]
    areas: Option<PathBuf>,
    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Command-line paths take precedence over the configuration file.
fn pick(cli: &Option<PathBuf>, config: &Option<PathBuf>, what: &str) -> Result<PathBuf> {
    cli.clone()
        .or_else(|| config.clone())
        .ok_or_else(|| anyhow!("no {} path given (command line or [paths] section)", what))
}

fn load_config(path: Option<PathBuf>) -> Result<SkillConfig> {
    match resolve_config_path(path) {
        Some(path) => {
            println!("📋 Loading configuration from {}", path.display());
            SkillConfig::load(&path).with_context(|| format!("invalid configuration {}", path.display()))
        }
        None => {
            println!("📋 No configuration file given, using defaults");
            Ok(SkillConfig::default())
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config)?;
    let (args, full) = match &cli.command {
        Command::Events(args) => (args, false),
        Command::Assess(args) => (args, true),
    };
    let paths = &config.paths;
    let output = args.output.clone().unwrap_or_else(|| paths.output.clone());

    println!("📊 Loading reanalysis...");
    let discharge_path = pick(&args.discharge, &paths.discharge, "discharge")?;
    let threshold_path = pick(&args.thresholds, &paths.thresholds, "thresholds")?;
    let discharge = load_discharge(&discharge_path).context("loading discharge")?;
    let thresholds = load_thresholds(&threshold_path).context("loading thresholds")?;

    let assessor = Assessor::new(config.clone());
    let events = assessor
        .observed_events(&discharge, &thresholds)
        .context("detecting observed events")?;
    let total: u64 = events.event_counts().values().sum();
    println!("✓ {} observed events at {} stations\n", total, events.stations().len());

    if !full {
        report::save_events(&events, &output.join("observed_events.csv"))?;
        println!("💾 Results in {}", output.display());
        return Ok(());
    }

    println!("📊 Collecting forecasts...");
    let forecast_root = pick(&args.forecasts, &paths.forecasts, "forecasts")?;
    let runs = assessor.model_runs(&forecast_root).context("listing forecasts")?;
    let areas = match args.areas.clone().or_else(|| paths.station_areas.clone()) {
        Some(path) => Some(load_station_areas(&path).with_context(|| format!("loading {}", path.display()))?),
        None => None,
    };
    let upper = assessor.upper_threshold(&thresholds)?;

    println!("📊 Scoring criteria...");
    let assessment = assessor
        .assess(&events, &upper, &runs, areas.as_ref())
        .context("assessment failed")?;
    print_selection(&assessment.best);

    write_assessment(&assessment, &events, &output)?;
    println!("💾 Results in {}", output.display());
    Ok(())
}

fn print_selection(best: &LabeledTable<CriteriaSelection>) {
    println!("\n🎯 Selected criteria");
    for row in best.rows() {
        let group: Vec<String> = row.coords.iter().map(|(d, c)| format!("{}={}", d, c)).collect();
        let criteria: Vec<String> = row.value.criteria.iter().map(|(d, c)| format!("{}={}", d, c)).collect();
        let scores: Vec<String> = row
            .value
            .skill
            .metrics()
            .into_iter()
            .map(|(name, v)| format!("{}={:.3}", name, v))
            .collect();
        println!("   [{}] {} | {}", group.join(", "), criteria.join(", "), scores.join(" "));
    }
    println!();
}

fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    println!("🌊 Flood Skill Assessment");
    println!("=========================\n");

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("\n❌ {:#}\n", e);
        std::process::exit(1);
    }
    info!("done");
}
