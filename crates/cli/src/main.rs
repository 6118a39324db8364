// uaplaces - build and enrich the Ukrainian administrative records collection

mod exit_codes;
mod fetch;
mod pipeline;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use env_logger::{Env, Target};
use serde::Serialize;
use uaplaces_config::{ConfigError, Settings};
use uaplaces_io::IoError;
use uaplaces_recon::{ConsistencyReport, ReconError, StepReport};

use exit_codes::{
    EXIT_CHECK_FINDINGS, EXIT_COLLECTION, EXIT_CONFIG, EXIT_ERROR, EXIT_INPUT, EXIT_SUCCESS, EXIT_USAGE,
};
use pipeline::Step;

#[derive(Parser)]
#[command(name = "uaplaces")]
#[command(about = "Reconcile KATOTTH administrative units with OSM, Wikidata and decentralization.ua")]
#[command(version)]
struct Cli {
    /// Settings file (default: <config dir>/uaplaces/uaplaces.toml when present)
    #[arg(long, global = true, env = "UAPLACES_CONFIG")]
    config: Option<PathBuf>,

    /// Record collection to read and write (overrides [paths] data)
    #[arg(long, global = true, env = "UAPLACES_DATA")]
    data: Option<PathBuf>,

    /// Log warnings and errors only
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Print reports as a single JSON value on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed or refresh the collection from the KATOTTH classifier
    #[command(after_help = "\
Examples:
  uaplaces generate
  uaplaces generate --data out/settlements.json")]
    Generate,

    /// Fill KOATUU codes from the comparison table
    MapKoatuu,

    /// Fill OSM references and postal codes from the place table
    AddPlaces,

    /// Fetch coordinates and tags for settlements that have a node reference
    OsmLocations,

    /// Match oblasts, districts and communities to OSM relations by KATOTTH
    OsmRegions,

    /// Match settlements to OSM nodes by KATOTTH, then by Wikidata ID
    OsmSettlements,

    /// Fill community population, area and center; propagate to parents
    Decentralization,

    /// Assign Wikidata IDs, drop shared ones, fill fields from Wikidata
    Wikidata,

    /// Report missing fields, map mismatches, hierarchy and duplicate problems
    #[command(after_help = "\
Examples:
  uaplaces check
  uaplaces check --json | jq '.missing'
  uaplaces check --strict    # exit 10 when anything is reported")]
    Check {
        /// Exit with code 10 when the report is not clean
        #[arg(long)]
        strict: bool,
    },

    /// Run every step in order, then the check
    #[command(after_help = "\
Examples:
  uaplaces run
  uaplaces run --from osm-settlements
  RUST_LOG=debug uaplaces run --from wikidata")]
    Run {
        /// Resume from this step
        #[arg(long, value_enum, default_value = "generate")]
        from: Step,
    },

    /// Inspect or create the settings file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the settings file location
    Path,
    /// Print the effective settings as TOML
    Show,
    /// Write a settings file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let result = match cli.command {
        Commands::Config(cmd) => cmd_config(cmd, cli.config),
        command => load_settings(cli.config.as_deref(), cli.data).and_then(|settings| match command {
            Commands::Generate => cmd_step(Step::Generate, &settings, cli.json),
            Commands::MapKoatuu => cmd_step(Step::MapKoatuu, &settings, cli.json),
            Commands::AddPlaces => cmd_step(Step::AddPlaces, &settings, cli.json),
            Commands::OsmLocations => cmd_step(Step::OsmLocations, &settings, cli.json),
            Commands::OsmRegions => cmd_step(Step::OsmRegions, &settings, cli.json),
            Commands::OsmSettlements => cmd_step(Step::OsmSettlements, &settings, cli.json),
            Commands::Decentralization => cmd_step(Step::Decentralization, &settings, cli.json),
            Commands::Wikidata => cmd_step(Step::Wikidata, &settings, cli.json),
            Commands::Check { strict } => cmd_check(&settings, strict, cli.json),
            Commands::Run { from } => cmd_run(from, &settings, cli.json),
            Commands::Config(_) => Ok(()),
        }),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `warn` with `--quiet`.
fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default))
        .target(Target::Stderr)
        .init();
}

fn load_settings(explicit: Option<&std::path::Path>, data: Option<PathBuf>) -> Result<Settings, CliError> {
    let mut settings = Settings::load(explicit).map_err(CliError::config)?;
    if let Some(data) = data {
        settings.paths.data = data;
    }
    Ok(settings)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn config(err: ConfigError) -> Self {
        let hint = match &err {
            ConfigError::Read { .. } => None,
            _ => Some("compare with the defaults written by `uaplaces config init`".to_string()),
        };
        Self { code: EXIT_CONFIG, message: err.to_string(), hint }
    }

    /// Input tables and maps.
    pub fn input(err: IoError) -> Self {
        Self { code: EXIT_INPUT, message: err.to_string(), hint: None }
    }

    /// The record collection itself.
    pub fn collection(err: IoError) -> Self {
        Self { code: EXIT_COLLECTION, message: err.to_string(), hint: None }
    }

    pub fn engine(err: ReconError) -> Self {
        let code = match &err {
            ReconError::Source(_) => EXIT_ERROR,
            _ => EXIT_COLLECTION,
        };
        Self { code, message: err.to_string(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// Output
// ============================================================================

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CliError::io(e.to_string()))?;
    let mut out = io::stdout().lock();
    writeln!(out, "{}", json).map_err(|e| CliError::io(e.to_string()))
}

fn print_reports(reports: &[StepReport]) -> Result<(), CliError> {
    let mut out = io::stdout().lock();
    for report in reports {
        writeln!(out, "{}", report.headline()).map_err(|e| CliError::io(e.to_string()))?;
        for (field, count) in &report.fields_filled {
            writeln!(out, "  {field}: {count} filled").map_err(|e| CliError::io(e.to_string()))?;
        }
        for entry in &report.conflicts {
            writeln!(
                out,
                "  conflict {} {}: kept {}, offered {}",
                entry.code, entry.field, entry.current, entry.offered
            )
            .map_err(|e| CliError::io(e.to_string()))?;
        }
    }
    Ok(())
}

fn print_check(report: &ConsistencyReport) -> Result<(), CliError> {
    let mut out = io::stdout().lock();
    write!(out, "{}", report.render()).map_err(|e| CliError::io(e.to_string()))
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_step(step: Step, settings: &Settings, json: bool) -> Result<(), CliError> {
    let reports = pipeline::run_step(step, settings)?;
    if json {
        print_json(&reports)
    } else {
        print_reports(&reports)
    }
}

fn cmd_check(settings: &Settings, strict: bool, json: bool) -> Result<(), CliError> {
    let report = pipeline::run_check(settings)?;
    if json {
        print_json(&report)?;
    } else {
        print_check(&report)?;
    }
    if strict && !report.is_clean() {
        return Err(CliError { code: EXIT_CHECK_FINDINGS, message: String::new(), hint: None });
    }
    Ok(())
}

fn cmd_run(from: Step, settings: &Settings, json: bool) -> Result<(), CliError> {
    let (summary, outcome) = pipeline::run_all(from, settings);
    if json {
        print_json(&summary)?;
    } else {
        print_reports(&summary.steps)?;
        if let Some(check) = &summary.check {
            print_check(check)?;
        }
    }
    outcome
}

fn cmd_config(cmd: ConfigCommands, explicit: Option<PathBuf>) -> Result<(), CliError> {
    let path = explicit.clone().unwrap_or_else(Settings::config_path);
    match cmd {
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Show => {
            let settings = Settings::load(explicit.as_deref()).map_err(CliError::config)?;
            let toml = toml::to_string_pretty(&settings).map_err(|e| CliError::io(e.to_string()))?;
            print!("{}", toml);
            Ok(())
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::args(format!("{} already exists", path.display()))
                    .with_hint("pass --force to overwrite"));
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CliError::io(format!("cannot create {}: {e}", parent.display())))?;
            }
            std::fs::write(&path, Settings::default_toml())
                .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;
            log::info!("wrote {}", path.display());
            Ok(())
        }
    }
}
