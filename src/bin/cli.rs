//! cdc-schemas CLI
//!
//! Compares generations of CDC schema triads, or two standalone Avro schema
//! files, and turns the outcome into a process exit code:
//! 0 on PASS, 1 on FAIL or error, 2 on invalid invocation.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use cdc_schemas::verdict::EXIT_INVALID_INPUT;
use cdc_schemas::{
    verify_generation, CompatibilityLevel, ComparisonEngine, Decision, SchemaError, ToolConfig,
    VerdictPolicy,
};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cdc-schemas")]
#[command(version)]
#[command(about = "Compare CDC table schema generations for compatibility")]
struct Cli {
    /// Logging verbosity; repeat to increase (default: ERROR)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file, layered over the default locations
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two generation directories (CURRENT / NEXT)
    Compare {
        /// Directory with the CURRENT table schemas
        #[arg(value_name = "CURR_SCHEMAS_DIR")]
        current_dir: PathBuf,

        /// Directory with the NEXT table schemas
        #[arg(value_name = "NEXT_SCHEMAS_DIR")]
        next_dir: PathBuf,

        #[command(flatten)]
        options: CompareOptions,

        /// Compare tables one at a time instead of on the thread pool
        #[arg(long)]
        sequential: bool,
    },

    /// Compare two Avro schema (.avsc) files
    CompareFiles {
        /// CURRENT schema file
        #[arg(value_name = "CURR_SCHEMA_FILE")]
        current_file: PathBuf,

        /// NEXT schema file
        #[arg(value_name = "NEXT_SCHEMA_FILE")]
        next_file: PathBuf,

        /// Schema files declaring named types the compared files refer to; parsed first, in order
        #[arg(short = 's', long = "include-schema", value_name = "FILE")]
        include_schemas: Vec<PathBuf>,

        #[command(flatten)]
        options: CompareOptions,
    },

    /// Verify every checksum of a generation directory against its manifest
    Verify {
        /// Generation directory
        dir: PathBuf,
    },
}

#[derive(Args)]
struct CompareOptions {
    /// Compatibility level (NONE, BACKWARD, BACKWARD_TRANSITIVE, FORWARD,
    /// FORWARD_TRANSITIVE, FULL, FULL_TRANSITIVE; default: BACKWARD)
    #[arg(short, long)]
    compatibility: Option<CompatibilityLevel>,

    /// CI mode: also fail on added/removed tables and on compatible changes
    #[arg(short = 'i', long = "ci", visible_alias = "ci-mode")]
    ci: bool,

    /// Output file (JSON); overwritten if it exists. Standard output otherwise
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

/// Comparison settings after layering flags over configuration
struct Resolved {
    level: CompatibilityLevel,
    ci_mode: bool,
    output: Option<PathBuf>,
}

impl Resolved {
    fn new(options: CompareOptions, config: &ToolConfig) -> Self {
        Self {
            level: options.compatibility.unwrap_or(config.compare.compatibility),
            ci_mode: options.ci || config.compare.ci_mode,
            output: options.output.or_else(|| config.compare.output.clone()),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            process::exit(exit_code(&e));
        }
    }
}

/// Invalid invocations exit with 2, every other failure with 1
fn exit_code(err: &anyhow::Error) -> i32 {
    let invalid_input = err
        .downcast_ref::<SchemaError>()
        .map_or(false, SchemaError::is_invalid_input);
    if invalid_input {
        EXIT_INVALID_INPUT
    } else {
        1
    }
}

/// RUST_LOG wins when set; otherwise the -v count picks the level
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Compare {
            current_dir,
            next_dir,
            options,
            sequential,
        } => {
            let resolved = Resolved::new(options, &config);
            require_dir(&current_dir)?;
            require_dir(&next_dir)?;
            check_output(resolved.output.as_deref())?;
            debug!(
                "Comparing {} -> {} at {} (CI mode: {})",
                current_dir.display(),
                next_dir.display(),
                resolved.level,
                resolved.ci_mode
            );

            let engine = ComparisonEngine::new(resolved.level)
                .parallel(config.compare.parallel && !sequential);
            let report = engine
                .compare_generations(&current_dir, &next_dir)
                .context("Failed to compare table schemas")?;
            write_report(&report.to_json()?, resolved.output.as_deref())?;

            let decision = VerdictPolicy::new(resolved.ci_mode).evaluate(&report);
            Ok(conclude(&decision))
        }

        Commands::CompareFiles {
            current_file,
            next_file,
            include_schemas,
            options,
        } => {
            let resolved = Resolved::new(options, &config);
            require_file(&current_file)?;
            require_file(&next_file)?;
            for include in &include_schemas {
                require_file(include)?;
            }
            check_output(resolved.output.as_deref())?;

            let engine = ComparisonEngine::new(resolved.level);
            let report = engine
                .compare_files(&current_file, &next_file, &include_schemas)
                .context("Failed to compare schema files")?;
            write_report(&report.to_json()?, resolved.output.as_deref())?;

            let decision = VerdictPolicy::new(resolved.ci_mode).evaluate_files(&report);
            Ok(conclude(&decision))
        }

        Commands::Verify { dir } => {
            require_dir(&dir)?;
            let manifest = verify_generation(&dir)
                .with_context(|| format!("Verification failed for {}", dir.display()))?;
            println!(
                "{}: {} tables verified (catalog checksum {})",
                dir.display(),
                manifest.table_count,
                manifest.catalog_checksum
            );
            Ok(0)
        }
    }
}

/// An explicit configuration file must load; default locations only warn
fn load_config(path: Option<&Path>) -> anyhow::Result<ToolConfig> {
    match ToolConfig::load_from(path) {
        Ok(config) => Ok(config),
        Err(e) if path.is_none() => {
            warn!("Ignoring configuration: {}", e);
            Ok(ToolConfig::default())
        }
        Err(e) => Err(SchemaError::from(e)).context("Failed to load configuration"),
    }
}

fn require_dir(path: &Path) -> Result<(), SchemaError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(SchemaError::InvalidInput(format!(
            "Directory must exist: {}",
            path.display()
        )))
    }
}

fn require_file(path: &Path) -> Result<(), SchemaError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(SchemaError::InvalidInput(format!(
            "File must exist: {}",
            path.display()
        )))
    }
}

fn check_output(output: Option<&Path>) -> Result<(), SchemaError> {
    if let Some(path) = output {
        if path.is_dir() {
            return Err(SchemaError::InvalidInput(format!(
                "Output file is a directory: {}",
                path.display()
            )));
        }
        if path.exists() {
            warn!("Output file exists and will be overwritten: {}", path.display());
        }
    }
    Ok(())
}

fn write_report(json: &str, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            debug!("Writing result to file: {}", path.display());
            fs::write(path, format!("{}\n", json))
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn conclude(decision: &Decision) -> i32 {
    decision.log();
    decision.verdict.exit_code()
}
