//! CLI command definitions for selfmod.
//!
//! Snippet execution, the full update pipeline, and the staging and backup
//! operations it is built from, each as its own subcommand.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgGroup, Parser};
use serde::Serialize;
use tracing::info;

use crate::codegen::{CodeSection, SyntaxValidator, SYSTEM_PROMPT};
use crate::execution::{ExecutionEngine, ExecutionResult};
use crate::llm::{LiteLlmClient, LlmProvider, LlmTextGenerator, TextGenerator};
use crate::metrics;
use crate::pipeline::{
    AutoConfirm, Confirmation, ConsoleConfirmation, PipelineConfig, UpdatePipeline, UpdateReport,
};
use crate::workspace::{BackupArchive, BackupRecord, StagingArea};

/// Generate, validate, stage, test and apply code changes to a live source tree.
#[derive(Parser, Debug)]
#[command(name = "selfmod")]
#[command(about = "Self-modification pipeline for a live Python code base")]
#[command(version)]
#[command(
    long_about = "selfmod turns a task description into a generated Python module plus tests, checks both statically, stages them, runs the staged tests and, after confirmation, applies the module to the live tree with a backup of what it replaces.\n\nExample usage:\n  selfmod propose --task \"write a function that adds two numbers\"\n  selfmod run --code \"print(1 + 1)\""
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file; SELFMOD_* environment variables override it.
    #[arg(short, long, env = "SELFMOD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Print Prometheus metrics to stderr before exiting.
    #[arg(long, global = true)]
    pub print_metrics: bool,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Execute a snippet in a separate interpreter process.
    Run(RunArgs),

    /// Generate, test and apply an update for a task description.
    Propose(ProposeArgs),

    /// Parse a source file without executing it.
    Validate(ValidateArgs),

    /// Copy a file or directory into the staging area.
    Stage(StageArgs),

    /// Back up a live artifact.
    Backup(PathArgs),

    /// List the backups of a live artifact, oldest first.
    Backups(BackupsArgs),

    /// Restore a live artifact from one of its backups.
    Restore(RestoreArgs),

    /// Remove one staged item, or everything staged.
    Clear(ClearArgs),
}

/// Arguments for `selfmod run`.
#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["code", "file"])))]
pub struct RunArgs {
    /// Snippet source text.
    #[arg(long)]
    pub code: Option<String>,

    /// File holding the snippet source.
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Text written to the snippet's standard input.
    #[arg(long)]
    pub stdin: Option<String>,

    /// Timeout in seconds (default: configured snippet timeout).
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `selfmod propose`.
#[derive(Parser, Debug)]
pub struct ProposeArgs {
    /// Task description handed to the text generator.
    #[arg(long)]
    pub task: String,

    /// Relative path of the module to create or replace (default: configured default target).
    #[arg(long)]
    pub target: Option<PathBuf>,

    /// Apply without asking once the staged tests pass.
    #[arg(short, long)]
    pub yes: bool,

    /// Output the update report as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `selfmod validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// File to parse.
    pub file: PathBuf,
}

/// Arguments for `selfmod stage`.
#[derive(Parser, Debug)]
pub struct StageArgs {
    /// File or directory to copy.
    pub source: PathBuf,

    /// Destination relative to the staging root.
    pub relative: PathBuf,
}

/// A single path relative to the codebase root.
#[derive(Parser, Debug)]
pub struct PathArgs {
    pub relative: PathBuf,
}

/// Arguments for `selfmod backups`.
#[derive(Parser, Debug)]
pub struct BackupsArgs {
    pub relative: PathBuf,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `selfmod restore`.
#[derive(Parser, Debug)]
pub struct RestoreArgs {
    pub relative: PathBuf,

    /// Position in `selfmod backups` output (default: the most recent backup).
    #[arg(short, long)]
    pub index: Option<usize>,
}

/// Arguments for `selfmod clear`.
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Staged item to remove; everything is removed when omitted.
    pub relative: Option<PathBuf>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// Returns an error, and so a non-zero exit status, when a snippet fails or
/// an update ends anywhere other than APPLIED or CANCELLED.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    if cli.print_metrics {
        metrics::init_metrics()?;
    }

    let config = PipelineConfig::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Run(args) => run_snippet_command(args, &config).await,
        Commands::Propose(args) => run_propose_command(args, config.clone()).await,
        Commands::Validate(args) => run_validate_command(args),
        Commands::Stage(args) => run_stage_command(args, &config),
        Commands::Backup(args) => run_backup_command(args, &config),
        Commands::Backups(args) => run_backups_command(args, &config),
        Commands::Restore(args) => run_restore_command(args, &config),
        Commands::Clear(args) => run_clear_command(args, &config),
    };

    if cli.print_metrics {
        eprint!("{}", metrics::export_metrics());
    }

    result
}

// ============================================================================
// Snippet execution
// ============================================================================

#[derive(Debug, Serialize)]
struct RunOutput<'a> {
    outcome: &'static str,
    #[serde(flatten)]
    result: &'a ExecutionResult,
}

async fn run_snippet_command(args: RunArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let code = match (args.code, args.file) {
        (Some(code), _) => code,
        (None, Some(path)) => fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read snippet {}: {}", path.display(), e))?,
        (None, None) => anyhow::bail!("Either --code or --file is required"),
    };

    let engine = ExecutionEngine::new(config.interpreter()).with_default_timeout(config.snippet_timeout());
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| engine.default_timeout());

    let result = engine.run(&code, args.stdin.as_deref(), timeout).await;

    if args.json {
        let output = RunOutput {
            outcome: result.outcome(),
            result: &result,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
        if let Some(err) = &result.error {
            eprintln!("[selfmod] {}", err);
        }
    }

    if !result.success {
        anyhow::bail!(
            "Snippet {} (exit code {}, {:.2}s)",
            result.outcome(),
            result.exit_code,
            result.duration.as_secs_f64()
        );
    }
    Ok(())
}

// ============================================================================
// Update pipeline
// ============================================================================

fn build_generator(config: &PipelineConfig) -> anyhow::Result<Arc<dyn TextGenerator>> {
    let client = LiteLlmClient::from_env().map_err(|e| {
        anyhow::anyhow!(
            "Failed to initialize LLM client: {}. Set LITELLM_API_BASE (and LITELLM_API_KEY if required).",
            e
        )
    })?;
    info!(api_base = %client.api_base(), "Using LiteLLM client from environment");

    let provider: Arc<dyn LlmProvider> = Arc::new(client);
    let generator = LlmTextGenerator::new(provider)
        .with_model(config.model.clone())
        .with_system_prompt(SYSTEM_PROMPT)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);
    Ok(Arc::new(generator))
}

async fn run_propose_command(args: ProposeArgs, config: PipelineConfig) -> anyhow::Result<()> {
    let generator = build_generator(&config)?;
    let confirmer: Arc<dyn Confirmation> = if args.yes {
        Arc::new(AutoConfirm(true))
    } else {
        Arc::new(ConsoleConfirmation)
    };

    let pipeline = UpdatePipeline::new(config, generator, confirmer)?;
    let report = pipeline.execute(&args.task, args.target.as_deref()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.succeeded() {
        anyhow::bail!("Update ended in {}", report.final_phase);
    }
    Ok(())
}

fn print_report(report: &UpdateReport) {
    let history: Vec<&str> = report.history.iter().map(|p| p.as_str()).collect();

    println!("\n=== Update {} ===", report.request_id);
    println!("Target:      {}", report.target.display());
    println!("Test target: {}", report.test_target.display());
    println!("Phase:       {}", report.final_phase);
    println!("History:     {}", history.join(" -> "));
    println!("Result:      {}", report.message);
    if let Some(staged) = &report.staged {
        println!("Staged:      {}", staged.main.staged_path.display());
        println!("             {}", staged.test.staged_path.display());
    }
    if let Some(main) = &report.staged_main {
        println!("Staged:      {} (tests not staged)", main.staged_path.display());
    }
    if let Some(record) = &report.backup {
        println!("Backup:      {}", record.backup_path.display());
    }
    if let Some(path) = &report.applied_path {
        println!("Applied:     {}", path.display());
    }
    if let Some(diagnostic) = report.diagnostic.as_deref().filter(|d| !d.trim().is_empty()) {
        println!("\n--- diagnostic ---\n{}", diagnostic.trim_end());
    }
}

// ============================================================================
// Validation, staging and backups
// ============================================================================

fn run_validate_command(args: ValidateArgs) -> anyhow::Result<()> {
    let code = fs::read_to_string(&args.file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", args.file.display(), e))?;

    SyntaxValidator::python().validate(&code, CodeSection::Main)?;
    println!("{}: syntax OK", args.file.display());
    Ok(())
}

fn run_stage_command(args: StageArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let staging = StagingArea::new(&config.staging_root)?;
    let artifact = staging.stage(&args.source, &args.relative)?;
    println!("Staged {} -> {}", args.source.display(), artifact.staged_path.display());
    println!("sha256: {}", artifact.digest);
    Ok(())
}

fn open_archive(config: &PipelineConfig) -> anyhow::Result<BackupArchive> {
    Ok(BackupArchive::new(&config.codebase_root, &config.backup_root)?)
}

fn run_backup_command(args: PathArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let archive = open_archive(config)?;
    match archive.backup(&args.relative)? {
        Some(record) => println!("Backed up {} -> {}", args.relative.display(), record.backup_path.display()),
        None => println!("Nothing to back up: {} does not exist", args.relative.display()),
    }
    Ok(())
}

fn run_backups_command(args: BackupsArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let history = open_archive(config)?.history(&args.relative)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.is_empty() {
        println!("No backups of {}", args.relative.display());
    }
    for (index, record) in history.iter().enumerate() {
        println!(
            "[{}] {}  {}",
            index,
            record.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
            record.backup_path.display()
        );
    }
    Ok(())
}

fn select_backup(history: &[BackupRecord], index: Option<usize>, relative: &Path) -> anyhow::Result<BackupRecord> {
    let record = match index {
        Some(index) => history.get(index),
        None => history.last(),
    };
    record.cloned().ok_or_else(|| match index {
        Some(index) => anyhow::anyhow!(
            "No backup #{} of {} ({} available)",
            index,
            relative.display(),
            history.len()
        ),
        None => anyhow::anyhow!("No backups of {}", relative.display()),
    })
}

fn run_restore_command(args: RestoreArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let archive = open_archive(config)?;
    let history = archive.history(&args.relative)?;
    let record = select_backup(&history, args.index, &args.relative)?;

    let restored = archive.restore(&record)?;
    println!("Restored {} from {}", restored.display(), record.backup_path.display());
    Ok(())
}

fn run_clear_command(args: ClearArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let staging = StagingArea::new(&config.staging_root)?;
    staging.clear(args.relative.as_deref())?;
    match &args.relative {
        Some(relative) => println!("Cleared staged {}", relative.display()),
        None => println!("Cleared staging area {}", staging.root().display()),
    }
    Ok(())
}
