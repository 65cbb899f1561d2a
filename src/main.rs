//! Binary entry point for the sdump CLI.
//!
//! Each subcommand maps its arguments onto one library call and prints a
//! single JSON response to stdout. Logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! # Changed line ranges between two revisions of a file
//! sdump diff Buggy.java Fixed.java
//!
//! # Instrument two methods in place and write the report
//! sdump instrument src/Foo.java --signature "int gcd(int u, int v)" --signature "Foo()" --report report.json
//!
//! # One JSON document from a collected tree
//! sdump merge collected_dumps/Lang/1 --output lang_1.json
//!
//! # Full pipeline for a few bugs
//! sdump run --project Lang --bug 1 --bug 2 --config run.json
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use statedump::config::RunConfig;
use statedump::defects4j::Defects4j;
use statedump::deps::ArtifactCache;
use statedump::diff::{compute_change_ranges, ChangeRanges};
use statedump::error::{OutputErrorCode, StateDumpError};
use statedump::java::instrument::{instrument_file, InstrumentOptions, InstrumentationReport};
use statedump::java::resolve::{
    build_target_set, pair_source_trees, resolve_pair, FilePair, TargetSet,
};
use statedump::java::MethodSignature;
use statedump::output::{emit_response, ErrorResponse, Response};
use statedump::pipeline::{run_matrix, BugId, BugReport};
use statedump::trace::collect::{collect_with, CollectOptions, Collection};
use statedump::trace::merge::{merge_json_files, MergeStats};
use statedump::trace::postprocess::{process_dirs, SCHEMAS_DIR};
use statedump::trace::{ProcessOptions, ProcessStats, TestResults};

// ============================================================================
// CLI Structure
// ============================================================================

/// Method-level state dumping for Java bug-fix pairs.
#[derive(Parser, Debug)]
#[command(name = "sdump", version, about = "Method-level state dumping for Java bug-fix pairs")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Log level for tracing output (overridden by RUST_LOG).
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Log line format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// JSON run configuration; unspecified fields use defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Changed line ranges between two files.
    Diff {
        left: PathBuf,
        right: PathBuf,
        /// Unified context width (default from config).
        #[arg(long)]
        context: Option<u32>,
    },
    /// Methods touched by the changes between a buggy and a fixed file, or
    /// between two source trees.
    Resolve { buggy: PathBuf, fixed: PathBuf },
    /// Instrument methods of one file in place.
    Instrument {
        file: PathBuf,
        /// Method signature to instrument; repeatable.
        #[arg(long = "signature", required = true)]
        signatures: Vec<String>,
        /// Write the instrumentation report here.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Directory file labels are made relative to.
        #[arg(long)]
        label_root: Option<PathBuf>,
    },
    /// Clean dump files in a directory and generate schemas.
    Postprocess {
        dir: PathBuf,
        /// Rewrite files without keeping a backup.
        #[arg(long)]
        no_backup: bool,
    },
    /// Merge every JSON file below a directory into one document.
    Merge {
        dir: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Collect a checkout's dumps into the archive.
    Collect {
        #[arg(long)]
        work_dir: PathBuf,
        #[arg(long)]
        project: String,
        #[arg(long)]
        bug: String,
        #[arg(long)]
        output: PathBuf,
        /// JSON object mapping test names to "correct" or "wrong".
        #[arg(long)]
        results: Option<PathBuf>,
    },
    /// Run the full pipeline for one or more bugs.
    Run {
        #[arg(long)]
        project: String,
        /// Bug id; repeatable.
        #[arg(long = "bug", required = true)]
        bugs: Vec<u32>,
    },
}

// ============================================================================
// Response Payloads
// ============================================================================

#[derive(Debug, Serialize)]
struct DiffData {
    left_file: String,
    right_file: String,
    #[serde(flatten)]
    ranges: ChangeRanges,
}

#[derive(Debug, Serialize)]
struct ResolveData {
    buggy: String,
    fixed: String,
    methods: BTreeSet<MethodSignature>,
}

#[derive(Debug, Serialize)]
struct ResolveTreeData {
    pairs: usize,
    targets: TargetSet,
}

#[derive(Debug, Serialize)]
struct InstrumentData {
    #[serde(flatten)]
    report: InstrumentationReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct PostprocessData {
    dir: PathBuf,
    #[serde(flatten)]
    stats: ProcessStats,
}

#[derive(Debug, Serialize)]
struct MergeData {
    output: PathBuf,
    #[serde(flatten)]
    stats: MergeStats,
}

#[derive(Debug, Serialize)]
struct CollectData {
    #[serde(flatten)]
    collection: Collection,
}

#[derive(Debug, Serialize)]
struct RunData {
    succeeded: usize,
    failed: usize,
    reports: Vec<BugReport>,
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level, cli.global.log_format);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::from_error(&err);

            // Errors go to stdout as JSON like every other response
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();

            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel, format: LogFormat) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Execute the CLI command.
fn execute(cli: Cli) -> Result<(), StateDumpError> {
    let config = RunConfig::load_or_default(cli.global.config.as_deref())?;
    match cli.command {
        Command::Diff {
            left,
            right,
            context,
        } => execute_diff(&config, &left, &right, context),
        Command::Resolve { buggy, fixed } => execute_resolve(&config, buggy, fixed),
        Command::Instrument {
            file,
            signatures,
            report,
            label_root,
        } => execute_instrument(&config, &file, &signatures, report, label_root),
        Command::Postprocess { dir, no_backup } => execute_postprocess(&dir, no_backup),
        Command::Merge { dir, output } => execute_merge(&dir, output),
        Command::Collect {
            work_dir,
            project,
            bug,
            output,
            results,
        } => execute_collect(&config, &work_dir, &project, &bug, &output, results.as_deref()),
        Command::Run { project, bugs } => execute_run(&config, &project, &bugs),
    }
}

fn emit<T: Serialize>(data: T) -> Result<(), StateDumpError> {
    emit_response(&Response::ok(data), &mut io::stdout())
        .map_err(|e| StateDumpError::internal(e.to_string()))?;
    let _ = io::stdout().flush();
    Ok(())
}

// ============================================================================
// Command Executors
// ============================================================================

fn execute_diff(
    config: &RunConfig,
    left: &Path,
    right: &Path,
    context: Option<u32>,
) -> Result<(), StateDumpError> {
    let mut options = config.diff_options();
    if let Some(context) = context {
        options.context = context;
    }
    let ranges = compute_change_ranges(left, right, &options)?;
    emit(DiffData {
        left_file: left.display().to_string(),
        right_file: right.display().to_string(),
        ranges,
    })
}

fn execute_resolve(config: &RunConfig, buggy: PathBuf, fixed: PathBuf) -> Result<(), StateDumpError> {
    if buggy.is_dir() && fixed.is_dir() {
        let pairs = pair_source_trees(&buggy, &fixed);
        let targets = build_target_set(&pairs, &config.diff_options());
        return emit(ResolveTreeData {
            pairs: pairs.len(),
            targets,
        });
    }
    let pair = FilePair::new(buggy, fixed);
    let methods = resolve_pair(&pair, &config.diff_options())?;
    emit(ResolveData {
        buggy: pair.buggy.display().to_string(),
        fixed: pair.fixed.display().to_string(),
        methods,
    })
}

fn execute_instrument(
    config: &RunConfig,
    file: &Path,
    signatures: &[String],
    report_path: Option<PathBuf>,
    label_root: Option<PathBuf>,
) -> Result<(), StateDumpError> {
    let targets: BTreeSet<MethodSignature> =
        signatures.iter().map(|s| MethodSignature::normalize(s)).collect();
    let options = InstrumentOptions {
        relevant_method_limit: config.relevant_method_limit,
        label_root,
        report_path: None,
    };
    let result = instrument_file(file, &targets, &options)?;
    let report = InstrumentationReport {
        files: vec![result],
        failures: Vec::new(),
    };
    if let Some(path) = &report_path {
        report.write(path)?;
    }
    emit(InstrumentData {
        report,
        report_path,
    })
}

fn execute_postprocess(dir: &Path, no_backup: bool) -> Result<(), StateDumpError> {
    if !dir.is_dir() {
        return Err(StateDumpError::file_not_found(dir.display().to_string()));
    }
    let options = ProcessOptions { backup: !no_backup };
    let stats = process_dirs(&[dir.to_path_buf()], &dir.join(SCHEMAS_DIR), &options);
    emit(PostprocessData {
        dir: dir.to_path_buf(),
        stats,
    })
}

fn execute_merge(dir: &Path, output: PathBuf) -> Result<(), StateDumpError> {
    let stats = merge_json_files(dir, &output)?;
    emit(MergeData { output, stats })
}

fn execute_collect(
    config: &RunConfig,
    work_dir: &Path,
    project: &str,
    bug: &str,
    output: &Path,
    results: Option<&Path>,
) -> Result<(), StateDumpError> {
    let results = results.map(load_results).transpose()?;
    let options = CollectOptions {
        report_file_name: config.report_file_name.clone(),
        process: ProcessOptions {
            backup: config.keep_backups,
        },
    };
    let collection = collect_with(work_dir, project, bug, output, results.as_ref(), &options)?;
    emit(CollectData { collection })
}

fn load_results(path: &Path) -> Result<TestResults, StateDumpError> {
    let text = fs::read_to_string(path)
        .map_err(|_| StateDumpError::file_not_found(path.display().to_string()))?;
    serde_json::from_str(&text).map_err(|e| {
        StateDumpError::invalid_args(format!("invalid results file {}: {}", path.display(), e))
    })
}

fn execute_run(config: &RunConfig, project: &str, bugs: &[u32]) -> Result<(), StateDumpError> {
    let tool = Defects4j::from_config(config);
    if tool.locate().is_none() {
        return Err(StateDumpError::invalid_args_with_details(
            "benchmark tool not found",
            serde_json::json!({ "program": config.defects4j }),
        ));
    }
    let cache = ArtifactCache::with_curl(config.cache_dir.clone(), config.timeouts.download());
    let bugs: Vec<BugId> = bugs.iter().map(|&bug| BugId::new(project, bug)).collect();

    let reports = run_matrix(&bugs, config, Arc::new(tool), Arc::new(cache));
    let succeeded = reports.iter().filter(|r| r.success).count();
    emit(RunData {
        succeeded,
        failed: reports.len() - succeeded,
        reports,
    })
}

// ============================================================================
// Tests
// ============================================================================
