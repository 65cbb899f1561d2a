//! Per-bug pipeline and the bug-matrix worker pool.
//!
//! [`run_bug`] drives one bug through its stages on the calling thread and
//! never fails: every problem is recorded on the returned [`BugReport`].
//! [`run_matrix`] runs many bugs at once on a bounded pool.

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn};

use statedump_core::config::RunConfig;
use statedump_core::stage::{StageFailure, StageName, StageTimeline};
use statedump_java::instrument::{instrument_targets, InstrumentOptions};
use statedump_java::resolve::{all_methods_target_set, build_target_set, pairs_for_modified_classes};
use statedump_java::runtime::{deploy_helper_sources, dump_file_for_test, DUMPS_DIR};
use statedump_java::TargetSet;
use statedump_trace::collect::{collect_with, CollectOptions, Collection};
use statedump_trace::{ProcessOptions, TestOutcome, TestResults};

use crate::defects4j::{
    class_source_path, property_lines, BenchmarkTool, Revision, PROP_CLASSES_MODIFIED,
    PROP_SRC_CLASSES, PROP_TESTS_TRIGGER,
};
use crate::deps::{jackson_artifacts, ArtifactCache, LIB_DIR};

/// Source root used when the project does not export one.
const DEFAULT_SRC_DIR: &str = "src/main/java";

// ============================================================================
// Types
// ============================================================================

/// A benchmark bug: project name and numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BugId {
    pub project: String,
    pub bug: u32,
}

impl BugId {
    pub fn new(project: impl Into<String>, bug: u32) -> Self {
        BugId {
            project: project.into(),
            bug,
        }
    }
}

impl fmt::Display for BugId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.project, self.bug)
    }
}

/// Everything known about one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugReport {
    pub bug: BugId,
    pub started_at: String,
    pub finished_at: String,
    /// Every stage finished Ok.
    pub success: bool,
    pub timeline: StageTimeline,
    pub targeted_methods: usize,
    pub instrumented_methods: usize,
    pub test_results: TestResults,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BugReport {
    fn new(bug: &BugId) -> Self {
        BugReport {
            bug: bug.clone(),
            started_at: Utc::now().to_rfc3339(),
            finished_at: String::new(),
            success: false,
            timeline: StageTimeline::default(),
            targeted_methods: 0,
            instrumented_methods: 0,
            test_results: TestResults::new(),
            collection: None,
            error: None,
        }
    }

    /// Report for a run that never got to record its own outcome.
    pub fn failed(bug: &BugId, message: impl Into<String>) -> Self {
        let mut report = BugReport::new(bug);
        report.finished_at = report.started_at.clone();
        report.error = Some(message.into());
        report
    }
}

/// Result of the compile stage.
#[derive(Debug, Clone, Serialize)]
struct Prepared {
    src_dir: PathBuf,
    jars: Vec<PathBuf>,
    dump_obj_written: bool,
}

/// Summary recorded for the instrument stage.
#[derive(Debug, Clone, Serialize)]
struct Instrumented {
    files: usize,
    methods: usize,
    failures: usize,
    report: PathBuf,
}

// ============================================================================
// Single bug
// ============================================================================

/// Run every stage for one bug.
pub fn run_bug(
    bug: &BugId,
    config: &RunConfig,
    tool: &dyn BenchmarkTool,
    cache: &ArtifactCache,
) -> BugReport {
    let span = info_span!("bug", project = %bug.project, bug = bug.bug);
    let _guard = span.enter();

    let mut report = BugReport::new(bug);
    let buggy = config.buggy_dir(&bug.project, bug.bug);
    let fixed = config.fixed_dir(&bug.project, bug.bug);

    report.timeline.run(StageName::CheckoutBuggy, || {
        checkout_fresh(tool, bug, Revision::Buggy, &buggy)
    });
    report.timeline.run(StageName::CheckoutFixed, || {
        checkout_fresh(tool, bug, Revision::Fixed, &fixed)
    });

    let prepared = report
        .timeline
        .run(StageName::Compile, || prepare(tool, cache, config, &buggy));
    let src_dir = prepared
        .map(|p| p.src_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SRC_DIR));

    let targets = report.timeline.run(StageName::ResolveTargets, || {
        resolve_targets(tool, config, &buggy, &fixed, &src_dir)
    });
    report.targeted_methods = targets
        .as_ref()
        .map(|t| t.values().map(|s| s.len()).sum())
        .unwrap_or(0);

    let instrumented = report.timeline.run(StageName::Instrument, || {
        instrument(config, &buggy, &src_dir, targets.as_ref().unwrap_or(&TargetSet::new()))
    });
    report.instrumented_methods = instrumented.map(|i| i.methods).unwrap_or(0);

    report
        .timeline
        .run(StageName::Rebuild, || tool.compile(&buggy));

    if let Some(results) = report
        .timeline
        .run(StageName::RunTests, || run_tests(tool, config, &buggy))
    {
        report.test_results = results;
    }

    let results = report.test_results.clone();
    let collection = report.timeline.run(StageName::Collect, || {
        collect_dumps(config, bug, &buggy, &results)
    });
    report.collection = collection.map(|c| c.dir);

    report.success = report.timeline.all_ok();
    report.error = report
        .timeline
        .first_failure()
        .map(|(stage, message)| format!("{}: {}", stage, message));
    report.finished_at = Utc::now().to_rfc3339();
    info!(success = report.success, "bug finished");
    report
}

fn checkout_fresh(
    tool: &dyn BenchmarkTool,
    bug: &BugId,
    revision: Revision,
    dir: &Path,
) -> Result<PathBuf, StageFailure> {
    if dir.exists() {
        debug!(dir = %dir.display(), "removing previous checkout");
        fs::remove_dir_all(dir)?;
    }
    tool.checkout(&bug.project, bug.bug, revision, dir)?;
    Ok(dir.to_path_buf())
}

/// Deploy the runtime helpers, fetch their jars and compile.
fn prepare(
    tool: &dyn BenchmarkTool,
    cache: &ArtifactCache,
    config: &RunConfig,
    buggy: &Path,
) -> Result<Prepared, StageFailure> {
    let src_dir = tool
        .export(buggy, PROP_SRC_CLASSES)?
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SRC_DIR));
    let helpers = deploy_helper_sources(buggy, &src_dir, &config.dump_env_var)?;
    let jars = cache.fetch_all(
        &jackson_artifacts(&config.jackson_version),
        &buggy.join(LIB_DIR),
    )?;
    tool.compile(buggy)?;
    Ok(Prepared {
        src_dir,
        jars,
        dump_obj_written: helpers.dump_obj_written,
    })
}

fn resolve_targets(
    tool: &dyn BenchmarkTool,
    config: &RunConfig,
    buggy: &Path,
    fixed: &Path,
    src_dir: &Path,
) -> Result<TargetSet, StageFailure> {
    let classes: Vec<String> = property_lines(tool.export(buggy, PROP_CLASSES_MODIFIED)?.as_deref())
        .iter()
        .map(|class| class_source_path(class))
        .collect();
    let pairs: Vec<_> = pairs_for_modified_classes(&buggy.join(src_dir), &fixed.join(src_dir), &classes)
        .into_iter()
        .filter(|pair| pair.buggy.is_file() && pair.fixed.is_file())
        .collect();

    let mut targets = build_target_set(&pairs, &config.diff_options());
    if targets.is_empty() && config.instrument_all_modified {
        let files: Vec<PathBuf> = pairs.into_iter().map(|pair| pair.buggy).collect();
        info!(files = files.len(), "no changed methods, instrumenting all methods of modified classes");
        targets = all_methods_target_set(&files);
    }
    if targets.is_empty() {
        warn!(classes = ?classes, "no methods to instrument");
    }
    Ok(targets)
}

fn instrument(
    config: &RunConfig,
    buggy: &Path,
    src_dir: &Path,
    targets: &TargetSet,
) -> Result<Instrumented, StageFailure> {
    let report_path = buggy.join(&config.report_file_name);
    let options = InstrumentOptions {
        relevant_method_limit: config.relevant_method_limit,
        label_root: Some(buggy.join(src_dir)),
        report_path: Some(report_path.clone()),
    };
    let report = instrument_targets(targets, &options);
    let summary = Instrumented {
        files: report.files.len(),
        methods: report.instrumented_count(),
        failures: report.failures.len(),
        report: report_path,
    };
    if summary.methods == 0 && summary.failures > 0 {
        return Err(StageFailure::new(format!(
            "no method instrumented, {} file(s) failed",
            summary.failures
        )));
    }
    Ok(summary)
}

/// Run the triggering tests, each writing its own dump file.
///
/// A passing test is correct; a failing or timed-out one is wrong.
fn run_tests(
    tool: &dyn BenchmarkTool,
    config: &RunConfig,
    buggy: &Path,
) -> Result<TestResults, StageFailure> {
    let tests = property_lines(tool.export(buggy, PROP_TESTS_TRIGGER)?.as_deref());
    fs::create_dir_all(buggy.join(DUMPS_DIR))?;

    let queue = Mutex::new(tests.into_iter().collect::<VecDeque<String>>());
    let results = Mutex::new(TestResults::new());
    let errors = Mutex::new(Vec::new());
    let workers = config.test_workers.max(1);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let next = queue.lock().ok().and_then(|mut q| q.pop_front());
                let Some(test) = next else {
                    break;
                };
                let dump = dump_file_for_test(buggy, &test);
                let env = [(config.dump_env_var.clone(), dump.display().to_string())];
                match tool.test(buggy, &test, &env) {
                    Ok(run) => {
                        let outcome = if run.passed && !run.timed_out {
                            TestOutcome::Correct
                        } else {
                            TestOutcome::Wrong
                        };
                        debug!(test = %test, ?outcome, timed_out = run.timed_out, "test finished");
                        if let Ok(mut results) = results.lock() {
                            results.insert(test, outcome);
                        }
                    }
                    Err(failure) => {
                        warn!(test = %test, error = %failure.message, "test could not run");
                        if let Ok(mut errors) = errors.lock() {
                            errors.push(failure);
                        }
                    }
                }
            });
        }
    });

    let results = results.into_inner().unwrap_or_default();
    let errors = errors.into_inner().unwrap_or_default();
    if results.is_empty() {
        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }
    }
    Ok(results)
}

fn collect_dumps(
    config: &RunConfig,
    bug: &BugId,
    buggy: &Path,
    results: &TestResults,
) -> Result<Collection, StageFailure> {
    let options = CollectOptions {
        report_file_name: config.report_file_name.clone(),
        process: ProcessOptions {
            backup: config.keep_backups,
        },
    };
    let collection = collect_with(
        buggy,
        &bug.project,
        &bug.bug.to_string(),
        &config.output_base,
        Some(results),
        &options,
    )?;
    Ok(collection)
}

// ============================================================================
// Bug matrix
// ============================================================================

/// Run `bugs` on at most `config.workers` concurrent pipelines.
///
/// Reports come back in input order. A pipeline that panics yields a failed
/// report for its bug only.
pub fn run_matrix(
    bugs: &[BugId],
    config: &RunConfig,
    tool: Arc<dyn BenchmarkTool>,
    cache: Arc<ArtifactCache>,
) -> Vec<BugReport> {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            return bugs
                .iter()
                .map(|bug| BugReport::failed(bug, format!("cannot start runtime: {}", err)))
                .collect()
        }
    };
    let config = Arc::new(config.clone());
    runtime.block_on(run_matrix_async(bugs.to_vec(), config, tool, cache))
}

async fn run_matrix_async(
    bugs: Vec<BugId>,
    config: Arc<RunConfig>,
    tool: Arc<dyn BenchmarkTool>,
    cache: Arc<ArtifactCache>,
) -> Vec<BugReport> {
    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    let mut set = JoinSet::new();

    for (index, bug) in bugs.iter().cloned().enumerate() {
        let semaphore = semaphore.clone();
        let config = config.clone();
        let tool = tool.clone();
        let cache = cache.clone();
        set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (index, BugReport::failed(&bug, "worker pool closed"));
            };
            let id = bug.clone();
            let joined = tokio::task::spawn_blocking(move || {
                run_bug(&id, &config, tool.as_ref(), &cache)
            })
            .await;
            let report = match joined {
                Ok(report) => report,
                Err(err) => {
                    let message = if err.is_panic() {
                        panic_message(err.into_panic())
                    } else {
                        err.to_string()
                    };
                    warn!(bug = %bug, error = %message, "pipeline worker died");
                    BugReport::failed(&bug, format!("pipeline panicked: {}", message))
                }
            };
            (index, report)
        });
    }

    let mut reports: Vec<Option<BugReport>> = vec![None; bugs.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, report)) => reports[index] = Some(report),
            Err(err) => warn!(error = %err, "matrix task failed"),
        }
    }
    reports
        .into_iter()
        .zip(&bugs)
        .map(|(report, bug)| report.unwrap_or_else(|| BugReport::failed(bug, "pipeline task lost")))
        .collect()
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
