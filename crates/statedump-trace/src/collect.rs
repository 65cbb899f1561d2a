//! Dump collection.
//!
//! Moves the per-test dump files of one checkout into the archive layout
//! `<output_base>/<project>/<bug>/{correct,wrong}/`, post-processes them and
//! leaves only the curated result behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use statedump_core::config::DEFAULT_REPORT_FILE;
use statedump_java::runtime::{safe_test_name, DUMPS_DIR};

use crate::error::TraceError;
use crate::postprocess::{process_dirs, ProcessOptions, ProcessStats, SCHEMAS_DIR};

/// Outcome of one test execution on the buggy revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    /// The test passed.
    Correct,
    /// The test failed or timed out.
    Wrong,
}

impl TestOutcome {
    pub fn dir_name(self) -> &'static str {
        match self {
            TestOutcome::Correct => "correct",
            TestOutcome::Wrong => "wrong",
        }
    }
}

/// Test name (`Class::method`) to outcome.
pub type TestResults = BTreeMap<String, TestOutcome>;

/// Knobs for [`collect_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectOptions {
    /// Instrumentation report copied next to the dumps.
    pub report_file_name: String,
    pub process: ProcessOptions,
}

impl Default for CollectOptions {
    fn default() -> Self {
        CollectOptions {
            report_file_name: DEFAULT_REPORT_FILE.to_string(),
            process: ProcessOptions::default(),
        }
    }
}

/// What a collection run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub dir: PathBuf,
    pub correct: usize,
    pub wrong: usize,
    /// Dump files matching no test result.
    pub unmatched: usize,
    pub report_copied: bool,
    pub stats: ProcessStats,
}

/// Collect with default options. Returns the collection directory.
pub fn collect(
    work_dir: &Path,
    project: &str,
    bug: &str,
    output_base: &Path,
    test_results: Option<&TestResults>,
) -> Result<PathBuf, TraceError> {
    collect_with(
        work_dir,
        project,
        bug,
        output_base,
        test_results,
        &CollectOptions::default(),
    )
    .map(|collection| collection.dir)
}

/// [`collect`] that logs the failure instead of returning it.
pub fn collect_safe(
    work_dir: &Path,
    project: &str,
    bug: &str,
    output_base: &Path,
    test_results: Option<&TestResults>,
) -> Option<PathBuf> {
    match collect(work_dir, project, bug, output_base, test_results) {
        Ok(dir) => Some(dir),
        Err(err) => {
            warn!(project, bug, error = %err, "dump collection failed");
            None
        }
    }
}

/// Full collection run.
///
/// An empty result map is treated like no results: every dump lands in the
/// collection root.
pub fn collect_with(
    work_dir: &Path,
    project: &str,
    bug: &str,
    output_base: &Path,
    test_results: Option<&TestResults>,
    options: &CollectOptions,
) -> Result<Collection, TraceError> {
    let dumps_dir = work_dir.join(DUMPS_DIR);
    if !dumps_dir.is_dir() {
        return Err(TraceError::DumpsMissing { path: dumps_dir });
    }

    let collection_dir = output_base.join(project).join(bug);
    create_dir(&collection_dir)?;
    let results = test_results.filter(|r| !r.is_empty());
    if results.is_some() {
        create_dir(&collection_dir.join(TestOutcome::Correct.dir_name()))?;
        create_dir(&collection_dir.join(TestOutcome::Wrong.dir_name()))?;
    }

    let mut collection = Collection {
        dir: collection_dir.clone(),
        correct: 0,
        wrong: 0,
        unmatched: 0,
        report_copied: false,
        stats: ProcessStats::default(),
    };

    let routes = results.map(route_table).unwrap_or_default();
    for dump in json_files(&dumps_dir)? {
        let stem = dump
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dest_dir = match routes.get(&stem) {
            Some(outcome) => {
                match outcome {
                    TestOutcome::Correct => collection.correct += 1,
                    TestOutcome::Wrong => collection.wrong += 1,
                }
                collection_dir.join(outcome.dir_name())
            }
            None => {
                if results.is_some() {
                    warn!(file = %dump.display(), "dump matches no test result");
                    collection.unmatched += 1;
                }
                collection_dir.clone()
            }
        };
        let Some(name) = dump.file_name() else {
            continue;
        };
        let dest = dest_dir.join(name);
        fs::copy(&dump, &dest).map_err(|e| TraceError::io(&dest, e))?;
        debug!(from = %dump.display(), to = %dest.display(), "collected dump");
    }

    let dirs: Vec<PathBuf> = if results.is_some() {
        vec![
            collection_dir.join(TestOutcome::Correct.dir_name()),
            collection_dir.join(TestOutcome::Wrong.dir_name()),
        ]
    } else {
        vec![collection_dir.clone()]
    };
    collection.stats = process_dirs(&dirs, &collection_dir.join(SCHEMAS_DIR), &options.process);

    // Copied after processing so the report is never cleaned as a dump.
    let report = work_dir.join(&options.report_file_name);
    if report.is_file() {
        let dest = collection_dir.join(&options.report_file_name);
        fs::copy(&report, &dest).map_err(|e| TraceError::io(&dest, e))?;
        collection.report_copied = true;
    }

    prune(&collection_dir, &options.report_file_name)?;

    info!(
        project,
        bug,
        dir = %collection_dir.display(),
        correct = collection.correct,
        wrong = collection.wrong,
        unmatched = collection.unmatched,
        "collected dumps"
    );
    Ok(collection)
}

/// Safe test name to outcome, the key dump files are named by.
fn route_table(results: &TestResults) -> BTreeMap<String, TestOutcome> {
    results
        .iter()
        .map(|(test, outcome)| (safe_test_name(test), *outcome))
        .collect()
}

fn create_dir(path: &Path) -> Result<(), TraceError> {
    fs::create_dir_all(path).map_err(|e| TraceError::io(path, e))
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>, TraceError> {
    let entries = fs::read_dir(dir).map_err(|e| TraceError::io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Remove everything but the outcome directories, schemas and the report.
fn prune(collection_dir: &Path, report_file_name: &str) -> Result<(), TraceError> {
    let keep = [
        TestOutcome::Correct.dir_name(),
        TestOutcome::Wrong.dir_name(),
        SCHEMAS_DIR,
        report_file_name,
    ];
    let entries = fs::read_dir(collection_dir).map_err(|e| TraceError::io(collection_dir, e))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let name = entry.file_name();
        if keep.iter().any(|k| name == *k) {
            continue;
        }
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| TraceError::io(&path, e))?;
        debug!(path = %path.display(), "pruned");
    }
    Ok(())
}
