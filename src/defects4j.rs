//! Benchmark checkout tool.
//!
//! The pipeline talks to the benchmark corpus only through [`BenchmarkTool`].
//! [`Defects4j`] drives the `defects4j` command line through the process
//! runner, with one timeout per command kind.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use statedump_core::config::{RunConfig, Timeouts};
use statedump_core::process::{run_command, CommandOutput, CommandSpec};
use statedump_core::stage::StageFailure;

/// Project property holding the source directory of the classes.
pub const PROP_SRC_CLASSES: &str = "dir.src.classes";
/// Project property listing the classes modified by the fix.
pub const PROP_CLASSES_MODIFIED: &str = "classes.modified";
/// Project property listing the tests that trigger the bug.
pub const PROP_TESTS_TRIGGER: &str = "tests.trigger";

/// Revision of a bug to check out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Revision {
    Buggy,
    Fixed,
}

impl Revision {
    /// Version suffix appended to the bug id (`1b`, `1f`).
    pub fn suffix(self) -> &'static str {
        match self {
            Revision::Buggy => "b",
            Revision::Fixed => "f",
        }
    }
}

/// Result of running a single test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRun {
    pub test: String,
    pub passed: bool,
    pub timed_out: bool,
}

/// The benchmark checkout/build/test tool.
pub trait BenchmarkTool: Send + Sync {
    /// Check out `project` at `bug` and `revision` into `work_dir`.
    fn checkout(
        &self,
        project: &str,
        bug: u32,
        revision: Revision,
        work_dir: &Path,
    ) -> Result<(), StageFailure>;

    fn compile(&self, work_dir: &Path) -> Result<(), StageFailure>;

    /// Run one test with extra environment variables.
    fn test(
        &self,
        work_dir: &Path,
        test: &str,
        env: &[(String, String)],
    ) -> Result<TestRun, StageFailure>;

    /// Value of a project property; `None` when unset or empty.
    fn export(&self, work_dir: &Path, property: &str) -> Result<Option<String>, StageFailure>;
}

/// [`BenchmarkTool`] backed by the `defects4j` executable.
#[derive(Debug, Clone)]
pub struct Defects4j {
    program: String,
    timeouts: Timeouts,
}

impl Defects4j {
    pub fn new(program: impl Into<String>, timeouts: Timeouts) -> Self {
        Defects4j {
            program: program.into(),
            timeouts,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Defects4j::new(config.defects4j.clone(), config.timeouts.clone())
    }

    /// Resolved executable, if it can be found.
    pub fn locate(&self) -> Option<PathBuf> {
        which::which(&self.program).ok()
    }

    fn run(&self, spec: CommandSpec) -> Result<CommandOutput, StageFailure> {
        let output = run_command(&spec)?;
        debug!(
            command = ?output.command,
            status = ?output.status,
            secs = output.duration.as_secs_f64(),
            "defects4j finished"
        );
        Ok(output)
    }

    fn run_ok(&self, spec: CommandSpec) -> Result<CommandOutput, StageFailure> {
        let output = self.run(spec)?;
        if output.success() {
            Ok(output)
        } else {
            Err(StageFailure::from_command(&output))
        }
    }
}

impl BenchmarkTool for Defects4j {
    fn checkout(
        &self,
        project: &str,
        bug: u32,
        revision: Revision,
        work_dir: &Path,
    ) -> Result<(), StageFailure> {
        let spec = CommandSpec::new(&self.program)
            .args(["checkout", "-p", project, "-v"])
            .arg(format!("{}{}", bug, revision.suffix()))
            .arg("-w")
            .arg(work_dir.display().to_string())
            .timeout(self.timeouts.checkout());
        self.run_ok(spec).map(|_| ())
    }

    fn compile(&self, work_dir: &Path) -> Result<(), StageFailure> {
        let spec = CommandSpec::new(&self.program)
            .arg("compile")
            .current_dir(work_dir)
            .timeout(self.timeouts.compile());
        self.run_ok(spec).map(|_| ())
    }

    fn test(
        &self,
        work_dir: &Path,
        test: &str,
        env: &[(String, String)],
    ) -> Result<TestRun, StageFailure> {
        let mut spec = CommandSpec::new(&self.program)
            .args(["test", "-t", test])
            .current_dir(work_dir)
            .timeout(self.timeouts.test());
        for (key, value) in env {
            spec = spec.env(key, value);
        }
        let output = self.run(spec)?;
        let passed = output.success() && failing_test_count(&output.stdout).unwrap_or(0) == 0;
        Ok(TestRun {
            test: test.to_string(),
            passed,
            timed_out: output.timed_out(),
        })
    }

    fn export(&self, work_dir: &Path, property: &str) -> Result<Option<String>, StageFailure> {
        let spec = CommandSpec::new(&self.program)
            .args(["export", "-p", property])
            .current_dir(work_dir)
            .timeout(self.timeouts.export());
        let output = self.run_ok(spec)?;
        let value = output.stdout.trim();
        Ok((!value.is_empty()).then(|| value.to_string()))
    }
}

/// Count from the `Failing tests: N` line of a test run.
pub fn failing_test_count(stdout: &str) -> Option<usize> {
    stdout.lines().find_map(|line| {
        line.trim()
            .strip_prefix("Failing tests:")
            .and_then(|n| n.trim().parse().ok())
    })
}

/// Non-empty trimmed lines of a multi-line property value.
pub fn property_lines(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Source path of a class relative to its source root.
///
/// Nested classes (`a.B$C`) map to the file of their outermost class.
pub fn class_source_path(class_name: &str) -> String {
    let outer = class_name.split('$').next().unwrap_or(class_name);
    format!("{}.java", outer.replace('.', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_count_parsed() {
        let out = "Running ant (compile.tests)...OK\nFailing tests: 2\n  - a.B::c\n  - a.B::d\n";
        assert_eq!(failing_test_count(out), Some(2));
        assert_eq!(failing_test_count("Failing tests: 0"), Some(0));
        assert_eq!(failing_test_count("nothing here"), None);
    }

    #[test]
    fn property_lines_trimmed() {
        let lines = property_lines(Some(" a.B \n\n c.D\n"));
        assert_eq!(lines, vec!["a.B", "c.D"]);
        assert!(property_lines(None).is_empty());
    }

    #[test]
    fn class_paths() {
        assert_eq!(
            class_source_path("org.apache.commons.lang3.math.Fraction"),
            "org/apache/commons/lang3/math/Fraction.java"
        );
        assert_eq!(class_source_path("a.B$Inner"), "a/B.java");
    }

    #[test]
    fn revision_suffixes() {
        assert_eq!(Revision::Buggy.suffix(), "b");
        assert_eq!(Revision::Fixed.suffix(), "f");
    }

    #[test]
    fn missing_executable_fails_stage() {
        let tool = Defects4j::new("statedump-no-such-defects4j", Timeouts::default());
        assert!(tool.locate().is_none());
        let err = tool.compile(Path::new(".")).unwrap_err();
        assert!(!err.timed_out);
        assert!(err.message.contains("statedump-no-such-defects4j"));
    }
}
