//! Entry/exit instrumentation of Java methods.
//!
//! Instrumenting a file is a single pass over one immutable parse:
//!
//! 1. Parse and collect the declarations whose signature is targeted
//! 2. Build a [`MethodPlan`] per declaration (or record why it is skipped)
//! 3. Emit disjoint edits: marker, prologue, return rewrites, epilogue,
//!    plus one import edit per file
//! 4. Validate and apply the edit set, highest offset first
//! 5. Write the file back and return one report record per method
//!
//! Already-instrumented methods carry the marker annotation and are skipped,
//! so instrumenting twice leaves the file byte-identical.

pub mod emit;
pub mod plan;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use statedump_core::config::DEFAULT_RELEVANT_METHOD_LIMIT;
use statedump_core::patch::{EditError, EditSet};
use statedump_core::text::line_count;

use crate::error::InstrumentError;
use crate::javadoc::{javadoc_for, JavaDoc};
use crate::relevant::RelevanceIndex;
use crate::resolve::TargetSet;
use crate::signature::MethodSignature;
use crate::syntax::{parse_java, MethodNode};

pub use plan::{MethodPlan, SkipReason};

// ============================================================================
// Options and Results
// ============================================================================

/// Options for an instrumentation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentOptions {
    /// Cap on relevant methods attached to each record.
    pub relevant_method_limit: usize,
    /// When set, file paths embedded in generated code and records are made
    /// relative to this directory.
    pub label_root: Option<PathBuf>,
    /// Where [`instrument_targets`] writes the report, if anywhere.
    pub report_path: Option<PathBuf>,
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        InstrumentOptions {
            relevant_method_limit: DEFAULT_RELEVANT_METHOD_LIMIT,
            label_root: None,
            report_path: None,
        }
    }
}

impl InstrumentOptions {
    /// Path string recorded for `path`.
    pub fn file_label(&self, path: &Path) -> String {
        let shown = self
            .label_root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);
        shown.display().to_string()
    }
}

/// One instrumented method, as persisted in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentedMethodRecord {
    pub file: String,
    /// Signature before transformation.
    pub signature: MethodSignature,
    pub javadoc: Option<JavaDoc>,
    /// Declaration source before transformation.
    pub code: String,
    pub relevant_methods: Vec<MethodSignature>,
}

/// What happened to a file as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    /// Edits were applied and the file rewritten.
    Instrumented,
    /// No declaration matched a target; the file was not touched.
    NoTargets,
    /// Targets matched but every one was skipped; the file was not touched.
    Unchanged,
    /// The source did not parse cleanly; the file was not touched.
    ParseFailed,
}

/// Result of rewriting a source buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRewrite {
    /// New buffer, present only when something was instrumented.
    pub output: Option<Vec<u8>>,
    pub records: Vec<InstrumentedMethodRecord>,
    pub skipped: Vec<(MethodSignature, SkipReason)>,
    pub outcome: FileOutcome,
}

impl SourceRewrite {
    fn untouched(outcome: FileOutcome, skipped: Vec<(MethodSignature, SkipReason)>) -> Self {
        SourceRewrite {
            output: None,
            records: Vec::new(),
            skipped,
            outcome,
        }
    }
}

/// Result of instrumenting one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInstrumentation {
    pub file: PathBuf,
    pub records: Vec<InstrumentedMethodRecord>,
    pub skipped: Vec<(MethodSignature, SkipReason)>,
    pub outcome: FileOutcome,
}

// ============================================================================
// Source Rewriting
// ============================================================================

/// Instrument the targeted methods of a source buffer.
///
/// Pure: the input is never modified and nothing touches the file system.
/// `file_label` is the path string embedded in generated calls.
pub fn instrument_source(
    source: &[u8],
    file_label: &str,
    targets: &BTreeSet<MethodSignature>,
    options: &InstrumentOptions,
) -> Result<SourceRewrite, EditError> {
    let Some(tree) = parse_java(source) else {
        return Ok(SourceRewrite::untouched(FileOutcome::ParseFailed, Vec::new()));
    };
    if tree.has_errors() {
        return Ok(SourceRewrite::untouched(FileOutcome::ParseFailed, Vec::new()));
    }

    let methods = tree.method_nodes();
    let matched: Vec<(MethodNode<'_>, MethodSignature)> = methods
        .iter()
        .map(|m| (*m, m.signature()))
        .filter(|(_, sig)| targets.contains(sig))
        .collect();

    let mut skipped: Vec<(MethodSignature, SkipReason)> = targets
        .iter()
        .filter(|t| !matched.iter().any(|(_, sig)| sig == *t))
        .map(|t| (t.clone(), SkipReason::NotFound))
        .collect();
    if matched.is_empty() {
        return Ok(SourceRewrite::untouched(FileOutcome::NoTargets, skipped));
    }

    let mut planned: Vec<(MethodNode<'_>, MethodPlan)> = Vec::new();
    for (method, signature) in matched {
        let floor = lookback_floor(&method);
        match MethodPlan::build(&method, source, floor) {
            Ok(plan) => planned.push((method, plan)),
            Err(reason) => {
                debug!(signature = %signature, ?reason, "skipping method");
                skipped.push((signature, reason));
            }
        }
    }
    if planned.is_empty() {
        return Ok(SourceRewrite::untouched(FileOutcome::Unchanged, skipped));
    }

    let mut edits = EditSet::for_content(source);
    let missing = emit::missing_imports(|name| tree.has_import(name));
    if let Some(edit) = emit::import_edit(edits.next_id(), tree.package_end(), &missing) {
        edits.push(edit);
    }
    for (_, plan) in &planned {
        emit::push_method_edits(&mut edits, plan, file_label);
    }
    let output = edits.apply(source)?;
    if line_count(&output) != line_count(source) {
        warn!(file = file_label, "instrumentation shifted source lines");
    }

    let index = (options.relevant_method_limit > 0).then(|| RelevanceIndex::build(&tree));
    let records = planned
        .iter()
        .map(|(method, plan)| InstrumentedMethodRecord {
            file: file_label.to_string(),
            signature: plan.signature.clone(),
            javadoc: javadoc_for(method, source),
            code: plan::method_code(method, source),
            relevant_methods: index
                .as_ref()
                .map(|idx| idx.relevant_to(&plan.signature, options.relevant_method_limit))
                .unwrap_or_default(),
        })
        .collect();

    Ok(SourceRewrite {
        output: Some(output),
        records,
        skipped,
        outcome: FileOutcome::Instrumented,
    })
}

/// End of whatever precedes the declaration in its parent.
fn lookback_floor(method: &MethodNode<'_>) -> usize {
    let node = method.node();
    node.prev_sibling()
        .map(|prev| prev.end_byte())
        .or_else(|| node.parent().map(|parent| parent.start_byte()))
        .unwrap_or(0)
}

// ============================================================================
// Files
// ============================================================================

/// Instrument the targeted methods of one file in place.
pub fn instrument_file(
    path: &Path,
    targets: &BTreeSet<MethodSignature>,
    options: &InstrumentOptions,
) -> Result<FileInstrumentation, InstrumentError> {
    let source = fs::read(path).map_err(|e| InstrumentError::read(path, e))?;
    let label = options.file_label(path);
    let rewrite =
        instrument_source(&source, &label, targets, options).map_err(|source| {
            InstrumentError::Edit {
                path: path.to_path_buf(),
                source,
            }
        })?;

    if let Some(output) = &rewrite.output {
        fs::write(path, output).map_err(|source| InstrumentError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    for (signature, reason) in &rewrite.skipped {
        if *reason != SkipReason::AlreadyInstrumented {
            warn!(file = %path.display(), signature = %signature, ?reason, "method not instrumented");
        }
    }
    if rewrite.outcome == FileOutcome::ParseFailed {
        warn!(file = %path.display(), "source does not parse, left untouched");
    }

    Ok(FileInstrumentation {
        file: path.to_path_buf(),
        records: rewrite.records,
        skipped: rewrite.skipped,
        outcome: rewrite.outcome,
    })
}

/// A file that could not be instrumented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: PathBuf,
    pub message: String,
}

/// Results of instrumenting a whole target set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentationReport {
    pub files: Vec<FileInstrumentation>,
    pub failures: Vec<FileFailure>,
}

impl InstrumentationReport {
    /// Every instrumented method record, in file order.
    pub fn records(&self) -> impl Iterator<Item = &InstrumentedMethodRecord> {
        self.files.iter().flat_map(|f| f.records.iter())
    }

    pub fn instrumented_count(&self) -> usize {
        self.records().count()
    }

    /// Persist the records as a pretty-printed JSON array.
    pub fn write(&self, path: &Path) -> Result<(), InstrumentError> {
        let records: Vec<&InstrumentedMethodRecord> = self.records().collect();
        let json = serde_json::to_string_pretty(&records)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| InstrumentError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        fs::write(path, json).map_err(|source| InstrumentError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Instrument every file of a target set.
///
/// Per-file failures are logged and recorded; they never stop the run. The
/// report is written to `options.report_path` when set.
pub fn instrument_targets(targets: &TargetSet, options: &InstrumentOptions) -> InstrumentationReport {
    let mut report = InstrumentationReport::default();
    for (path, signatures) in targets {
        match instrument_file(path, signatures, options) {
            Ok(result) => {
                debug!(
                    file = %path.display(),
                    outcome = ?result.outcome,
                    methods = result.records.len(),
                    "instrumented file"
                );
                report.files.push(result);
            }
            Err(err) => {
                warn!(file = %path.display(), error = %err, "instrumentation failed");
                report.failures.push(FileFailure {
                    file: path.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    if let Some(report_path) = &options.report_path {
        match report.write(report_path) {
            Ok(()) => info!(
                path = %report_path.display(),
                methods = report.instrumented_count(),
                "wrote instrumentation report"
            ),
            Err(err) => {
                warn!(path = %report_path.display(), error = %err, "cannot write report");
                report.failures.push(FileFailure {
                    file: report_path.clone(),
                    message: err.to_string(),
                });
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(sigs: &[&str]) -> BTreeSet<MethodSignature> {
        sigs.iter().map(|s| MethodSignature::normalize(s)).collect()
    }

    fn rewrite(source: &str, sigs: &[&str]) -> SourceRewrite {
        instrument_source(
            source.as_bytes(),
            "A.java",
            &targets(sigs),
            &InstrumentOptions::default(),
        )
        .unwrap()
    }

    fn output(source: &str, sigs: &[&str]) -> String {
        String::from_utf8(rewrite(source, sigs).output.unwrap()).unwrap()
    }

    /// For every return statement in `sig`'s body, the expression stored in
    /// the holder by the statement two places before it.
    fn holder_assignments(out: &str, sig: &str) -> Vec<String> {
        use crate::syntax::{node_text, visit_nodes};

        let bytes = out.as_bytes();
        let tree = parse_java(bytes).unwrap();
        let methods = tree.method_nodes();
        let method = methods
            .iter()
            .find(|m| m.signature().as_str() == sig)
            .unwrap();
        let mut returns = Vec::new();
        visit_nodes(method.node(), &mut |node| {
            if node.kind() == "return_statement" {
                returns.push(node);
            }
        });
        returns
            .into_iter()
            .map(|ret| {
                assert_eq!(node_text(bytes, ret), "return __objdump_ret;");
                let flag = ret.prev_named_sibling().unwrap();
                assert_eq!(node_text(bytes, flag), "__objdump_returned = true;");
                let assign = flag.prev_named_sibling().unwrap();
                let text = node_text(bytes, assign);
                text.strip_prefix("__objdump_ret = ")
                    .and_then(|rest| rest.strip_suffix(';'))
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    mod rewrite_tests {
        use super::*;

        #[test]
        fn simple_method_gets_all_parts() {
            let src = "package p;\n\nclass A {\n    int twice(int x) {\n        return x * 2;\n    }\n}\n";
            let out = output(src, &["int twice(int x)"]);
            assert!(out.starts_with(
                "package p; import org.instrument.DumpObj; import org.instrument.DebugDump;\n"
            ));
            assert!(out.contains("@DumpObj int twice(int x) {"));
            assert!(out.contains("__objdump_params.put(\"param0\", x);"));
            assert!(out.contains("{ __objdump_ret = x * 2; __objdump_returned = true; return __objdump_ret; }"));
            assert!(out.contains("} finally { org.instrument.DebugDump.writeExit(this,"));
            assert_eq!(out.lines().count(), src.lines().count());
        }

        #[test]
        fn return_expression_appears_once() {
            let src = "class A {\n    int f() {\n        return compute(1, 2);\n    }\n}\n";
            let out = output(src, &["int f()"]);
            assert_eq!(out.matches("compute(1, 2)").count(), 1);
            assert_eq!(holder_assignments(&out, "int f()"), vec!["compute(1, 2)"]);
        }

        #[test]
        fn every_return_reads_the_holder_once_assigned() {
            let src = "class A {\n    int f(int x) {\n        if (x > 0) {\n            return next(x);\n        }\n        return x < 0 ? next(-x) : 0;\n    }\n}\n";
            let out = output(src, &["int f(int x)"]);
            assert_eq!(
                holder_assignments(&out, "int f(int x)"),
                vec!["next(x)", "x < 0 ? next(-x) : 0"]
            );
            assert_eq!(out.matches("next(").count(), 2);
        }

        #[test]
        fn signature_text_preserved() {
            let src = "class A {\n    public final <T> java.util.List<T> wrap(final T item, int... rest) throws java.io.IOException {\n        return null;\n    }\n}\n";
            let out = output(src, &["java.util.List<T> wrap(T item, int... rest)"]);
            assert!(out.contains(
                "@DumpObj public final <T> java.util.List<T> wrap(final T item, int... rest) throws java.io.IOException {"
            ));
            assert!(out.contains("java.util.List<T> __objdump_ret = null;"));
        }

        #[test]
        fn constructor_prologue_follows_super_call() {
            let src = "class A extends B {\n    A(int x) {\n        super(x);\n        y = x;\n    }\n}\n";
            let out = output(src, &["A(int x)"]);
            let super_at = out.find("super(x);").unwrap();
            let id_at = out.find("newInvocationId()").unwrap();
            assert!(super_at < id_at);
            assert!(out.contains("writeEntry(this,"));
            assert!(!out.contains("__objdump_ret"));
        }

        #[test]
        fn static_method_records_null_self() {
            let src = "class A {\n    static void log(String m) {\n        System.out.println(m);\n    }\n}\n";
            let out = output(src, &["void log(String m)"]);
            assert!(out.contains("writeEntry(null,"));
            assert!(out.contains("writeExit(null, __objdump_params, null,"));
        }

        #[test]
        fn empty_body() {
            let src = "class A {\n    void f() {}\n}\n";
            let out = output(src, &["void f()"]);
            let prologue = out.find("try {").unwrap();
            let epilogue = out.find("} finally {").unwrap();
            assert!(prologue < epilogue);
        }

        #[test]
        fn existing_imports_not_duplicated() {
            let src = "import org.instrument.*;\nclass A {\n    void f() {}\n}\n";
            let out = output(src, &["void f()"]);
            assert!(!out.contains("import org.instrument.DumpObj;"));
            assert!(out.starts_with("import org.instrument.*;"));
        }

        #[test]
        fn no_package_puts_imports_first() {
            let src = "class A {\n    void f() {}\n}\n";
            let out = output(src, &["void f()"]);
            assert!(out.starts_with("import org.instrument.DumpObj; import org.instrument.DebugDump; class A {"));
        }
    }

    mod outcome_tests {
        use super::*;

        #[test]
        fn no_matching_targets_leaves_source_alone() {
            let result = rewrite("class A { void f() {} }", &["void g()"]);
            assert_eq!(result.outcome, FileOutcome::NoTargets);
            assert!(result.output.is_none());
            assert_eq!(result.skipped[0].1, SkipReason::NotFound);
        }

        #[test]
        fn abstract_target_is_unsupported() {
            let result = rewrite("abstract class A { abstract void f(); }", &["void f()"]);
            assert_eq!(result.outcome, FileOutcome::Unchanged);
            assert_eq!(result.skipped[0].1, SkipReason::UnsupportedBody);
        }

        #[test]
        fn broken_source_is_parse_failure() {
            let result = rewrite("class A { void f() { return ; ", &["void f()"]);
            assert_eq!(result.outcome, FileOutcome::ParseFailed);
            assert!(result.output.is_none());
        }

        #[test]
        fn records_carry_original_code_and_javadoc() {
            let src = "class A {\n    /** Doubles. @return twice x */\n    int twice(int x) { return x * 2; }\n    int quad(int x) { return twice(twice(x)); }\n}\n";
            let result = rewrite(src, &["int twice(int x)"]);
            let record = &result.records[0];
            assert_eq!(record.file, "A.java");
            assert_eq!(record.signature.as_str(), "int twice(int x)");
            assert_eq!(record.code, "int twice(int x) { return x * 2; }");
            assert!(record.javadoc.is_some());
            assert_eq!(record.relevant_methods[0].as_str(), "int quad(int x)");
        }

        #[test]
        fn second_pass_is_a_no_op() {
            let src = "class A {\n    int f(int a) { return a; }\n}\n";
            let once = output(src, &["int f(int a)"]);
            let again = rewrite(&once, &["int f(int a)"]);
            assert_eq!(again.outcome, FileOutcome::Unchanged);
            assert!(again.output.is_none());
            assert_eq!(again.skipped[0].1, SkipReason::AlreadyInstrumented);
        }
    }

    mod file_tests {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn file_is_rewritten_and_report_written() {
            let tmp = TempDir::new().unwrap();
            let file = tmp.path().join("A.java");
            fs::write(&file, "class A {\n    int f() { return 1; }\n}\n").unwrap();
            let report_path = tmp.path().join("instrumented_methods.json");

            let mut set = TargetSet::new();
            set.insert(file.clone(), targets(&["int f()"]));
            let options = InstrumentOptions {
                label_root: Some(tmp.path().to_path_buf()),
                report_path: Some(report_path.clone()),
                ..InstrumentOptions::default()
            };
            let report = instrument_targets(&set, &options);

            assert!(report.failures.is_empty());
            assert_eq!(report.instrumented_count(), 1);
            assert!(fs::read_to_string(&file).unwrap().contains("@DumpObj"));
            let written: serde_json::Value =
                serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
            assert_eq!(written[0]["file"], "A.java");
            assert_eq!(written[0]["signature"], "int f()");
        }

        #[test]
        fn missing_file_recorded_as_failure() {
            let mut set = TargetSet::new();
            set.insert(PathBuf::from("/nonexistent/A.java"), targets(&["int f()"]));
            let report = instrument_targets(&set, &InstrumentOptions::default());
            assert_eq!(report.failures.len(), 1);
            assert!(report.files.is_empty());
        }
    }
}
