//! Changed-method resolution.
//!
//! Maps diff line ranges onto the method and constructor declarations they
//! touch, and builds the per-file target set the instrumenter consumes.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use statedump_core::diff::{compute_change_ranges, ChangeRange, DiffOptions};

use crate::signature::MethodSignature;
use crate::syntax::parse_java;

/// Methods to instrument, keyed by buggy-revision source path.
pub type TargetSet = BTreeMap<PathBuf, BTreeSet<MethodSignature>>;

/// A buggy/fixed pair of one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePair {
    pub buggy: PathBuf,
    pub fixed: PathBuf,
}

impl FilePair {
    pub fn new(buggy: impl Into<PathBuf>, fixed: impl Into<PathBuf>) -> Self {
        FilePair {
            buggy: buggy.into(),
            fixed: fixed.into(),
        }
    }
}

/// Signatures of the declarations whose line extent intersects any range.
pub fn resolve_changed_methods_in_source(
    source: &[u8],
    ranges: &[ChangeRange],
) -> BTreeSet<MethodSignature> {
    if ranges.is_empty() {
        return BTreeSet::new();
    }
    let Some(tree) = parse_java(source) else {
        return BTreeSet::new();
    };
    tree.method_nodes()
        .iter()
        .filter(|m| {
            let (start, end) = (m.start_line(), m.end_line());
            ranges.iter().any(|r| r.intersects(start, end))
        })
        .map(|m| m.signature())
        .collect()
}

/// File-reading variant of [`resolve_changed_methods_in_source`].
///
/// An unreadable file yields an empty set.
pub fn resolve_changed_methods(path: &Path, ranges: &[ChangeRange]) -> BTreeSet<MethodSignature> {
    if ranges.is_empty() {
        return BTreeSet::new();
    }
    let source = match fs::read(path) {
        Ok(source) => source,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "cannot read source, no methods resolved");
            return BTreeSet::new();
        }
    };
    let methods = resolve_changed_methods_in_source(&source, ranges);
    if methods.is_empty() {
        warn!(file = %path.display(), ranges = ?ranges, "no method overlaps the changed lines");
    }
    methods
}

/// Every method and constructor declared in a file.
pub fn all_methods(path: &Path) -> BTreeSet<MethodSignature> {
    match fs::read(path) {
        Ok(source) => all_methods_in_source(&source),
        Err(err) => {
            warn!(file = %path.display(), error = %err, "cannot read source");
            BTreeSet::new()
        }
    }
}

pub fn all_methods_in_source(source: &[u8]) -> BTreeSet<MethodSignature> {
    parse_java(source)
        .map(|tree| tree.method_nodes().iter().map(|m| m.signature()).collect())
        .unwrap_or_default()
}

/// Changed methods of one pair: left ranges on the buggy file, right ranges
/// on the fixed file, unioned.
pub fn resolve_pair(
    pair: &FilePair,
    options: &DiffOptions,
) -> Result<BTreeSet<MethodSignature>, statedump_core::diff::DiffError> {
    let ranges = compute_change_ranges(&pair.buggy, &pair.fixed, options)?;
    let mut methods = resolve_changed_methods(&pair.buggy, &ranges.left);
    methods.extend(resolve_changed_methods(&pair.fixed, &ranges.right));
    Ok(methods)
}

/// Build the target set over file pairs.
///
/// Pairs whose diff fails are skipped, and pairs with no changed method get
/// no entry.
pub fn build_target_set(pairs: &[FilePair], options: &DiffOptions) -> TargetSet {
    let mut targets = TargetSet::new();
    for pair in pairs {
        match resolve_pair(pair, options) {
            Ok(methods) if methods.is_empty() => {
                debug!(file = %pair.buggy.display(), "no changed methods");
            }
            Ok(methods) => {
                targets
                    .entry(pair.buggy.clone())
                    .or_default()
                    .extend(methods);
            }
            Err(err) => {
                warn!(
                    buggy = %pair.buggy.display(),
                    fixed = %pair.fixed.display(),
                    error = %err,
                    "diff failed, skipping pair"
                );
            }
        }
    }
    targets
}

/// Target set covering every method of the given buggy files.
pub fn all_methods_target_set(files: &[PathBuf]) -> TargetSet {
    files
        .iter()
        .filter_map(|path| {
            let methods = all_methods(path);
            (!methods.is_empty()).then(|| (path.clone(), methods))
        })
        .collect()
}

/// Pair the `.java` files of two source trees by relative path.
///
/// Files present on only one side are ignored.
pub fn pair_source_trees(buggy_root: &Path, fixed_root: &Path) -> Vec<FilePair> {
    let mut pairs: Vec<FilePair> = WalkDir::new(buggy_root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "java"))
        .filter_map(|e| {
            let rel = e.path().strip_prefix(buggy_root).ok()?;
            let fixed = fixed_root.join(rel);
            fixed
                .is_file()
                .then(|| FilePair::new(e.path().to_path_buf(), fixed))
        })
        .collect();
    pairs.sort_by(|a, b| a.buggy.cmp(&b.buggy));
    pairs
}

/// Pairs for class-relative paths (`org/x/Foo.java`) under each revision's
/// source root.
pub fn pairs_for_modified_classes(
    buggy_src: &Path,
    fixed_src: &Path,
    classes: &[String],
) -> Vec<FilePair> {
    classes
        .iter()
        .map(|rel| FilePair::new(buggy_src.join(rel), fixed_src.join(rel)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "class A {\n    int f() {\n        return 1;\n    }\n\n    int g() {\n        return 2;\n    }\n}\n";

    mod in_source_tests {
        use super::*;

        #[test]
        fn range_inside_body() {
            let methods = resolve_changed_methods_in_source(SOURCE.as_bytes(), &[ChangeRange::new(3, 3)]);
            let names: Vec<&str> = methods.iter().map(|m| m.as_str()).collect();
            assert_eq!(names, vec!["int f()"]);
        }

        #[test]
        fn range_spanning_two_methods() {
            let methods = resolve_changed_methods_in_source(SOURCE.as_bytes(), &[ChangeRange::new(4, 6)]);
            assert_eq!(methods.len(), 2);
        }

        #[test]
        fn range_between_methods() {
            let methods = resolve_changed_methods_in_source(SOURCE.as_bytes(), &[ChangeRange::new(5, 5)]);
            assert!(methods.is_empty());
        }

        #[test]
        fn boundary_lines_count() {
            let first = resolve_changed_methods_in_source(SOURCE.as_bytes(), &[ChangeRange::new(2, 2)]);
            let last = resolve_changed_methods_in_source(SOURCE.as_bytes(), &[ChangeRange::new(8, 8)]);
            assert_eq!(first.len(), 1);
            assert_eq!(last.iter().next().unwrap().as_str(), "int g()");
        }

        #[test]
        fn no_ranges_no_methods() {
            assert!(resolve_changed_methods_in_source(SOURCE.as_bytes(), &[]).is_empty());
        }

        #[test]
        fn all_methods_lists_everything() {
            assert_eq!(all_methods_in_source(SOURCE.as_bytes()).len(), 2);
        }
    }

    mod file_tests {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn unreadable_file_yields_empty_set() {
            let methods = resolve_changed_methods(
                Path::new("/nonexistent/A.java"),
                &[ChangeRange::new(1, 10)],
            );
            assert!(methods.is_empty());
        }

        #[test]
        fn source_trees_pair_by_relative_path() {
            let tmp = TempDir::new().unwrap();
            let buggy = tmp.path().join("buggy");
            let fixed = tmp.path().join("fixed");
            fs::create_dir_all(buggy.join("org/x")).unwrap();
            fs::create_dir_all(fixed.join("org/x")).unwrap();
            fs::write(buggy.join("org/x/A.java"), SOURCE).unwrap();
            fs::write(fixed.join("org/x/A.java"), SOURCE).unwrap();
            fs::write(buggy.join("org/x/Only.java"), SOURCE).unwrap();
            fs::write(buggy.join("org/x/notes.txt"), "x").unwrap();

            let pairs = pair_source_trees(&buggy, &fixed);
            assert_eq!(
                pairs,
                vec![FilePair::new(buggy.join("org/x/A.java"), fixed.join("org/x/A.java"))]
            );
        }

        #[test]
        fn all_methods_target_set_skips_missing() {
            let tmp = TempDir::new().unwrap();
            let present = tmp.path().join("A.java");
            fs::write(&present, SOURCE).unwrap();
            let targets = all_methods_target_set(&[present.clone(), tmp.path().join("B.java")]);
            assert_eq!(targets.len(), 1);
            assert_eq!(targets[&present].len(), 2);
        }
    }
}
