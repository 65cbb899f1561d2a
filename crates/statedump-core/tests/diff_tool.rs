//! Integration tests for change-range extraction against the system `diff`.

use std::fs;
use std::path::Path;

use statedump_core::diff::{compute_change_ranges, ChangeRange, DiffError, DiffOptions};
use statedump_core::process::program_available;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn identical_files_yield_no_ranges() {
    if !program_available("diff") {
        eprintln!("skipping: diff not available");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let a = write(tmp.path(), "A.java", "class A {}\n");
    let b = write(tmp.path(), "B.java", "class A {}\n");
    let ranges = compute_change_ranges(&a, &b, &DiffOptions::default()).unwrap();
    assert!(ranges.left.is_empty());
    assert!(ranges.right.is_empty());
}

#[test]
fn replaced_line_reported_on_both_sides() {
    if !program_available("diff") {
        eprintln!("skipping: diff not available");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let a = write(tmp.path(), "a.txt", "1\n2\n3\n4\n5\n");
    let b = write(tmp.path(), "b.txt", "1\n2\nthree\nthree.5\n4\n5\n");
    let ranges = compute_change_ranges(&a, &b, &DiffOptions::default()).unwrap();
    assert_eq!(ranges.left, vec![ChangeRange::new(3, 3)]);
    assert_eq!(ranges.right, vec![ChangeRange::new(3, 4)]);
}

#[test]
fn wider_context_keeps_changed_lines_exact() {
    if !program_available("diff") {
        eprintln!("skipping: diff not available");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let a = write(tmp.path(), "a.txt", "1\n2\n3\n4\n5\n6\n7\n");
    let b = write(tmp.path(), "b.txt", "1\n2\n3\nX\n5\n6\n7\n");
    let options = DiffOptions {
        context: 3,
        ..DiffOptions::default()
    };
    let ranges = compute_change_ranges(&a, &b, &options).unwrap();
    assert_eq!(ranges.left, vec![ChangeRange::new(4, 4)]);
    assert_eq!(ranges.right, vec![ChangeRange::new(4, 4)]);
}

#[test]
fn unreadable_file_is_file_access_error() {
    let tmp = TempDir::new().unwrap();
    let a = write(tmp.path(), "a.txt", "x\n");
    let missing = tmp.path().join("missing.txt");
    match compute_change_ranges(&a, &missing, &DiffOptions::default()) {
        Err(DiffError::FileAccess { path, .. }) => assert_eq!(path, missing),
        other => panic!("Expected FileAccess, got {:?}", other),
    }
}
