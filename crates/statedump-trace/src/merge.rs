//! Merging a directory tree of JSON files into one document.
//!
//! Each file's content lands under its relative path: `a/b/t.json` becomes
//! `{"a": {"b": {"t.json": <content>}}}`. Objects meeting at the same key
//! merge recursively; anything else is replaced by the later file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::TraceError;
use crate::postprocess::write_json;

/// Counters for one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// JSON files visited, readable or not.
    pub files_processed: usize,
    /// Files whose content was merged.
    pub json_count: usize,
    pub errors: usize,
    /// Size of the written document in bytes.
    pub output_size: u64,
}

/// Merge every `*.json` below `target_dir` into `output_path`.
///
/// Unreadable or invalid files are logged and counted, never fatal. The
/// output file itself is skipped when it lies inside `target_dir`.
pub fn merge_json_files(target_dir: &Path, output_path: &Path) -> Result<MergeStats, TraceError> {
    if !target_dir.is_dir() {
        return Err(TraceError::NotADirectory {
            path: target_dir.to_path_buf(),
        });
    }

    let mut stats = MergeStats::default();
    let mut merged = Map::new();

    let files = WalkDir::new(target_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".json"))
        .map(|e| e.into_path())
        .filter(|p| p.as_path() != output_path);

    for path in files {
        stats.files_processed += 1;
        let content = match read_json(&path) {
            Ok(content) => content,
            Err(err) => {
                warn!(error = %err, "skipping JSON file");
                stats.errors += 1;
                continue;
            }
        };
        let Ok(relative) = path.strip_prefix(target_dir) else {
            stats.errors += 1;
            continue;
        };
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        merge_into(&mut merged, &nest(&parts, content));
        stats.json_count += 1;
        debug!(file = %relative.display(), "merged JSON file");
    }

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| TraceError::io(parent, e))?;
    }
    write_json(output_path, &Value::Object(merged))?;
    stats.output_size = fs::metadata(output_path)
        .map_err(|e| TraceError::io(output_path, e))?
        .len();

    info!(
        files = stats.json_count,
        errors = stats.errors,
        bytes = stats.output_size,
        output = %output_path.display(),
        "merged JSON files"
    );
    Ok(stats)
}

fn read_json(path: &Path) -> Result<Value, TraceError> {
    let text = fs::read_to_string(path).map_err(|e| TraceError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| TraceError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

/// `{"a": {"b": content}}` for parts `["a", "b"]`.
fn nest(parts: &[String], content: Value) -> Map<String, Value> {
    let mut value = content;
    let mut map = Map::new();
    for (i, part) in parts.iter().enumerate().rev() {
        if i == 0 {
            map.insert(part.clone(), value);
            break;
        }
        let mut level = Map::new();
        level.insert(part.clone(), value);
        value = Value::Object(level);
    }
    map
}

fn merge_into(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge_into(existing, incoming),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, text: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn nests_content_by_relative_path() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("in");
        write(&root, "correct/t1.json", r#"[{"id": "1"}]"#);
        write(&root, "correct/t2.json", r#"{"k": 2}"#);
        write(&root, "schemas/A.java/f()/entry.schema.json", r#"{"type": "object"}"#);
        write(&root, "notes.txt", "ignored");

        let out = tmp.path().join("merged/all.json");
        let stats = merge_json_files(&root, &out).unwrap();
        assert_eq!(stats.files_processed, 3);
        assert_eq!(stats.json_count, 3);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.output_size, fs::metadata(&out).unwrap().len());

        let merged: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(
            merged,
            json!({
                "correct": {"t1.json": [{"id": "1"}], "t2.json": {"k": 2}},
                "schemas": {"A.java": {"f()": {"entry.schema.json": {"type": "object"}}}}
            })
        );
    }

    #[test]
    fn invalid_files_counted_and_skipped() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "good.json", "[1]");
        write(tmp.path(), "bad.json", "{oops");

        let out = tmp.path().join("merged.json");
        let stats = merge_json_files(tmp.path(), &out).unwrap();
        assert_eq!(stats.files_processed, 2);
        assert_eq!(stats.json_count, 1);
        assert_eq!(stats.errors, 1);

        let again = merge_json_files(tmp.path(), &out).unwrap();
        assert_eq!(again.files_processed, 2);
    }

    #[test]
    fn objects_merge_and_scalars_replace() {
        let mut target = nest(&["a".to_string(), "x.json".to_string()], json!({"k": 1}));
        merge_into(&mut target, &nest(&["a".to_string(), "y.json".to_string()], json!(2)));
        merge_into(&mut target, &nest(&["a".to_string(), "x.json".to_string()], json!({"j": 3})));
        merge_into(&mut target, &nest(&["a".to_string(), "y.json".to_string()], json!(4)));
        assert_eq!(
            Value::Object(target),
            json!({"a": {"x.json": {"k": 1, "j": 3}, "y.json": 4}})
        );
    }

    #[test]
    fn missing_directory_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("f.json");
        fs::write(&file, "{}").unwrap();
        for target in [tmp.path().join("absent"), file] {
            match merge_json_files(&target, &tmp.path().join("out.json")) {
                Err(TraceError::NotADirectory { path }) => assert_eq!(path, target),
                other => panic!("Expected NotADirectory, got {:?}", other),
            }
        }
    }
}
