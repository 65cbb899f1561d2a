//! Dump post-processing.
//!
//! Rewrites every dump file in place with cleaned records, then infers one
//! schema per `(file, method, phase)` over all records seen.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::clean::clean_record;
use crate::error::TraceError;
use crate::schema::{inference_copy, SchemaBuilder};

/// Name of the schema directory created next to processed dumps.
pub const SCHEMAS_DIR: &str = "schemas";

const UNKNOWN: &str = "unknown";

/// Options for a processing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Keep a `<name>.backup` of each file until its rewrite succeeds.
    pub backup: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        ProcessOptions { backup: true }
    }
}

/// Counters for one processing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStats {
    pub files_processed: usize,
    pub records_processed: usize,
    pub schemas_generated: usize,
    pub errors: usize,
}

/// Entry or exit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Phase {
    Entry,
    Exit,
}

impl Phase {
    fn parse(value: Option<&Value>) -> Option<Self> {
        match value.and_then(Value::as_str) {
            Some("entry") => Some(Phase::Entry),
            Some("exit") => Some(Phase::Exit),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Phase::Entry => "entry",
            Phase::Exit => "exit",
        }
    }
}

type GroupKey = (String, String, Phase);

/// Process one directory, writing schemas to `<directory>/schemas`.
pub fn process(directory: &Path) -> ProcessStats {
    process_dirs(
        &[directory.to_path_buf()],
        &directory.join(SCHEMAS_DIR),
        &ProcessOptions::default(),
    )
}

/// Process several directories jointly: records from all of them feed the
/// same schema groups.
pub fn process_dirs(dirs: &[PathBuf], schemas_dir: &Path, options: &ProcessOptions) -> ProcessStats {
    let mut stats = ProcessStats::default();
    let mut groups: BTreeMap<GroupKey, SchemaBuilder> = BTreeMap::new();

    for dir in dirs {
        let files = match dump_files(dir) {
            Ok(files) => files,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "cannot list dump directory");
                stats.errors += 1;
                continue;
            }
        };
        for file in files {
            match process_file(&file, options, &mut groups) {
                Ok(records) => {
                    stats.files_processed += 1;
                    stats.records_processed += records;
                    debug!(file = %file.display(), records, "cleaned dump file");
                }
                Err(err) => {
                    warn!(error = %err, "failed to process dump file");
                    stats.errors += 1;
                }
            }
        }
    }

    for ((file, signature, phase), builder) in &groups {
        match write_schema(schemas_dir, file, signature, *phase, builder) {
            Ok(path) => {
                stats.schemas_generated += 1;
                debug!(schema = %path.display(), samples = builder.sample_count(), "wrote schema");
            }
            Err(err) => {
                warn!(error = %err, "failed to write schema");
                stats.errors += 1;
            }
        }
    }

    info!(
        files = stats.files_processed,
        records = stats.records_processed,
        schemas = stats.schemas_generated,
        errors = stats.errors,
        "post-processing finished"
    );
    stats
}

/// `*.json` files directly in `dir` whose name does not mention `schema`,
/// in any letter case.
fn dump_files(dir: &Path) -> Result<Vec<PathBuf>, TraceError> {
    let entries = fs::read_dir(dir).map_err(|e| TraceError::io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            name.ends_with(".json") && !name.to_lowercase().contains("schema")
        })
        .collect();
    files.sort();
    Ok(files)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".backup");
    path.with_file_name(name)
}

/// Clean one dump file in place and feed its records into `groups`.
///
/// Returns the number of records grouped as entry or exit. On failure the
/// backup, if any, is left behind.
fn process_file(
    path: &Path,
    options: &ProcessOptions,
    groups: &mut BTreeMap<GroupKey, SchemaBuilder>,
) -> Result<usize, TraceError> {
    let source = if options.backup {
        let backup = backup_path(path);
        fs::rename(path, &backup).map_err(|e| TraceError::io(path, e))?;
        backup
    } else {
        path.to_path_buf()
    };

    let text = fs::read_to_string(&source).map_err(|e| TraceError::io(&source, e))?;
    let parsed: Value = serde_json::from_str(&text).map_err(|e| TraceError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    let Value::Array(records) = parsed else {
        return Err(TraceError::InvalidDump {
            path: path.to_path_buf(),
            reason: "expected a JSON array of records".to_string(),
        });
    };

    let cleaned: Vec<Value> = records.into_iter().filter_map(clean_record).collect();
    let mut grouped = 0;
    for record in &cleaned {
        let Some(map) = record.as_object() else {
            continue;
        };
        let Some(phase) = Phase::parse(map.get("phase")) else {
            continue;
        };
        let key = (
            metadata(map, "file_path"),
            metadata(map, "method_signature"),
            phase,
        );
        groups.entry(key).or_default().add_object(&inference_copy(record));
        grouped += 1;
    }

    write_json(path, &Value::Array(cleaned))?;
    if options.backup {
        fs::remove_file(&source).map_err(|e| TraceError::io(&source, e))?;
    }
    Ok(grouped)
}

fn metadata(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

fn write_schema(
    schemas_dir: &Path,
    file: &str,
    signature: &str,
    phase: Phase,
    builder: &SchemaBuilder,
) -> Result<PathBuf, TraceError> {
    let dir = schemas_dir
        .join(sanitize_path(file))
        .join(sanitize_path(signature));
    fs::create_dir_all(&dir).map_err(|e| TraceError::io(&dir, e))?;
    let path = dir.join(format!("{}.schema.json", phase.as_str()));
    write_json(&path, &builder.to_schema())?;
    Ok(path)
}

/// Pretty-print `value` with keys sorted at every level.
pub(crate) fn write_json(path: &Path, value: &Value) -> Result<(), TraceError> {
    let text = serde_json::to_string_pretty(&sorted(value)).map_err(|e| TraceError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    fs::write(path, text).map_err(|e| TraceError::io(path, e))
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Relative directory path safe to create under the schema root.
///
/// Characters invalid on common file systems become `_`; empty, `.` and
/// `..` components are dropped.
pub fn sanitize_path(path: &str) -> String {
    let replaced: String = path
        .chars()
        .map(|c| if "<>:\"|?*".contains(c) { '_' } else { c })
        .collect();
    let joined = replaced
        .split('/')
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect::<Vec<_>>()
        .join("/");
    let trimmed = joined.trim_matches(|c| c == '/' || c == '.');
    if trimmed.is_empty() {
        UNKNOWN.to_string()
    } else {
        trimmed.to_string()
    }
}
