//! Run configuration.
//!
//! `RunConfig` is an explicit value threaded through every pipeline stage.
//! Nothing reads process-wide state: the only environment hand-off is the
//! dump destination variable set on each instrumented test process.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::diff::DiffOptions;

/// Environment variable the Java runtime helper reads its dump path from.
pub const DEFAULT_DUMP_ENV_VAR: &str = "OBJDUMP_OUT";

/// Whether `name` can be used as the dump environment variable: ASCII
/// letters, digits and `_`, not starting with a digit.
pub fn is_valid_env_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Default instrumentation report file name.
pub const DEFAULT_REPORT_FILE: &str = "instrumented_methods.json";

/// Default number of relevant methods attached to each report record.
pub const DEFAULT_RELEVANT_METHOD_LIMIT: usize = 3;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Timeouts per kind of external command, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub checkout_secs: u64,
    pub compile_secs: u64,
    pub test_secs: u64,
    pub diff_secs: u64,
    pub export_secs: u64,
    pub download_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            checkout_secs: 300,
            compile_secs: 600,
            test_secs: 300,
            diff_secs: 60,
            export_secs: 120,
            download_secs: 120,
        }
    }
}

impl Timeouts {
    pub fn checkout(&self) -> Duration {
        Duration::from_secs(self.checkout_secs)
    }

    pub fn compile(&self) -> Duration {
        Duration::from_secs(self.compile_secs)
    }

    pub fn test(&self) -> Duration {
        Duration::from_secs(self.test_secs)
    }

    pub fn diff(&self) -> Duration {
        Duration::from_secs(self.diff_secs)
    }

    pub fn export(&self) -> Duration {
        Duration::from_secs(self.export_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }
}

/// Per-run configuration.
///
/// Every field has a default, so a config file only needs the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Base directory for per-bug checkouts (`<work_root>/<project>_<bug>`).
    pub work_root: PathBuf,
    /// Root of the collected dump archive.
    pub output_base: PathBuf,
    /// Shared on-disk cache for downloaded jars. `None` uses the user cache dir.
    pub cache_dir: Option<PathBuf>,
    /// Unified diff context width.
    pub diff_context: u32,
    /// Cap on relevant methods per report record.
    pub relevant_method_limit: usize,
    pub timeouts: Timeouts,
    /// Concurrent bug pipelines.
    pub workers: usize,
    /// Concurrent test executions within one pipeline.
    pub test_workers: usize,
    pub dump_env_var: String,
    pub report_file_name: String,
    pub jackson_version: String,
    /// Instrument every method of the modified classes when the diff
    /// touches no method body.
    pub instrument_all_modified: bool,
    /// Keep `.backup` copies while post-processing dumps.
    pub keep_backups: bool,
    /// Benchmark tool executable.
    pub defects4j: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            work_root: std::env::temp_dir().join("statedump"),
            output_base: PathBuf::from("collected_dumps"),
            cache_dir: None,
            diff_context: 0,
            relevant_method_limit: DEFAULT_RELEVANT_METHOD_LIMIT,
            timeouts: Timeouts::default(),
            workers: 4,
            test_workers: 4,
            dump_env_var: DEFAULT_DUMP_ENV_VAR.to_string(),
            report_file_name: DEFAULT_REPORT_FILE.to_string(),
            jackson_version: "2.13.0".to_string(),
            instrument_all_modified: false,
            keep_backups: true,
            defects4j: "defects4j".to_string(),
        }
    }
}

impl RunConfig {
    /// Load a config from a JSON file, filling unspecified fields with defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RunConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => RunConfig::load(path),
            None => Ok(RunConfig::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.test_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "test_workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if !is_valid_env_var_name(&self.dump_env_var) {
            return Err(ConfigError::Invalid {
                field: "dump_env_var",
                reason: "must be a non-empty name of letters, digits and _".to_string(),
            });
        }
        if self.report_file_name.is_empty() || self.report_file_name.contains('/') {
            return Err(ConfigError::Invalid {
                field: "report_file_name",
                reason: "must be a plain file name".to_string(),
            });
        }
        Ok(())
    }

    /// Diff options derived from this config.
    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            context: self.diff_context,
            timeout: self.timeouts.diff(),
            ..DiffOptions::default()
        }
    }

    /// Checkout directory for the buggy revision of a bug.
    pub fn buggy_dir(&self, project: &str, bug: u32) -> PathBuf {
        self.work_root.join(format!("{}_{}", project, bug))
    }

    /// Checkout directory for the fixed revision of a bug.
    pub fn fixed_dir(&self, project: &str, bug: u32) -> PathBuf {
        self.work_root.join(format!("{}_{}_fixed", project, bug))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = RunConfig::default();
        config.validate().unwrap();
        assert_eq!(config.diff_context, 0);
        assert_eq!(config.relevant_method_limit, 3);
        assert_eq!(config.dump_env_var, "OBJDUMP_OUT");
        assert_eq!(config.report_file_name, "instrumented_methods.json");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"diff_context": 3, "workers": 2, "timeouts": {{"test_secs": 30}}}}"#
        )
        .unwrap();
        let config = RunConfig::load(file.path()).unwrap();
        assert_eq!(config.diff_context, 3);
        assert_eq!(config.workers, 2);
        assert_eq!(config.timeouts.test(), Duration::from_secs(30));
        assert_eq!(config.timeouts.compile_secs, 600);
        assert_eq!(config.diff_options().context, 3);
    }

    #[test]
    fn zero_workers_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"workers": 0}}"#).unwrap();
        match RunConfig::load(file.path()) {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "workers"),
            other => panic!("Expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn dump_env_var_must_be_identifier() {
        assert!(is_valid_env_var_name("OBJDUMP_OUT"));
        assert!(is_valid_env_var_name("_trace2"));
        assert!(!is_valid_env_var_name(""));
        assert!(!is_valid_env_var_name("2OUT"));
        assert!(!is_valid_env_var_name("OUT\""));

        let config = RunConfig {
            dump_env_var: "BAD NAME".to_string(),
            ..RunConfig::default()
        };
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "dump_env_var"),
            other => panic!("Expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            RunConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        assert!(matches!(
            RunConfig::load(Path::new("/nonexistent/statedump.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn checkout_dirs_are_keyed_by_bug() {
        let config = RunConfig {
            work_root: PathBuf::from("/w"),
            ..RunConfig::default()
        };
        assert_eq!(config.buggy_dir("Lang", 6), PathBuf::from("/w/Lang_6"));
        assert_eq!(config.fixed_dir("Lang", 6), PathBuf::from("/w/Lang_6_fixed"));
    }
}
