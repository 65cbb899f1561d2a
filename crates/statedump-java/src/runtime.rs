//! Runtime helper sources and dump file layout.
//!
//! The instrumented code calls into `org.instrument.DebugDump`, which ships
//! here as an embedded template and is copied into each checkout's source
//! tree before compilation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use statedump_core::config::{is_valid_env_var_name, DEFAULT_DUMP_ENV_VAR};

/// Java package of the runtime helpers.
pub const RUNTIME_PACKAGE: &str = "org.instrument";

/// Fully qualified recorder class called by generated code.
pub const RECORDER_CLASS: &str = "org.instrument.DebugDump";

/// Simple name of the marker annotation placed on instrumented methods.
pub const MARKER_ANNOTATION: &str = "DumpObj";

/// Imports added to every instrumented compilation unit.
pub const RUNTIME_IMPORTS: [&str; 2] = ["org.instrument.DumpObj", "org.instrument.DebugDump"];

/// Placeholder strings the recorder substitutes for unserializable state.
pub const CYCLE_SENTINEL: &str = "[CYCLE_DETECTED]";
pub const MAX_DEPTH_SENTINEL: &str = "[MAX_DEPTH_REACHED]";
pub const SERIALIZATION_ERROR_PREFIX: &str = "[SERIALIZATION_ERROR";

/// Directory, relative to a checkout, that receives per-test dump files.
pub const DUMPS_DIR: &str = "dumps";

const DEBUG_DUMP_SOURCE: &str = include_str!("../templates/DebugDump.java");
const DUMP_OBJ_SOURCE: &str = include_str!("../templates/DumpObj.java");

/// Where the helpers were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedHelpers {
    pub debug_dump: PathBuf,
    pub dump_obj: PathBuf,
    /// False when an existing `DumpObj.java` was left in place.
    pub dump_obj_written: bool,
}

/// Recorder source reading its dump path from `dump_env_var`.
pub fn recorder_source(dump_env_var: &str) -> String {
    DEBUG_DUMP_SOURCE.replace(DEFAULT_DUMP_ENV_VAR, dump_env_var)
}

/// Write the helper sources under `<work_dir>/<src_rel>/org/instrument/`.
///
/// `DebugDump.java` is always refreshed and reads its dump path from
/// `dump_env_var`; `DumpObj.java` is only created when missing.
pub fn deploy_helper_sources(
    work_dir: &Path,
    src_rel: &Path,
    dump_env_var: &str,
) -> io::Result<DeployedHelpers> {
    if !is_valid_env_var_name(dump_env_var) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid dump environment variable name: {:?}", dump_env_var),
        ));
    }
    let package_dir = RUNTIME_PACKAGE
        .split('.')
        .fold(work_dir.join(src_rel), |dir, part| dir.join(part));
    fs::create_dir_all(&package_dir)?;

    let debug_dump = package_dir.join("DebugDump.java");
    fs::write(&debug_dump, recorder_source(dump_env_var))?;

    let dump_obj = package_dir.join("DumpObj.java");
    let dump_obj_written = !dump_obj.exists();
    if dump_obj_written {
        fs::write(&dump_obj, DUMP_OBJ_SOURCE)?;
    }
    debug!(
        dir = %package_dir.display(),
        dump_env_var,
        dump_obj_written,
        "deployed runtime helpers"
    );

    Ok(DeployedHelpers {
        debug_dump,
        dump_obj,
        dump_obj_written,
    })
}

/// File-system safe form of a test name: every non-alphanumeric character
/// becomes `-`.
pub fn safe_test_name(test: &str) -> String {
    test.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Dump destination for one test execution: `<work_dir>/dumps/<safe>.json`.
pub fn dump_file_for_test(work_dir: &Path, test: &str) -> PathBuf {
    work_dir
        .join(DUMPS_DIR)
        .join(format!("{}.json", safe_test_name(test)))
}
