//! Runtime dependency jars.
//!
//! The recorder needs Jackson on the checkout's classpath. Jars are fetched
//! once into a shared on-disk cache and copied into each checkout's `lib/`.
//! Concurrent pipelines share the cache: every download lands in a unique
//! temp file inside the cache directory and is renamed into place, so a
//! reader never sees a partial jar.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use statedump_core::process::{run_command, CommandSpec};

/// Directory, relative to a checkout, receiving the jars.
pub const LIB_DIR: &str = "lib";

const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2";

/// Errors fetching an artifact.
#[derive(Debug, Error)]
pub enum DepsError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("download of {url} produced an empty file")]
    Empty { url: String },
}

impl DepsError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DepsError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A downloadable jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub url: String,
}

impl Artifact {
    /// A Maven Central artifact.
    pub fn maven(group: &str, artifact: &str, version: &str) -> Self {
        let file_name = format!("{}-{}.jar", artifact, version);
        let url = format!(
            "{}/{}/{}/{}/{}",
            MAVEN_CENTRAL,
            group.replace('.', "/"),
            artifact,
            version,
            file_name
        );
        Artifact { file_name, url }
    }
}

/// The Jackson core, databind and annotations jars for `version`.
pub fn jackson_artifacts(version: &str) -> Vec<Artifact> {
    ["jackson-core", "jackson-databind", "jackson-annotations"]
        .iter()
        .map(|name| Artifact::maven("com.fasterxml.jackson.core", name, version))
        .collect()
}

/// Fetches a URL into a file.
pub trait Downloader: Send + Sync {
    fn download(&self, url: &str, dest: &Path) -> Result<(), DepsError>;
}

/// [`Downloader`] running `curl`, retried once.
#[derive(Debug, Clone)]
pub struct CurlDownloader {
    pub timeout: Duration,
}

impl Downloader for CurlDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<(), DepsError> {
        let spec = CommandSpec::new("curl")
            .args(["-fsSL", "-o"])
            .arg(dest.display().to_string())
            .arg(url)
            .timeout(self.timeout);
        let mut last = String::new();
        for attempt in 1..=2 {
            match run_command(&spec) {
                Ok(output) if output.success() && file_len(dest) > 0 => return Ok(()),
                Ok(output) => last = output.failure_summary(),
                Err(err) => last = err.to_string(),
            }
            debug!(url, attempt, error = %last, "download attempt failed");
        }
        Err(DepsError::Download {
            url: url.to_string(),
            message: last,
        })
    }
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Shared jar cache.
pub struct ArtifactCache {
    dir: PathBuf,
    downloader: Box<dyn Downloader>,
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCache").field("dir", &self.dir).finish()
    }
}

impl ArtifactCache {
    pub fn new(dir: impl Into<PathBuf>, downloader: Box<dyn Downloader>) -> Self {
        ArtifactCache {
            dir: dir.into(),
            downloader,
        }
    }

    /// Cache in `dir`, or the default location, downloading with curl.
    pub fn with_curl(dir: Option<PathBuf>, timeout: Duration) -> Self {
        ArtifactCache::new(
            dir.unwrap_or_else(default_cache_dir),
            Box::new(CurlDownloader { timeout }),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cached path of `artifact`, downloading it first if needed.
    pub fn cached(&self, artifact: &Artifact) -> Result<PathBuf, DepsError> {
        let path = self.dir.join(&artifact.file_name);
        if file_len(&path) > 0 {
            return Ok(path);
        }
        fs::create_dir_all(&self.dir).map_err(|e| DepsError::io(&self.dir, e))?;
        let temp = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(&self.dir)
            .map_err(|e| DepsError::io(&self.dir, e))?;
        self.downloader.download(&artifact.url, temp.path())?;
        if file_len(temp.path()) == 0 {
            return Err(DepsError::Empty {
                url: artifact.url.clone(),
            });
        }
        temp.persist(&path)
            .map_err(|e| DepsError::io(&path, e.error))?;
        info!(jar = %artifact.file_name, "cached artifact");
        Ok(path)
    }

    /// Place `artifact` in `dest_dir`.
    ///
    /// A jar already present is kept. When the cache cannot be used the jar
    /// is downloaded straight into `dest_dir`.
    pub fn fetch(&self, artifact: &Artifact, dest_dir: &Path) -> Result<PathBuf, DepsError> {
        let dest = dest_dir.join(&artifact.file_name);
        if file_len(&dest) > 0 {
            return Ok(dest);
        }
        fs::create_dir_all(dest_dir).map_err(|e| DepsError::io(dest_dir, e))?;
        match self.cached(artifact) {
            Ok(cached) => {
                fs::copy(&cached, &dest).map_err(|e| DepsError::io(&dest, e))?;
            }
            Err(err) => {
                warn!(jar = %artifact.file_name, error = %err, "cache unavailable, downloading directly");
                self.downloader.download(&artifact.url, &dest)?;
                if file_len(&dest) == 0 {
                    return Err(DepsError::Empty {
                        url: artifact.url.clone(),
                    });
                }
            }
        }
        Ok(dest)
    }

    /// Place every artifact in `dest_dir`.
    pub fn fetch_all(&self, artifacts: &[Artifact], dest_dir: &Path) -> Result<Vec<PathBuf>, DepsError> {
        artifacts.iter().map(|a| self.fetch(a, dest_dir)).collect()
    }
}

/// `<user cache dir>/statedump/jars`, or under the temp dir without one.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("statedump")
        .join("jars")
}
