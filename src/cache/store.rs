use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::protocol::{AnalysisResponse, CpdToken, Issue, ParsingError};
use crate::error::{AssayError, Result};
use crate::util::checksum;

const ENTRY_FILE: &str = "entry.json";
const ARTIFACTS_DIR: &str = "artifacts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    /// Input file identity, `/`-separated.
    pub file: String,
    pub fingerprint: String,
}

/// What a cached analysis hands back to the processor. `artifacts` are the
/// engine-generated files: absolute paths when handed to or returned from
/// the store, work-directory relative inside a stored entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheAnalysis {
    #[serde(default)]
    pub parsing_error: Option<ParsingError>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub cpd_tokens: Vec<CpdToken>,
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
}

impl From<AnalysisResponse> for CacheAnalysis {
    fn from(response: AnalysisResponse) -> Self {
        Self {
            parsing_error: response.parsing_error,
            issues: response.issues,
            cpd_tokens: response.cpd_tokens,
            artifacts: response.ucfg_paths,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub file: String,
    pub fingerprint: String,
    /// Identity of the configuration the file was analysed under, if any.
    pub config_identity: Option<String>,
    pub format_marker: String,
    pub analysis: CacheAnalysis,
    pub written_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        key: &CacheKey,
        config_identity: Option<String>,
        format_marker: impl Into<String>,
        analysis: CacheAnalysis,
    ) -> Self {
        Self {
            file: key.file.clone(),
            fingerprint: key.fingerprint.clone(),
            config_identity,
            format_marker: format_marker.into(),
            analysis,
            written_at: Utc::now(),
        }
    }
}

/// Persistent per-file analysis results. One slot per file; a write
/// replaces whatever the slot held.
pub trait CacheStore {
    /// The entry stored for `file`. Artifacts stay in the store until
    /// `restore` is called.
    fn read(&self, file: &str) -> Result<Option<CacheEntry>>;

    /// Copy the artifacts of an entry returned by `read` back into place,
    /// returning their absolute paths.
    fn restore(&self, entry: &CacheEntry) -> Result<Vec<PathBuf>>;

    /// Store `entry`, taking a copy of each artifact it names.
    fn write(&self, entry: &CacheEntry) -> Result<()>;
}

/// Filesystem store: `<root>/<sha256(file)>/entry.json` plus the copied
/// artifacts under `artifacts/`, laid out relative to the work directory.
pub struct FsCacheStore {
    root: PathBuf,
    work_dir: PathBuf,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            work_dir: work_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot(&self, file: &str) -> PathBuf {
        self.root.join(checksum::sha256_bytes(file.as_bytes()))
    }

    /// Where an artifact lives relative to both the work directory and the
    /// slot's artifact directory. Artifacts outside the work directory
    /// cannot be restored to the same path and are refused.
    fn artifact_name(&self, artifact: &Path) -> Result<PathBuf> {
        let relative = artifact.strip_prefix(&self.work_dir).map_err(|_| {
            AssayError::CacheError(format!(
                "artifact {} is outside the work directory {}",
                artifact.display(),
                self.work_dir.display()
            ))
        })?;
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !plain || relative.as_os_str().is_empty() {
            return Err(AssayError::CacheError(format!(
                "invalid artifact path {}",
                artifact.display()
            )));
        }
        Ok(relative.to_path_buf())
    }

    /// Remove every cached entry.
    pub fn clear(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}

impl CacheStore for FsCacheStore {
    fn read(&self, file: &str) -> Result<Option<CacheEntry>> {
        let slot = self.slot(file);
        let entry_path = slot.join(ENTRY_FILE);
        if !entry_path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&entry_path)?;
        let entry: CacheEntry = serde_json::from_str(&raw)
            .map_err(|e| AssayError::CacheError(format!("corrupt entry {}: {}", entry_path.display(), e)))?;
        if entry.file != file {
            return Err(AssayError::CacheError(format!(
                "slot {} holds {} instead of {}",
                slot.display(),
                entry.file,
                file
            )));
        }

        debug!("Read cache entry for {} from {}", file, slot.display());
        Ok(Some(entry))
    }

    fn restore(&self, entry: &CacheEntry) -> Result<Vec<PathBuf>> {
        let artifacts_dir = self.slot(&entry.file).join(ARTIFACTS_DIR);
        let mut restored = Vec::with_capacity(entry.analysis.artifacts.len());
        for name in &entry.analysis.artifacts {
            let source = artifacts_dir.join(name);
            let target = self.work_dir.join(name);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&source, &target).map_err(|e| {
                AssayError::CacheError(format!("failed to restore artifact {}: {}", source.display(), e))
            })?;
            restored.push(target);
        }
        Ok(restored)
    }

    fn write(&self, entry: &CacheEntry) -> Result<()> {
        let slot = self.slot(&entry.file);
        let entry_path = slot.join(ENTRY_FILE);
        let artifacts_dir = slot.join(ARTIFACTS_DIR);

        fs::create_dir_all(&slot)?;
        // Invalidate first so an interrupted write leaves a miss behind.
        if entry_path.exists() {
            fs::remove_file(&entry_path)?;
        }
        if artifacts_dir.exists() {
            fs::remove_dir_all(&artifacts_dir)?;
        }

        let mut stored = entry.clone();
        stored.analysis.artifacts = Vec::with_capacity(entry.analysis.artifacts.len());
        for artifact in &entry.analysis.artifacts {
            let name = self.artifact_name(artifact)?;
            let target = artifacts_dir.join(&name);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(artifact, &target).map_err(|e| {
                AssayError::CacheError(format!("failed to store artifact {}: {}", artifact.display(), e))
            })?;
            stored.analysis.artifacts.push(name);
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&slot)?;
        tmp.write_all(serde_json::to_string_pretty(&stored)?.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&entry_path)
            .map_err(|e| AssayError::CacheError(format!("failed to persist {}: {}", entry_path.display(), e)))?;

        debug!("Wrote cache entry for {} to {}", entry.file, slot.display());
        Ok(())
    }
}
