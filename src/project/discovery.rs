//! Enumeration of input files and root project configurations under a base
//! directory.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::config::AnalysisConfig;
use crate::error::{AssayError, Result};
use crate::project::{to_unix_path, FileKind, InputFile, Language};

pub struct Discovery {
    exclusions: Vec<String>,
    test_pattern: Regex,
    config_file_name: String,
}

impl Discovery {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let test_pattern = Regex::new(&config.test_pattern).map_err(|e| {
            AssayError::ConfigError(format!("invalid test_pattern '{}': {}", config.test_pattern, e))
        })?;
        Ok(Self {
            exclusions: config.exclusions.clone(),
            test_pattern,
            config_file_name: config.config_file_name.clone(),
        })
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        self.exclusions.iter().any(|ex| ex.as_str() == name)
    }

    fn walk(&self, base: &Path) -> impl Iterator<Item = DirEntry> + '_ {
        WalkDir::new(base)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| e.depth() == 0 || !self.is_excluded(e))
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!("Skipping unreadable entry: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
    }

    pub fn kind_of(&self, path: &Path) -> FileKind {
        if self.test_pattern.is_match(&to_unix_path(path)) {
            FileKind::Test
        } else {
            FileKind::Main
        }
    }

    /// All analysable files under `base`, in a stable order.
    pub fn input_files(&self, base: &Path) -> Result<Vec<InputFile>> {
        let base = absolute(base)?;
        let files = self
            .walk(&base)
            .filter_map(|entry| {
                let path = entry.into_path();
                let language = Language::from_path(&path)?;
                let kind = self.kind_of(path.strip_prefix(&base).unwrap_or(&path));
                Some(InputFile::new(path, kind, language))
            })
            .collect();
        Ok(files)
    }

    /// Root configuration files named `config_file_name` under `base`.
    pub fn config_roots(&self, base: &Path) -> Result<Vec<PathBuf>> {
        let base = absolute(base)?;
        let roots = self
            .walk(&base)
            .filter(|e| e.file_name().to_string_lossy() == self.config_file_name.as_str())
            .map(DirEntry::into_path)
            .collect();
        Ok(roots)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| {
        AssayError::ConfigError(format!("cannot resolve base directory {}: {}", path.display(), e))
    })
}
