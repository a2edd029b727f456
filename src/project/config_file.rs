use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::project::{to_unix_path, InputFile};
use crate::util::checksum;

/// A loaded project configuration. Immutable for the rest of the run.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    references: Vec<PathBuf>,
    files: HashSet<String>,
    settings: serde_json::Value,
    identity: String,
}

impl ConfigFile {
    /// `files` is the set of sources the configuration governs, as reported
    /// by whoever parsed it.
    pub fn new(
        path: impl Into<PathBuf>,
        references: Vec<PathBuf>,
        files: impl IntoIterator<Item = String>,
        settings: serde_json::Value,
    ) -> Self {
        let path = path.into();
        let files: HashSet<String> = files
            .into_iter()
            .map(|f| f.replace('\\', "/"))
            .collect();

        let mut sorted: Vec<&String> = files.iter().collect();
        sorted.sort();
        let settings_text = settings.to_string();
        let path_text = to_unix_path(&path);
        let identity = checksum::sha256_parts(
            std::iter::once(path_text.as_bytes())
                .chain(std::iter::once(settings_text.as_bytes()))
                .chain(sorted.iter().map(|f| f.as_bytes())),
        );

        Self {
            path,
            references,
            files,
            settings,
            identity,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Referenced configuration paths, in declaration order.
    pub fn references(&self) -> &[PathBuf] {
        &self.references
    }

    pub fn settings(&self) -> &serde_json::Value {
        &self.settings
    }

    /// Stable fingerprint of everything that can change analysis results.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn governs(&self, file: &InputFile) -> bool {
        self.files.contains(&file.unix_path())
    }
}

impl PartialEq for ConfigFile {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for ConfigFile {}

impl fmt::Display for ConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
