//! Input files and project configurations as seen by the orchestrator.

pub mod config_file;
pub mod discovery;

use std::borrow::Cow;
use std::cell::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AssayError, Result};
use crate::util::checksum;

pub use config_file::ConfigFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileKind {
    Main,
    Test,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Main => write!(f, "MAIN"),
            FileKind::Test => write!(f, "TEST"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
    Html,
}

impl Language {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "js" | "jsx" | "mjs" | "cjs" | "vue" => Some(Language::JavaScript),
            "ts" | "tsx" | "mts" | "cts" => Some(Language::TypeScript),
            "html" | "htm" => Some(Language::Html),
            _ => None,
        }
    }

    /// Whether files of this language are analysed under a project configuration.
    pub fn uses_project_config(&self) -> bool {
        !matches!(self, Language::Html)
    }
}

/// A file to analyse. Content is read at most once, on first use.
#[derive(Debug, Clone)]
pub struct InputFile {
    path: PathBuf,
    kind: FileKind,
    language: Language,
    contents: OnceCell<Vec<u8>>,
}

impl InputFile {
    pub fn new(path: impl Into<PathBuf>, kind: FileKind, language: Language) -> Self {
        Self {
            path: path.into(),
            kind,
            language,
            contents: OnceCell::new(),
        }
    }

    /// Build an input file with content already in memory.
    pub fn with_contents(
        path: impl Into<PathBuf>,
        kind: FileKind,
        language: Language,
        contents: impl Into<String>,
    ) -> Self {
        let file = Self::new(path, kind, language);
        let _ = file.contents.set(contents.into().into_bytes());
        file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Path with `/` separators, as exchanged with the engine.
    pub fn unix_path(&self) -> String {
        to_unix_path(&self.path)
    }

    /// Raw file content, read once.
    pub fn bytes(&self) -> Result<&[u8]> {
        if let Some(contents) = self.contents.get() {
            return Ok(contents);
        }
        let read = std::fs::read(&self.path).map_err(AssayError::IoError)?;
        Ok(self.contents.get_or_init(|| read))
    }

    /// Content as text. Invalid UTF-8 sequences are replaced, in which case
    /// the result is `Cow::Owned`.
    pub fn contents(&self) -> Result<Cow<'_, str>> {
        Ok(String::from_utf8_lossy(self.bytes()?))
    }

    /// Content-derived fingerprint used to detect changes between runs.
    pub fn fingerprint(&self) -> Result<String> {
        Ok(checksum::sha256_bytes(self.bytes()?))
    }
}

impl fmt::Display for InputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

pub fn to_unix_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
