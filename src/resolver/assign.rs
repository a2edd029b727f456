use std::fmt;

use crate::project::{ConfigFile, InputFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    Config(ConfigFile),
    /// Files no configuration governs. Reported, never analysed.
    Unmatched,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Config(config) => write!(f, "{}", config),
            GroupKey::Unmatched => write!(f, "<unmatched>"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileGroup {
    pub key: GroupKey,
    pub files: Vec<InputFile>,
}

impl FileGroup {
    pub fn config(&self) -> Option<&ConfigFile> {
        match &self.key {
            GroupKey::Config(config) => Some(config),
            GroupKey::Unmatched => None,
        }
    }

    pub fn is_unmatched(&self) -> bool {
        self.key == GroupKey::Unmatched
    }
}

/// Partition `files` by the first configuration, in resolver order, that
/// governs each of them.
///
/// Groups come out in configuration order with files in input order.
/// Configurations governing nothing produce no group; the unmatched group,
/// when present, is last.
pub fn assign_files(configs: &[ConfigFile], files: Vec<InputFile>) -> Vec<FileGroup> {
    let mut buckets: Vec<Vec<InputFile>> = vec![Vec::new(); configs.len()];
    let mut unmatched = Vec::new();

    for file in files {
        match configs.iter().position(|c| c.governs(&file)) {
            Some(idx) => buckets[idx].push(file),
            None => unmatched.push(file),
        }
    }

    let mut groups: Vec<FileGroup> = configs
        .iter()
        .zip(buckets)
        .filter(|(_, files)| !files.is_empty())
        .map(|(config, files)| FileGroup {
            key: GroupKey::Config(config.clone()),
            files,
        })
        .collect();

    if !unmatched.is_empty() {
        groups.push(FileGroup {
            key: GroupKey::Unmatched,
            files: unmatched,
        });
    }

    groups
}
