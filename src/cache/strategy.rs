use std::fmt;

use tracing::{debug, warn};

use super::store::{CacheAnalysis, CacheEntry, CacheKey, CacheStore};
use crate::config::CacheConfig;
use crate::error::{AssayError, Result};
use crate::project::InputFile;

/// Marker for the shape of what the engine produced. Entries written under
/// another marker are never reused.
pub fn format_marker(engine_version: Option<&str>) -> String {
    format!(
        "assay-{}/engine-{}",
        env!("CARGO_PKG_VERSION"),
        engine_version.unwrap_or("unknown")
    )
}

/// Per-file decision on whether the engine has to run.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheStrategy {
    /// Caching is off: analyse, write nothing back.
    Disabled,
    /// Analyse and write the result back under `key`.
    Recompute {
        key: CacheKey,
        config_identity: Option<String>,
    },
    /// The stored analysis is still valid.
    Reuse { key: CacheKey, analysis: CacheAnalysis },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reason {
    CacheDisabled,
    UnreadableFile,
    FullAnalysisRequested,
    NoEntry,
    FileChanged,
    ConfigChanged,
    FormatChanged,
    ReadFailed,
    RestoreFailed,
    Unchanged,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Reason::CacheDisabled => "cache is disabled",
            Reason::UnreadableFile => "file content could not be fingerprinted",
            Reason::FullAnalysisRequested => "full analysis requested",
            Reason::NoEntry => "no cached entry",
            Reason::FileChanged => "file changed since it was cached",
            Reason::ConfigChanged => "configuration changed since it was cached",
            Reason::FormatChanged => "cached entry has another format",
            Reason::ReadFailed => "cached entry could not be read",
            Reason::RestoreFailed => "cached artifacts could not be restored",
            Reason::Unchanged => "file unchanged",
        };
        f.write_str(text)
    }
}

impl CacheStrategy {
    pub fn is_analysis_required(&self) -> bool {
        !matches!(self, CacheStrategy::Reuse { .. })
    }

    pub fn read_analysis_from_cache(&self) -> Option<&CacheAnalysis> {
        match self {
            CacheStrategy::Reuse { analysis, .. } => Some(analysis),
            _ => None,
        }
    }

    /// Persist a fresh analysis. A no-op unless the strategy is `Recompute`.
    pub fn write_analysis_to_cache(&self, cache: &AnalysisCache<'_>, analysis: &CacheAnalysis) -> Result<()> {
        let CacheStrategy::Recompute { key, config_identity } = self else {
            return Ok(());
        };
        let store = cache
            .store
            .ok_or_else(|| AssayError::CacheError("no cache store configured".to_string()))?;
        let entry = CacheEntry::new(key, config_identity.clone(), &cache.format_marker, analysis.clone());
        store.write(&entry)
    }
}

/// The cache as seen by the dispatcher: a store plus the rules for trusting it.
pub struct AnalysisCache<'a> {
    store: Option<&'a dyn CacheStore>,
    skip_unchanged: bool,
    format_marker: String,
}

impl<'a> AnalysisCache<'a> {
    pub fn new(store: &'a dyn CacheStore, config: &CacheConfig, format_marker: String) -> Self {
        Self {
            store: config.enabled.then_some(store),
            skip_unchanged: config.skip_unchanged,
            format_marker,
        }
    }

    pub fn disabled() -> Self {
        Self {
            store: None,
            skip_unchanged: false,
            format_marker: String::new(),
        }
    }

    pub fn format_marker(&self) -> &str {
        &self.format_marker
    }

    /// Decide how `file`, governed by the configuration with
    /// `config_identity`, is to be handled.
    pub fn strategy_for(&self, file: &InputFile, config_identity: Option<&str>) -> CacheStrategy {
        let (strategy, reason) = self.decide(file, config_identity);
        debug!("Cache strategy for {}: {} ({})", file, strategy.label(), reason);
        strategy
    }

    fn decide(&self, file: &InputFile, config_identity: Option<&str>) -> (CacheStrategy, Reason) {
        let Some(store) = self.store else {
            return (CacheStrategy::Disabled, Reason::CacheDisabled);
        };

        let fingerprint = match file.fingerprint() {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                warn!("Cannot fingerprint {}: {}", file, e);
                return (CacheStrategy::Disabled, Reason::UnreadableFile);
            }
        };
        let key = CacheKey {
            file: file.unix_path(),
            fingerprint,
        };
        let recompute = |key: CacheKey, reason: Reason| {
            (
                CacheStrategy::Recompute {
                    key,
                    config_identity: config_identity.map(str::to_string),
                },
                reason,
            )
        };

        if !self.skip_unchanged {
            return recompute(key, Reason::FullAnalysisRequested);
        }

        let entry = match store.read(&key.file) {
            Ok(Some(entry)) => entry,
            Ok(None) => return recompute(key, Reason::NoEntry),
            Err(e) => {
                warn!("Failed to read cache entry for {}: {}", file, e);
                return recompute(key, Reason::ReadFailed);
            }
        };

        if entry.fingerprint != key.fingerprint {
            return recompute(key, Reason::FileChanged);
        }
        if entry.config_identity.as_deref() != config_identity {
            return recompute(key, Reason::ConfigChanged);
        }
        if entry.format_marker != self.format_marker {
            return recompute(key, Reason::FormatChanged);
        }

        let artifacts = match store.restore(&entry) {
            Ok(artifacts) => artifacts,
            Err(e) => {
                warn!("Failed to restore cached artifacts for {}: {}", file, e);
                return recompute(key, Reason::RestoreFailed);
            }
        };
        let mut analysis = entry.analysis;
        analysis.artifacts = artifacts;

        (CacheStrategy::Reuse { key, analysis }, Reason::Unchanged)
    }
}

impl CacheStrategy {
    fn label(&self) -> &'static str {
        match self {
            CacheStrategy::Disabled => "no cache",
            CacheStrategy::Recompute { .. } => "recompute",
            CacheStrategy::Reuse { .. } => "reuse",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::protocol::{Issue, Location};
    use crate::project::{FileKind, Language};
    use crate::cache::FsCacheStore;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[derive(Default)]
    struct MemoryStore {
        entries: RefCell<HashMap<String, CacheEntry>>,
        fail_reads: bool,
        fail_writes: bool,
    }

    impl CacheStore for MemoryStore {
        fn read(&self, file: &str) -> Result<Option<CacheEntry>> {
            if self.fail_reads {
                return Err(AssayError::CacheError("read failed".to_string()));
            }
            Ok(self.entries.borrow().get(file).cloned())
        }

        fn restore(&self, entry: &CacheEntry) -> Result<Vec<PathBuf>> {
            Ok(entry.analysis.artifacts.clone())
        }

        fn write(&self, entry: &CacheEntry) -> Result<()> {
            if self.fail_writes {
                return Err(AssayError::CacheError("write failed".to_string()));
            }
            self.entries.borrow_mut().insert(entry.file.clone(), entry.clone());
            Ok(())
        }
    }

    fn enabled() -> CacheConfig {
        CacheConfig {
            enabled: true,
            skip_unchanged: true,
        }
    }

    fn file(contents: &str) -> InputFile {
        InputFile::with_contents("/p/a.ts", FileKind::Main, Language::TypeScript, contents)
    }

    fn analysis() -> CacheAnalysis {
        CacheAnalysis {
            issues: vec![Issue {
                rule_id: "no-var".to_string(),
                message: "Unexpected var".to_string(),
                location: Location {
                    line: 1,
                    column: 0,
                    end_line: Some(1),
                    end_column: Some(3),
                },
                secondary_locations: vec![],
            }],
            ..Default::default()
        }
    }

    fn warm(cache: &AnalysisCache<'_>, file: &InputFile, config: Option<&str>) {
        let strategy = cache.strategy_for(file, config);
        assert!(strategy.is_analysis_required());
        strategy.write_analysis_to_cache(cache, &analysis()).unwrap();
    }

    #[test]
    fn test_disabled_cache_always_analyses() {
        let store = MemoryStore::default();
        let config = CacheConfig {
            enabled: false,
            skip_unchanged: true,
        };
        let cache = AnalysisCache::new(&store, &config, "m1".to_string());

        let strategy = cache.strategy_for(&file("let a;"), Some("cfg"));
        assert_eq!(strategy, CacheStrategy::Disabled);
        assert!(strategy.is_analysis_required());
        strategy.write_analysis_to_cache(&cache, &analysis()).unwrap();
        assert!(store.entries.borrow().is_empty());
    }

    #[test]
    fn test_round_trip_reuses_written_analysis() {
        let store = MemoryStore::default();
        let cache = AnalysisCache::new(&store, &enabled(), "m1".to_string());
        let f = file("let a;");

        warm(&cache, &f, Some("cfg"));

        let strategy = cache.strategy_for(&f, Some("cfg"));
        assert!(!strategy.is_analysis_required());
        assert_eq!(strategy.read_analysis_from_cache(), Some(&analysis()));
    }

    #[test]
    fn test_changed_content_is_never_reused() {
        let store = MemoryStore::default();
        let cache = AnalysisCache::new(&store, &enabled(), "m1".to_string());
        warm(&cache, &file("let a;"), Some("cfg"));

        let strategy = cache.strategy_for(&file("let a = 1;"), Some("cfg"));
        assert!(strategy.is_analysis_required());
        assert!(strategy.read_analysis_from_cache().is_none());
    }

    #[test]
    fn test_changed_configuration_is_not_reused() {
        let store = MemoryStore::default();
        let cache = AnalysisCache::new(&store, &enabled(), "m1".to_string());
        let f = file("let a;");
        warm(&cache, &f, Some("cfg"));

        assert!(cache.strategy_for(&f, Some("other")).is_analysis_required());
        assert!(cache.strategy_for(&f, None).is_analysis_required());
    }

    #[test]
    fn test_other_format_marker_is_not_reused() {
        let store = MemoryStore::default();
        let f = file("let a;");
        warm(&AnalysisCache::new(&store, &enabled(), "m1".to_string()), &f, None);

        let newer = AnalysisCache::new(&store, &enabled(), "m2".to_string());
        assert!(matches!(newer.strategy_for(&f, None), CacheStrategy::Recompute { .. }));
    }

    #[test]
    fn test_artifacts_restored_only_on_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        let store = FsCacheStore::new(dir.path().join("cache"), &work);
        let cache = AnalysisCache::new(&store, &enabled(), "m1".to_string());

        let artifact = work.join("ucfg/a.ucfg");
        std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        std::fs::write(&artifact, "v1").unwrap();
        let produced = CacheAnalysis {
            artifacts: vec![artifact.clone()],
            ..Default::default()
        };
        cache
            .strategy_for(&file("v1"), None)
            .write_analysis_to_cache(&cache, &produced)
            .unwrap();
        std::fs::remove_dir_all(&work).unwrap();

        let changed = cache.strategy_for(&file("v2"), None);
        assert!(changed.is_analysis_required());
        assert!(!artifact.exists());

        let unchanged = cache.strategy_for(&file("v1"), None);
        assert_eq!(
            unchanged.read_analysis_from_cache().unwrap().artifacts,
            vec![artifact.clone()]
        );
        assert_eq!(std::fs::read_to_string(&artifact).unwrap(), "v1");
    }

    #[test]
    fn test_lost_artifacts_degrade_to_recompute() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        let store = FsCacheStore::new(dir.path().join("cache"), &work);
        let cache = AnalysisCache::new(&store, &enabled(), "m1".to_string());

        let artifact = work.join("a.ucfg");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(&artifact, "v1").unwrap();
        let produced = CacheAnalysis {
            artifacts: vec![artifact],
            ..Default::default()
        };
        cache
            .strategy_for(&file("v1"), None)
            .write_analysis_to_cache(&cache, &produced)
            .unwrap();
        std::fs::remove_dir_all(store.root().join(crate::util::checksum::sha256_bytes(b"/p/a.ts")).join("artifacts"))
            .unwrap();

        assert!(matches!(
            cache.strategy_for(&file("v1"), None),
            CacheStrategy::Recompute { .. }
        ));
    }

    #[test]
    fn test_full_analysis_still_writes_back() {
        let store = MemoryStore::default();
        let config = CacheConfig {
            enabled: true,
            skip_unchanged: false,
        };
        let cache = AnalysisCache::new(&store, &config, "m1".to_string());
        let f = file("let a;");

        warm(&cache, &f, None);
        assert!(cache.strategy_for(&f, None).is_analysis_required());
        assert_eq!(store.entries.borrow().len(), 1);
    }

    #[test]
    fn test_read_failure_degrades_to_recompute() {
        let store = MemoryStore {
            fail_reads: true,
            ..Default::default()
        };
        let cache = AnalysisCache::new(&store, &enabled(), "m1".to_string());
        let strategy = cache.strategy_for(&file("let a;"), None);
        assert!(matches!(strategy, CacheStrategy::Recompute { .. }));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let store = MemoryStore {
            fail_writes: true,
            ..Default::default()
        };
        let cache = AnalysisCache::new(&store, &enabled(), "m1".to_string());
        let strategy = cache.strategy_for(&file("let a;"), None);
        assert!(matches!(
            strategy.write_analysis_to_cache(&cache, &analysis()),
            Err(AssayError::CacheError(_))
        ));
    }

    #[test]
    fn test_unreadable_file_is_analysed_uncached() {
        let store = MemoryStore::default();
        let cache = AnalysisCache::new(&store, &enabled(), "m1".to_string());
        let missing = InputFile::new("/nonexistent/a.ts", FileKind::Main, Language::TypeScript);
        assert_eq!(cache.strategy_for(&missing, None), CacheStrategy::Disabled);
    }

    #[test]
    fn test_labels_match_behaviour() {
        let key = CacheKey {
            file: "/p/a.ts".to_string(),
            fingerprint: "f1".to_string(),
        };
        assert_eq!(CacheStrategy::Disabled.label(), "no cache");
        let recompute = CacheStrategy::Recompute {
            key: key.clone(),
            config_identity: None,
        };
        assert_eq!(recompute.label(), "recompute");
        let reuse = CacheStrategy::Reuse {
            key,
            analysis: CacheAnalysis::default(),
        };
        assert_eq!(reuse.label(), "reuse");
    }

    #[test]
    fn test_format_marker_includes_engine_version() {
        assert!(format_marker(Some("1.2.3")).ends_with("engine-1.2.3"));
        assert_ne!(format_marker(Some("1.2.3")), format_marker(Some("1.2.4")));
    }
}
