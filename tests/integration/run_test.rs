use std::path::PathBuf;

use assay::analysis::{IssueCollector, RunCoordinator, RunState};
use assay::cache::{format_marker, AnalysisCache, CacheStore, FsCacheStore};
use assay::config::{AnalysisConfig, CacheConfig};
use assay::util::cancel::CancellationToken;

use crate::support::{numbered_files, ts_file, FakeEngine, RecordingSink};

fn single_project(files: &[String]) -> FakeEngine {
    let refs: Vec<&str> = files.iter().map(String::as_str).collect();
    FakeEngine::default().with_config("/p/tsconfig.json", &[], &refs)
}

fn roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/p/tsconfig.json")]
}

#[test]
fn test_cancellation_stops_before_next_file() {
    let paths = numbered_files(5);
    let cancel = CancellationToken::new();
    let mut engine = single_project(&paths);
    engine.cancel_after = Some((2, cancel.clone()));

    let dir = tempfile::tempdir().unwrap();
    let store = FsCacheStore::new(dir.path().join("cache"), dir.path().join("work"));
    let cache = AnalysisCache::new(&store, &CacheConfig::default(), format_marker(Some("fake-1")));
    let config = AnalysisConfig::default();
    let sink = RecordingSink::new();
    let mut collector = IssueCollector::new();

    let files = paths.iter().map(|p| ts_file(p, "let x = 1;")).collect();
    let report = RunCoordinator::new(&config, &mut engine, &cache, cancel, sink.clone())
        .analyze_files(&roots(), files, &mut collector);

    assert_eq!(report.state, RunState::Cancelled);
    assert_eq!(report.analysed, 2);
    assert_eq!(engine.analyzed, paths[..2].to_vec());
    assert_eq!(collector.findings().len(), 2);

    for path in &paths[..2] {
        assert!(store.read(path).unwrap().is_some(), "{} should be cached", path);
    }
    for path in &paths[2..] {
        assert!(store.read(path).unwrap().is_none(), "{} should not be cached", path);
    }

    assert_eq!(sink.count("cancel"), 1);
    assert_eq!(sink.count("stop"), 0);
}

#[test]
fn test_engine_death_fails_the_run() {
    let paths = numbered_files(5);
    let mut engine = single_project(&paths);
    engine.dies_at_check = Some(2);

    let dir = tempfile::tempdir().unwrap();
    let store = FsCacheStore::new(dir.path().join("cache"), dir.path().join("work"));
    let cache = AnalysisCache::new(&store, &CacheConfig::default(), format_marker(Some("fake-1")));
    let config = AnalysisConfig::default();
    let sink = RecordingSink::new();
    let mut collector = IssueCollector::new();

    let files = paths.iter().map(|p| ts_file(p, "let x = 1;")).collect();
    let report = RunCoordinator::new(&config, &mut engine, &cache, CancellationToken::new(), sink.clone())
        .analyze_files(&roots(), files, &mut collector);

    assert_eq!(report.state, RunState::Failed);
    assert!(report.error.as_deref().unwrap().contains("not answering"));
    assert_eq!(engine.analyzed, vec![paths[0].clone()]);
    assert_eq!(collector.findings().len(), 1);
    assert_eq!(sink.events(), vec!["start", "cancel"]);

    assert!(store.read(&paths[0]).unwrap().is_some());
    for path in &paths[1..] {
        assert!(store.read(path).unwrap().is_none(), "{} should not be cached", path);
    }
}

#[test]
fn test_second_run_reuses_unchanged_files() {
    let paths = numbered_files(3);
    let dir = tempfile::tempdir().unwrap();
    let store = FsCacheStore::new(dir.path().join("cache"), dir.path().join("work"));
    let cache = AnalysisCache::new(&store, &CacheConfig::default(), format_marker(Some("fake-1")));
    let config = AnalysisConfig::default();

    let run = |contents: &[&str]| {
        let mut engine = single_project(&paths);
        let mut collector = IssueCollector::new();
        let files = paths
            .iter()
            .zip(contents)
            .map(|(p, c)| ts_file(p, c))
            .collect();
        let report = RunCoordinator::new(&config, &mut engine, &cache, CancellationToken::new(), RecordingSink::new())
            .analyze_files(&roots(), files, &mut collector);
        (report, engine.analyzed, collector)
    };

    let (first, analysed, _) = run(&["a", "b", "c"]);
    assert_eq!(first.state, RunState::Succeeded);
    assert_eq!((first.analysed, first.reused), (3, 0));
    assert_eq!(analysed.len(), 3);

    let (second, analysed, collector) = run(&["a", "b", "c"]);
    assert_eq!((second.analysed, second.reused), (0, 3));
    assert!(analysed.is_empty());
    assert!(collector.findings().iter().all(|f| f.from_cache));
    assert_eq!(collector.issue_count(), 3);

    let (third, analysed, _) = run(&["a", "changed", "c"]);
    assert_eq!((third.analysed, third.reused), (1, 2));
    assert_eq!(analysed, vec![paths[1].clone()]);
}

#[test]
fn test_unmatched_files_are_never_dispatched() {
    let mut engine = FakeEngine::default().with_config("/p/c1.json", &[], &["/p/f1.ts", "/p/f2.ts"]);
    let cache = AnalysisCache::disabled();
    let config = AnalysisConfig::default();
    let mut collector = IssueCollector::new();

    let files = vec![
        ts_file("/p/f1.ts", ""),
        ts_file("/p/f2.ts", ""),
        ts_file("/p/f3.ts", ""),
    ];
    let report = RunCoordinator::new(&config, &mut engine, &cache, CancellationToken::new(), RecordingSink::new())
        .analyze_files(&[PathBuf::from("/p/c1.json")], files, &mut collector);

    assert_eq!(report.state, RunState::Succeeded);
    assert_eq!(engine.analyzed, vec!["/p/f1.ts", "/p/f2.ts"]);
    assert_eq!(report.unmatched, vec!["/p/f3.ts"]);
    assert_eq!(engine.new_configs, 1);
}

#[test]
fn test_cyclic_references_load_each_configuration_once() {
    let mut engine = FakeEngine::default()
        .with_config("/p/A.json", &["/p/B.json"], &["/p/a.ts"])
        .with_config("/p/B.json", &["/p/A.json"], &["/p/b.ts"]);
    let cache = AnalysisCache::disabled();
    let config = AnalysisConfig::default();
    let mut collector = IssueCollector::new();

    let report = RunCoordinator::new(&config, &mut engine, &cache, CancellationToken::new(), RecordingSink::new())
        .analyze_files(
            &[PathBuf::from("/p/A.json")],
            vec![ts_file("/p/b.ts", ""), ts_file("/p/a.ts", "")],
            &mut collector,
        );

    assert_eq!(report.state, RunState::Succeeded);
    assert_eq!(engine.loads, vec![PathBuf::from("/p/A.json"), PathBuf::from("/p/B.json")]);
    assert_eq!(engine.analyzed, vec!["/p/a.ts", "/p/b.ts"]);
}

#[test]
fn test_no_configuration_skips_the_run() {
    let mut engine = FakeEngine::default();
    let cache = AnalysisCache::disabled();
    let config = AnalysisConfig::default();
    let sink = RecordingSink::new();
    let mut collector = IssueCollector::new();

    let report = RunCoordinator::new(&config, &mut engine, &cache, CancellationToken::new(), sink.clone())
        .analyze_files(&[], vec![ts_file("/p/a.ts", "")], &mut collector);

    assert_eq!(report.state, RunState::Skipped);
    assert!(report.is_success());
    assert!(engine.analyzed.is_empty());
    assert!(sink.events().is_empty());
}
