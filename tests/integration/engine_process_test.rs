use std::fs;
use std::path::Path;

use assay::analysis::{IssueCollector, RunCoordinator, RunState};
use assay::cache::{format_marker, AnalysisCache, FsCacheStore};
use assay::config::{AnalysisConfig, CacheConfig, EngineConfig};
use assay::engine::{AnalysisEngine, BridgeProcess};
use assay::project::discovery::Discovery;
use assay::util::cancel::CancellationToken;

use crate::support::RecordingSink;

/// A shell engine that governs `files` from any configuration and reports
/// one issue per script file.
fn shell_engine(files: &[String]) -> EngineConfig {
    let listed = files
        .iter()
        .map(|f| format!("\"{}\"", f))
        .collect::<Vec<_>>()
        .join(",");
    let script = format!(
        r#"
while IFS= read -r line; do
  case "$line" in
    *'"command":"status"'*) echo '{{"status":"OK!","version":"0.9.0"}}' ;;
    *'"command":"load-config"'*) echo '{{"files":[{listed}]}}' ;;
    *'"command":"analyze-ts"'*) echo '{{"issues":[{{"ruleId":"no-var","message":"Unexpected var","line":1,"column":0}}]}}' ;;
    *'"command":"close"'*) exit 0 ;;
    *) echo '{{}}' ;;
  esac
done
"#
    );
    EngineConfig {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script],
        startup_timeout_secs: 10,
        request_timeout_secs: 10,
    }
}

fn write(base: &Path, rel: &str, contents: &str) {
    let path = base.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
fn test_analysis_through_engine_process() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("project");
    write(&base, "tsconfig.json", "{}");
    write(&base, "src/a.ts", "var a = 1;");
    write(&base, "src/b.ts", "var b = 2;");
    write(&base, "index.html", "<html></html>");
    let base = base.canonicalize().unwrap();

    let config = AnalysisConfig::default();
    let discovery = Discovery::new(&config).unwrap();
    let roots = discovery.config_roots(&base).unwrap();
    assert_eq!(roots, vec![base.join("tsconfig.json")]);

    let governed = vec![
        base.join("src/a.ts").to_string_lossy().to_string(),
        base.join("src/b.ts").to_string_lossy().to_string(),
    ];
    let engine_config = shell_engine(&governed);

    let store = FsCacheStore::new(dir.path().join("cache"), base.join(".assay"));

    let run = || {
        let mut engine = BridgeProcess::start(&engine_config).unwrap();
        let cache = AnalysisCache::new(&store, &CacheConfig::default(), format_marker(engine.version()));
        let (configured, standalone): (Vec<_>, Vec<_>) = discovery
            .input_files(&base)
            .unwrap()
            .into_iter()
            .partition(|f| f.language().uses_project_config());

        let mut collector = IssueCollector::new();
        let reports = {
            let mut coordinator = RunCoordinator::new(
                &config,
                &mut engine,
                &cache,
                CancellationToken::new(),
                RecordingSink::new(),
            );
            vec![
                coordinator.analyze_files(&roots, configured, &mut collector),
                coordinator.analyze_standalone(standalone, &mut collector),
            ]
        };
        engine.close();
        (reports, collector)
    };

    let (reports, collector) = run();
    assert_eq!(reports[0].state, RunState::Succeeded);
    assert_eq!(reports[0].analysed, 2);
    assert_eq!(reports[1].state, RunState::Succeeded);
    assert_eq!(reports[1].analysed, 1);
    assert_eq!(collector.issue_count(), 2);

    let (reports, collector) = run();
    assert_eq!((reports[0].analysed, reports[0].reused), (0, 2));
    assert_eq!((reports[1].analysed, reports[1].reused), (0, 1));
    assert_eq!(collector.issue_count(), 2);
}
