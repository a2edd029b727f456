use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use assay::engine::protocol::{Issue, Location};
use assay::engine::{AnalysisEngine, AnalysisRequest, AnalysisResponse, LinterRule};
use assay::error::{AssayError, Result};
use assay::progress::{ProgressSink, ProgressState};
use assay::project::{ConfigFile, FileKind, InputFile, Language};
use assay::util::cancel::CancellationToken;

/// In-memory engine: configurations come from a map, every analysed file
/// yields one issue.
#[derive(Default)]
pub struct FakeEngine {
    configs: HashMap<PathBuf, ConfigFile>,
    pub loads: Vec<PathBuf>,
    pub analyzed: Vec<String>,
    pub new_configs: usize,
    liveness_checks: usize,
    /// `is_alive` answers false from this (1-based) check on.
    pub dies_at_check: Option<usize>,
    /// Cancel the token once this many files have been analysed.
    pub cancel_after: Option<(usize, CancellationToken)>,
}

impl FakeEngine {
    pub fn with_config(mut self, path: &str, refs: &[&str], files: &[&str]) -> Self {
        self.configs.insert(
            PathBuf::from(path),
            ConfigFile::new(
                path,
                refs.iter().map(PathBuf::from).collect(),
                files.iter().map(|f| f.to_string()),
                serde_json::json!({"compilerOptions": {"strict": true}}),
            ),
        );
        self
    }
}

impl AnalysisEngine for FakeEngine {
    fn is_alive(&mut self) -> bool {
        self.liveness_checks += 1;
        match self.dies_at_check {
            Some(n) => self.liveness_checks < n,
            None => true,
        }
    }

    fn version(&self) -> Option<&str> {
        Some("fake-1")
    }

    fn init_linter(&mut self, _: Vec<LinterRule>, _: Vec<String>, _: Vec<String>) -> Result<()> {
        Ok(())
    }

    fn load_config(&mut self, path: &Path) -> Result<ConfigFile> {
        self.loads.push(path.to_path_buf());
        self.configs.get(path).cloned().ok_or_else(|| AssayError::ConfigLoadError {
            path: path.to_path_buf(),
            reason: "not found".to_string(),
        })
    }

    fn analyze(&mut self, _: Language, request: AnalysisRequest) -> Result<AnalysisResponse> {
        self.analyzed.push(request.file_path.clone());
        if let Some((after, token)) = &self.cancel_after {
            if self.analyzed.len() >= *after {
                token.cancel();
            }
        }
        Ok(AnalysisResponse {
            issues: vec![Issue {
                rule_id: "no-unused-vars".to_string(),
                message: format!("unused variable in {}", request.file_path),
                location: Location {
                    line: 1,
                    column: 4,
                    end_line: Some(1),
                    end_column: Some(5),
                },
                secondary_locations: vec![],
            }],
            ..Default::default()
        })
    }

    fn new_config(&mut self) -> Result<()> {
        self.new_configs += 1;
        Ok(())
    }
}

/// Progress sink recording the terminal calls it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }
}

impl ProgressSink for RecordingSink {
    fn started(&self, _: &ProgressState) {
        self.events.lock().unwrap().push("start".to_string());
    }
    fn tick(&self, _: &ProgressState) {}
    fn stopped(&self, _: &ProgressState) {
        self.events.lock().unwrap().push("stop".to_string());
    }
    fn cancelled(&self, _: &ProgressState) {
        self.events.lock().unwrap().push("cancel".to_string());
    }
}

pub fn ts_file(path: &str, contents: &str) -> InputFile {
    InputFile::with_contents(path, FileKind::Main, Language::TypeScript, contents)
}

/// `/p/src/f1.ts` .. `/p/src/f{n}.ts`
pub fn numbered_files(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("/p/src/f{}.ts", i)).collect()
}
