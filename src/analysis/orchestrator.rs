//! Run coordinator: configuration resolution, file grouping, and the
//! per-group dispatch loop with progress and cancellation.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::dispatcher::{AnalysisDispatcher, Dispatched, RequestOptions};
use super::processor::AnalysisProcessor;
use crate::cache::AnalysisCache;
use crate::config::{AnalysisConfig, ConfigErrorPolicy};
use crate::engine::{AnalysisEngine, EngineConfigLoader, LinterRule};
use crate::error::{AssayError, Result};
use crate::progress::{ProgressReport, ProgressSink};
use crate::project::{ConfigFile, InputFile};
use crate::resolver::{assign_files, ConfigGraph};
use crate::util::cancel::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    NotStarted,
    Running,
    Succeeded,
    Cancelled,
    Failed,
    /// Nothing was dispatchable: no configuration or no governed file.
    Skipped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::NotStarted => "not started",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Cancelled => "cancelled",
            RunState::Failed => "failed",
            RunState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome of one `analyze_files` or `analyze_standalone` call.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub state: RunState,
    pub analysed: usize,
    pub reused: usize,
    pub unmatched: Vec<String>,
    pub config_failures: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            state: RunState::NotStarted,
            analysed: 0,
            reused: 0,
            unmatched: Vec::new(),
            config_failures: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn finish(mut self, state: RunState) -> Self {
        self.state = state;
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.state, RunState::Succeeded | RunState::Skipped)
    }
}

/// Files analysed together under one configuration, or none.
struct Batch<'g> {
    config: Option<&'g ConfigFile>,
    files: &'g [InputFile],
}

/// Drives runs against a single engine. The linter is initialised before
/// the first dispatch and kept for later runs of the same coordinator.
pub struct RunCoordinator<'a> {
    config: &'a AnalysisConfig,
    engine: &'a mut dyn AnalysisEngine,
    cache: &'a AnalysisCache<'a>,
    cancel: CancellationToken,
    sink: Arc<dyn ProgressSink>,
    progress_period: Duration,
    linter_ready: bool,
}

impl<'a> RunCoordinator<'a> {
    pub fn new(
        config: &'a AnalysisConfig,
        engine: &'a mut dyn AnalysisEngine,
        cache: &'a AnalysisCache<'a>,
        cancel: CancellationToken,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config,
            engine,
            cache,
            cancel,
            sink,
            progress_period: config.progress_period(),
            linter_ready: false,
        }
    }

    /// Analyse files governed by the configurations reachable from `roots`.
    pub fn analyze_files(
        &mut self,
        roots: &[PathBuf],
        files: Vec<InputFile>,
        processor: &mut dyn AnalysisProcessor,
    ) -> RunReport {
        let mut report = RunReport::new();
        if files.is_empty() {
            info!("No files to analyze");
            return report.finish(RunState::Skipped);
        }

        let resolved = {
            let mut loader = EngineConfigLoader::new(&mut *self.engine);
            ConfigGraph::resolve(&mut loader, roots)
        };
        let graph = match resolved {
            Ok(graph) => graph,
            Err(e) => {
                error!("Failed to resolve configurations: {}", e);
                report.error = Some(e.to_string());
                return report.finish(RunState::Failed);
            }
        };
        report.config_failures = graph
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.path.display(), f.error))
            .collect();

        if !graph.failures.is_empty() && self.config.on_config_error == ConfigErrorPolicy::Abort {
            let message = format!(
                "{} configuration(s) failed to load, aborting",
                graph.failures.len()
            );
            error!("{}", message);
            report.error = Some(message);
            return report.finish(RunState::Failed);
        }

        if graph.is_empty() {
            warn!(
                "No {} found, analysis will be skipped",
                self.config.config_file_name
            );
            report.unmatched = files.iter().map(InputFile::unix_path).collect();
            return report.finish(RunState::Skipped);
        }

        let groups = assign_files(&graph.configs, files);
        let mut batches = Vec::with_capacity(groups.len());
        for group in &groups {
            if group.is_unmatched() {
                info!(
                    "Skipping {} file(s) with no {}",
                    group.files.len(),
                    self.config.config_file_name
                );
                let paths: Vec<String> = group.files.iter().map(InputFile::unix_path).collect();
                debug!("Skipped files: {}", paths.join("\n"));
                report.unmatched.extend(paths);
            } else {
                batches.push(Batch {
                    config: group.config(),
                    files: &group.files,
                });
            }
        }

        if batches.is_empty() {
            warn!("No file is governed by a loaded configuration, analysis will be skipped");
            return report.finish(RunState::Skipped);
        }

        self.run(&batches, processor, report)
    }

    /// Analyse files that need no project configuration.
    pub fn analyze_standalone(
        &mut self,
        files: Vec<InputFile>,
        processor: &mut dyn AnalysisProcessor,
    ) -> RunReport {
        let report = RunReport::new();
        if files.is_empty() {
            return report.finish(RunState::Skipped);
        }
        let batches = [Batch {
            config: None,
            files: &files,
        }];
        self.run(&batches, processor, report)
    }

    // -----------------------------------------------------------------------
    // Dispatch loop
    // -----------------------------------------------------------------------

    fn run(
        &mut self,
        batches: &[Batch<'_>],
        processor: &mut dyn AnalysisProcessor,
        mut report: RunReport,
    ) -> RunReport {
        let total: usize = batches.iter().map(|b| b.files.len()).sum();
        let first = batches
            .iter()
            .find_map(|b| b.files.first())
            .map(InputFile::path);

        report.state = RunState::Running;
        let mut progress = ProgressReport::new(Arc::clone(&self.sink), self.progress_period);
        progress.start(total, first);

        match self.process_batches(batches, processor, &progress, &mut report) {
            Ok(()) => {
                progress.stop();
                report.finish(RunState::Succeeded)
            }
            Err(AssayError::Cancelled) => {
                progress.cancel();
                info!("Analysis cancelled");
                report.error = Some(AssayError::Cancelled.to_string());
                report.finish(RunState::Cancelled)
            }
            Err(e) => {
                progress.cancel();
                error!("Analysis failed: {}", e);
                report.error = Some(e.to_string());
                report.finish(RunState::Failed)
            }
        }
    }

    fn process_batches(
        &mut self,
        batches: &[Batch<'_>],
        processor: &mut dyn AnalysisProcessor,
        progress: &ProgressReport,
        report: &mut RunReport,
    ) -> Result<()> {
        self.ensure_linter()?;

        let options = RequestOptions::from(self.config);
        for batch in batches {
            match batch.config {
                Some(config) => info!(
                    "Analyzing {} file(s) using {}",
                    batch.files.len(),
                    config
                ),
                None => info!(
                    "Analyzing {} file(s) without project configuration",
                    batch.files.len()
                ),
            }

            let mut dispatcher =
                AnalysisDispatcher::new(&mut *self.engine, self.cache, &self.cancel, options.clone());
            for file in batch.files {
                match dispatcher.dispatch(file, batch.config, processor)? {
                    Dispatched::Analysed => report.analysed += 1,
                    Dispatched::Reused => report.reused += 1,
                }
                progress.next_file(file.path());
            }

            if batch.config.is_some() {
                if let Err(e) = self.engine.new_config() {
                    warn!("Failed to clear engine configuration state: {}", e);
                }
            }
        }
        Ok(())
    }

    fn ensure_linter(&mut self) -> Result<()> {
        if self.linter_ready {
            return Ok(());
        }
        let rules: Vec<LinterRule> = self
            .config
            .rules
            .iter()
            .map(|rule| LinterRule {
                key: rule.key.clone(),
                configurations: rule.configurations.clone(),
                file_type_target: rule.file_kinds.clone(),
            })
            .collect();
        debug!("Initialising linter with {} rule(s)", rules.len());
        self.engine.init_linter(
            rules,
            self.config.environments.clone(),
            self.config.globals.clone(),
        )?;
        self.linter_ready = true;
        Ok(())
    }
}
