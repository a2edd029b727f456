use std::borrow::Cow;

use tracing::{debug, error, warn};

use super::processor::AnalysisProcessor;
use crate::cache::{AnalysisCache, CacheAnalysis};
use crate::config::AnalysisConfig;
use crate::engine::{AnalysisEngine, AnalysisRequest};
use crate::error::{AssayError, Result};
use crate::project::{to_unix_path, ConfigFile, InputFile};
use crate::util::cancel::CancellationToken;

/// Request fields that are the same for every file of a run.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub send_content: bool,
    pub ignore_header_comments: bool,
    pub linter_id: String,
}

impl From<&AnalysisConfig> for RequestOptions {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            send_content: config.send_content,
            ignore_header_comments: config.ignore_header_comments,
            linter_id: config.linter_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Analysed,
    Reused,
}

/// Runs one file through cache and engine.
pub struct AnalysisDispatcher<'a> {
    engine: &'a mut dyn AnalysisEngine,
    cache: &'a AnalysisCache<'a>,
    cancel: &'a CancellationToken,
    options: RequestOptions,
}

impl<'a> AnalysisDispatcher<'a> {
    pub fn new(
        engine: &'a mut dyn AnalysisEngine,
        cache: &'a AnalysisCache<'a>,
        cancel: &'a CancellationToken,
        options: RequestOptions,
    ) -> Self {
        Self {
            engine,
            cache,
            cancel,
            options,
        }
    }

    /// Analyse `file` under `config`, or reuse its cached analysis.
    ///
    /// Fails with `Cancelled` when the run has been cancelled and with
    /// `EngineUnavailable` when the engine stopped answering. Nothing is
    /// retried.
    pub fn dispatch(
        &mut self,
        file: &InputFile,
        config: Option<&ConfigFile>,
        processor: &mut dyn AnalysisProcessor,
    ) -> Result<Dispatched> {
        if self.cancel.is_cancelled() {
            return Err(AssayError::Cancelled);
        }
        if !self.engine.is_alive() {
            if self.cancel.is_cancelled() {
                return Err(AssayError::Cancelled);
            }
            return Err(AssayError::EngineUnavailable(
                "analysis engine is not answering".to_string(),
            ));
        }

        let config_identity = config.map(ConfigFile::identity);
        let strategy = self.cache.strategy_for(file, config_identity);

        if let Some(analysis) = strategy.read_analysis_from_cache() {
            processor.process_cache_analysis(file, analysis);
            return Ok(Dispatched::Reused);
        }

        let request = self.build_request(file, config);
        debug!("Analyzing {} ({:?})", file, file.language());
        let response = self
            .engine
            .analyze(file.language(), request)
            .map_err(|e| {
                error!("Failed to get response while analyzing {}: {}", file, e);
                e
            })?;

        processor.process_response(file, &response);

        let analysis = CacheAnalysis::from(response);
        if let Err(e) = strategy.write_analysis_to_cache(self.cache, &analysis) {
            warn!("Failed to write cache entry for {}: {}", file, e);
        }
        Ok(Dispatched::Analysed)
    }

    fn build_request(&self, file: &InputFile, config: Option<&ConfigFile>) -> AnalysisRequest {
        let file_content = if self.options.send_content {
            match file.contents() {
                Ok(Cow::Borrowed(text)) => Some(text.to_string()),
                Ok(Cow::Owned(text)) => {
                    warn!("{} is not valid UTF-8, sending it with replacement characters", file);
                    Some(text)
                }
                Err(e) => {
                    warn!("Cannot read {}, leaving it to the engine: {}", file, e);
                    None
                }
            }
        } else {
            None
        };
        AnalysisRequest {
            file_path: file.unix_path(),
            file_type: file.kind(),
            file_content,
            ignore_header_comments: self.options.ignore_header_comments,
            ts_configs: config.map(|c| vec![to_unix_path(c.path())]).unwrap_or_default(),
            linter_id: self.options.linter_id.clone(),
        }
    }
}
