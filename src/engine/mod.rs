//! The external analysis engine: the operations the orchestrator needs from
//! it and the child-process implementation.

pub mod process;
pub mod protocol;

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::project::{ConfigFile, Language};
use crate::resolver::ConfigLoader;

pub use process::BridgeProcess;
pub use protocol::{AnalysisRequest, AnalysisResponse, ConfigResponse, LinterRule};

/// A single long-lived engine. Requests are strictly sequential; callers
/// hold it by `&mut` for the duration of a run.
pub trait AnalysisEngine {
    /// Liveness probe, checked before every dispatch.
    fn is_alive(&mut self) -> bool;

    /// Engine-reported version, part of the cache format marker.
    fn version(&self) -> Option<&str>;

    fn init_linter(
        &mut self,
        rules: Vec<LinterRule>,
        environments: Vec<String>,
        globals: Vec<String>,
    ) -> Result<()>;

    fn load_config(&mut self, path: &Path) -> Result<ConfigFile>;

    fn analyze(&mut self, language: Language, request: AnalysisRequest) -> Result<AnalysisResponse>;

    /// Advisory: drop configuration-scoped state before the next group.
    fn new_config(&mut self) -> Result<()>;
}

/// Lets the configuration resolver load through the engine.
pub struct EngineConfigLoader<'a> {
    engine: &'a mut dyn AnalysisEngine,
}

impl<'a> EngineConfigLoader<'a> {
    pub fn new(engine: &'a mut dyn AnalysisEngine) -> Self {
        Self { engine }
    }
}

impl ConfigLoader for EngineConfigLoader<'_> {
    fn load_config(&mut self, path: &Path) -> Result<ConfigFile> {
        self.engine.load_config(path)
    }
}

impl ConfigResponse {
    pub fn into_config_file(self, path: &Path) -> ConfigFile {
        let references = self
            .project_references
            .into_iter()
            .map(PathBuf::from)
            .collect();
        ConfigFile::new(path, references, self.files, self.settings)
    }
}
