use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{AssayError, Result};
use crate::project::ConfigFile;

/// Something able to parse a project configuration.
pub trait ConfigLoader {
    fn load_config(&mut self, path: &Path) -> Result<ConfigFile>;
}

#[derive(Debug)]
pub struct ConfigLoadFailure {
    pub path: PathBuf,
    pub error: AssayError,
}

/// Configurations reachable from a set of roots, flattened in visit order.
#[derive(Debug, Default)]
pub struct ConfigGraph {
    pub roots: Vec<PathBuf>,
    pub configs: Vec<ConfigFile>,
    pub failures: Vec<ConfigLoadFailure>,
}

impl ConfigGraph {
    /// Load every configuration reachable from `roots`, each path at most once.
    ///
    /// Roots are visited in order, referenced configurations after the
    /// configuration that names them. A path that fails to load is recorded
    /// in `failures` and never retried. Engine failures abort resolution.
    pub fn resolve(loader: &mut dyn ConfigLoader, roots: &[PathBuf]) -> Result<Self> {
        let mut graph = ConfigGraph {
            roots: roots.to_vec(),
            ..Default::default()
        };
        let mut queue: VecDeque<PathBuf> = roots.iter().cloned().collect();
        let mut visited = HashSet::new();

        while let Some(path) = queue.pop_front() {
            if !visited.insert(path.clone()) {
                continue;
            }

            match loader.load_config(&path) {
                Ok(config) => {
                    if !config.references().is_empty() {
                        debug!(
                            "Adding referenced configurations of {}: {:?}",
                            path.display(),
                            config.references()
                        );
                    }
                    queue.extend(config.references().iter().cloned());
                    graph.configs.push(config);
                }
                Err(error) if error.is_engine_failure() => {
                    return Err(error);
                }
                Err(error) => {
                    warn!("Failed to load configuration {}: {}", path.display(), error);
                    graph.failures.push(ConfigLoadFailure { path, error });
                }
            }
        }

        Ok(graph)
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
