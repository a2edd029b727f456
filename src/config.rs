use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::project::FileKind;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GlobalConfig {
    #[serde(default = "default_general")]
    pub general: GeneralConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Root under which the engine writes generated artifacts; cached
    /// artifacts are restored relative to it.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_engine_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfigErrorPolicy {
    /// Warn about the failing path and continue with the configurations that loaded.
    #[default]
    Skip,
    /// Fail the run before anything is dispatched.
    Abort,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuleConfig {
    pub key: String,
    #[serde(default)]
    pub configurations: Vec<serde_json::Value>,
    #[serde(default = "default_rule_file_kinds")]
    pub file_kinds: Vec<FileKind>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalysisConfig {
    /// Explicit root project configurations. When empty, roots are
    /// discovered under the base directory by `config_file_name`.
    #[serde(default)]
    pub config_roots: Vec<PathBuf>,
    #[serde(default = "default_config_file_name")]
    pub config_file_name: String,
    #[serde(default = "default_exclusions")]
    pub exclusions: Vec<String>,
    #[serde(default = "default_test_pattern")]
    pub test_pattern: String,
    #[serde(default)]
    pub send_content: bool,
    #[serde(default = "default_true")]
    pub ignore_header_comments: bool,
    #[serde(default = "default_linter_id")]
    pub linter_id: String,
    #[serde(default = "default_progress_period")]
    pub progress_period_secs: u64,
    #[serde(default)]
    pub on_config_error: ConfigErrorPolicy,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    #[serde(default)]
    pub environments: Vec<String>,
    #[serde(default)]
    pub globals: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// When false every file is analysed, but results are still written back.
    #[serde(default = "default_true")]
    pub skip_unchanged: bool,
}

fn default_general() -> GeneralConfig {
    let use_xdg = !nix::unistd::getuid().is_root();

    GeneralConfig {
        cache_dir: if use_xdg {
            get_xdg_cache().unwrap_or_else(default_cache_dir)
        } else {
            default_cache_dir()
        },
        work_dir: default_work_dir(),
    }
}

fn get_xdg_cache() -> Option<PathBuf> {
    std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| {
            std::env::var("HOME")
                .map(|h| PathBuf::from(h).join(".cache"))
                .ok()
        })
        .map(|p| p.join("assay"))
}

fn get_xdg_config() -> Option<PathBuf> {
    if nix::unistd::getuid().is_root() {
        return None;
    }

    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| {
            std::env::var("HOME")
                .map(|h| PathBuf::from(h).join(".config"))
                .ok()
        })
        .map(|p| p.join("assay/assay.toml"))
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/assay")
}
fn default_work_dir() -> PathBuf {
    PathBuf::from(".assay")
}
fn default_engine_command() -> String {
    "assay-engine".to_string()
}
fn default_startup_timeout() -> u64 {
    60
}
fn default_request_timeout() -> u64 {
    300
}
fn default_config_file_name() -> String {
    "tsconfig.json".to_string()
}
fn default_exclusions() -> Vec<String> {
    vec!["node_modules".to_string(), ".git".to_string(), ".assay".to_string()]
}
fn default_test_pattern() -> String {
    r"(^|/)(__tests__|tests?)/|\.(test|spec)\.[cm]?[jt]sx?$".to_string()
}
fn default_linter_id() -> String {
    "default".to_string()
}
fn default_progress_period() -> u64 {
    10
}
fn default_rule_file_kinds() -> Vec<FileKind> {
    vec![FileKind::Main, FileKind::Test]
}
fn default_true() -> bool {
    true
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            general: default_general(),
            engine: EngineConfig::default(),
            analysis: AnalysisConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
            args: Vec::new(),
            startup_timeout_secs: default_startup_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            config_roots: Vec::new(),
            config_file_name: default_config_file_name(),
            exclusions: default_exclusions(),
            test_pattern: default_test_pattern(),
            send_content: false,
            ignore_header_comments: true,
            linter_id: default_linter_id(),
            progress_period_secs: default_progress_period(),
            on_config_error: ConfigErrorPolicy::default(),
            rules: Vec::new(),
            environments: Vec::new(),
            globals: Vec::new(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_unchanged: true,
        }
    }
}

impl GlobalConfig {
    /// Load configuration with layered merging.
    ///
    /// When an explicit `path` is supplied (via `--config`), that single file
    /// replaces the file layers. Otherwise layers are merged in ascending
    /// priority order, so each only needs the keys it overrides:
    ///
    ///   1. built-in defaults
    ///   2. `/etc/assay/assay.toml`
    ///   3. `$XDG_CONFIG_HOME/assay/assay.toml` (non-root only)
    ///   4. `./assay.toml`
    ///   5. `ASSAY_*` environment variables, `__` separating sections
    ///      (e.g. `ASSAY_CACHE__ENABLED=false`)
    ///
    /// Missing files are skipped.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(GlobalConfig::default()));

        match path {
            Some(p) => {
                figment = figment.merge(Toml::file(p));
            }
            None => {
                let mut layers = vec![PathBuf::from("/etc/assay/assay.toml")];
                if let Some(xdg) = get_xdg_config() {
                    layers.push(xdg);
                }
                layers.push(PathBuf::from("./assay.toml"));
                for layer in layers {
                    figment = figment.merge(Toml::file(layer));
                }
            }
        }

        Self::extract(figment.merge(Env::prefixed("ASSAY_").split("__")))
    }

    /// Parse a configuration from TOML text on top of the built-in defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::extract(
            Figment::from(Serialized::defaults(GlobalConfig::default()))
                .merge(Toml::string(content)),
        )
    }

    fn extract(figment: Figment) -> Result<Self> {
        Ok(figment.extract()?)
    }

    /// Directory holding per-file analysis cache entries.
    pub fn analysis_cache_dir(&self) -> PathBuf {
        self.general.cache_dir.join("analysis")
    }
}

impl AnalysisConfig {
    pub fn progress_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.progress_period_secs.max(1))
    }
}
