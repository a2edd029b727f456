use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::protocol::{
    self, AnalysisRequest, AnalysisResponse, ConfigResponse, EngineRequest, LinterRule,
    StatusResponse,
};
use super::AnalysisEngine;
use crate::config::EngineConfig;
use crate::error::{AssayError, Result};
use crate::project::{to_unix_path, ConfigFile, Language};

const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The engine as a child process speaking line-delimited JSON on
/// stdin/stdout. Stderr is forwarded to the log.
pub struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    replies: Receiver<std::io::Result<String>>,
    request_timeout: Duration,
    version: Option<String>,
    /// Set once a request went unanswered; later replies cannot be matched
    /// to their requests.
    broken: Option<String>,
}

impl BridgeProcess {
    /// Spawn the engine and wait until it answers `status`.
    pub fn start(config: &EngineConfig) -> Result<Self> {
        info!("Starting analysis engine: {} {}", config.command, config.args.join(" "));

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| {
            AssayError::EngineUnavailable(format!("failed to start '{}': {}", config.command, e))
        })?;

        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                let _ = child.kill();
                return Err(AssayError::EngineUnavailable(
                    "engine stdio was not captured".to_string(),
                ));
            }
        };

        spawn_log_forwarder(stderr);
        let mut engine = Self {
            child,
            stdin,
            replies: spawn_line_reader(stdout),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            version: None,
            broken: None,
        };

        let startup_timeout = Duration::from_secs(config.startup_timeout_secs);
        let status: StatusResponse = engine
            .round_trip(&EngineRequest::Status, startup_timeout)
            .map_err(|e| AssayError::EngineUnavailable(format!("engine did not become ready: {}", e)))?;
        if !status.is_ok() {
            return Err(AssayError::EngineUnavailable(format!(
                "engine reported status '{}'",
                status.status
            )));
        }

        info!(
            "Analysis engine ready (pid {}, version {})",
            engine.child.id(),
            status.version.as_deref().unwrap_or("unknown")
        );
        engine.version = status.version;
        Ok(engine)
    }

    fn send(&mut self, request: &EngineRequest) -> Result<()> {
        let line = protocol::encode(request)?;
        writeln!(self.stdin, "{}", line)
            .and_then(|_| self.stdin.flush())
            .map_err(|e| AssayError::TransportError(format!("failed to write request: {}", e)))
    }

    fn receive(&self, timeout: Duration) -> Result<String> {
        match self.replies.recv_timeout(timeout) {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(e)) => Err(AssayError::TransportError(format!("failed to read reply: {}", e))),
            Err(RecvTimeoutError::Timeout) => Err(AssayError::TransportError(format!(
                "no reply within {}s",
                timeout.as_secs()
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(AssayError::TransportError("engine closed its output".to_string()))
            }
        }
    }

    fn round_trip<T: DeserializeOwned>(&mut self, request: &EngineRequest, timeout: Duration) -> Result<T> {
        if let Some(reason) = &self.broken {
            return Err(AssayError::EngineUnavailable(format!(
                "engine stream is out of sync after: {}",
                reason
            )));
        }
        let line = self
            .send(request)
            .and_then(|_| self.receive(timeout))
            .map_err(|e| {
                warn!("Marking analysis engine unusable: {}", e);
                self.broken = Some(e.to_string());
                e
            })?;
        protocol::decode(&line)
    }

    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the engine to exit, killing it if it does not within a short grace period.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.has_exited() {
            return;
        }
        if self.send(&EngineRequest::Close).is_ok() {
            let deadline = Instant::now() + SHUTDOWN_GRACE;
            while Instant::now() < deadline {
                if self.has_exited() {
                    debug!("Analysis engine exited");
                    return;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
        warn!("Analysis engine did not exit, killing pid {}", self.child.id());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for BridgeProcess {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl AnalysisEngine for BridgeProcess {
    fn is_alive(&mut self) -> bool {
        if self.broken.is_some() || self.has_exited() {
            return false;
        }
        match self.round_trip::<StatusResponse>(&EngineRequest::Status, LIVENESS_TIMEOUT) {
            Ok(status) => status.is_ok(),
            Err(e) => {
                warn!("Engine liveness check failed: {}", e);
                false
            }
        }
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn init_linter(
        &mut self,
        rules: Vec<LinterRule>,
        environments: Vec<String>,
        globals: Vec<String>,
    ) -> Result<()> {
        let request = EngineRequest::InitLinter {
            rules,
            environments,
            globals,
        };
        let _: serde_json::Value = self.round_trip(&request, self.request_timeout)?;
        Ok(())
    }

    fn load_config(&mut self, path: &Path) -> Result<ConfigFile> {
        let request = EngineRequest::LoadConfig {
            path: to_unix_path(path),
        };
        let response: ConfigResponse = self
            .round_trip(&request, self.request_timeout)
            .map_err(|e| match e {
                AssayError::EngineError(reason) => AssayError::ConfigLoadError {
                    path: path.to_path_buf(),
                    reason,
                },
                other => other,
            })?;
        Ok(response.into_config_file(path))
    }

    fn analyze(&mut self, language: Language, request: AnalysisRequest) -> Result<AnalysisResponse> {
        let request = match language {
            Language::JavaScript => EngineRequest::AnalyzeJs(request),
            Language::TypeScript => EngineRequest::AnalyzeTs(request),
            Language::Html => EngineRequest::AnalyzeHtml(request),
        };
        self.round_trip(&request, self.request_timeout)
    }

    fn new_config(&mut self) -> Result<()> {
        let _: serde_json::Value = self.round_trip(&EngineRequest::NewConfig, self.request_timeout)?;
        Ok(())
    }
}

fn spawn_line_reader<R: Read + Send + 'static>(reader: R) -> Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            let failed = line.is_err();
            if let Ok(ref text) = line {
                if text.trim().is_empty() {
                    continue;
                }
            }
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

fn spawn_log_forwarder<R: Read + Send + 'static>(reader: R) {
    std::thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            match line {
                Ok(text) => debug!(target: "assay::engine", "{}", text),
                Err(_) => break,
            }
        }
    });
}
