//! Newline-delimited JSON messages exchanged with the analysis engine.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AssayError, Result};
use crate::project::FileKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub file_path: String,
    pub file_type: FileKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
    pub ignore_header_comments: bool,
    pub ts_configs: Vec<String>,
    pub linter_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinterRule {
    pub key: String,
    pub configurations: Vec<serde_json::Value>,
    pub file_type_target: Vec<FileKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum EngineRequest {
    Status,
    InitLinter {
        rules: Vec<LinterRule>,
        environments: Vec<String>,
        globals: Vec<String>,
    },
    LoadConfig {
        path: String,
    },
    AnalyzeJs(AnalysisRequest),
    AnalyzeTs(AnalysisRequest),
    AnalyzeHtml(AnalysisRequest),
    NewConfig,
    Close,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl StatusResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "OK!"
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub project_references: Vec<String>,
    #[serde(default)]
    pub settings: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub end_column: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub rule_id: String,
    pub message: String,
    #[serde(flatten)]
    pub location: Location,
    #[serde(default)]
    pub secondary_locations: Vec<Location>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsingError {
    pub message: String,
    #[serde(default)]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpdToken {
    pub image: String,
    #[serde(flatten)]
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    #[serde(default)]
    pub parsing_error: Option<ParsingError>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub cpd_tokens: Vec<CpdToken>,
    /// Files the engine generated for this source.
    #[serde(default)]
    pub ucfg_paths: Vec<PathBuf>,
}

pub fn encode(request: &EngineRequest) -> Result<String> {
    Ok(serde_json::to_string(request)?)
}

/// Decode one reply line. A reply carrying a string `error` field is an
/// engine-side failure whatever the expected type.
pub fn decode<T: DeserializeOwned>(line: &str) -> Result<T> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
        AssayError::TransportError(format!("malformed engine reply: {}", e))
    })?;
    if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
        return Err(AssayError::EngineError(message.to_string()));
    }
    serde_json::from_value(value)
        .map_err(|e| AssayError::TransportError(format!("unexpected engine reply: {}", e)))
}
