use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::CacheAnalysis;
use crate::engine::protocol::{AnalysisResponse, Issue, ParsingError};
use crate::project::InputFile;

/// Consumer of per-file analysis results. Each dispatched file reaches
/// exactly one of the two methods, exactly once.
pub trait AnalysisProcessor {
    fn process_response(&mut self, file: &InputFile, response: &AnalysisResponse);
    fn process_cache_analysis(&mut self, file: &InputFile, analysis: &CacheAnalysis);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFindings {
    pub file: String,
    pub from_cache: bool,
    pub issues: Vec<Issue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsing_error: Option<ParsingError>,
    pub cpd_tokens: usize,
}

/// Keeps every file's findings in dispatch order.
#[derive(Debug, Default)]
pub struct IssueCollector {
    findings: Vec<FileFindings>,
}

impl IssueCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn findings(&self) -> &[FileFindings] {
        &self.findings
    }

    pub fn into_findings(self) -> Vec<FileFindings> {
        self.findings
    }

    pub fn issue_count(&self) -> usize {
        self.findings.iter().map(|f| f.issues.len()).sum()
    }

    fn record(
        &mut self,
        file: &InputFile,
        from_cache: bool,
        issues: &[Issue],
        parsing_error: Option<&ParsingError>,
        cpd_tokens: usize,
    ) {
        if let Some(error) = parsing_error {
            match error.line {
                Some(line) => warn!("Failed to parse {} at line {}: {}", file, line, error.message),
                None => warn!("Failed to parse {}: {}", file, error.message),
            }
        }
        debug!("{} issue(s) in {}", issues.len(), file);
        self.findings.push(FileFindings {
            file: file.unix_path(),
            from_cache,
            issues: issues.to_vec(),
            parsing_error: parsing_error.cloned(),
            cpd_tokens,
        });
    }
}

impl AnalysisProcessor for IssueCollector {
    fn process_response(&mut self, file: &InputFile, response: &AnalysisResponse) {
        self.record(
            file,
            false,
            &response.issues,
            response.parsing_error.as_ref(),
            response.cpd_tokens.len(),
        );
    }

    fn process_cache_analysis(&mut self, file: &InputFile, analysis: &CacheAnalysis) {
        self.record(
            file,
            true,
            &analysis.issues,
            analysis.parsing_error.as_ref(),
            analysis.cpd_tokens.len(),
        );
    }
}
