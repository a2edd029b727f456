//! Orchestration of analysis runs.

pub mod dispatcher;
pub mod orchestrator;
pub mod processor;

pub use dispatcher::{AnalysisDispatcher, Dispatched, RequestOptions};
pub use orchestrator::{RunCoordinator, RunReport, RunState};
pub use processor::{AnalysisProcessor, FileFindings, IssueCollector};
