//! # Data Models
//!
//! Reports and the values that flow through one processing attempt.
//!
//! - [`Report`] - the civic issue report and its analysis fields
//! - [`ProcessingJob`] - a "process report R" delivery
//! - [`PipelineResult`] - outcome of one pipeline within one attempt (never persisted as-is)
//! - [`Verdict`] - aggregated outcome of one attempt
//! - [`ReportTransition`] - audit trail of report state changes

pub mod pipeline_result;
pub mod processing_job;
pub mod report;
pub mod report_transition;
pub mod verdict;

pub use pipeline_result::{FailureReason, PipelineOutcome, PipelineResult};
pub use processing_job::ProcessingJob;
pub use report::Report;
pub use report_transition::{NewReportTransition, ReportTransition};
pub use verdict::Verdict;
