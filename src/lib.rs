#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # CivInsight Core
//!
//! Asynchronous analysis orchestration for civic issue reports.
//!
//! ## Overview
//!
//! Each report (free text plus optional media) is enriched with machine-derived
//! classification, captioning, object detection and a severity/confidence verdict.
//! The core decides which analysis pipelines apply, runs them concurrently against
//! independent remote inference capabilities, tolerates partial failure, aggregates
//! the results and drives the report through its lifecycle exactly once per attempt.
//!
//! ## Module Organization
//!
//! - [`capability`] - Inference capability seam and the HTTP transport
//! - [`orchestration`] - Retry, fan-out, aggregation, lifecycle control and dispatch
//! - [`state_machine`] - Report states, events and persisted transitions
//! - [`persistence`] - Report repository trait with in-memory and PostgreSQL stores
//! - [`models`] - Reports, jobs, pipeline results and verdicts
//! - [`config`] - Layered configuration (defaults, TOML, environment)
//! - [`logging`] - Structured logging setup and helpers
//! - [`error`] - Crate-wide error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use civinsight_core::capability::HttpCapabilityClient;
//! use civinsight_core::config::ConfigManager;
//! use civinsight_core::orchestration::ReportLifecycleController;
//! use civinsight_core::persistence::InMemoryReportRepository;
//! use civinsight_core::models::Report;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//!
//! let repository = Arc::new(InMemoryReportRepository::new());
//! let client = Arc::new(HttpCapabilityClient::from_config(config)?);
//! let controller = ReportLifecycleController::from_config(config, repository.clone(), client);
//!
//! let report = Report::with_text("Large pothole on Main St");
//! repository.insert(report.clone());
//!
//! let outcome = controller.process(report.id).await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod capability;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod state_machine;

pub use capability::{Capability, CapabilityClient, CapabilityError, HttpCapabilityClient};
pub use config::{CivInsightConfig, ConfigManager};
pub use constants::events as system_events;
pub use error::{CivInsightError, Result};
pub use models::{PipelineResult, ProcessingJob, Report, Verdict};
pub use orchestration::{
    DispatchQueue, DispatchWorkerPool, FanOutExecutor, ProcessOutcome, ReportLifecycleController,
    ResultAggregator, RetryPolicy,
};
pub use persistence::{InMemoryReportRepository, ReportRepository};
pub use state_machine::{ReportEvent, ReportState, ReportStateMachine};
