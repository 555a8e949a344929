//! # Analysis Orchestration
//!
//! Asynchronous orchestration of report analysis, leaf-first:
//!
//! - **RetryPolicy**: bounded exponential backoff for transient capability failures
//! - **Pipeline selection**: which capabilities apply to a report's inputs
//! - **FanOutExecutor**: concurrent pipelines under a global bound and an overall deadline
//! - **ResultAggregator**: partial results to a single verdict
//! - **ReportLifecycleController**: single-flight processing attempts driving the
//!   report state machine
//! - **DispatchQueue** / **DispatchWorkerPool**: at-least-once delivery of processing jobs
//!
//! ## Flow
//!
//! ```text
//! enqueue(report_id) → worker → process(report_id)
//!     single-flight claim → PENDING/FAILED/PROCESSED → PROCESSING
//!     select → fan out (retry + timeout per pipeline) → aggregate
//!     → PROCESSED | FAILED, claim released
//! ```

pub mod dispatch_queue;
pub mod errors;
pub mod fan_out_executor;
pub mod lifecycle_controller;
pub mod pipeline_selector;
pub mod result_aggregator;
pub mod retry_policy;
pub mod single_flight;
pub mod worker_pool;

pub use dispatch_queue::{
    DispatchError, DispatchQueue, DispatchReceiver, DispatchStats, DispatchStatsSnapshot,
};
pub use errors::{LifecycleError, LifecycleResult};
pub use fan_out_executor::FanOutExecutor;
pub use lifecycle_controller::{
    ProcessOutcome, ReportLifecycleController, ReportProcessor, SkipReason,
};
pub use pipeline_selector::{select_for_inputs, select_pipelines};
pub use result_aggregator::ResultAggregator;
pub use retry_policy::{RetryPolicy, Retryable};
pub use single_flight::{FlightGuard, SingleFlight};
pub use worker_pool::DispatchWorkerPool;
