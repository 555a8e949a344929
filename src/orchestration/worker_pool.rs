//! # Dispatch Worker Pool
//!
//! A fixed number of workers share the dispatch receiver. Each worker runs one job's
//! processing attempt to completion before taking the next. A job whose processing
//! returns an error is redelivered after an exponential delay until it has been
//! delivered `max_deliveries` times.
//!
//! Shutdown is cooperative: idle workers stop immediately, busy workers finish their
//! current job first.

use super::dispatch_queue::{DispatchQueue, DispatchReceiver, DispatchStats};
use super::fan_out_executor::panic_message;
use super::lifecycle_controller::{ProcessOutcome, ReportProcessor};
use super::retry_policy::RetryPolicy;
use crate::config::DispatchConfig;
use crate::logging::log_error;
use crate::models::ProcessingJob;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct DispatchWorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    stats: Arc<DispatchStats>,
}

impl DispatchWorkerPool {
    /// Spawn `config.worker_count` workers draining `receiver`
    pub fn start(
        config: &DispatchConfig,
        queue: DispatchQueue,
        receiver: DispatchReceiver,
        processor: Arc<dyn ReportProcessor>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let receiver = Arc::new(Mutex::new(receiver));
        let redelivery = RetryPolicy::new(
            config.max_deliveries,
            config.redelivery_base_delay(),
            config.redelivery_max_delay(),
        );
        let stats = queue.stats();
        let worker_count = config.worker_count.max(1);

        let workers = (0..worker_count)
            .map(|worker_id| {
                let worker = Worker {
                    worker_id,
                    receiver: Arc::clone(&receiver),
                    queue: queue.clone(),
                    processor: Arc::clone(&processor),
                    redelivery: redelivery.clone(),
                    shutdown_rx: shutdown_rx.clone(),
                    stats: Arc::clone(&stats),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(worker_count, "Dispatch worker pool started");
        Self {
            workers,
            shutdown_tx,
            stats,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// Signal shutdown and wait for every worker to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Dispatch worker ended abnormally");
            }
        }
        info!("Dispatch worker pool stopped");
    }
}

struct Worker {
    worker_id: usize,
    receiver: Arc<Mutex<DispatchReceiver>>,
    queue: DispatchQueue,
    processor: Arc<dyn ReportProcessor>,
    redelivery: RetryPolicy,
    shutdown_rx: watch::Receiver<bool>,
    stats: Arc<DispatchStats>,
}

async fn next_job(receiver: &Mutex<DispatchReceiver>) -> Option<ProcessingJob> {
    receiver.lock().await.recv().await
}

impl Worker {
    async fn run(mut self) {
        debug!(worker_id = self.worker_id, "Dispatch worker started");
        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }
            let job = tokio::select! {
                biased;
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                job = next_job(&self.receiver) => job,
            };
            let Some(job) = job else {
                break;
            };
            self.handle(job).await;
        }
        debug!(worker_id = self.worker_id, "Dispatch worker stopped");
    }

    async fn handle(&self, job: ProcessingJob) {
        let result = AssertUnwindSafe(self.processor.process(job.report_id))
            .catch_unwind()
            .await;

        let error = match result {
            Ok(Ok(ProcessOutcome::Processed(_))) => {
                self.stats.record_processed();
                return;
            }
            Ok(Ok(ProcessOutcome::Failed(_))) => {
                self.stats.record_failed();
                return;
            }
            Ok(Ok(ProcessOutcome::Skipped(_))) => {
                self.stats.record_skipped();
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("processor panicked: {}", panic_message(panic.as_ref())),
        };

        self.stats.record_error();
        if job.attempt_number >= self.redelivery.max_attempts() {
            self.stats.record_dropped();
            log_error(
                "dispatch_worker",
                "process",
                &error,
                Some(&format!(
                    "report {} dropped after {} deliveries",
                    job.report_id, job.attempt_number
                )),
            );
            return;
        }

        let delay = self.redelivery.delay_for_attempt(job.attempt_number);
        warn!(
            report_id = %job.report_id,
            delivery = job.attempt_number,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "Processing failed, scheduling redelivery"
        );
        let queue = self.queue.clone();
        let next = job.redelivery();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue.requeue(next).await {
                warn!(error = %e, "Redelivery dropped");
            }
        });
    }
}
