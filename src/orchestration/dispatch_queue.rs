//! # Dispatch Queue
//!
//! Decouples ingestion from processing. Jobs travel over a bounded in-process channel
//! and are delivered at least once: a job whose processing errors is put back with
//! its delivery number increased (see [`super::worker_pool`]). Duplicate jobs for the
//! same report are harmless because the lifecycle controller is single-flight, and
//! periodic sweeps use [`DispatchQueue::offer_batch`], which skips ids still waiting
//! in the queue and never blocks on a full one.

use crate::constants::events;
use crate::logging::log_report_operation;
use crate::models::ProcessingJob;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Dispatch queue is closed")]
    QueueClosed,

    #[error("Dispatch queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },
}

/// Running counters for a queue and the workers draining it
#[derive(Debug, Default)]
pub struct DispatchStats {
    enqueued: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    redelivered: AtomicU64,
    errors: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DispatchStatsSnapshot {
    pub enqueued: u64,
    /// Attempts that ended PROCESSED
    pub processed: u64,
    /// Attempts that ended FAILED
    pub failed: u64,
    pub skipped: u64,
    pub redelivered: u64,
    /// Deliveries whose processing returned an error
    pub errors: u64,
    /// Jobs abandoned after their last allowed delivery
    pub dropped: u64,
}

impl DispatchStats {
    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_redelivered(&self) {
        self.redelivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            redelivered: self.redelivered.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Sending half, cheap to clone
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    sender: mpsc::Sender<ProcessingJob>,
    capacity: usize,
    stats: Arc<DispatchStats>,
    pending: PendingJobs,
}

/// Receiving half, drained by a worker pool
#[derive(Debug)]
pub struct DispatchReceiver {
    receiver: mpsc::Receiver<ProcessingJob>,
    pending: PendingJobs,
}

impl DispatchReceiver {
    pub async fn recv(&mut self) -> Option<ProcessingJob> {
        let job = self.receiver.recv().await?;
        self.pending.release(job.report_id);
        Some(job)
    }
}

/// Jobs sitting in the channel, counted per report
#[derive(Debug, Clone, Default)]
struct PendingJobs(Arc<DashMap<Uuid, usize>>);

impl PendingJobs {
    fn hold(&self, report_id: Uuid) {
        *self.0.entry(report_id).or_insert(0) += 1;
    }

    fn release(&self, report_id: Uuid) {
        self.0.remove_if_mut(&report_id, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
    }

    fn contains(&self, report_id: Uuid) -> bool {
        self.0.contains_key(&report_id)
    }
}

impl DispatchQueue {
    pub fn new(capacity: usize) -> (Self, DispatchReceiver) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let pending = PendingJobs::default();
        let queue = Self {
            sender,
            capacity,
            stats: Arc::new(DispatchStats::default()),
            pending: pending.clone(),
        };
        (queue, DispatchReceiver { receiver, pending })
    }

    /// Queue a first delivery for `report_id`, waiting for room if the queue is full
    pub async fn enqueue(&self, report_id: Uuid) -> Result<ProcessingJob, DispatchError> {
        let job = ProcessingJob::new(report_id);
        self.pending.hold(report_id);
        if self.sender.send(job.clone()).await.is_err() {
            self.pending.release(report_id);
            return Err(DispatchError::QueueClosed);
        }
        self.stats.record_enqueued();
        log_report_operation(events::REPORT_ENQUEUED, report_id, "queued", Some(1), None);
        Ok(job)
    }

    /// Queue without waiting; fails with `QueueFull` instead of applying backpressure
    pub fn try_enqueue(&self, report_id: Uuid) -> Result<ProcessingJob, DispatchError> {
        let job = ProcessingJob::new(report_id);
        self.pending.hold(report_id);
        self.sender.try_send(job.clone()).map_err(|e| {
            self.pending.release(report_id);
            match e {
                TrySendError::Full(_) => DispatchError::QueueFull {
                    capacity: self.capacity,
                },
                TrySendError::Closed(_) => DispatchError::QueueClosed,
            }
        })?;
        self.stats.record_enqueued();
        log_report_operation(events::REPORT_ENQUEUED, report_id, "queued", Some(1), None);
        Ok(job)
    }

    /// Queue every id in order; stops at the first error
    pub async fn enqueue_batch<I>(&self, report_ids: I) -> Result<usize, DispatchError>
    where
        I: IntoIterator<Item = Uuid>,
    {
        let mut queued = 0;
        for report_id in report_ids {
            self.enqueue(report_id).await?;
            queued += 1;
        }
        Ok(queued)
    }

    /// Queue ids not already waiting, without blocking.
    ///
    /// Stops at the first full or closed queue; the rest are left for a later offer.
    /// Returns how many jobs were queued.
    pub fn offer_batch<I>(&self, report_ids: I) -> usize
    where
        I: IntoIterator<Item = Uuid>,
    {
        let mut queued = 0;
        for report_id in report_ids {
            if self.pending.contains(report_id) {
                continue;
            }
            match self.try_enqueue(report_id) {
                Ok(_) => queued += 1,
                Err(_) => break,
            }
        }
        queued
    }

    /// Whether a job for `report_id` is waiting for a worker
    pub fn is_queued(&self, report_id: Uuid) -> bool {
        self.pending.contains(report_id)
    }

    /// Put back a job for another delivery
    pub async fn requeue(&self, job: ProcessingJob) -> Result<(), DispatchError> {
        let report_id = job.report_id;
        self.pending.hold(report_id);
        if self.sender.send(job).await.is_err() {
            self.pending.release(report_id);
            return Err(DispatchError::QueueClosed);
        }
        self.stats.record_redelivered();
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs waiting for a worker
    pub fn len(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }
}
