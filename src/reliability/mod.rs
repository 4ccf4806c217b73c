#![forbid(unsafe_code)]

//! Reception-awareness reliability: duplicate detection and the record
//! disposal job.
//!
//! The receiving side's whole obligation is to make retried sends safely
//! idempotent. Sender-side retry (count, interval) is policy read from the
//! PMode, not state kept here.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::metrics;
use crate::pmode::ReceptionAwareness;

/// Outcome of recording an inbound message id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicateCheck {
    New,
    Duplicate,
}

/// Concurrent message-id ledger with arrival timestamps.
#[derive(Debug, Default)]
pub struct DuplicateStore {
    records: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl DuplicateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-if-absent. A second arrival whose original record is still
    /// within `retention` is a duplicate; an expired record is replaced and
    /// the arrival counts as new.
    pub async fn record(
        &self,
        message_id: &str,
        retention: ChronoDuration,
    ) -> DuplicateCheck {
        let now = Utc::now();
        let mut records = self.records.write().await;
        match records.get(message_id) {
            Some(seen) if now.signed_duration_since(*seen) <= retention => {
                tracing::info!(
                    target: "msh::reliability",
                    event = "duplicate_detected",
                    message_id = message_id
                );
                metrics::counters().record_duplicate();
                DuplicateCheck::Duplicate
            }
            _ => {
                records.insert(message_id.to_string(), now);
                DuplicateCheck::New
            }
        }
    }

    /// Removes every record older than `retention`, returning the count.
    pub async fn purge_expired(&self, retention: ChronoDuration) -> usize {
        let cutoff = Utc::now() - retention;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, seen| *seen >= cutoff);
        before - records.len()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

/// Sender-side retry policy read from the PMode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    /// Extracts the retry policy when reception awareness enables retrying.
    pub fn from_reception_awareness(awareness: &ReceptionAwareness) -> Option<Self> {
        if !(awareness.enabled.is_required() && awareness.retry.is_required()) {
            return None;
        }
        Some(Self {
            max_retries: awareness.retry_count,
            interval: Duration::from_millis(awareness.retry_interval_ms),
        })
    }
}

/// Recurring purge of expired duplicate records.
///
/// `schedule` is idempotent; `shutdown` deterministically stops the task.
pub struct DisposalJob {
    store: Arc<DuplicateStore>,
    retention: ChronoDuration,
    interval: Duration,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DisposalJob {
    pub fn new(store: Arc<DuplicateStore>, retention_minutes: u64, interval: Duration) -> Self {
        Self {
            store,
            retention: ChronoDuration::minutes(retention_minutes as i64),
            interval,
            shutdown: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    pub async fn schedule(&self) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            tracing::debug!(
                target: "msh::reliability",
                event = "disposal_already_scheduled"
            );
            return;
        }

        let store = Arc::clone(&self.store);
        let retention = self.retention;
        let interval = self.interval;
        let shutdown = self.shutdown.clone();

        *handle = Some(tokio::spawn(async move {
            tracing::info!(
                target: "msh::reliability",
                event = "disposal_started",
                interval_secs = interval.as_secs()
            );
            while sleep_with_shutdown(interval, &shutdown).await {
                let purged = store.purge_expired(retention).await;
                metrics::counters().record_disposal_run(purged);
                tracing::info!(
                    target: "msh::reliability",
                    event = "disposal_run",
                    purged = purged
                );
            }
            tracing::info!(target: "msh::reliability", event = "disposal_stopped");
        }));
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut handle = self.handle.lock().await;
        if let Some(handle) = handle.take() {
            let _ = handle.await;
        }
    }

    /// One immediate purge pass, outside the schedule. Used by tests and
    /// management endpoints.
    pub async fn run_once(&self) -> usize {
        let purged = self.store.purge_expired(self.retention).await;
        metrics::counters().record_disposal_run(purged);
        purged
    }
}

/// Waits for the interval to elapse; returns `false` when shutdown was
/// requested first.
async fn sleep_with_shutdown(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
