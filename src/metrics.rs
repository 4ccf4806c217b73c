#![forbid(unsafe_code)]

use crate::telemetry::{runtime_counters, RuntimeCounters};
use std::sync::OnceLock;

pub use crate::telemetry::RuntimeCountersSnapshot;

/// Collector that wraps the runtime counter APIs with a single entrypoint.
pub struct MetricsCollector {
    counters: &'static RuntimeCounters,
}

impl MetricsCollector {
    fn new() -> Self {
        Self {
            counters: runtime_counters(),
        }
    }

    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        self.counters.snapshot()
    }

    pub fn record_message_received(&self) {
        self.counters.inc_messages_received();
    }

    pub fn record_message_accepted(&self) {
        self.counters.inc_messages_accepted();
    }

    pub fn record_message_rejected(&self) {
        self.counters.inc_messages_rejected();
    }

    pub fn record_duplicate(&self) {
        self.counters.inc_duplicates_detected();
    }

    pub fn record_disposal_run(&self, purged: usize) {
        self.counters.record_disposal_run(purged);
    }

    pub fn record_security_verification(&self) {
        self.counters.inc_security_verifications();
    }
}

/// Returns the shared `MetricsCollector` instance.
pub fn counters() -> &'static MetricsCollector {
    MetricsCollector::global()
}
