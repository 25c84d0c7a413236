//! Saga manager statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-manager statistics
pub struct ManagerStats {
    pub events_received: AtomicU64,
    pub events_relevant: AtomicU64,
    pub sagas_created: AtomicU64,
    pub handlers_invoked: AtomicU64,
    pub handler_failures: AtomicU64,
    pub extraction_failures: AtomicU64,
    pub stale_identifiers: AtomicU64,
    pub sagas_ended: AtomicU64,
}

impl ManagerStats {
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            events_relevant: AtomicU64::new(0),
            sagas_created: AtomicU64::new(0),
            handlers_invoked: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            extraction_failures: AtomicU64::new(0),
            stale_identifiers: AtomicU64::new(0),
            sagas_ended: AtomicU64::new(0),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ManagerStatsSnapshot {
        ManagerStatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_relevant: self.events_relevant.load(Ordering::Relaxed),
            sagas_created: self.sagas_created.load(Ordering::Relaxed),
            handlers_invoked: self.handlers_invoked.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            stale_identifiers: self.stale_identifiers.load(Ordering::Relaxed),
            sagas_ended: self.sagas_ended.load(Ordering::Relaxed),
        }
    }
}

impl Default for ManagerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManagerStatsSnapshot {
    pub events_received: u64,
    pub events_relevant: u64,
    pub sagas_created: u64,
    pub handlers_invoked: u64,
    pub handler_failures: u64,
    pub extraction_failures: u64,
    pub stale_identifiers: u64,
    pub sagas_ended: u64,
}
