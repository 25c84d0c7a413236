//! Saga identity and dispatch correlation types

use serde::{Deserialize, Serialize};

/// Globally unique identifier of a saga instance
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SagaId(Box<str>);

impl SagaId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<Box<str>>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string().into_boxed_str())
    }

    /// Get the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SagaId({})", self.0)
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation context for one `handle` call, passed to observers
#[derive(Clone)]
pub struct DispatchContext {
    /// Process-unique sequence number of this dispatch
    pub dispatch_id: u64,
    /// Runtime type of the dispatched event
    pub event_type: &'static str,
    /// When dispatch started (millis since UNIX epoch)
    pub started_at_millis: u64,
}

impl DispatchContext {
    pub(crate) fn begin(event_type: &'static str) -> Self {
        Self {
            dispatch_id: Self::next_dispatch_id(),
            event_type,
            started_at_millis: Self::now_millis(),
        }
    }

    /// Get current time in milliseconds since UNIX epoch
    pub fn now_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Millis elapsed since dispatch started
    pub fn elapsed_millis(&self) -> u64 {
        Self::now_millis().saturating_sub(self.started_at_millis)
    }

    fn next_dispatch_id() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("dispatch_id", &self.dispatch_id)
            .field("event_type", &self.event_type)
            .finish()
    }
}
