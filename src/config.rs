//! Saga manager configuration

use crate::{DispatchObserver, NoOpObserver};
use std::sync::Arc;

/// Configuration for [`SagaManager`](crate::SagaManager)
#[derive(Clone)]
pub struct SagaManagerConfig {
    /// When `false`, `handle` returns `SagaError::Dispatch` if any handler
    /// failed. Dispatch to the remaining instances still runs to completion.
    pub suppress_handler_errors: bool,
    /// Receives dispatch notifications
    pub observer: Arc<dyn DispatchObserver>,
}

impl Default for SagaManagerConfig {
    fn default() -> Self {
        Self {
            suppress_handler_errors: true,
            observer: Arc::new(NoOpObserver),
        }
    }
}

impl SagaManagerConfig {
    /// Set whether handler failures are only reported, not returned
    pub fn with_suppress_handler_errors(mut self, suppress: bool) -> Self {
        self.suppress_handler_errors = suppress;
        self
    }

    /// Set the dispatch observer
    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = observer;
        self
    }
}

impl std::fmt::Debug for SagaManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaManagerConfig")
            .field("suppress_handler_errors", &self.suppress_handler_errors)
            .finish_non_exhaustive()
    }
}
