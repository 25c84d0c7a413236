//! Dispatch observer trait

use crate::{AssociationValue, DispatchContext, DispatchFailure, MethodId, SagaId};

/// Observer trait for external observability
pub trait DispatchObserver: Send + Sync + 'static {
    fn on_dispatch_started(&self, context: &DispatchContext);
    fn on_saga_created(&self, context: &DispatchContext, saga_type: &str, saga_id: &SagaId, association: &AssociationValue);
    fn on_handler_invoked(&self, context: &DispatchContext, saga_id: &SagaId, method: &MethodId);
    fn on_association_added(&self, context: &DispatchContext, saga_id: &SagaId, association: &AssociationValue);
    fn on_association_removed(&self, context: &DispatchContext, saga_id: &SagaId, association: &AssociationValue);
    fn on_saga_ended(&self, context: &DispatchContext, saga_type: &str, saga_id: &SagaId);
    fn on_stale_identifier(&self, context: &DispatchContext, saga_type: &str, saga_id: &SagaId);
    fn on_failure(&self, context: &DispatchContext, failure: &DispatchFailure);
    fn on_dispatch_completed(&self, context: &DispatchContext, invocations: usize, failures: usize);
}

/// No-op observer
pub struct NoOpObserver;

impl DispatchObserver for NoOpObserver {
    fn on_dispatch_started(&self, _context: &DispatchContext) {}
    fn on_saga_created(&self, _context: &DispatchContext, _saga_type: &str, _saga_id: &SagaId, _association: &AssociationValue) {}
    fn on_handler_invoked(&self, _context: &DispatchContext, _saga_id: &SagaId, _method: &MethodId) {}
    fn on_association_added(&self, _context: &DispatchContext, _saga_id: &SagaId, _association: &AssociationValue) {}
    fn on_association_removed(&self, _context: &DispatchContext, _saga_id: &SagaId, _association: &AssociationValue) {}
    fn on_saga_ended(&self, _context: &DispatchContext, _saga_type: &str, _saga_id: &SagaId) {}
    fn on_stale_identifier(&self, _context: &DispatchContext, _saga_type: &str, _saga_id: &SagaId) {}
    fn on_failure(&self, _context: &DispatchContext, _failure: &DispatchFailure) {}
    fn on_dispatch_completed(&self, _context: &DispatchContext, _invocations: usize, _failures: usize) {}
}

/// Tracing-based observer
pub struct TracingObserver;

impl DispatchObserver for TracingObserver {
    fn on_dispatch_started(&self, context: &DispatchContext) {
        tracing::debug!(dispatch_id = context.dispatch_id, event_type = %context.event_type, "Dispatch started");
    }

    fn on_saga_created(&self, context: &DispatchContext, saga_type: &str, saga_id: &SagaId, association: &AssociationValue) {
        tracing::info!(dispatch_id = context.dispatch_id, saga_type = %saga_type, saga_id = %saga_id, association = %association, "Saga started");
    }

    fn on_handler_invoked(&self, context: &DispatchContext, saga_id: &SagaId, method: &MethodId) {
        tracing::info!(dispatch_id = context.dispatch_id, saga_id = %saga_id, method = %method, "Handler invoked");
    }

    fn on_association_added(&self, context: &DispatchContext, saga_id: &SagaId, association: &AssociationValue) {
        tracing::debug!(dispatch_id = context.dispatch_id, saga_id = %saga_id, association = %association, "Association added");
    }

    fn on_association_removed(&self, context: &DispatchContext, saga_id: &SagaId, association: &AssociationValue) {
        tracing::debug!(dispatch_id = context.dispatch_id, saga_id = %saga_id, association = %association, "Association removed");
    }

    fn on_saga_ended(&self, context: &DispatchContext, saga_type: &str, saga_id: &SagaId) {
        tracing::info!(dispatch_id = context.dispatch_id, saga_type = %saga_type, saga_id = %saga_id, "Saga ended");
    }

    fn on_stale_identifier(&self, context: &DispatchContext, saga_type: &str, saga_id: &SagaId) {
        tracing::warn!(dispatch_id = context.dispatch_id, saga_type = %saga_type, saga_id = %saga_id, "Stale saga identifier skipped");
    }

    fn on_failure(&self, context: &DispatchContext, failure: &DispatchFailure) {
        if failure.is_handler_failure() {
            tracing::error!(dispatch_id = context.dispatch_id, saga_type = %failure.saga_type, method = %failure.method, error = %failure.kind, "Handler failed");
        } else {
            tracing::warn!(dispatch_id = context.dispatch_id, saga_type = %failure.saga_type, method = %failure.method, error = %failure.kind, "Handler skipped");
        }
    }

    fn on_dispatch_completed(&self, context: &DispatchContext, invocations: usize, failures: usize) {
        tracing::debug!(dispatch_id = context.dispatch_id, invocations, failures, duration_ms = context.elapsed_millis(), "Dispatch completed");
    }
}
