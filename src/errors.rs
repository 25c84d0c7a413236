//! Error types for registration, routing and handler invocation

use crate::{MethodId, SagaId};

/// Association value could not be read off an event
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    /// The configured property is absent or null on the event
    #[error("property `{property}` missing on event {event_type}")]
    MissingProperty {
        /// Runtime type of the event
        event_type: &'static str,
        /// Configured property path
        property: Box<str>,
    },
    /// A custom resolver yielded no value
    #[error("custom resolver for key `{key}` produced no value on event {event_type}")]
    Unresolved {
        /// Runtime type of the event
        event_type: &'static str,
        /// Association key of the descriptor
        key: Box<str>,
    },
}

/// Failure reported by the repository collaborator
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// Identifier is unknown or was pruned
    #[error("saga not found: {0}")]
    NotFound(SagaId),
    /// Backend failure
    #[error("storage error: {0}")]
    Storage(Box<str>),
}

impl RepositoryError {
    /// Check if this error means "no such instance"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Error raised by a saga handler
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct HandlerError {
    /// Error description
    pub reason: Box<str>,
}

impl HandlerError {
    /// Create a handler error
    pub fn new(reason: impl Into<Box<str>>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Malformed handler registration
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// Saga type name is empty
    #[error("saga type name must not be empty")]
    EmptySagaType,
    /// Saga type is already registered on this manager
    #[error("saga type `{0}` is already registered")]
    DuplicateSagaType(Box<str>),
    /// Two descriptors share a method identity
    #[error("duplicate handler `{method}` on saga type `{saga_type}`")]
    DuplicateMethod {
        /// Saga type
        saga_type: Box<str>,
        /// Offending method identity
        method: MethodId,
    },
    /// A descriptor field is empty
    #[error("handler `{method}` on saga type `{saga_type}` has an empty {field}")]
    EmptyField {
        /// Saga type
        saga_type: Box<str>,
        /// Method identity (may itself be empty)
        method: MethodId,
        /// Name of the empty field
        field: &'static str,
    },
    /// Descriptor was built for another saga type
    #[error("handler `{method}` belongs to saga type `{found}`, not `{expected}`")]
    SagaTypeMismatch {
        /// Registry saga type
        expected: Box<str>,
        /// Descriptor saga type
        found: Box<str>,
        /// Method identity
        method: MethodId,
    },
}

/// Invalid lifecycle transition
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// No transition leaves the ended state
    #[error("saga {0} has already ended")]
    AlreadyEnded(SagaId),
}

/// Why one descriptor or instance contributed nothing to a dispatch
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FailureKind {
    /// Association value could not be extracted
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// The handler itself failed
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),
    /// Repository call failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    /// Saga state could not be (de)serialized
    #[error("state serialization failed: {0}")]
    State(Box<str>),
    /// Effects could not be applied
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// One failed contribution to a dispatch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchFailure {
    /// Saga type being dispatched
    pub saga_type: Box<str>,
    /// Handler that was being processed
    pub method: MethodId,
    /// Instance, when the failure concerns one
    pub saga_id: Option<SagaId>,
    /// Cause
    pub kind: FailureKind,
}

impl std::fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.saga_type, self.method)?;
        if let Some(id) = &self.saga_id {
            write!(f, " on {}", id)?;
        }
        write!(f, ": {}", self.kind)
    }
}

impl std::error::Error for DispatchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl DispatchFailure {
    /// Check if the handler itself raised the failure
    pub fn is_handler_failure(&self) -> bool {
        matches!(self.kind, FailureKind::Handler(_))
    }
}

/// Top-level error returned by the manager
#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    /// Rejected registration
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    /// Handlers failed while error suppression was disabled
    #[error("{} handler invocation(s) failed", .failures.len())]
    Dispatch {
        /// Every failure recorded during the dispatch
        failures: Vec<DispatchFailure>,
    },
}
