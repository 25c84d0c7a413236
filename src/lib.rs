//! Association-Based Saga Event Routing
//!
//! Routes inbound domain events to long-lived saga instances. Each saga type
//! registers handler descriptors; each descriptor reads one association value
//! off the event and either starts a new saga instance or is invoked on every
//! active instance associated with that value.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! // 1. Describe the handlers of a saga type
//! let on_from = HandlerDescriptor::<TransferSaga>::builder("TransferSaga", "on_initiate_from")
//!     .event_type("TransferInitiated")
//!     .associate_on("accountId", "from")
//!     .start_saga(CreationPolicy::Always)
//!     .handle_typed(|saga, event: &TransferInitiated, effects| { /* ... */ Ok(()) })
//!     .build();
//!
//! // 2. Register them with a manager backed by a repository
//! let mut manager = SagaManager::new(repository, SagaManagerConfig::default());
//! manager.register("TransferSaga", vec![on_from, on_to, on_settled])?;
//!
//! // 3. Dispatch events
//! let report = manager.handle(&event)?;
//! ```
//!
//! Handler identity is the [`MethodId`]. Dispatch order comes from
//! [`ordering`] and never decides whether two handlers are the same.

#![warn(missing_docs)]

// === Core Types ===
mod association;
mod context;
mod errors;
mod events;
mod state;

// === Handlers ===
mod handler;
pub mod ordering;
mod registry;
mod traits;

// === Storage ===
mod repository;

// === Dispatch ===
mod config;
mod manager;

// === Observability ===
mod observer;
mod stats;

// === Re-exports ===

// Types
pub use association::{AssociationSet, AssociationValue};
pub use context::{DispatchContext, SagaId};
pub use events::{downcast_event, AsAny, Event};

// State
pub use state::{AssociationDelta, SagaEffects, SagaInstance, SagaLifecycle};

// Errors
pub use errors::{
    DispatchFailure, ExtractionError, FailureKind, HandlerError, LifecycleError,
    RegistrationError, RepositoryError, SagaError,
};

// Handlers
pub use handler::{
    extract, AssociationResolver, CreationPolicy, HandlerDescriptor, HandlerDescriptorBuilder,
    HandlerFn, MethodId,
};
pub use ordering::HandlerRank;
pub use registry::HandlerRegistry;
pub use traits::SagaState;

// Storage
pub use repository::{InMemorySagaRepository, SagaRepository};

// Dispatch
pub use config::SagaManagerConfig;
pub use manager::{DispatchReport, Invocation, SagaManager};

// Observability
pub use observer::{DispatchObserver, NoOpObserver, TracingObserver};
pub use stats::{ManagerStats, ManagerStatsSnapshot};
