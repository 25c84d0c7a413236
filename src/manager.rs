//! Saga manager: registration and event dispatch
//!
//! For every registered saga type, the manager resolves the handlers bound
//! to the event, extracts each handler's association value, and then either
//! starts a new instance or invokes the handler on every active instance the
//! repository associates with that value.
//!
//! Each handler and each matched instance is processed independently. A
//! failure is recorded in the [`DispatchReport`] and dispatch moves on.

use crate::stats::ManagerStats;
use crate::{
    AssociationDelta, AssociationValue, CreationPolicy, DispatchContext, DispatchFailure,
    DispatchObserver, Event, FailureKind, HandlerDescriptor, HandlerRegistry, ManagerStatsSnapshot,
    MethodId, RegistrationError, SagaEffects, SagaError, SagaId, SagaInstance, SagaManagerConfig,
    SagaRepository, SagaState,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// One successful handler invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Saga type
    pub saga_type: Box<str>,
    /// Instance the handler ran on
    pub saga_id: SagaId,
    /// Handler
    pub method: MethodId,
}

/// Outcome of one `handle` call
#[derive(Clone, Debug, Default)]
pub struct DispatchReport {
    /// Instances started by this event
    pub created: Vec<SagaId>,
    /// Every successful invocation, in dispatch order
    pub invocations: Vec<Invocation>,
    /// Instances that ended while handling this event
    pub ended: Vec<SagaId>,
    /// Handlers or instances that contributed nothing, and why
    pub failures: Vec<DispatchFailure>,
}

impl DispatchReport {
    /// Check if at least one handler ran
    pub fn is_handled(&self) -> bool {
        !self.invocations.is_empty()
    }

    /// Check if any handler itself failed
    pub fn has_handler_failures(&self) -> bool {
        self.failures.iter().any(DispatchFailure::is_handler_failure)
    }
}

/// Mutable state of one dispatch, shared by every saga type it visits
struct DispatchRun<'a> {
    repository: &'a dyn SagaRepository,
    observer: &'a dyn DispatchObserver,
    stats: &'a ManagerStats,
    context: DispatchContext,
    created: HashSet<SagaId>,
    report: DispatchReport,
}

impl DispatchRun<'_> {
    fn fail(
        &mut self,
        saga_type: &str,
        method: &MethodId,
        saga_id: Option<SagaId>,
        kind: FailureKind,
    ) {
        match &kind {
            FailureKind::Extraction(_) => ManagerStats::incr(&self.stats.extraction_failures),
            FailureKind::Handler(_) => ManagerStats::incr(&self.stats.handler_failures),
            _ => {}
        }
        let failure = DispatchFailure {
            saga_type: saga_type.into(),
            method: method.clone(),
            saga_id,
            kind,
        };
        self.observer.on_failure(&self.context, &failure);
        self.report.failures.push(failure);
    }

    fn invoked(&mut self, saga_type: &str, saga_id: &SagaId, method: &MethodId) {
        ManagerStats::incr(&self.stats.handlers_invoked);
        self.observer.on_handler_invoked(&self.context, saga_id, method);
        self.report.invocations.push(Invocation {
            saga_type: saga_type.into(),
            saga_id: saga_id.clone(),
            method: method.clone(),
        });
    }

    fn applied(&mut self, saga_type: &str, saga_id: &SagaId, delta: &AssociationDelta) {
        for value in &delta.added {
            self.observer.on_association_added(&self.context, saga_id, value);
        }
        for value in &delta.removed {
            self.observer.on_association_removed(&self.context, saga_id, value);
        }
        if delta.ended {
            ManagerStats::incr(&self.stats.sagas_ended);
            self.observer.on_saga_ended(&self.context, saga_type, saga_id);
            self.report.ended.push(saga_id.clone());
        }
    }
}

/// Type-erased dispatch entry for one registered saga type
trait SagaTypeDispatch: Send + Sync {
    fn saga_type(&self) -> &str;

    fn handler_count(&self) -> usize;

    /// Returns `true` if any handler of this saga type matched the event
    fn dispatch(&self, event: &dyn Event, run: &mut DispatchRun<'_>) -> bool;
}

struct TypedSagaDispatch<S> {
    registry: HandlerRegistry<S>,
}

impl<S: SagaState> SagaTypeDispatch for TypedSagaDispatch<S> {
    fn saga_type(&self) -> &str {
        self.registry.saga_type()
    }

    fn handler_count(&self) -> usize {
        self.registry.descriptors().len()
    }

    fn dispatch(&self, event: &dyn Event, run: &mut DispatchRun<'_>) -> bool {
        let candidates = self.registry.resolve(event);
        if candidates.is_empty() {
            return false;
        }
        tracing::trace!(
            saga_type = %self.saga_type(),
            candidates = candidates.len(),
            "Resolved handler candidates"
        );

        for descriptor in candidates {
            self.dispatch_descriptor(descriptor, event, run);
        }
        true
    }
}

impl<S: SagaState> TypedSagaDispatch<S> {
    fn dispatch_descriptor(
        &self,
        descriptor: &HandlerDescriptor<S>,
        event: &dyn Event,
        run: &mut DispatchRun<'_>,
    ) {
        let saga_type = self.saga_type();
        let association = match descriptor.extract(event) {
            Ok(value) => value,
            Err(error) => {
                run.fail(saga_type, descriptor.method_id(), None, error.into());
                return;
            }
        };

        if descriptor.creation_policy() == CreationPolicy::Always {
            self.start_saga(descriptor, event, association, run);
            return;
        }

        let ids = match run.repository.find(saga_type, &association) {
            Ok(ids) => ids,
            Err(error) => {
                run.fail(saga_type, descriptor.method_id(), None, error.into());
                return;
            }
        };

        // stale and ended identifiers do not count as found
        if self.invoke_existing(descriptor, event, ids, run) {
            return;
        }
        if descriptor.creation_policy() == CreationPolicy::IfNoneFound {
            self.start_saga(descriptor, event, association, run);
        } else {
            tracing::debug!(
                saga_type = %saga_type,
                method = %descriptor.method_id(),
                association = %association,
                "No saga associated with event"
            );
        }
    }

    /// `(none) -> Active`. The instance is only persisted once the start
    /// handler has succeeded.
    fn start_saga(
        &self,
        descriptor: &HandlerDescriptor<S>,
        event: &dyn Event,
        association: AssociationValue,
        run: &mut DispatchRun<'_>,
    ) {
        let saga_type = self.saga_type();
        let method = descriptor.method_id();
        let saga_id = SagaId::generate();

        let mut state = S::default();
        let mut effects = SagaEffects::new(saga_id.clone());
        if let Err(error) = descriptor.invoke(&mut state, event, &mut effects) {
            run.fail(saga_type, method, Some(saga_id), error.into());
            return;
        }

        let serialized = match serde_json::to_value(&state) {
            Ok(value) => value,
            Err(error) => {
                run.fail(saga_type, method, Some(saga_id), state_failure(error));
                return;
            }
        };

        let mut instance =
            SagaInstance::start(saga_id.clone(), saga_type, association.clone(), serialized);
        let delta = match instance.apply(effects) {
            Ok(delta) => delta,
            Err(error) => {
                run.fail(saga_type, method, Some(saga_id), error.into());
                return;
            }
        };

        // An instance ended by its own start handler is never stored.
        if !delta.ended {
            if let Err(error) = run.repository.save(&instance) {
                run.fail(saga_type, method, Some(saga_id), error.into());
                return;
            }
        }

        ManagerStats::incr(&run.stats.sagas_created);
        run.observer.on_saga_created(&run.context, saga_type, &saga_id, &association);
        run.created.insert(saga_id.clone());
        run.report.created.push(saga_id.clone());
        run.invoked(saga_type, &saga_id, method);
        run.applied(saga_type, &saga_id, &delta);
    }

    /// `Active -> Active | Ended` on every matched instance.
    ///
    /// Returns `true` if at least one live instance was found, whether or
    /// not its invocation succeeded. Instances started earlier in this
    /// dispatch, or that failed to load, count as found.
    fn invoke_existing(
        &self,
        descriptor: &HandlerDescriptor<S>,
        event: &dyn Event,
        ids: BTreeSet<SagaId>,
        run: &mut DispatchRun<'_>,
    ) -> bool {
        let saga_type = self.saga_type();
        let method = descriptor.method_id();
        let mut found = false;

        for saga_id in ids {
            // started by this same event; it already saw it
            if run.created.contains(&saga_id) {
                found = true;
                continue;
            }

            let mut instance = match run.repository.load(&saga_id) {
                Ok(instance) => instance,
                Err(error) if error.is_not_found() => {
                    ManagerStats::incr(&run.stats.stale_identifiers);
                    run.observer.on_stale_identifier(&run.context, saga_type, &saga_id);
                    continue;
                }
                Err(error) => {
                    // the instance may still exist
                    found = true;
                    run.fail(saga_type, method, Some(saga_id), error.into());
                    continue;
                }
            };
            if !instance.is_active() {
                tracing::trace!(saga_id = %saga_id, "Skipping ended saga");
                continue;
            }
            found = true;

            let mut state: S = match serde_json::from_value(instance.state().clone()) {
                Ok(state) => state,
                Err(error) => {
                    run.fail(saga_type, method, Some(saga_id), state_failure(error));
                    continue;
                }
            };

            let mut effects = SagaEffects::new(saga_id.clone());
            if let Err(error) = descriptor.invoke(&mut state, event, &mut effects) {
                run.fail(saga_type, method, Some(saga_id), error.into());
                continue;
            }

            match serde_json::to_value(&state) {
                Ok(value) => instance.set_state(value),
                Err(error) => {
                    run.fail(saga_type, method, Some(saga_id), state_failure(error));
                    continue;
                }
            }

            let delta = match instance.apply(effects) {
                Ok(delta) => delta,
                Err(error) => {
                    run.fail(saga_type, method, Some(saga_id), error.into());
                    continue;
                }
            };

            let persisted = if delta.ended {
                run.repository.remove(&saga_id)
            } else {
                run.repository.save(&instance)
            };
            if let Err(error) = persisted {
                run.fail(saga_type, method, Some(saga_id), error.into());
                continue;
            }

            run.invoked(saga_type, &saga_id, method);
            run.applied(saga_type, &saga_id, &delta);
        }
        found
    }
}

fn state_failure(error: serde_json::Error) -> FailureKind {
    FailureKind::State(error.to_string().into())
}

/// Routes events to saga instances.
///
/// # Example
///
/// ```rust
/// use saga_router::{
///     CreationPolicy, Event, HandlerDescriptor, InMemorySagaRepository, SagaManager,
///     SagaManagerConfig,
/// };
/// use std::sync::Arc;
///
/// struct Initiate {
///     from: String,
///     to: String,
/// }
///
/// impl Event for Initiate {
///     fn event_type(&self) -> &'static str {
///         "Initiate"
///     }
///
///     fn property(&self, name: &str) -> Option<String> {
///         match name {
///             "from" => Some(self.from.clone()),
///             "to" => Some(self.to.clone()),
///             _ => None,
///         }
///     }
/// }
///
/// let repository = Arc::new(InMemorySagaRepository::new());
/// let mut manager = SagaManager::new(repository.clone(), SagaManagerConfig::default());
///
/// let handlers = ["from", "to"].map(|property| {
///     HandlerDescriptor::<()>::builder("TransferSaga", format!("on_initiate_{property}"))
///         .event_type("Initiate")
///         .associate_on("myIdentifier", property)
///         .start_saga(CreationPolicy::Always)
///         .build()
/// });
/// manager.register("TransferSaga", handlers.to_vec()).unwrap();
///
/// let report = manager
///     .handle(&Initiate { from: "from123".into(), to: "to123".into() })
///     .unwrap();
/// assert_eq!(report.created.len(), 2);
/// ```
pub struct SagaManager {
    repository: Arc<dyn SagaRepository>,
    config: SagaManagerConfig,
    stats: ManagerStats,
    sagas: Vec<Box<dyn SagaTypeDispatch>>,
}

impl SagaManager {
    /// Create a manager with no saga types registered
    pub fn new(repository: Arc<dyn SagaRepository>, config: SagaManagerConfig) -> Self {
        Self {
            repository,
            config,
            stats: ManagerStats::new(),
            sagas: Vec::new(),
        }
    }

    /// Register a saga type with its handlers. Fails before any dispatch on
    /// malformed or duplicate handlers.
    pub fn register<S: SagaState>(
        &mut self,
        saga_type: impl Into<Box<str>>,
        descriptors: Vec<HandlerDescriptor<S>>,
    ) -> Result<(), RegistrationError> {
        let registry = HandlerRegistry::new(saga_type, descriptors)?;
        if self
            .sagas
            .iter()
            .any(|s| s.saga_type() == registry.saga_type())
        {
            return Err(RegistrationError::DuplicateSagaType(registry.saga_type().into()));
        }

        tracing::info!(
            saga_type = %registry.saga_type(),
            handlers = registry.descriptors().len(),
            "Saga type registered"
        );
        self.sagas.push(Box::new(TypedSagaDispatch { registry }));
        Ok(())
    }

    /// Registered saga types with their handler counts, in registration order
    pub fn registered_saga_types(&self) -> Vec<(&str, usize)> {
        self.sagas
            .iter()
            .map(|s| (s.saga_type(), s.handler_count()))
            .collect()
    }

    /// Dispatch `event` to every interested saga type and instance.
    ///
    /// Always runs to completion. With `suppress_handler_errors` disabled,
    /// returns `SagaError::Dispatch` afterwards if any handler failed.
    pub fn handle(&self, event: &dyn Event) -> Result<DispatchReport, SagaError> {
        let mut run = DispatchRun {
            repository: self.repository.as_ref(),
            observer: self.config.observer.as_ref(),
            stats: &self.stats,
            context: DispatchContext::begin(event.event_type()),
            created: HashSet::new(),
            report: DispatchReport::default(),
        };
        ManagerStats::incr(&self.stats.events_received);
        run.observer.on_dispatch_started(&run.context);

        let mut relevant = false;
        for saga in &self.sagas {
            relevant |= saga.dispatch(event, &mut run);
        }
        if relevant {
            ManagerStats::incr(&self.stats.events_relevant);
        }

        run.observer.on_dispatch_completed(
            &run.context,
            run.report.invocations.len(),
            run.report.failures.len(),
        );

        let report = run.report;
        if !self.config.suppress_handler_errors && report.has_handler_failures() {
            return Err(SagaError::Dispatch {
                failures: report.failures,
            });
        }
        Ok(report)
    }

    /// Snapshot of the dispatch counters
    pub fn stats(&self) -> ManagerStatsSnapshot {
        self.stats.snapshot()
    }

    /// The repository collaborator
    pub fn repository(&self) -> &Arc<dyn SagaRepository> {
        &self.repository
    }
}

impl std::fmt::Debug for SagaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaManager")
            .field("saga_types", &self.registered_saga_types())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
