//! Saga lifecycle driven by dispatch: associate, disassociate, end, and
//! failure isolation between instances and saga types.

use saga_router::{
    AssociationValue, CreationPolicy, DispatchContext, DispatchFailure, DispatchObserver,
    DispatchReport, Event, FailureKind, HandlerDescriptor, HandlerError, InMemorySagaRepository,
    MethodId, RegistrationError, RepositoryError, SagaError, SagaId, SagaInstance, SagaManager,
    SagaManagerConfig, SagaRepository,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const TRANSFER: &str = "TransferSaga";

// === Events ===

struct TransferInitiated {
    transfer_id: &'static str,
    from: &'static str,
}

struct AccountDebited {
    account: &'static str,
    amount: u64,
}

struct TransferCompleted {
    transfer_id: &'static str,
}

impl Event for TransferInitiated {
    fn event_type(&self) -> &'static str {
        "TransferInitiated"
    }

    fn supertypes(&self) -> &'static [&'static str] {
        &["TransferEvent"]
    }

    fn property(&self, name: &str) -> Option<String> {
        match name {
            "transferId" => Some(self.transfer_id.into()),
            "from" => Some(self.from.into()),
            _ => None,
        }
    }
}

impl Event for AccountDebited {
    fn event_type(&self) -> &'static str {
        "AccountDebited"
    }

    fn property(&self, name: &str) -> Option<String> {
        match name {
            "account" => Some(self.account.into()),
            "amount" => Some(self.amount.to_string()),
            _ => None,
        }
    }
}

impl Event for TransferCompleted {
    fn event_type(&self) -> &'static str {
        "TransferCompleted"
    }

    fn supertypes(&self) -> &'static [&'static str] {
        &["TransferEvent"]
    }

    fn property(&self, name: &str) -> Option<String> {
        (name == "transferId").then(|| self.transfer_id.into())
    }
}

// === Saga ===

#[derive(Default, Serialize, Deserialize)]
struct TransferSaga {
    debited: u64,
    transfer_events: u32,
}

fn transfer_handlers() -> Vec<HandlerDescriptor<TransferSaga>> {
    vec![
        HandlerDescriptor::builder(TRANSFER, "on_initiated")
            .event_type("TransferInitiated")
            .associate_on("transferId", "transferId")
            .start_saga(CreationPolicy::IfNoneFound)
            .handle_typed(|_saga, event: &TransferInitiated, effects| {
                effects.associate_with("accountId", event.from);
                Ok(())
            })
            .build(),
        HandlerDescriptor::builder(TRANSFER, "on_debited")
            .event_type("AccountDebited")
            .associate_on("accountId", "account")
            .handle_typed(|saga: &mut TransferSaga, event: &AccountDebited, effects| {
                saga.debited += event.amount;
                effects.remove_association_with("accountId", event.account);
                Ok(())
            })
            .build(),
        HandlerDescriptor::builder(TRANSFER, "on_any_transfer_event")
            .event_type("TransferEvent")
            .associate_on("transferId", "transferId")
            .handle(|saga: &mut TransferSaga, _event, _effects| {
                saga.transfer_events += 1;
                Ok(())
            })
            .build(),
        HandlerDescriptor::builder(TRANSFER, "on_completed")
            .event_type("TransferCompleted")
            .associate_on("transferId", "transferId")
            .end_saga()
            .build(),
    ]
}

fn setup() -> (Arc<InMemorySagaRepository>, SagaManager) {
    let repository = Arc::new(InMemorySagaRepository::new());
    let mut manager = SagaManager::new(repository.clone(), SagaManagerConfig::default());
    manager.register(TRANSFER, transfer_handlers()).unwrap();
    (repository, manager)
}

fn only_instance(repository: &InMemorySagaRepository, av: &AssociationValue) -> SagaInstance {
    let ids = repository.find(TRANSFER, av).unwrap();
    assert_eq!(ids.len(), 1, "expected exactly one saga for {av}");
    repository.load(ids.iter().next().unwrap()).unwrap()
}

/// `find` lists exactly the active instances holding `av`
fn assert_index_consistent(repository: &InMemorySagaRepository, av: &AssociationValue) {
    let expected: BTreeSet<SagaId> = repository
        .ids_of_type(TRANSFER)
        .unwrap()
        .into_iter()
        .filter(|id| {
            let saga = repository.load(id).unwrap();
            saga.is_active() && saga.associations().contains(av)
        })
        .collect();
    assert_eq!(repository.find(TRANSFER, av).unwrap(), expected);
}

#[test]
fn test_full_lifecycle() {
    let (repository, manager) = setup();
    let transfer = AssociationValue::new("transferId", "t-1");
    let account = AssociationValue::new("accountId", "acc-9");

    // start: the more specific handler runs before the supertype handler,
    // which does not see the saga created in this dispatch
    let report = manager
        .handle(&TransferInitiated {
            transfer_id: "t-1",
            from: "acc-9",
        })
        .unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.invocations.len(), 1);
    assert_eq!(report.invocations[0].method, MethodId::new("on_initiated"));

    let saga = only_instance(&repository, &transfer);
    assert!(saga.associations().contains(&account));
    assert_index_consistent(&repository, &transfer);
    assert_index_consistent(&repository, &account);

    // disassociate
    manager
        .handle(&AccountDebited {
            account: "acc-9",
            amount: 250,
        })
        .unwrap();
    let saga = only_instance(&repository, &transfer);
    assert_eq!(saga.state()["debited"], 250);
    assert!(repository.find(TRANSFER, &account).unwrap().is_empty());
    assert_index_consistent(&repository, &account);

    // a second debit on the same account reaches nobody
    let report = manager
        .handle(&AccountDebited {
            account: "acc-9",
            amount: 1,
        })
        .unwrap();
    assert!(!report.is_handled());

    // end: the supertype handler also matches but runs after the saga is gone
    let report = manager
        .handle(&TransferCompleted { transfer_id: "t-1" })
        .unwrap();
    let methods: Vec<_> = report.invocations.iter().map(|i| i.method.as_str()).collect();
    assert_eq!(methods, vec!["on_completed"]);
    assert_eq!(report.ended, vec![saga.id().clone()]);

    assert!(repository.find(TRANSFER, &transfer).unwrap().is_empty());
    assert_eq!(
        repository.load(saga.id()),
        Err(RepositoryError::NotFound(saga.id().clone()))
    );
    assert_index_consistent(&repository, &transfer);

    // ended sagas receive nothing
    let report = manager
        .handle(&TransferCompleted { transfer_id: "t-1" })
        .unwrap();
    assert!(!report.is_handled());
    assert!(report.ended.is_empty());

    let stats = manager.stats();
    assert_eq!(stats.sagas_created, 1);
    assert_eq!(stats.sagas_ended, 1);
    assert_eq!(stats.events_received, 5);
}

#[test]
fn test_supertype_handler_reaches_existing_saga() {
    let (repository, manager) = setup();
    let event = TransferInitiated {
        transfer_id: "t-2",
        from: "acc-1",
    };

    manager.handle(&event).unwrap();
    let report = manager.handle(&event).unwrap();

    // no new saga: on_initiated and the supertype handler both run on it
    assert!(report.created.is_empty());
    let methods: Vec<_> = report.invocations.iter().map(|i| i.method.as_str()).collect();
    assert_eq!(methods, vec!["on_initiated", "on_any_transfer_event"]);

    let saga = only_instance(&repository, &AssociationValue::new("transferId", "t-2"));
    assert_eq!(saga.state()["transfer_events"], 1);
}

// === Isolation ===

#[derive(Default, Serialize, Deserialize)]
struct CustomerSaga {
    poisoned: bool,
    pings: u32,
}

struct CustomerJoined {
    customer: &'static str,
    poisoned: bool,
}

struct Ping {
    customer: &'static str,
}

impl Event for CustomerJoined {
    fn event_type(&self) -> &'static str {
        "CustomerJoined"
    }

    fn property(&self, name: &str) -> Option<String> {
        (name == "customer").then(|| self.customer.into())
    }
}

impl Event for Ping {
    fn event_type(&self) -> &'static str {
        "Ping"
    }

    fn property(&self, name: &str) -> Option<String> {
        (name == "customer").then(|| self.customer.into())
    }
}

fn customer_handlers(saga_type: &str) -> Vec<HandlerDescriptor<CustomerSaga>> {
    vec![
        HandlerDescriptor::builder(saga_type, "on_joined")
            .event_type("CustomerJoined")
            .associate_on("customer", "customer")
            .start_saga(CreationPolicy::Always)
            .handle_typed(|saga: &mut CustomerSaga, event: &CustomerJoined, _effects| {
                saga.poisoned = event.poisoned;
                Ok(())
            })
            .build(),
        HandlerDescriptor::builder(saga_type, "on_ping")
            .event_type("Ping")
            .associate_on("customer", "customer")
            .handle(|saga: &mut CustomerSaga, _event, _effects| {
                if saga.poisoned {
                    return Err(HandlerError::new("poisoned saga"));
                }
                saga.pings += 1;
                Ok(())
            })
            .build(),
    ]
}

#[test]
fn test_failing_instance_does_not_block_siblings_or_other_saga_types() {
    let repository = Arc::new(InMemorySagaRepository::new());
    let mut manager = SagaManager::new(repository.clone(), SagaManagerConfig::default());
    manager.register("CustomerSaga", customer_handlers("CustomerSaga")).unwrap();
    manager.register("LoyaltySaga", customer_handlers("LoyaltySaga")).unwrap();

    manager
        .handle(&CustomerJoined {
            customer: "c1",
            poisoned: true,
        })
        .unwrap();
    manager
        .handle(&CustomerJoined {
            customer: "c1",
            poisoned: false,
        })
        .unwrap();
    assert_eq!(repository.len(), 4);

    let report = manager.handle(&Ping { customer: "c1" }).unwrap();
    assert_eq!(report.invocations.len(), 2);
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(DispatchFailure::is_handler_failure));

    let saga_types: BTreeSet<_> = report.invocations.iter().map(|i| i.saga_type.clone()).collect();
    assert_eq!(saga_types.len(), 2);

    // failed invocations left their instance untouched
    for failure in &report.failures {
        let id = failure.saga_id.as_ref().unwrap();
        let saga = repository.load(id).unwrap();
        assert_eq!(saga.state()["pings"], 0);
    }
}

#[test]
fn test_failed_start_handler_persists_nothing() {
    let repository = Arc::new(InMemorySagaRepository::new());
    let mut manager = SagaManager::new(repository.clone(), SagaManagerConfig::default());
    let failing = HandlerDescriptor::<CustomerSaga>::builder("CustomerSaga", "on_joined")
        .event_type("CustomerJoined")
        .associate_on("customer", "customer")
        .start_saga(CreationPolicy::Always)
        .handle(|_, _, _| Err(HandlerError::new("rejected")))
        .build();
    manager.register("CustomerSaga", vec![failing]).unwrap();

    let report = manager
        .handle(&CustomerJoined {
            customer: "c1",
            poisoned: false,
        })
        .unwrap();

    assert!(report.created.is_empty());
    assert!(matches!(report.failures[0].kind, FailureKind::Handler(_)));
    assert!(repository.is_empty());
}

// === Stale index entries ===

/// Repository whose index also reports an identifier that no longer exists
struct StaleIndexRepository {
    inner: InMemorySagaRepository,
    ghost: SagaId,
}

impl SagaRepository for StaleIndexRepository {
    fn find(
        &self,
        saga_type: &str,
        value: &AssociationValue,
    ) -> Result<BTreeSet<SagaId>, RepositoryError> {
        let mut ids = self.inner.find(saga_type, value)?;
        ids.insert(self.ghost.clone());
        Ok(ids)
    }

    fn load(&self, id: &SagaId) -> Result<SagaInstance, RepositoryError> {
        self.inner.load(id)
    }

    fn save(&self, instance: &SagaInstance) -> Result<(), RepositoryError> {
        self.inner.save(instance)
    }

    fn remove(&self, id: &SagaId) -> Result<(), RepositoryError> {
        self.inner.remove(id)
    }
}

#[derive(Default)]
struct CountingObserver {
    stale: AtomicUsize,
    created: AtomicUsize,
}

impl DispatchObserver for CountingObserver {
    fn on_dispatch_started(&self, _context: &DispatchContext) {}
    fn on_saga_created(&self, _context: &DispatchContext, _saga_type: &str, _saga_id: &SagaId, _association: &AssociationValue) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }
    fn on_handler_invoked(&self, _context: &DispatchContext, _saga_id: &SagaId, _method: &MethodId) {}
    fn on_association_added(&self, _context: &DispatchContext, _saga_id: &SagaId, _association: &AssociationValue) {}
    fn on_association_removed(&self, _context: &DispatchContext, _saga_id: &SagaId, _association: &AssociationValue) {}
    fn on_saga_ended(&self, _context: &DispatchContext, _saga_type: &str, _saga_id: &SagaId) {}
    fn on_stale_identifier(&self, _context: &DispatchContext, _saga_type: &str, _saga_id: &SagaId) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }
    fn on_failure(&self, _context: &DispatchContext, _failure: &DispatchFailure) {}
    fn on_dispatch_completed(&self, _context: &DispatchContext, _invocations: usize, _failures: usize) {}
}

#[test]
fn test_stale_identifier_treated_as_absent() {
    let repository = Arc::new(StaleIndexRepository {
        inner: InMemorySagaRepository::new(),
        ghost: SagaId::new("pruned-saga"),
    });
    let observer = Arc::new(CountingObserver::default());
    let config = SagaManagerConfig::default().with_observer(observer.clone());
    let mut manager = SagaManager::new(repository, config);
    manager.register("CustomerSaga", customer_handlers("CustomerSaga")).unwrap();

    manager
        .handle(&CustomerJoined {
            customer: "c1",
            poisoned: false,
        })
        .unwrap();
    let report = manager.handle(&Ping { customer: "c1" }).unwrap();

    assert_eq!(report.invocations.len(), 1);
    assert!(report.failures.is_empty());
    assert_eq!(observer.stale.load(Ordering::Relaxed), 1);
    assert_eq!(observer.created.load(Ordering::Relaxed), 1);
    assert_eq!(manager.stats().stale_identifiers, 1);
}

// === Ended instances still listed by the index ===

/// Repository whose index still lists an instance that has already ended
struct EndedInstanceRepository {
    inner: InMemorySagaRepository,
    ended: SagaInstance,
    saves: AtomicUsize,
}

impl EndedInstanceRepository {
    fn new(customer: &'static str) -> Self {
        let mut ended = SagaInstance::start(
            SagaId::new("finished-saga"),
            "CustomerSaga",
            AssociationValue::new("customer", customer),
            serde_json::json!({ "poisoned": false, "pings": 3 }),
        );
        ended.end().unwrap();
        Self {
            inner: InMemorySagaRepository::new(),
            ended,
            saves: AtomicUsize::new(0),
        }
    }
}

impl SagaRepository for EndedInstanceRepository {
    fn find(
        &self,
        saga_type: &str,
        value: &AssociationValue,
    ) -> Result<BTreeSet<SagaId>, RepositoryError> {
        let mut ids = self.inner.find(saga_type, value)?;
        ids.insert(self.ended.id().clone());
        Ok(ids)
    }

    fn load(&self, id: &SagaId) -> Result<SagaInstance, RepositoryError> {
        if id == self.ended.id() {
            return Ok(self.ended.clone());
        }
        self.inner.load(id)
    }

    fn save(&self, instance: &SagaInstance) -> Result<(), RepositoryError> {
        self.saves.fetch_add(1, Ordering::Relaxed);
        self.inner.save(instance)
    }

    fn remove(&self, id: &SagaId) -> Result<(), RepositoryError> {
        self.inner.remove(id)
    }
}

#[test]
fn test_ended_instance_from_index_is_inert() {
    let repository = Arc::new(EndedInstanceRepository::new("c1"));
    let mut manager = SagaManager::new(repository.clone(), SagaManagerConfig::default());
    manager.register("CustomerSaga", customer_handlers("CustomerSaga")).unwrap();

    let report = manager.handle(&Ping { customer: "c1" }).unwrap();

    assert!(!report.is_handled());
    assert!(report.created.is_empty());
    assert!(report.ended.is_empty());
    assert!(report.failures.is_empty());
    assert_eq!(repository.saves.load(Ordering::Relaxed), 0);
    assert!(repository.inner.is_empty());
}

#[test]
fn test_ended_instance_does_not_count_as_found() {
    let repository = Arc::new(EndedInstanceRepository::new("c1"));
    let mut manager = SagaManager::new(repository.clone(), SagaManagerConfig::default());
    let on_ping = HandlerDescriptor::<CustomerSaga>::builder("CustomerSaga", "on_ping")
        .event_type("Ping")
        .associate_on("customer", "customer")
        .start_saga(CreationPolicy::IfNoneFound)
        .build();
    manager.register("CustomerSaga", vec![on_ping]).unwrap();

    let report = manager.handle(&Ping { customer: "c1" }).unwrap();

    assert_eq!(report.created.len(), 1);
    assert_ne!(&report.created[0], repository.ended.id());
    assert_eq!(repository.saves.load(Ordering::Relaxed), 1);

    let live = manager
        .repository()
        .find("CustomerSaga", &AssociationValue::new("customer", "c1"))
        .unwrap();
    assert_eq!(live.len(), 2);
    assert!(live.contains(&report.created[0]));
}

// === Error propagation ===

#[test]
fn test_registration_and_dispatch_share_one_error_type() {
    fn run(manager: &mut SagaManager) -> Result<DispatchReport, SagaError> {
        manager.register("CustomerSaga", customer_handlers("CustomerSaga"))?;
        manager.register("CustomerSaga", customer_handlers("CustomerSaga"))?;
        manager.handle(&Ping { customer: "c1" })
    }

    let repository = Arc::new(InMemorySagaRepository::new());
    let mut manager = SagaManager::new(repository, SagaManagerConfig::default());

    match run(&mut manager) {
        Err(SagaError::Registration(error)) => {
            assert_eq!(error, RegistrationError::DuplicateSagaType("CustomerSaga".into()));
        }
        other => panic!("expected registration error, got {other:?}"),
    }
}
