//! Saga repository trait and in-memory implementation

use crate::{AssociationValue, RepositoryError, SagaId, SagaInstance};
use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

/// Storage of saga instances and their association index.
///
/// Every call is atomic on its own. The index must list an identifier under
/// `(saga_type, value)` exactly when the stored instance is active and holds
/// `value`.
pub trait SagaRepository: Send + Sync + 'static {
    /// Identifiers of active instances of `saga_type` associated with `value`
    fn find(
        &self,
        saga_type: &str,
        value: &AssociationValue,
    ) -> Result<BTreeSet<SagaId>, RepositoryError>;

    /// Load an instance. `RepositoryError::NotFound` for unknown identifiers.
    fn load(&self, id: &SagaId) -> Result<SagaInstance, RepositoryError>;

    /// Insert or update an instance and reindex its associations. Saving an
    /// ended instance removes it.
    fn save(&self, instance: &SagaInstance) -> Result<(), RepositoryError>;

    /// Drop an instance and all of its index entries. Unknown ids are a no-op.
    fn remove(&self, id: &SagaId) -> Result<(), RepositoryError>;
}

type IndexKey = (Box<str>, AssociationValue);

#[derive(Default)]
struct Inner {
    instances: HashMap<SagaId, SagaInstance>,
    index: HashMap<IndexKey, BTreeSet<SagaId>>,
}

impl Inner {
    fn unindex(&mut self, saga_type: &str, id: &SagaId, values: &[AssociationValue]) {
        for value in values {
            let key = (Box::<str>::from(saga_type), value.clone());
            if let Some(ids) = self.index.get_mut(&key) {
                ids.remove(id);
                if ids.is_empty() {
                    self.index.remove(&key);
                }
            }
        }
    }

    fn remove(&mut self, id: &SagaId) -> Option<SagaInstance> {
        let previous = self.instances.remove(id)?;
        let values: Vec<_> = previous.associations().iter().cloned().collect();
        self.unindex(previous.saga_type(), id, &values);
        Some(previous)
    }
}

fn poisoned<T>(error: PoisonError<T>) -> RepositoryError {
    RepositoryError::Storage(error.to_string().into())
}

/// In-memory repository
pub struct InMemorySagaRepository {
    data: RwLock<Inner>,
}

impl InMemorySagaRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Inner::default()),
        }
    }

    /// Number of stored instances
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.instances.len()).unwrap_or(0)
    }

    /// Whether no instance is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifiers of every stored instance of `saga_type`
    pub fn ids_of_type(&self, saga_type: &str) -> Result<BTreeSet<SagaId>, RepositoryError> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data
            .instances
            .values()
            .filter(|i| i.saga_type() == saga_type)
            .map(|i| i.id().clone())
            .collect())
    }
}

impl SagaRepository for InMemorySagaRepository {
    fn find(
        &self,
        saga_type: &str,
        value: &AssociationValue,
    ) -> Result<BTreeSet<SagaId>, RepositoryError> {
        let data = self.data.read().map_err(poisoned)?;
        let key = (Box::<str>::from(saga_type), value.clone());
        Ok(data.index.get(&key).cloned().unwrap_or_default())
    }

    fn load(&self, id: &SagaId) -> Result<SagaInstance, RepositoryError> {
        let data = self.data.read().map_err(poisoned)?;
        data.instances
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))
    }

    fn save(&self, instance: &SagaInstance) -> Result<(), RepositoryError> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.remove(instance.id());
        if !instance.is_active() {
            return Ok(());
        }

        for value in instance.associations() {
            data.index
                .entry((instance.saga_type().into(), value.clone()))
                .or_default()
                .insert(instance.id().clone());
        }
        data.instances.insert(instance.id().clone(), instance.clone());
        Ok(())
    }

    fn remove(&self, id: &SagaId) -> Result<(), RepositoryError> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.remove(id);
        Ok(())
    }
}

impl Default for InMemorySagaRepository {
    fn default() -> Self {
        Self::new()
    }
}
