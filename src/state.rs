//! Saga instance lifecycle
//!
//! ```text
//!   (none) ──start──► Active ──apply(effects)──► Active
//!                        │
//!                        └──apply(effects with end)──► Ended (terminal)
//! ```

use crate::{AssociationSet, AssociationValue, LifecycleError, SagaId};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a saga instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaLifecycle {
    /// Receives events and is reachable through its associations
    Active,
    /// Terminal. Holds no associations and receives nothing.
    Ended,
}

impl SagaLifecycle {
    /// Check if the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

/// Lifecycle effects recorded by one handler invocation.
///
/// Handlers never touch the instance's associations directly; the manager
/// applies these effects after the handler returns successfully.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SagaEffects {
    saga_id: SagaId,
    added: Vec<AssociationValue>,
    removed: Vec<AssociationValue>,
    end: bool,
}

impl SagaEffects {
    /// Create an empty effect set for the instance `saga_id`
    pub fn new(saga_id: SagaId) -> Self {
        Self {
            saga_id,
            added: Vec::new(),
            removed: Vec::new(),
            end: false,
        }
    }

    /// Identifier of the instance the handler runs on
    pub fn saga_id(&self) -> &SagaId {
        &self.saga_id
    }

    /// Associate the saga with `key = value`
    pub fn associate_with(&mut self, key: impl Into<Box<str>>, value: impl Into<Box<str>>) {
        let value = AssociationValue::new(key, value);
        self.removed.retain(|v| *v != value);
        self.added.push(value);
    }

    /// Remove the association `key = value`
    pub fn remove_association_with(
        &mut self,
        key: impl Into<Box<str>>,
        value: impl Into<Box<str>>,
    ) {
        let value = AssociationValue::new(key, value);
        self.added.retain(|v| *v != value);
        self.removed.push(value);
    }

    /// End the saga once the handler returns
    pub fn end(&mut self) {
        self.end = true;
    }

    /// Check if the end directive was raised
    pub fn is_ended(&self) -> bool {
        self.end
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && !self.end
    }
}

/// Associations that actually changed when effects were applied
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssociationDelta {
    /// Newly held associations
    pub added: Vec<AssociationValue>,
    /// Associations no longer held
    pub removed: Vec<AssociationValue>,
    /// Whether the instance transitioned to `Ended`
    pub ended: bool,
}

impl AssociationDelta {
    /// Check if the instance was left untouched
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && !self.ended
    }
}

/// A saga instance with its associations and serialized state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SagaInstance {
    id: SagaId,
    saga_type: Box<str>,
    associations: AssociationSet,
    lifecycle: SagaLifecycle,
    state: serde_json::Value,
}

impl SagaInstance {
    /// `(none) -> Active`: a fresh instance associated with `association`
    pub fn start(
        id: SagaId,
        saga_type: impl Into<Box<str>>,
        association: AssociationValue,
        state: serde_json::Value,
    ) -> Self {
        let mut associations = AssociationSet::new();
        associations.add(association);
        Self {
            id,
            saga_type: saga_type.into(),
            associations,
            lifecycle: SagaLifecycle::Active,
            state,
        }
    }

    /// Instance identifier
    pub fn id(&self) -> &SagaId {
        &self.id
    }

    /// Saga type
    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    /// Current associations
    pub fn associations(&self) -> &AssociationSet {
        &self.associations
    }

    /// Lifecycle state
    pub fn lifecycle(&self) -> SagaLifecycle {
        self.lifecycle
    }

    /// Check if the instance still receives events
    pub fn is_active(&self) -> bool {
        !self.lifecycle.is_terminal()
    }

    /// Serialized saga state
    pub fn state(&self) -> &serde_json::Value {
        &self.state
    }

    /// Replace the serialized saga state
    pub fn set_state(&mut self, state: serde_json::Value) {
        self.state = state;
    }

    /// Apply handler effects. Removals are applied after additions, and the
    /// end directive last.
    pub fn apply(&mut self, effects: SagaEffects) -> Result<AssociationDelta, LifecycleError> {
        if self.lifecycle.is_terminal() {
            return Err(LifecycleError::AlreadyEnded(self.id.clone()));
        }

        let mut delta = AssociationDelta::default();
        for value in effects.added {
            if self.associations.add(value.clone()) {
                delta.added.push(value);
            }
        }
        for value in effects.removed {
            if self.associations.remove(&value) {
                delta.removed.push(value);
            }
        }

        if effects.end {
            // values added by this same invocation were never persisted
            let ended = self.end()?;
            let added = std::mem::take(&mut delta.added);
            delta
                .removed
                .extend(ended.removed.into_iter().filter(|v| !added.contains(v)));
            delta.ended = true;
        }
        Ok(delta)
    }

    /// `Active -> Ended`: drops every association so no lookup reaches the
    /// instance any more.
    pub fn end(&mut self) -> Result<AssociationDelta, LifecycleError> {
        if self.lifecycle.is_terminal() {
            return Err(LifecycleError::AlreadyEnded(self.id.clone()));
        }
        self.lifecycle = SagaLifecycle::Ended;
        Ok(AssociationDelta {
            added: Vec::new(),
            removed: self.associations.drain(),
            ended: true,
        })
    }
}

// Instances are entities: identity is the identifier.
impl PartialEq for SagaInstance {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SagaInstance {}

impl std::hash::Hash for SagaInstance {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
