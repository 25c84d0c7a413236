//! Handler candidate registry for one saga type

use crate::ordering::{sort_candidates, HandlerRank};
use crate::{Event, HandlerDescriptor, MethodId, RegistrationError};
use std::collections::HashSet;

/// Validated handler descriptors of one saga type, in discovery order
pub struct HandlerRegistry<S> {
    saga_type: Box<str>,
    descriptors: Vec<HandlerDescriptor<S>>,
}

impl<S> HandlerRegistry<S> {
    /// Validate `descriptors` for `saga_type`.
    ///
    /// Uniqueness is checked on method identity with a hash set, so two
    /// handlers that only share an event type and association key are both
    /// kept.
    pub fn new(
        saga_type: impl Into<Box<str>>,
        descriptors: Vec<HandlerDescriptor<S>>,
    ) -> Result<Self, RegistrationError> {
        let saga_type = saga_type.into();
        if saga_type.is_empty() {
            return Err(RegistrationError::EmptySagaType);
        }

        let mut seen: HashSet<&MethodId> = HashSet::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            let empty_field = |field| RegistrationError::EmptyField {
                saga_type: saga_type.clone(),
                method: descriptor.method_id().clone(),
                field,
            };
            if descriptor.method_id().as_str().is_empty() {
                return Err(empty_field("method identity"));
            }
            if descriptor.event_type().is_empty() {
                return Err(empty_field("event type"));
            }
            if descriptor.key_name().is_empty() {
                return Err(empty_field("association key"));
            }
            if descriptor.saga_type() != saga_type.as_ref() {
                return Err(RegistrationError::SagaTypeMismatch {
                    expected: saga_type.clone(),
                    found: descriptor.saga_type().into(),
                    method: descriptor.method_id().clone(),
                });
            }
            if !seen.insert(descriptor.method_id()) {
                return Err(RegistrationError::DuplicateMethod {
                    saga_type: saga_type.clone(),
                    method: descriptor.method_id().clone(),
                });
            }
        }

        Ok(Self {
            saga_type,
            descriptors,
        })
    }

    /// Saga type name
    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    /// All descriptors in discovery order
    pub fn descriptors(&self) -> &[HandlerDescriptor<S>] {
        &self.descriptors
    }

    /// Descriptors whose event type matches `event`, most specific first.
    /// Empty when the saga type is not interested in the event.
    pub fn resolve(&self, event: &dyn Event) -> Vec<&HandlerDescriptor<S>> {
        let hierarchy = event.type_hierarchy();
        let mut candidates: Vec<_> = self
            .descriptors
            .iter()
            .filter_map(|d| HandlerRank::of(d, &hierarchy).map(|rank| (rank, d)))
            .collect();
        sort_candidates(&mut candidates);
        candidates.into_iter().map(|(_, d)| d).collect()
    }
}

impl<S> std::fmt::Debug for HandlerRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("saga_type", &self.saga_type)
            .field("descriptors", &self.descriptors)
            .finish()
    }
}
