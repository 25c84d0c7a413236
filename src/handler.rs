//! Handler descriptors
//!
//! A [`HandlerDescriptor`] is the static metadata of one saga handler: which
//! event type it accepts, how the association value is read off the event,
//! whether it may start a saga, and the handler function itself.
//!
//! Descriptor identity is its [`MethodId`] and nothing else. Two descriptors
//! bound to the same event type and association key are still distinct
//! handlers when their method identities differ.

use crate::events::downcast_event;
use crate::{AssociationValue, Event, ExtractionError, HandlerError, SagaEffects};
use std::sync::Arc;

/// Opaque, stable identity of one handler method.
///
/// Unique within one saga type; registration rejects duplicates there. Two
/// saga types may reuse a method name, so descriptors are only compared
/// within a single saga type. Qualify the name (`"TransferSaga::on_settled"`)
/// when identities must be unique across saga types.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(Box<str>);

impl MethodId {
    /// Create a method identity
    pub fn new(id: impl Into<Box<str>>) -> Self {
        Self(id.into())
    }

    /// Get the identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for MethodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MethodId({})", self.0)
    }
}

impl std::fmt::Display for MethodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a handler may create saga instances
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CreationPolicy {
    /// Only invoked on existing instances
    #[default]
    Never,
    /// Create a new instance every time the handler fires
    Always,
    /// Create an instance only when none is associated with the event's value
    IfNoneFound,
}

impl CreationPolicy {
    /// Check if this policy can start a saga
    pub fn starts_new_saga(&self) -> bool {
        !matches!(self, Self::Never)
    }
}

/// How the association value is read off an event
#[derive(Clone)]
pub enum AssociationResolver {
    /// Read a named property with [`Event::property`]
    Property(Box<str>),
    /// Compute the value from the event
    Custom(Arc<dyn Fn(&dyn Event) -> Option<String> + Send + Sync>),
}

impl std::fmt::Debug for AssociationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Property(path) => f.debug_tuple("Property").field(path).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Handler function: mutates the saga state and records lifecycle effects
pub type HandlerFn<S> =
    Arc<dyn Fn(&mut S, &dyn Event, &mut SagaEffects) -> Result<(), HandlerError> + Send + Sync>;

/// Static description of one saga handler
pub struct HandlerDescriptor<S> {
    saga_type: Box<str>,
    method_id: MethodId,
    event_type: &'static str,
    key_name: Box<str>,
    resolver: AssociationResolver,
    creation_policy: CreationPolicy,
    ends_saga: bool,
    handler: HandlerFn<S>,
}

impl<S: 'static> HandlerDescriptor<S> {
    /// Start building a descriptor for `method_id` on `saga_type`
    pub fn builder(
        saga_type: impl Into<Box<str>>,
        method_id: impl Into<Box<str>>,
    ) -> HandlerDescriptorBuilder<S> {
        HandlerDescriptorBuilder {
            saga_type: saga_type.into(),
            method_id: MethodId::new(method_id),
            event_type: "",
            key_name: "".into(),
            resolver: AssociationResolver::Property("".into()),
            creation_policy: CreationPolicy::Never,
            ends_saga: false,
            handler: None,
        }
    }
}

impl<S> HandlerDescriptor<S> {
    /// Saga type this handler belongs to
    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    /// Identity of the handler
    pub fn method_id(&self) -> &MethodId {
        &self.method_id
    }

    /// Event type the handler is bound to
    pub fn event_type(&self) -> &'static str {
        self.event_type
    }

    /// Association key name
    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// How the association value is resolved
    pub fn resolver(&self) -> &AssociationResolver {
        &self.resolver
    }

    /// Creation policy
    pub fn creation_policy(&self) -> CreationPolicy {
        self.creation_policy
    }

    /// Check if this handler may start a saga
    pub fn starts_new_saga(&self) -> bool {
        self.creation_policy.starts_new_saga()
    }

    /// Check if the saga ends after this handler succeeds
    pub fn ends_saga(&self) -> bool {
        self.ends_saga
    }

    /// Position of this handler's event type in `hierarchy`, `None` if it
    /// does not match
    pub fn specificity(&self, hierarchy: &[&'static str]) -> Option<usize> {
        hierarchy.iter().position(|t| *t == self.event_type)
    }

    /// Read the association value for this handler off `event`
    pub fn extract(&self, event: &dyn Event) -> Result<AssociationValue, ExtractionError> {
        let value = match &self.resolver {
            AssociationResolver::Property(path) => {
                event
                    .property(path)
                    .ok_or_else(|| ExtractionError::MissingProperty {
                        event_type: event.event_type(),
                        property: path.clone(),
                    })?
            }
            AssociationResolver::Custom(resolve) => {
                resolve(event).ok_or_else(|| ExtractionError::Unresolved {
                    event_type: event.event_type(),
                    key: self.key_name.clone(),
                })?
            }
        };
        Ok(AssociationValue::new(self.key_name.clone(), value))
    }

    /// Run the handler. On success an `ends_saga` handler also records the
    /// end directive.
    pub fn invoke(
        &self,
        state: &mut S,
        event: &dyn Event,
        effects: &mut SagaEffects,
    ) -> Result<(), HandlerError> {
        (self.handler)(state, event, effects)?;
        if self.ends_saga {
            effects.end();
        }
        Ok(())
    }
}

/// Read the association value configured on `descriptor` off `event`
pub fn extract<S>(
    event: &dyn Event,
    descriptor: &HandlerDescriptor<S>,
) -> Result<AssociationValue, ExtractionError> {
    descriptor.extract(event)
}

impl<S> Clone for HandlerDescriptor<S> {
    fn clone(&self) -> Self {
        Self {
            saga_type: self.saga_type.clone(),
            method_id: self.method_id.clone(),
            event_type: self.event_type,
            key_name: self.key_name.clone(),
            resolver: self.resolver.clone(),
            creation_policy: self.creation_policy,
            ends_saga: self.ends_saga,
            handler: Arc::clone(&self.handler),
        }
    }
}

// Identity is the method, never the event type or association key. Method
// identities are scoped to a saga type.
impl<S> PartialEq for HandlerDescriptor<S> {
    fn eq(&self, other: &Self) -> bool {
        self.method_id == other.method_id
    }
}

impl<S> Eq for HandlerDescriptor<S> {}

impl<S> std::hash::Hash for HandlerDescriptor<S> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.method_id.hash(state);
    }
}

impl<S> std::fmt::Debug for HandlerDescriptor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("saga_type", &self.saga_type)
            .field("method_id", &self.method_id)
            .field("event_type", &self.event_type)
            .field("key_name", &self.key_name)
            .field("resolver", &self.resolver)
            .field("creation_policy", &self.creation_policy)
            .field("ends_saga", &self.ends_saga)
            .finish()
    }
}

/// Builder for [`HandlerDescriptor`]
pub struct HandlerDescriptorBuilder<S> {
    saga_type: Box<str>,
    method_id: MethodId,
    event_type: &'static str,
    key_name: Box<str>,
    resolver: AssociationResolver,
    creation_policy: CreationPolicy,
    ends_saga: bool,
    handler: Option<HandlerFn<S>>,
}

impl<S: 'static> HandlerDescriptorBuilder<S> {
    /// Bind to an event type (or declared supertype)
    pub fn event_type(mut self, event_type: &'static str) -> Self {
        self.event_type = event_type;
        self
    }

    /// Associate on `key_name`, reading the value from `property`
    pub fn associate_on(
        mut self,
        key_name: impl Into<Box<str>>,
        property: impl Into<Box<str>>,
    ) -> Self {
        self.key_name = key_name.into();
        self.resolver = AssociationResolver::Property(property.into());
        self
    }

    /// Associate on `key_name`, computing the value with `resolve`
    pub fn associate_with<F>(mut self, key_name: impl Into<Box<str>>, resolve: F) -> Self
    where
        F: Fn(&dyn Event) -> Option<String> + Send + Sync + 'static,
    {
        self.key_name = key_name.into();
        self.resolver = AssociationResolver::Custom(Arc::new(resolve));
        self
    }

    /// Let the handler create instances
    pub fn start_saga(mut self, policy: CreationPolicy) -> Self {
        self.creation_policy = policy;
        self
    }

    /// End the saga after the handler succeeds
    pub fn end_saga(mut self) -> Self {
        self.ends_saga = true;
        self
    }

    /// Handler receiving the event as `&dyn Event`
    pub fn handle<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut S, &dyn Event, &mut SagaEffects) -> Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Handler receiving the concrete event type `E`.
    ///
    /// Fails with a [`HandlerError`] if the dispatched event is a different
    /// type, which can happen when binding to a supertype.
    pub fn handle_typed<E, F>(self, handler: F) -> Self
    where
        E: Event,
        F: Fn(&mut S, &E, &mut SagaEffects) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handle(move |state, event, effects| match downcast_event::<E>(event) {
            Some(typed) => handler(state, typed, effects),
            None => Err(HandlerError::new(format!(
                "unexpected event type {}",
                event.event_type()
            ))),
        })
    }

    /// Finish the descriptor. Validation happens at registration.
    pub fn build(self) -> HandlerDescriptor<S> {
        HandlerDescriptor {
            saga_type: self.saga_type,
            method_id: self.method_id,
            event_type: self.event_type,
            key_name: self.key_name,
            resolver: self.resolver,
            creation_policy: self.creation_policy,
            ends_saga: self.ends_saga,
            handler: match self.handler {
                Some(handler) => handler,
                None => Arc::new(noop_handler::<S>) as HandlerFn<S>,
            },
        }
    }
}

fn noop_handler<S>(_: &mut S, _: &dyn Event, _: &mut SagaEffects) -> Result<(), HandlerError> {
    Ok(())
}
