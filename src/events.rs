//! Inbound event contract

use std::any::Any;

/// Access to the concrete value behind a `&dyn Event`.
///
/// Blanket-implemented for every `'static` type, so event types never
/// implement it by hand.
pub trait AsAny: Any {
    /// Upcast to `&dyn Any` for downcasting
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An inbound domain event.
///
/// Events describe their runtime type by name and may declare supertypes
/// (event families or marker interfaces) so that handlers bound to a more
/// general type also match. Association properties are read by name.
///
/// # Example
///
/// ```rust
/// use saga_router::Event;
///
/// struct TransferInitiated {
///     from: String,
///     to: String,
/// }
///
/// impl Event for TransferInitiated {
///     fn event_type(&self) -> &'static str {
///         "TransferInitiated"
///     }
///
///     fn supertypes(&self) -> &'static [&'static str] {
///         &["TransferEvent"]
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
/// ```
pub trait Event: AsAny + Send + Sync {
    /// The most specific type name of this event
    fn event_type(&self) -> &'static str;

    /// Declared supertypes, most specific first
    fn supertypes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Read a named property. `None` when absent or null.
    fn property(&self, name: &str) -> Option<String>;

    /// The event type followed by its supertypes
    fn type_hierarchy(&self) -> Vec<&'static str> {
        std::iter::once(self.event_type())
            .chain(self.supertypes().iter().copied())
            .collect()
    }
}

/// Downcast a dispatched event to its concrete type
pub fn downcast_event<E: Event>(event: &dyn Event) -> Option<&E> {
    event.as_any().downcast_ref::<E>()
}
