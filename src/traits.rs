//! Core traits for saga state

use serde::{de::DeserializeOwned, Serialize};

/// User-defined state carried by a saga type.
///
/// New instances start from `Default`; between dispatches the state is
/// stored as JSON inside the [`SagaInstance`](crate::SagaInstance).
///
/// Implemented for every type meeting the bounds.
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Default, Serialize, Deserialize)]
/// struct TransferSaga {
///     amount_settled: u64,
/// }
///
/// fn assert_state<S: saga_router::SagaState>() {}
/// assert_state::<TransferSaga>();
/// ```
pub trait SagaState: Default + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> SagaState for T where T: Default + Serialize + DeserializeOwned + Send + Sync + 'static {}
