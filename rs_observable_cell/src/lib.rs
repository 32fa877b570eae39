mod cell;
mod error;
mod scheduler;
mod sink;
mod subscriber;
mod value;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use cell::{CellBuilder, CellOptions, ObservableCell};
pub use error::{CallbackError, DeliveryError};
pub use scheduler::{InlineScheduler, QueuedScheduler, Scheduler, Task};
pub use sink::{FailureSink, LogSink};
pub use subscriber::{Disposer, Subscriber, SubscriberId};
pub use value::{CellValue, Delivery, Presence};

#[cfg(feature = "tokio")]
pub use scheduler::TokioScheduler;

// Callbacks never run while a lock is held, so poisoning can only come from
// a panicking `Clone` or `PartialEq` of the stored value.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
