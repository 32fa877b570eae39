use log::{debug, trace};
use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::{Arc, Mutex, Weak};

use crate::error::DeliveryError;
use crate::lock;
use crate::scheduler::{Scheduler, Task};
use crate::sink::{FailureSink, LogSink};
use crate::subscriber::{Disposer, Subscriber, SubscriberId};
use crate::value::{CellValue, Delivery, Presence};

/// Options fixed when a cell is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellOptions {
    /// Deliver composite values as their elements
    pub unpack: bool,
    /// Which stored values count as deliverable
    pub presence: Presence,
}

struct Inner<T: CellValue> {
    value: Mutex<T>,
    subscribers: Mutex<HashMap<SubscriberId, Subscriber<T>>>,
    options: CellOptions,
    scheduler: Arc<dyn Scheduler>,
    sink: Arc<dyn FailureSink>,
}

/// A value that notifies its subscribers whenever it changes.
///
/// Handles are cheap to clone and all clones share the same value and
/// subscribers. Notifications are scheduled, not run, by `set`: when `set`
/// returns, subscribers may not have seen the new value yet.
pub struct ObservableCell<T: CellValue> {
    inner: Arc<Inner<T>>,
}

impl<T: CellValue> Clone for ObservableCell<T> {
    fn clone(&self) -> Self {
        ObservableCell {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ObservableCell<T>
where
    T: CellValue + Send + 'static,
{
    /// Creates a cell with default options
    pub fn new(value: T) -> Self {
        CellBuilder::new(value).build()
    }

    /// Creates a cell that spreads composite values into their elements
    /// when `unpack` is set
    pub fn with_unpack(value: T, unpack: bool) -> Self {
        CellBuilder::new(value).unpack(unpack).build()
    }

    pub fn builder(value: T) -> CellBuilder<T> {
        CellBuilder::new(value)
    }

    /// Returns a copy of the current value
    pub fn get(&self) -> T {
        lock(&self.inner.value).clone()
    }

    /// Calls `f` with a snapshot of the current value. The cell is not
    /// locked while `f` runs, so `f` may read or update it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.get();
        f(&value)
    }

    /// Stores `value` and notifies the subscribers if it differs from the
    /// current one. Returns whether a notification round was scheduled.
    pub fn set(&self, value: T) -> bool {
        self.set_with(value, None)
    }

    /// Stores `value` and notifies the subscribers, even if it equals the
    /// current one
    pub fn force_set(&self, value: T) -> bool {
        self.set_with(value, Some(true))
    }

    /// Update with explicit force policy:
    ///
    /// * `Some(true)` - always store and notify
    /// * `None` - store and notify only if the value changed
    /// * `Some(false)` - do nothing
    pub fn set_with(&self, value: T, force_update: Option<bool>) -> bool {
        {
            let mut current = lock(&self.inner.value);
            let accept = match force_update {
                Some(true) => true,
                None => *current != value,
                Some(false) => false,
            };
            if !accept {
                debug!("set dropped: force_update={:?}", force_update);
                return false;
            }
            *current = value;
        }
        self.notify_all();
        true
    }

    /// Registers `subscriber`. Connecting the same subscriber again keeps a
    /// single registration.
    pub fn connect(&self, subscriber: &Subscriber<T>) -> Disposer {
        self.connect_impl(subscriber, None)
    }

    /// Like `connect`, with `on_disconnect` running once the returned
    /// disposer is invoked
    pub fn connect_with<F>(&self, subscriber: &Subscriber<T>, on_disconnect: F) -> Disposer
    where
        F: FnOnce() + Send + 'static,
    {
        self.connect_impl(subscriber, Some(Box::new(on_disconnect)))
    }

    fn connect_impl(
        &self,
        subscriber: &Subscriber<T>,
        on_disconnect: Option<Box<dyn FnOnce() + Send>>,
    ) -> Disposer {
        let id = subscriber.id();
        {
            let mut subscribers = lock(&self.inner.subscribers);
            if subscribers.insert(id, subscriber.clone()).is_some() {
                debug!("subscriber already connected: id={}", id);
            } else {
                debug!("connect subscriber: id={}", id);
            }
        }
        let weak = Arc::downgrade(&self.inner);
        // holding the callback keeps its id from being reused by a later
        // subscriber, the ptr_eq check guards against removing a stranger
        let callback = subscriber.downgrade();
        Disposer::new(
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut subscribers = lock(&inner.subscribers);
                    let registered = subscribers
                        .get(&id)
                        .map_or(false, |s| s.is_callback(&callback));
                    if registered {
                        subscribers.remove(&id);
                        debug!("disconnect subscriber: id={}", id);
                    }
                }
            }),
            on_disconnect,
        )
    }

    /// Number of currently connected subscribers
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }

    pub fn is_unpacking(&self) -> bool {
        self.inner.options.unpack
    }

    pub fn options(&self) -> CellOptions {
        self.inner.options
    }

    fn notify_all(&self) {
        let subscribers: Vec<Subscriber<T>> =
            lock(&self.inner.subscribers).values().cloned().collect();
        debug!("schedule notification round: subscribers={}", subscribers.len());
        for subscriber in subscribers {
            let weak = Arc::downgrade(&self.inner);
            let id = subscriber.id();
            let task = Task::new(id, move || deliver(weak, subscriber));
            self.inner.scheduler.schedule(task, self.inner.sink.clone());
        }
    }
}

/// Delivers the value the cell holds at the time the task runs, which can
/// be newer than the one that triggered the round.
fn deliver<T: CellValue>(
    cell: Weak<Inner<T>>,
    subscriber: Subscriber<T>,
) -> Result<(), DeliveryError> {
    let id = subscriber.id();
    let (value, options) = match cell.upgrade() {
        Some(inner) => {
            let value = lock(&inner.value).clone();
            (value, inner.options)
        }
        None => {
            trace!("cell dropped before delivery: subscriber={}", id);
            return Ok(());
        }
    };

    let spread = if options.unpack {
        value.elements().filter(|e| !e.is_empty())
    } else {
        None
    };
    let delivery = match spread {
        Some(elements) => Delivery::Spread(elements),
        None if options.presence.admits(&value) => Delivery::Value(value),
        None => {
            return Err(DeliveryError::AbsentValue {
                subscriber: id,
                value: format!("{:?}", value),
            })
        }
    };

    trace!("deliver: subscriber={}", id);
    subscriber
        .call(delivery)
        .map_err(|source| DeliveryError::Callback {
            subscriber: id,
            source,
        })
}

impl<T: CellValue + Display> Display for ObservableCell<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let value = lock(&self.inner.value);
        Display::fmt(&*value, f)
    }
}

impl<T: CellValue> Debug for ObservableCell<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableCell")
            .field("value", &*lock(&self.inner.value))
            .field("options", &self.inner.options)
            .field("subscribers", &lock(&self.inner.subscribers).len())
            .finish()
    }
}

/// Builds a cell with non-default options or collaborators
pub struct CellBuilder<T: CellValue> {
    value: T,
    options: CellOptions,
    scheduler: Option<Arc<dyn Scheduler>>,
    sink: Option<Arc<dyn FailureSink>>,
}

impl<T> CellBuilder<T>
where
    T: CellValue + Send + 'static,
{
    pub fn new(value: T) -> Self {
        CellBuilder {
            value,
            options: CellOptions::default(),
            scheduler: None,
            sink: None,
        }
    }

    pub fn unpack(mut self, unpack: bool) -> Self {
        self.options.unpack = unpack;
        self
    }

    pub fn presence(mut self, presence: Presence) -> Self {
        self.options.presence = presence;
        self
    }

    pub fn options(mut self, options: CellOptions) -> Self {
        self.options = options;
        self
    }

    /// Scheduler running the delivery tasks. Defaults to `TokioScheduler`
    /// with the `tokio` feature, `InlineScheduler` without.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Receiver of delivery failures. Defaults to `LogSink`.
    pub fn sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> ObservableCell<T> {
        ObservableCell {
            inner: Arc::new(Inner {
                value: Mutex::new(self.value),
                subscribers: Mutex::new(HashMap::new()),
                options: self.options,
                scheduler: self.scheduler.unwrap_or_else(default_scheduler),
                sink: self.sink.unwrap_or_else(|| Arc::new(LogSink)),
            }),
        }
    }
}

#[cfg(feature = "tokio")]
fn default_scheduler() -> Arc<dyn Scheduler> {
    Arc::new(crate::scheduler::TokioScheduler::new())
}

#[cfg(not(feature = "tokio"))]
fn default_scheduler() -> Arc<dyn Scheduler> {
    Arc::new(crate::scheduler::InlineScheduler)
}
