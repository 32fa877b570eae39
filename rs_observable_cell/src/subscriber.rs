use std::fmt::{self, Debug, Display, Formatter};
use std::sync::{Arc, Mutex, Weak};

use crate::error::CallbackError;
use crate::lock;
use crate::value::{CellValue, Delivery};

pub(crate) type Callback<T> = dyn Fn(Delivery<T>) -> Result<(), CallbackError> + Send + Sync;

/// Identity of a subscriber callback. Two clones of the same `Subscriber`
/// share it, two separately created subscribers never do.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriberId(usize);

impl Display for SubscriberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A callback that can be connected to a cell
pub struct Subscriber<T: CellValue>(Arc<Callback<T>>);

impl<T: CellValue> Subscriber<T> {
    /// Creates a subscriber from a callback that may fail. Errors are
    /// reported to the cell's failure sink.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Delivery<T>) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        Subscriber(Arc::new(callback))
    }

    /// Creates a subscriber from a callback that never fails
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn(Delivery<T>) + Send + Sync + 'static,
    {
        Subscriber::new(move |d| {
            callback(d);
            Ok(())
        })
    }

    pub fn id(&self) -> SubscriberId {
        SubscriberId(Arc::as_ptr(&self.0) as *const () as usize)
    }

    pub(crate) fn call(&self, delivery: Delivery<T>) -> Result<(), CallbackError> {
        (self.0)(delivery)
    }

    /// Weak handle to the callback. While it lives, the callback's address
    /// cannot be handed out to another subscriber.
    pub(crate) fn downgrade(&self) -> Weak<Callback<T>> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn is_callback(&self, callback: &Weak<Callback<T>>) -> bool {
        Weak::ptr_eq(&Arc::downgrade(&self.0), callback)
    }
}

impl<T: CellValue> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Subscriber(self.0.clone())
    }
}

impl<T: CellValue> Debug for Subscriber<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscriber").field(&self.id()).finish()
    }
}

type Action = Box<dyn FnOnce() + Send>;

struct DisposerState {
    detach: Option<Action>,
    on_disconnect: Option<Action>,
}

/// Ends a subscription.
///
/// Dropping a disposer leaves the subscription in place. A callback that
/// holds a handle to its own cell keeps that cell alive until `dispose` is
/// called.
#[derive(Clone)]
pub struct Disposer(Arc<Mutex<DisposerState>>);

impl Disposer {
    pub(crate) fn new(detach: Action, on_disconnect: Option<Action>) -> Self {
        Disposer(Arc::new(Mutex::new(DisposerState {
            detach: Some(detach),
            on_disconnect,
        })))
    }

    /// Removes the callback from its cell, then runs the disconnect handler
    /// if one was given. Calling it again does nothing.
    pub fn dispose(&self) {
        let (detach, on_disconnect) = {
            let mut state = lock(&self.0);
            (state.detach.take(), state.on_disconnect.take())
        };
        if let Some(detach) = detach {
            detach();
        }
        if let Some(on_disconnect) = on_disconnect {
            on_disconnect();
        }
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.0).detach.is_none()
    }
}

impl Debug for Disposer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{Disposer, Subscriber};
    use crate::value::Delivery;

    #[test]
    fn clones_share_identity() {
        let s1 = Subscriber::<i32>::from_fn(|_| ());
        let s2 = s1.clone();
        let s3 = Subscriber::<i32>::from_fn(|_| ());
        assert_eq!(s1.id(), s2.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    fn weak_handle_matches_only_its_own_callback() {
        let s1 = Subscriber::<i32>::from_fn(|_| ());
        let s2 = Subscriber::<i32>::from_fn(|_| ());
        let w1 = s1.downgrade();
        assert!(s1.is_callback(&w1));
        assert!(s1.clone().is_callback(&w1));
        assert!(!s2.is_callback(&w1));
    }

    #[test]
    fn call_forwards_errors() {
        let s = Subscriber::<i32>::new(|d| match d {
            Delivery::Value(v) if v > 0 => Ok(()),
            _ => Err("negative".into()),
        });
        assert!(s.call(Delivery::Value(1)).is_ok());
        assert!(s.call(Delivery::Value(-1)).is_err());
    }

    #[test]
    fn dispose_runs_each_action_once() {
        let detached = Arc::new(AtomicUsize::new(0));
        let disconnected = Arc::new(AtomicUsize::new(0));
        let d = {
            let detached = detached.clone();
            let disconnected = disconnected.clone();
            Disposer::new(
                Box::new(move || {
                    detached.fetch_add(1, Ordering::SeqCst);
                }),
                Some(Box::new(move || {
                    disconnected.fetch_add(1, Ordering::SeqCst);
                })),
            )
        };
        assert!(!d.is_disposed());
        let d2 = d.clone();
        d.dispose();
        d2.dispose();
        d.dispose();
        assert!(d.is_disposed());
        assert_eq!(detached.load(Ordering::SeqCst), 1);
        assert_eq!(disconnected.load(Ordering::SeqCst), 1);
    }
}
