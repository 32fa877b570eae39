//! Deferred execution of delivery tasks. Every task runs isolated: whatever
//! it does, failures end up in a `FailureSink` and never unwind into the
//! code that scheduled it.

use log::trace;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::error::DeliveryError;
use crate::lock;
use crate::sink::FailureSink;
use crate::subscriber::SubscriberId;

type Job = Box<dyn FnOnce() -> Result<(), DeliveryError> + Send>;

/// One delivery to one subscriber
pub struct Task {
    subscriber: SubscriberId,
    job: Job,
}

impl Task {
    pub fn new<F>(subscriber: SubscriberId, job: F) -> Self
    where
        F: FnOnce() -> Result<(), DeliveryError> + Send + 'static,
    {
        Task {
            subscriber,
            job: Box::new(job),
        }
    }

    pub fn subscriber(&self) -> SubscriberId {
        self.subscriber
    }

    /// Runs the task, turning a panic into `DeliveryError::Panicked`
    pub fn run(self) -> Result<(), DeliveryError> {
        let subscriber = self.subscriber;
        match catch_unwind(AssertUnwindSafe(self.job)) {
            Ok(r) => r,
            Err(payload) => Err(DeliveryError::Panicked {
                subscriber,
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Runs the task and hands any failure to `sink`
    pub fn run_reporting(self, sink: &dyn FailureSink) {
        trace!("run delivery task: subscriber={}", self.subscriber);
        if let Err(e) = self.run() {
            sink.report(&e);
        }
    }
}

impl Debug for Task {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("subscriber", &self.subscriber)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs tasks at some point after `schedule` was called. Implementations
/// must not let a task's failure escape `schedule`.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Task, sink: Arc<dyn FailureSink>);
}

/// Runs every task right away, on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn schedule(&self, task: Task, sink: Arc<dyn FailureSink>) {
        task.run_reporting(sink.as_ref());
    }
}

/// Keeps tasks in a FIFO queue until `run_pending` is called
#[derive(Default)]
pub struct QueuedScheduler {
    queue: Mutex<VecDeque<(Task, Arc<dyn FailureSink>)>>,
}

impl QueuedScheduler {
    pub fn new() -> Self {
        QueuedScheduler::default()
    }

    /// Number of tasks waiting to run
    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Runs queued tasks until the queue is empty, including tasks queued by
    /// the tasks themselves. Returns how many tasks ran.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        loop {
            // the lock is released before the task runs, tasks may schedule
            let next = lock(&self.queue).pop_front();
            match next {
                Some((task, sink)) => {
                    task.run_reporting(sink.as_ref());
                    count += 1;
                }
                None => break,
            }
        }
        count
    }
}

impl Scheduler for QueuedScheduler {
    fn schedule(&self, task: Task, sink: Arc<dyn FailureSink>) {
        lock(&self.queue).push_back((task, sink));
    }
}

impl Debug for QueuedScheduler {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(feature = "tokio")]
pub use self::tokio_scheduler::TokioScheduler;

#[cfg(feature = "tokio")]
mod tokio_scheduler {
    use log::warn;
    use std::sync::Arc;
    use tokio::runtime::Handle;

    use super::{Scheduler, Task};
    use crate::sink::FailureSink;

    /// Spawns every task on a tokio runtime. Without an explicit handle the
    /// runtime of the calling context is used; outside any runtime the task
    /// runs inline.
    #[derive(Debug, Default, Clone)]
    pub struct TokioScheduler {
        handle: Option<Handle>,
    }

    impl TokioScheduler {
        pub fn new() -> Self {
            TokioScheduler { handle: None }
        }

        pub fn with_handle(handle: Handle) -> Self {
            TokioScheduler {
                handle: Some(handle),
            }
        }
    }

    impl Scheduler for TokioScheduler {
        fn schedule(&self, task: Task, sink: Arc<dyn FailureSink>) {
            let handle = match &self.handle {
                Some(h) => Some(h.clone()),
                None => Handle::try_current().ok(),
            };
            match handle {
                Some(h) => {
                    h.spawn(async move {
                        task.run_reporting(sink.as_ref());
                    });
                }
                None => {
                    warn!(
                        "no tokio runtime available, delivering inline: subscriber={}",
                        task.subscriber()
                    );
                    task.run_reporting(sink.as_ref());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::{InlineScheduler, QueuedScheduler, Scheduler, Task};
    use crate::error::DeliveryError;
    use crate::sink::FailureSink;
    use crate::subscriber::Subscriber;

    fn collecting_sink() -> (Arc<dyn FailureSink>, Arc<Mutex<Vec<String>>>) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        let sink: Arc<dyn FailureSink> = Arc::new(move |err: &DeliveryError| {
            e.lock().unwrap().push(err.to_string());
        });
        (sink, errors)
    }

    #[test]
    fn panics_are_reported_not_propagated() {
        let id = Subscriber::<i32>::from_fn(|_| ()).id();
        let (sink, errors) = collecting_sink();
        InlineScheduler.schedule(Task::new(id, || panic!("boom")), sink);
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("boom"));
    }

    #[test]
    fn queue_runs_only_on_demand() {
        let id = Subscriber::<i32>::from_fn(|_| ()).id();
        let (sink, errors) = collecting_sink();
        let ran = Arc::new(AtomicUsize::new(0));
        let q = QueuedScheduler::new();
        for _ in 0..3 {
            let ran = ran.clone();
            q.schedule(
                Task::new(id, move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
                sink.clone(),
            );
        }
        assert_eq!(q.pending(), 3);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(q.run_pending(), 3);
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(q.pending(), 0);
        assert!(errors.lock().unwrap().is_empty());
    }

    #[test]
    fn queue_drains_tasks_scheduled_while_running() {
        let id = Subscriber::<i32>::from_fn(|_| ()).id();
        let (sink, _) = collecting_sink();
        let q = Arc::new(QueuedScheduler::new());
        let inner_q = q.clone();
        let inner_sink = sink.clone();
        q.schedule(
            Task::new(id, move || {
                inner_q.schedule(Task::new(id, || Ok(())), inner_sink);
                Ok(())
            }),
            sink,
        );
        assert_eq!(q.run_pending(), 2);
    }

    #[cfg(feature = "tokio")]
    #[tokio::test(flavor = "current_thread")]
    async fn tokio_scheduler_defers_to_runtime() {
        use super::TokioScheduler;
        use tokio::sync::mpsc;

        let id = Subscriber::<i32>::from_fn(|_| ()).id();
        let (sink, _) = collecting_sink();
        let (tx, mut rx) = mpsc::unbounded_channel();
        TokioScheduler::new().schedule(
            Task::new(id, move || {
                let _ = tx.send(7);
                Ok(())
            }),
            sink,
        );
        // current_thread runtime: the spawned task cannot have run yet
        assert!(rx.try_recv().is_err());
        assert_eq!(rx.recv().await, Some(7));
    }
}
