use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{trace, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;
type OnResolve<T> = Box<dyn FnOnce(T) + Send + 'static>;
type OnReject<E> = Box<dyn FnOnce(E) + Send + 'static>;
type OnAbandon = Box<dyn FnOnce(String) + Send + 'static>;

/// Observable state of a [`Promise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Resolved,
    Rejected,
    /// The task that was meant to settle the promise panicked.
    Abandoned,
}

enum State<T, E> {
    Pending,
    Resolved(T),
    Rejected(E),
    Abandoned(String),
}

impl<T, E> State<T, E> {
    fn status(&self) -> Status {
        match self {
            State::Pending => Status::Pending,
            State::Resolved(_) => Status::Resolved,
            State::Rejected(_) => Status::Rejected,
            State::Abandoned(_) => Status::Abandoned,
        }
    }
}

struct Continuation<T, E> {
    on_resolve: OnResolve<T>,
    on_reject: OnReject<E>,
    on_abandon: Option<OnAbandon>,
}

struct Inner<T, E> {
    state: State<T, E>,
    continuations: Vec<Continuation<T, E>>,
    wakers: Vec<Waker>,
    dispatcher: Option<UnboundedSender<Job>>,
}

/// A value that settles once, either resolved with `T` or rejected with `E`.
///
/// Clones share the same state. Continuations registered with
/// [`Promise::then`] fire exactly once, in registration order, on a
/// dispatcher task owned by the promise; they never run on the caller's
/// stack while a runtime is available. A promise can also be awaited
/// directly, yielding `Result<T, E>`; awaiting an abandoned promise panics
/// with the panic message.
pub struct Promise<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.inner.lock().state.status();
        f.debug_struct("Promise").field("status", &status).finish()
    }
}

impl<T, E> Default for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates a pending promise.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Pending,
                continuations: Vec::new(),
                wakers: Vec::new(),
                dispatcher: None,
            })),
        }
    }

    pub fn resolved(value: T) -> Self {
        let promise = Self::new();
        promise.resolve(value);
        promise
    }

    pub fn rejected(error: E) -> Self {
        let promise = Self::new();
        promise.reject(error);
        promise
    }

    /// Runs `future` as a spawned task and settles with its output.
    ///
    /// The task is detached: it runs to completion even if every handle to
    /// the promise is dropped. If the task panics the promise is abandoned.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let promise = Self::new();
        let settle = promise.clone();
        tokio::spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(value)) => settle.resolve(value),
                Ok(Err(error)) => settle.reject(error),
                Err(payload) => settle.abandon(panic_message(payload.as_ref())),
            };
        });
        promise
    }

    /// Resolves the promise. Returns `false` if it had already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(State::Resolved(value))
    }

    /// Rejects the promise. Returns `false` if it had already settled.
    pub fn reject(&self, error: E) -> bool {
        self.settle(State::Rejected(error))
    }

    /// Marks the promise as never going to settle. Returns `false` if it had
    /// already settled.
    ///
    /// Plain continuations are dropped; awaiting the promise panics.
    pub fn abandon(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        warn!(reason = %reason, "promise abandoned");
        self.settle(State::Abandoned(reason))
    }

    pub fn status(&self) -> Status {
        self.inner.lock().state.status()
    }

    /// Returns the settled result, or `None` while pending or abandoned.
    pub fn peek(&self) -> Option<Result<T, E>> {
        match &self.inner.lock().state {
            State::Pending | State::Abandoned(_) => None,
            State::Resolved(value) => Some(Ok(value.clone())),
            State::Rejected(error) => Some(Err(error.clone())),
        }
    }

    /// Registers a pair of continuations. Exactly one of them fires, once.
    ///
    /// Registering on a settled promise schedules the matching continuation
    /// with the stored value.
    pub fn then<R, J>(&self, on_resolve: R, on_reject: J)
    where
        R: FnOnce(T) + Send + 'static,
        J: FnOnce(E) + Send + 'static,
    {
        self.register(Continuation {
            on_resolve: Box::new(on_resolve),
            on_reject: Box::new(on_reject),
            on_abandon: None,
        });
    }

    /// Like [`Promise::then`], with a third continuation for abandonment.
    pub(crate) fn then_or_abandon<R, J, A>(&self, on_resolve: R, on_reject: J, on_abandon: A)
    where
        R: FnOnce(T) + Send + 'static,
        J: FnOnce(E) + Send + 'static,
        A: FnOnce(String) + Send + 'static,
    {
        self.register(Continuation {
            on_resolve: Box::new(on_resolve),
            on_reject: Box::new(on_reject),
            on_abandon: Some(Box::new(on_abandon)),
        });
    }

    fn register(&self, continuation: Continuation<T, E>) {
        let inline = {
            let mut inner = self.inner.lock();
            if matches!(inner.state, State::Pending) {
                inner.continuations.push(continuation);
                return;
            }

            let job: Job = match &inner.state {
                State::Pending => return,
                State::Resolved(value) => {
                    let value = value.clone();
                    Box::new(move || (continuation.on_resolve)(value))
                }
                State::Rejected(error) => {
                    let error = error.clone();
                    Box::new(move || (continuation.on_reject)(error))
                }
                State::Abandoned(reason) => match continuation.on_abandon {
                    Some(on_abandon) => {
                        let reason = reason.clone();
                        Box::new(move || on_abandon(reason))
                    }
                    None => return,
                },
            };
            dispatch(&mut inner, vec![job])
        };

        inline.into_iter().for_each(|job| job());
    }

    fn settle(&self, next: State<T, E>) -> bool {
        let (inline, wakers) = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, State::Pending) {
                return false;
            }

            let continuations = std::mem::take(&mut inner.continuations);
            let jobs: Vec<Job> = match &next {
                State::Resolved(value) => continuations
                    .into_iter()
                    .map(|c| {
                        let value = value.clone();
                        Box::new(move || (c.on_resolve)(value)) as Job
                    })
                    .collect(),
                State::Rejected(error) => continuations
                    .into_iter()
                    .map(|c| {
                        let error = error.clone();
                        Box::new(move || (c.on_reject)(error)) as Job
                    })
                    .collect(),
                State::Abandoned(reason) => continuations
                    .into_iter()
                    .filter_map(|c| c.on_abandon)
                    .map(|on_abandon| {
                        let reason = reason.clone();
                        Box::new(move || on_abandon(reason)) as Job
                    })
                    .collect(),
                State::Pending => Vec::new(),
            };

            inner.state = next;
            let inline = dispatch(&mut inner, jobs);
            (inline, std::mem::take(&mut inner.wakers))
        };

        wakers.into_iter().for_each(Waker::wake);
        inline.into_iter().for_each(|job| job());
        true
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Queues jobs on the promise's dispatcher, starting it on first use.
///
/// Sending happens under the promise lock so jobs queued by concurrent
/// `settle`/`then` calls keep their order. Jobs that cannot be queued because
/// no runtime is available are handed back to run inline, after the lock is
/// released.
fn dispatch<T, E>(inner: &mut Inner<T, E>, jobs: Vec<Job>) -> Vec<Job> {
    if jobs.is_empty() {
        return jobs;
    }

    if inner.dispatcher.is_none() {
        let Ok(handle) = Handle::try_current() else {
            return jobs;
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        handle.spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
        });
        trace!("promise dispatcher started");
        inner.dispatcher = Some(tx);
    }

    let mut inline = Vec::new();
    if let Some(tx) = &inner.dispatcher {
        for job in jobs {
            if let Err(mpsc::error::SendError(job)) = tx.send(job) {
                inline.push(job);
            }
        }
    }
    inline
}

/// Future returned by awaiting a [`Promise`].
pub struct Wait<T, E> {
    promise: Promise<T, E>,
}

impl<T, E> Future for Wait<T, E>
where
    T: Clone,
    E: Clone,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.promise.inner.lock();
        if let State::Abandoned(reason) = &inner.state {
            let reason = reason.clone();
            drop(inner);
            panic!("awaited an abandoned promise: {reason}");
        }
        match &inner.state {
            State::Resolved(value) => Poll::Ready(Ok(value.clone())),
            State::Rejected(error) => Poll::Ready(Err(error.clone())),
            State::Pending | State::Abandoned(_) => {
                if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T, E> IntoFuture for Promise<T, E>
where
    T: Clone,
    E: Clone,
{
    type Output = Result<T, E>;
    type IntoFuture = Wait<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        Wait { promise: self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(log: &Log, entry: impl Into<String>) {
        log.lock().push(entry.into());
    }

    #[tokio::test]
    async fn settles_only_once() {
        let promise = Promise::<u32, String>::new();
        assert_eq!(promise.status(), Status::Pending);

        assert!(promise.resolve(1));
        assert!(!promise.resolve(2));
        assert!(!promise.reject("late".to_string()));

        assert_eq!(promise.status(), Status::Resolved);
        assert_eq!(promise.await, Ok(1));
    }

    #[tokio::test]
    async fn continuations_fire_in_registration_order() {
        let promise = Promise::<u32, String>::new();
        let log: Log = Arc::default();

        for name in ["first", "second", "third"] {
            let log = log.clone();
            promise.then(
                move |v| record(&log, format!("{name}:{v}")),
                |_| unreachable!(),
            );
        }
        let (tx, rx) = oneshot::channel();
        promise.then(move |_| drop(tx.send(())), |_| unreachable!());

        promise.resolve(7);
        rx.await.unwrap();

        assert_eq!(*log.lock(), vec!["first:7", "second:7", "third:7"]);
    }

    #[tokio::test]
    async fn continuations_run_asynchronously() {
        let promise = Promise::<u32, String>::new();
        let log: Log = Arc::default();
        let (tx, rx) = oneshot::channel();
        {
            let log = log.clone();
            promise.then(
                move |_| {
                    record(&log, "fired");
                    let _ = tx.send(());
                },
                |_| unreachable!(),
            );
        }

        promise.resolve(1);
        // single-threaded runtime: the dispatcher has not been polled yet
        assert!(log.lock().is_empty());

        rx.await.unwrap();
        assert_eq!(*log.lock(), vec!["fired"]);
    }

    #[tokio::test]
    async fn late_registration_receives_stored_error() {
        let promise = Promise::<u32, String>::rejected("boom".to_string());
        let (tx, rx) = oneshot::channel();

        promise.then(|_| unreachable!(), move |e| drop(tx.send(e)));

        assert_eq!(rx.await.unwrap(), "boom");
        assert_eq!(promise.peek(), Some(Err("boom".to_string())));
    }

    #[test]
    fn without_runtime_continuations_run_inline() {
        let promise = Promise::<u32, String>::new();
        let log: Log = Arc::default();
        let sink = log.clone();

        promise.then(move |v| record(&sink, v.to_string()), |_| unreachable!());
        promise.resolve(3);

        assert_eq!(*log.lock(), vec!["3"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn spawned_future_settles_promise() {
        let ok = Promise::<u32, String>::spawn(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(5)
        });
        let err = Promise::<u32, String>::spawn(async { Err("no".to_string()) });

        assert_eq!(ok.clone().await, Ok(5));
        assert_eq!(err.await, Err("no".to_string()));
        assert_eq!(ok.status(), Status::Resolved);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_settlers_pick_one_winner() {
        let promise = Promise::<usize, usize>::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let promise = promise.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    promise.resolve(i)
                } else {
                    promise.reject(i)
                }
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_ne!(promise.status(), Status::Pending);
    }

    #[tokio::test]
    async fn panicking_task_abandons_the_promise() {
        let promise = Promise::<u32, String>::spawn(async {
            if true {
                panic!("connection pool poisoned");
            }
            Ok(0)
        });

        let waiter = tokio::spawn(promise.clone().into_future());
        let err = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_panic());
        assert_eq!(promise.status(), Status::Abandoned);
        assert_eq!(promise.peek(), None);
        assert!(!promise.resolve(1));
    }

    #[tokio::test]
    async fn abandonment_skips_plain_continuations() {
        let promise = Promise::<u32, String>::new();
        let (tx, rx) = oneshot::channel::<()>();
        promise.then(move |_| drop(tx), |_| {});

        assert!(promise.abandon("worker gone"));
        assert!(!promise.abandon("again"));
        // the continuation was dropped without running, closing the channel
        assert!(rx.await.is_err());
    }
}
