//! Promise state machine and settlement plumbing.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::ProxyError;

/// Terminal outcome carried over the settlement channel.
enum Outcome<T> {
    Resolved(T),
    Rejected(ProxyError),
    Aborted,
}

/// How an awaited promise ended, cancellation included.
///
/// Aborting resolves the promise with no value, so cancellation composes
/// in call chains without forcing error handling at every site.
#[derive(Debug, PartialEq, Eq)]
pub enum Settlement<T> {
    Resolved(T),
    Aborted,
}

impl<T> Settlement<T> {
    /// The resolved value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Settlement::Resolved(value) => Some(value),
            Settlement::Aborted => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Settlement::Aborted)
    }
}

type AbortFn = Box<dyn FnOnce() + Send>;

struct Inner<T> {
    /// Settlement sender; `None` once a terminal transition happened.
    tx: Option<oneshot::Sender<Outcome<T>>>,
    /// Abort handlers, in registration order.
    handlers: Vec<AbortFn>,
    /// True once the handlers ran; they never run twice.
    handlers_fired: bool,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Shared<T> {
    /// First terminal transition wins; later calls find no sender.
    fn settle(&self, outcome: Outcome<T>) {
        let tx = match self.inner.lock() {
            Ok(mut inner) => inner.tx.take(),
            Err(_) => None,
        };
        if let Some(tx) = tx {
            // The receiver may already be gone; nothing to do then.
            let _ = tx.send(outcome);
        }
    }

    fn abort(&self) {
        let (handlers, tx) = match self.inner.lock() {
            Ok(mut inner) => {
                let handlers = if inner.handlers_fired {
                    Vec::new()
                } else {
                    inner.handlers_fired = true;
                    std::mem::take(&mut inner.handlers)
                };
                (handlers, inner.tx.take())
            }
            Err(_) => return,
        };

        // Run handlers outside the lock; a handler may re-enter abort().
        for handler in handlers {
            handler();
        }

        if let Some(tx) = tx {
            let _ = tx.send(Outcome::Aborted);
        }
    }
}

/// Settles the promise as `Incomplete` if every settler is dropped first.
struct SettlerGuard<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Drop for SettlerGuard<T> {
    fn drop(&mut self) {
        self.shared
            .settle(Outcome::Rejected(ProxyError::Incomplete));
    }
}

/// Settlement side handed to the executor.
pub struct Settler<T> {
    shared: Arc<Shared<T>>,
    _guard: Arc<SettlerGuard<T>>,
}

impl<T> Clone for Settler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            _guard: self._guard.clone(),
        }
    }
}

impl<T> Settler<T> {
    /// Resolve the promise. No-op after any terminal transition.
    pub fn resolve(&self, value: T) {
        self.shared.settle(Outcome::Resolved(value));
    }

    /// Reject the promise. No-op after any terminal transition.
    pub fn reject(&self, error: ProxyError) {
        self.shared.settle(Outcome::Rejected(error));
    }

    /// Register an abort handler.
    ///
    /// Handlers run exactly once, in registration order, the first time
    /// the promise is aborted. A handler registered after that point runs
    /// immediately.
    pub fn on_abort(&self, handler: impl FnOnce() + Send + 'static) {
        let fire_now = match self.shared.inner.lock() {
            Ok(mut inner) => {
                if inner.handlers_fired {
                    true
                } else {
                    inner.handlers.push(Box::new(handler));
                    return;
                }
            }
            Err(_) => return,
        };
        if fire_now {
            handler();
        }
    }
}

/// Cloneable handle for aborting from another task.
pub struct AbortHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for AbortHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> AbortHandle<T> {
    /// Abort the promise. Idempotent; safe at any point of the lifecycle.
    pub fn abort(&self) {
        self.shared.abort();
    }
}

/// A single-settlement asynchronous result with an explicit abort hook.
///
/// Awaiting yields `Ok(Settlement::Resolved(value))`,
/// `Ok(Settlement::Aborted)`, or `Err(error)` on rejection.
pub struct AbortablePromise<T> {
    shared: Arc<Shared<T>>,
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> AbortablePromise<T> {
    /// Build a promise by running `executor` with its settler.
    pub fn new(executor: impl FnOnce(Settler<T>)) -> Self {
        let (tx, rx) = oneshot::channel();
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                tx: Some(tx),
                handlers: Vec::new(),
                handlers_fired: false,
            }),
        });
        executor(Settler {
            shared: shared.clone(),
            _guard: Arc::new(SettlerGuard {
                shared: shared.clone(),
            }),
        });
        Self { shared, rx }
    }

    /// Abort in place; equivalent to `abort_handle().abort()`.
    pub fn abort(&self) {
        self.shared.abort();
    }

    /// Handle for aborting the promise from elsewhere.
    pub fn abort_handle(&self) -> AbortHandle<T> {
        AbortHandle {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Future for AbortablePromise<T> {
    type Output = Result<Settlement<T>, ProxyError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(Outcome::Resolved(value)) => Ok(Settlement::Resolved(value)),
            Ok(Outcome::Aborted) => Ok(Settlement::Aborted),
            Ok(Outcome::Rejected(error)) => Err(error),
            // The settler was dropped without settling.
            Err(_) => Err(ProxyError::Incomplete),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn resolves_with_value() {
        let promise = AbortablePromise::new(|settler| settler.resolve(7));
        assert_eq!(promise.await.unwrap(), Settlement::Resolved(7));
    }

    #[tokio::test]
    async fn first_settlement_wins() {
        let promise = AbortablePromise::<u32>::new(|settler| {
            settler.resolve(1);
            settler.resolve(2);
            settler.reject(ProxyError::Incomplete);
        });
        assert_eq!(promise.await.unwrap(), Settlement::Resolved(1));
    }

    #[tokio::test]
    async fn abort_resolves_without_value() {
        let mut _held = None;
        let promise = AbortablePromise::<u32>::new(|settler| _held = Some(settler));
        promise.abort();
        assert!(promise.await.unwrap().is_aborted());
    }

    #[tokio::test]
    async fn abort_runs_handlers_once_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut _held = None;
        let promise = AbortablePromise::<u32>::new(|settler| {
            for tag in ["first", "second"] {
                let calls = calls.clone();
                let order = order.clone();
                settler.on_abort(move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    order.lock().unwrap().push(tag);
                });
            }
            _held = Some(settler);
        });

        promise.abort();
        promise.abort();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert!(promise.await.unwrap().is_aborted());
    }

    #[tokio::test]
    async fn abort_after_settlement_keeps_outcome_but_fires_handlers() {
        let released = Arc::new(AtomicUsize::new(0));
        let released_in = released.clone();

        let promise = AbortablePromise::new(move |settler| {
            let released = released_in.clone();
            settler.on_abort(move || {
                released.fetch_add(1, Ordering::SeqCst);
            });
            settler.resolve(42);
        });

        promise.abort();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        // The already-settled outcome is preserved.
        assert_eq!(promise.await.unwrap(), Settlement::Resolved(42));
    }

    #[tokio::test]
    async fn handler_registered_after_abort_runs_immediately() {
        let fired = Arc::new(AtomicUsize::new(0));

        let mut late_settler = None;
        let promise = AbortablePromise::<u32>::new(|settler| {
            late_settler = Some(settler);
        });
        promise.abort();

        let fired_in = fired.clone();
        late_settler.unwrap().on_abort(move || {
            fired_in.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(promise.await.unwrap().is_aborted());
    }

    #[tokio::test]
    async fn dropped_settler_maps_to_incomplete() {
        let promise = AbortablePromise::<u32>::new(|_| {});
        assert!(matches!(promise.await, Err(ProxyError::Incomplete)));
    }

    #[tokio::test]
    async fn rejection_carries_error() {
        let promise = AbortablePromise::<u32>::new(|settler| {
            settler.reject(crate::error::TransportFault::new("refused").into());
        });
        match promise.await {
            Err(ProxyError::Transport(fault)) => assert_eq!(fault.message(), "refused"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
