//! Cold upstream publishers.
//!
//! Each subscribe starts an independent run, which is what a multicast source
//! expects from the upstream it shares.

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::error::{RuntimeError, StreamFailure};
use crate::subscriber::{Publisher, Subscriber, Subscription};

/// Emits a fixed list of items synchronously on the subscribing thread, then
/// completes.
#[derive(Debug, Clone)]
pub struct IterPublisher<T> {
    items: Arc<[T]>,
}

impl<T> IterPublisher<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }
}

impl<T> Publisher<T> for IterPublisher<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let flag = Arc::new(CancelFlag::default());
        subscriber.on_subscribe(Arc::clone(&flag) as Arc<dyn Subscription>);

        for item in self.items.iter() {
            if flag.is_cancelled() {
                return;
            }
            subscriber.on_item(item.clone());
        }
        if !flag.is_cancelled() {
            subscriber.on_complete();
        }
    }
}

#[derive(Default)]
struct CancelFlag(AtomicBool);

impl CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Subscription for CancelFlag {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Pumps a freshly built [`Stream`] into each subscriber on a tokio task.
///
/// Cancelling the subscription aborts the task.
pub struct StreamPublisher<F> {
    factory: F,
    runtime: Handle,
}

impl<F> StreamPublisher<F> {
    pub fn new(factory: F, runtime: Handle) -> Self {
        Self { factory, runtime }
    }

    /// Use the runtime the caller is running on.
    pub fn current(factory: F) -> Result<Self, RuntimeError> {
        Ok(Self::new(factory, Handle::try_current()?))
    }
}

impl<T, F, S> Publisher<T> for StreamPublisher<F>
where
    T: Send + 'static,
    F: Fn() -> S + Send + Sync,
    S: Stream<Item = Result<T, StreamFailure>> + Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let pump = Arc::new(PumpSubscription::default());
        subscriber.on_subscribe(Arc::clone(&pump) as Arc<dyn Subscription>);
        if pump.is_cancelled() {
            return;
        }

        let stream = (self.factory)();
        let task_pump = Arc::clone(&pump);
        let task = self.runtime.spawn(async move {
            let mut stream = std::pin::pin!(stream);
            while let Some(next) = stream.next().await {
                if task_pump.is_cancelled() {
                    return;
                }
                match next {
                    Ok(item) => subscriber.on_item(item),
                    Err(failure) => {
                        subscriber.on_failure(failure);
                        return;
                    }
                }
            }
            if !task_pump.is_cancelled() {
                subscriber.on_complete();
            }
        });
        pump.set_task(task.abort_handle());
    }
}

#[derive(Default)]
struct PumpSubscription {
    cancelled: AtomicBool,
    task: Mutex<Option<AbortHandle>>,
}

impl PumpSubscription {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn set_task(&self, task: AbortHandle) {
        let mut slot = self.task.lock();
        if self.is_cancelled() {
            task.abort();
            return;
        }
        *slot = Some(task);
    }
}

impl Subscription for PumpSubscription {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}
