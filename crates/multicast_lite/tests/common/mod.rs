#![allow(dead_code)]

use multicast_lite::{
    Cancellable, ConnectableSource, Connection, MulticastSource, NoopSubscription, Publisher,
    StreamFailure, Subscriber, Subscription, TimerAction, TimerHandle, UpstreamCancel,
    WorkerClock,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Hook = Box<dyn FnOnce() + Send>;

/// A cold upstream pushed by hand from the test body.
pub struct Driver<T> {
    current: Mutex<Option<Arc<dyn Subscriber<T>>>>,
    subscribes: AtomicUsize,
}

impl<T> Driver<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(None),
            subscribes: AtomicUsize::new(0),
        })
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn emit(&self, item: T) {
        let current = self.current.lock().clone();
        if let Some(subscriber) = current {
            subscriber.on_item(item);
        }
    }

    pub fn complete(&self) {
        let current = self.current.lock().take();
        if let Some(subscriber) = current {
            subscriber.on_complete();
        }
    }

    pub fn fail(&self, failure: StreamFailure) {
        let current = self.current.lock().take();
        if let Some(subscriber) = current {
            subscriber.on_failure(failure);
        }
    }
}

impl<T: Send + 'static> Publisher<T> for Driver<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        *self.current.lock() = Some(Arc::clone(&subscriber));
        subscriber.on_subscribe(Arc::new(NoopSubscription));
    }
}

/// A multicast source that counts every connect and upstream cancel it receives.
pub struct Probe<T> {
    inner: MulticastSource<T>,
    connects: AtomicUsize,
    cancels: AtomicUsize,
    after_connect: Mutex<Option<Hook>>,
}

impl<T: Clone + Send + 'static> Probe<T> {
    pub fn new(upstream: Arc<Driver<T>>) -> Arc<Self> {
        Arc::new(Self {
            inner: MulticastSource::new(upstream),
            connects: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            after_connect: Mutex::new(None),
        })
    }

    /// Run `hook` once, right after the next connect reached the multicast.
    pub fn after_connect(&self, hook: impl FnOnce() + Send + 'static) {
        *self.after_connect.lock() = Some(Box::new(hook));
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn attached(&self) -> usize {
        self.inner.subscriber_count()
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}

impl<T: Clone + Send + 'static> Publisher<T> for Probe<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.inner.subscribe(subscriber);
    }
}

impl<T: Clone + Send + 'static> ConnectableSource<T> for Probe<T> {
    fn connect(&self, connection: &Arc<Connection>) {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.inner.connect(connection);

        let hook = self.after_connect.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn cancel_capability(&self) -> Option<&dyn UpstreamCancel> {
        Some(self)
    }
}

impl<T: Clone + Send + 'static> UpstreamCancel for Probe<T> {
    fn cancel(&self, connection: &Connection) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.inner.cancel(connection);
    }
}

/// A consumer that records what it sees and can cancel on demand.
pub struct Recorder<T> {
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    items: Mutex<Vec<T>>,
    failure: Mutex<Option<StreamFailure>>,
    completions: AtomicUsize,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscription: Mutex::new(None),
            items: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            completions: AtomicUsize::new(0),
        })
    }

    pub fn cancel(&self) {
        let subscription = self.subscription.lock().clone();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    pub fn items(&self) -> Vec<T> {
        self.items.lock().clone()
    }

    pub fn failure(&self) -> Option<StreamFailure> {
        self.failure.lock().clone()
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

impl<T: Send> Subscriber<T> for Recorder<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        *self.subscription.lock() = Some(subscription);
    }

    fn on_item(&self, item: T) {
        self.items.lock().push(item);
    }

    fn on_failure(&self, failure: StreamFailure) {
        *self.failure.lock() = Some(failure);
    }

    fn on_complete(&self) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
}

/// A worker clock fired by hand. Its handles ignore `cancel`, so a superseded
/// action can still be run to check that it does nothing.
pub struct ManualClock {
    actions: Mutex<Vec<Option<TimerAction>>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            actions: Mutex::new(Vec::new()),
        })
    }

    pub fn scheduled(&self) -> usize {
        self.actions.lock().len()
    }

    /// Run the `index`th scheduled action, if it has not run yet.
    pub fn fire(&self, index: usize) {
        let action = self.actions.lock().get_mut(index).and_then(Option::take);
        if let Some(action) = action {
            action();
        }
    }
}

impl WorkerClock for ManualClock {
    fn schedule(&self, _delay: Duration, action: TimerAction) -> TimerHandle {
        self.actions.lock().push(Some(action));
        TimerHandle::new(IgnoreCancel)
    }
}

struct IgnoreCancel;

impl Cancellable for IgnoreCancel {
    fn cancel(&self) {}
}

/// Cancels its subscription as soon as it receives it.
pub struct CancelOnSubscribe;

impl<T> Subscriber<T> for CancelOnSubscribe {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        subscription.cancel();
    }

    fn on_item(&self, _item: T) {}

    fn on_failure(&self, _failure: StreamFailure) {}

    fn on_complete(&self) {}
}
