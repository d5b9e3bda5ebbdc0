use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::StreamFailure;
use crate::subscriber::{Publisher, Subscriber, Subscription};

/// A cold upstream driven by hand from the test body.
pub(crate) struct ManualUpstream<T> {
    current: Mutex<Option<Arc<dyn Subscriber<T>>>>,
    subscribes: AtomicUsize,
    cancels: Arc<AtomicUsize>,
}

impl<T> ManualUpstream<T> {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            subscribes: AtomicUsize::new(0),
            cancels: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    fn current(&self) -> Option<Arc<dyn Subscriber<T>>> {
        self.current.lock().clone()
    }

    pub fn emit(&self, item: T) {
        if let Some(subscriber) = self.current() {
            subscriber.on_item(item);
        }
    }

    pub fn complete(&self) {
        if let Some(subscriber) = self.current.lock().take() {
            subscriber.on_complete();
        }
    }

    pub fn fail(&self, failure: StreamFailure) {
        if let Some(subscriber) = self.current.lock().take() {
            subscriber.on_failure(failure);
        }
    }
}

impl<T: Send + 'static> Publisher<T> for ManualUpstream<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        *self.current.lock() = Some(Arc::clone(&subscriber));
        subscriber.on_subscribe(Arc::new(CountingSubscription(Arc::clone(&self.cancels))));
    }
}

struct CountingSubscription(Arc<AtomicUsize>);

impl Subscription for CountingSubscription {
    fn cancel(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A consumer that records every signal.
pub(crate) struct Collector<T> {
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    items: Mutex<Vec<T>>,
    failure: Mutex<Option<StreamFailure>>,
    completions: AtomicUsize,
}

impl<T: Clone> Collector<T> {
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

    pub fn is_completed(&self) -> bool {
        self.completions.load(Ordering::SeqCst) > 0
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

impl<T: Send> Subscriber<T> for Collector<T> {
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
