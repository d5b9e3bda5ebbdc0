use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::connection::Connection;
use crate::error::StreamFailure;
use crate::ref_count::RefCountInner;
use crate::subscriber::{Subscriber, Subscription};

/// Wraps one consumer of a `RefCount` and reports its departure.
///
/// Signals are relayed unchanged. Whichever of consumer cancel or upstream
/// termination is observed first is reported to the front; the other becomes a
/// no-op. The tracker holds the front weakly and never retires the connection
/// itself.
pub(crate) struct RefCountSubscriber<T> {
    downstream: Arc<dyn Subscriber<T>>,
    front: Weak<RefCountInner<T>>,
    connection: Arc<Connection>,
    reported: AtomicBool,
    upstream: Mutex<Option<Arc<dyn Subscription>>>,
    me: Weak<RefCountSubscriber<T>>,
}

impl<T> RefCountSubscriber<T>
where
    T: Send + 'static,
{
    pub fn new(
        downstream: Arc<dyn Subscriber<T>>,
        front: Weak<RefCountInner<T>>,
        connection: Arc<Connection>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            downstream,
            front,
            connection,
            reported: AtomicBool::new(false),
            upstream: Mutex::new(None),
            me: me.clone(),
        })
    }

    /// Claim the single report this tracker may make.
    fn claim_report(&self) -> bool {
        !self.reported.swap(true, Ordering::SeqCst)
    }

    fn report_terminated(&self) -> bool {
        if !self.claim_report() {
            return false;
        }
        if let Some(front) = self.front.upgrade() {
            front.on_terminate(&self.connection);
        }
        self.upstream.lock().take();
        true
    }
}

impl<T> Subscriber<T> for RefCountSubscriber<T>
where
    T: Send + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        *self.upstream.lock() = Some(subscription);
        if let Some(me) = self.me.upgrade() {
            self.downstream.on_subscribe(me);
        }
    }

    fn on_item(&self, item: T) {
        if self.reported.load(Ordering::SeqCst) {
            return;
        }
        self.downstream.on_item(item);
    }

    fn on_failure(&self, failure: StreamFailure) {
        if self.report_terminated() {
            self.downstream.on_failure(failure);
        }
    }

    fn on_complete(&self) {
        if self.report_terminated() {
            self.downstream.on_complete();
        }
    }
}

impl<T> Subscription for RefCountSubscriber<T>
where
    T: Send + 'static,
{
    fn cancel(&self) {
        if self.claim_report() {
            if let Some(front) = self.front.upgrade() {
                front.on_cancel(&self.connection);
            }
        }
        let upstream = self.upstream.lock().take();
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }
}
