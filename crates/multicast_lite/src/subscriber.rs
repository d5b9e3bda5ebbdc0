//! Push contracts shared by producers, the multicast fan-out and consumers.
//!
//! Every callback takes `&self`: signals may arrive from the producer's delivery
//! thread while the consumer cancels from another, so implementations keep their
//! own interior mutability.

use std::sync::Arc;

use crate::error::StreamFailure;

/// A best-effort, idempotent cancel capability.
///
/// Calling `cancel` any number of times, or after the guarded work has already
/// finished, must be safe.
pub trait Cancellable: Send + Sync {
    fn cancel(&self);
}

/// Handle given to a subscriber so it can stop the flow of signals.
///
/// Cancelling may happen at any time, including before the first item, and is
/// idempotent.
pub trait Subscription: Send + Sync {
    fn cancel(&self);
}

/// A push-based consumer of items followed by at most one terminal signal.
pub trait Subscriber<T>: Send + Sync {
    /// Delivered once, before any other signal.
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    fn on_item(&self, item: T);

    fn on_failure(&self, failure: StreamFailure);

    fn on_complete(&self);
}

/// Something consumers can attach to.
pub trait Publisher<T>: Send + Sync {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

impl<T, P: Publisher<T> + ?Sized> Publisher<T> for Arc<P> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        (**self).subscribe(subscriber)
    }
}

/// A subscription that does nothing when cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSubscription;

impl Subscription for NoopSubscription {
    fn cancel(&self) {}
}
