use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::connection::Connection;
use crate::error::StreamFailure;
use crate::subscriber::{Publisher, Subscriber, Subscription};

/// Best-effort request to stop an upstream generation.
///
/// Must be idempotent and safe to call after the generation terminated on its
/// own.
pub trait UpstreamCancel: Send + Sync {
    fn cancel(&self, connection: &Connection);
}

/// An upstream that does not produce until told to `connect`.
pub trait ConnectableSource<T>: Publisher<T> {
    /// Start delivery for `connection`'s generation.
    ///
    /// Called at most once per generation by the owning front.
    fn connect(&self, connection: &Arc<Connection>);

    /// Best-effort upstream cancel, if this source offers one.
    fn cancel_capability(&self) -> Option<&dyn UpstreamCancel> {
        None
    }
}

impl<T, C: ConnectableSource<T> + ?Sized> ConnectableSource<T> for Arc<C> {
    fn connect(&self, connection: &Arc<Connection>) {
        (**self).connect(connection)
    }

    fn cancel_capability(&self) -> Option<&dyn UpstreamCancel> {
        (**self).cancel_capability()
    }
}

/// Shares one subscription to a cold upstream among many consumers.
///
/// Consumers attach with [`Publisher::subscribe`] and receive whatever the
/// upstream emits once [`ConnectableSource::connect`] has run. A terminal
/// signal drains every attached consumer; consumers attaching afterwards wait
/// for the next `connect`. There is no replay.
pub struct MulticastSource<T> {
    upstream: Arc<dyn Publisher<T>>,
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    subscribers: DashMap<u64, Arc<dyn Subscriber<T>>, ahash::RandomState>,
    next_id: AtomicU64,
    active: Mutex<Option<Arc<FanOut<T>>>>,
}

impl<T> MulticastSource<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(upstream: impl Publisher<T> + 'static) -> Self {
        Self {
            upstream: Arc::new(upstream),
            shared: Arc::new(Shared {
                subscribers: DashMap::default(),
                next_id: AtomicU64::new(0),
                active: Mutex::new(None),
            }),
        }
    }

    /// Number of consumers currently attached.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.len()
    }

    /// Whether an upstream generation is connected and not yet terminated.
    pub fn is_active(&self) -> bool {
        self.shared.active.lock().is_some()
    }
}

impl<T> Publisher<T> for MulticastSource<T>
where
    T: Clone + Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let membership = Arc::new(Membership {
            shared: Arc::downgrade(&self.shared),
            id,
            cancelled: AtomicBool::new(false),
        });

        subscriber.on_subscribe(Arc::clone(&membership) as Arc<dyn Subscription>);
        self.shared.subscribers.insert(id, subscriber);

        // The consumer may have cancelled from inside on_subscribe.
        if membership.cancelled.load(Ordering::SeqCst) {
            self.shared.subscribers.remove(&id);
        }
    }
}

impl<T> ConnectableSource<T> for MulticastSource<T>
where
    T: Clone + Send + 'static,
{
    fn connect(&self, connection: &Arc<Connection>) {
        let fan_out = Arc::new(FanOut {
            shared: Arc::downgrade(&self.shared),
            generation: connection.id(),
            done: AtomicBool::new(false),
            upstream: Mutex::new(None),
        });

        let previous = self.shared.active.lock().replace(Arc::clone(&fan_out));
        if let Some(previous) = previous {
            previous.cancel();
        }

        debug!(
            generation = %connection.id(),
            subscribers = self.subscriber_count(),
            "Connecting multicast upstream"
        );
        self.upstream.subscribe(fan_out);
    }

    fn cancel_capability(&self) -> Option<&dyn UpstreamCancel> {
        Some(self)
    }
}

impl<T> UpstreamCancel for MulticastSource<T>
where
    T: Clone + Send + 'static,
{
    /// Cancel the upstream if `connection`'s generation is still the active one.
    fn cancel(&self, connection: &Connection) {
        let active = {
            let mut active = self.shared.active.lock();
            match active.as_ref() {
                Some(fan_out) if fan_out.generation == connection.id() => active.take(),
                _ => None,
            }
        };
        match active {
            Some(fan_out) => {
                debug!(generation = %fan_out.generation, "Cancelling multicast upstream");
                fan_out.cancel();
            }
            None => trace!(generation = %connection.id(), "Upstream generation already gone"),
        }
    }
}

/// Removes one consumer from the fan-out.
struct Membership<T> {
    shared: Weak<Shared<T>>,
    id: u64,
    cancelled: AtomicBool,
}

impl<T> Subscription for Membership<T>
where
    T: Send + 'static,
{
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.subscribers.remove(&self.id);
        }
    }
}

/// The single subscriber placed on the upstream for one generation.
struct FanOut<T> {
    shared: Weak<Shared<T>>,
    generation: Uuid,
    done: AtomicBool,
    upstream: Mutex<Option<Arc<dyn Subscription>>>,
}

impl<T> FanOut<T>
where
    T: Clone + Send + 'static,
{
    fn cancel(&self) {
        self.done.store(true, Ordering::SeqCst);
        let upstream = self.upstream.lock().take();
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }

    /// Retire this generation and hand back every attached consumer.
    fn drain(&self) -> Vec<Arc<dyn Subscriber<T>>> {
        let Some(shared) = self.shared.upgrade() else {
            return Vec::new();
        };

        {
            let mut active = shared.active.lock();
            if active
                .as_ref()
                .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), self))
            {
                *active = None;
            }
        }
        self.upstream.lock().take();

        let ids: Vec<u64> = shared.subscribers.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter_map(|id| shared.subscribers.remove(&id).map(|(_, subscriber)| subscriber))
            .collect()
    }
}

impl<T> Subscriber<T> for FanOut<T>
where
    T: Clone + Send + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let mut slot = self.upstream.lock();
        if self.done.load(Ordering::SeqCst) {
            drop(slot);
            subscription.cancel();
            return;
        }
        *slot = Some(subscription);
    }

    fn on_item(&self, item: T) {
        if self.done.load(Ordering::SeqCst) {
            return;
        }
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        // Snapshot first: consumers may cancel, and so mutate the map, while we deliver.
        let targets: Vec<Arc<dyn Subscriber<T>>> = shared
            .subscribers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        drop(shared);

        for target in targets {
            target.on_item(item.clone());
        }
    }

    fn on_failure(&self, failure: StreamFailure) {
        if self.done.swap(true, Ordering::SeqCst) {
            trace!(generation = %self.generation, "Ignoring failure after termination");
            return;
        }
        let targets = self.drain();
        debug!(
            generation = %self.generation,
            subscribers = targets.len(),
            error = %failure,
            "Multicast upstream failed"
        );
        for target in targets {
            target.on_failure(failure.clone());
        }
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            trace!(generation = %self.generation, "Ignoring completion after termination");
            return;
        }
        let targets = self.drain();
        debug!(
            generation = %self.generation,
            subscribers = targets.len(),
            "Multicast upstream completed"
        );
        for target in targets {
            target.on_complete();
        }
    }
}
