use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::error::StreamFailure;
use crate::subscriber::{Publisher, Subscriber, Subscription};

/// A consumer exposed as a [`Stream`].
///
/// Yields every item as `Ok`, a failure as a final `Err`, and ends on
/// completion. Dropping the stream cancels the subscription.
pub struct SubscriberStream<T> {
    receiver: mpsc::UnboundedReceiver<Result<T, StreamFailure>>,
    handle: Arc<CancelSlot>,
}

impl<T> SubscriberStream<T>
where
    T: Send + 'static,
{
    /// Subscribe to `publisher` and return the resulting stream.
    pub fn attach<P>(publisher: &P) -> Self
    where
        P: Publisher<T> + ?Sized,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = Arc::new(CancelSlot::default());
        let subscriber = Arc::new(ChannelSubscriber {
            sender: Mutex::new(Some(sender)),
            handle: Arc::clone(&handle),
        });
        publisher.subscribe(subscriber);
        Self { receiver, handle }
    }
}

impl<T> SubscriberStream<T> {
    /// Stop receiving. Items already buffered can still be read.
    pub fn cancel(&self) {
        self.handle.cancel();
    }
}

impl<T> Stream for SubscriberStream<T> {
    type Item = Result<T, StreamFailure>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl<T> Drop for SubscriberStream<T> {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

/// Holds the subscription until it is used or released.
#[derive(Default)]
struct CancelSlot {
    cancelled: AtomicBool,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
}

impl CancelSlot {
    fn set(&self, subscription: Arc<dyn Subscription>) {
        let mut slot = self.subscription.lock();
        if self.cancelled.load(Ordering::SeqCst) {
            drop(slot);
            subscription.cancel();
            return;
        }
        *slot = Some(subscription);
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let subscription = self.subscription.lock().take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    /// Forget the subscription once the flow has terminated.
    fn release(&self) {
        self.subscription.lock().take();
    }
}

struct ChannelSubscriber<T> {
    sender: Mutex<Option<mpsc::UnboundedSender<Result<T, StreamFailure>>>>,
    handle: Arc<CancelSlot>,
}

impl<T> Subscriber<T> for ChannelSubscriber<T>
where
    T: Send,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.handle.set(subscription);
    }

    fn on_item(&self, item: T) {
        if let Some(sender) = self.sender.lock().as_ref() {
            // A closed receiver means the stream was dropped, which cancels.
            let _ = sender.send(Ok(item));
        }
    }

    fn on_failure(&self, failure: StreamFailure) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(Err(failure));
        }
        self.handle.release();
    }

    fn on_complete(&self) {
        self.sender.lock().take();
        self.handle.release();
    }
}
