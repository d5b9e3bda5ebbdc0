use crate::config::RefCountConfig;
use crate::consumer::SubscriberStream;
use crate::error::RefCountError;
use crate::multicast::{ConnectableSource, MulticastSource};
use crate::ref_count::RefCount;
use crate::subscriber::Publisher;

/// Fluent helpers for any publisher.
pub trait PublisherExt<T>: Publisher<T> + Sized + 'static {
    /// Share this publisher: consumers attach now, delivery starts on `connect`.
    fn publish(self) -> MulticastSource<T>
    where
        T: Clone + Send + 'static,
    {
        MulticastSource::new(self)
    }

    /// Subscribe and consume as a [`futures::Stream`].
    fn to_stream(&self) -> SubscriberStream<T>
    where
        T: Send + 'static,
    {
        SubscriberStream::attach(self)
    }
}

impl<T, P> PublisherExt<T> for P where P: Publisher<T> + Sized + 'static {}

/// Fluent helpers for connectable sources.
pub trait ConnectableExt<T>: ConnectableSource<T> + Sized + 'static {
    /// Stay connected while at least one consumer is attached.
    fn ref_count(self) -> Result<RefCount<T>, RefCountError>
    where
        T: Send + 'static,
    {
        RefCount::new(self, RefCountConfig::default())
    }

    fn ref_count_with(self, config: RefCountConfig) -> Result<RefCount<T>, RefCountError>
    where
        T: Send + 'static,
    {
        RefCount::new(self, config)
    }
}

impl<T, C> ConnectableExt<T> for C where C: ConnectableSource<T> + Sized + 'static {}
