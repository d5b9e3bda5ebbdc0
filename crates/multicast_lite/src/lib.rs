//! Shared upstream connections for push-based streams.
//!
//! A [`MulticastSource`] lets many consumers share one subscription to a cold
//! upstream. A [`RefCount`] front sits on top of it and manages the connection
//! lifecycle: the upstream is connected once enough consumers have attached and
//! cancelled when the last one leaves, immediately or after a grace period.
//!
//! # Example
//!
//! ```ignore
//! use multicast_lite::{ConnectableExt, PublisherExt, RefCountConfig};
//! use futures::StreamExt;
//!
//! let shared = upstream
//!     .publish()
//!     .ref_count_with(RefCountConfig::new().with_grace_period(Duration::from_secs(1)))?;
//!
//! let mut first = shared.subscribe_stream();
//! let mut second = shared.subscribe_stream();
//! while let Some(item) = first.next().await {
//!     println!("Got: {:?}", item?);
//! }
//! ```

mod config;
mod connection;
mod consumer;
mod error;
mod ext;
mod multicast;
mod ref_count;
mod source;
mod subscriber;
mod timer;
mod tracking;

#[cfg(test)]
mod test_support;

pub use config::RefCountConfig;
pub use connection::Connection;
pub use consumer::SubscriberStream;
pub use error::{RefCountError, RuntimeError, StreamFailure};
pub use ext::{ConnectableExt, PublisherExt};
pub use multicast::{ConnectableSource, MulticastSource, UpstreamCancel};
pub use ref_count::RefCount;
pub use source::{IterPublisher, StreamPublisher};
pub use subscriber::{Cancellable, NoopSubscription, Publisher, Subscriber, Subscription};
pub use timer::{TimerAction, TimerHandle, TokioClock, WorkerClock};
