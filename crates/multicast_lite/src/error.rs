use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised when a component needs the ambient tokio runtime.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// Called outside of a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Errors that can occur while constructing a reference-counted multicast.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RefCountError {
    /// The subscriber threshold must be at least one.
    #[error("minimum subscribers must be at least 1, got {0}")]
    InvalidMinimumSubscribers(usize),

    /// The grace-period clock could not be created.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// A failure signalled by an upstream producer.
///
/// Cloning is cheap, so the fan-out can hand the same failure to every consumer.
#[derive(Clone, Error)]
#[error(transparent)]
pub struct StreamFailure(Arc<dyn StdError + Send + Sync + 'static>);

impl StreamFailure {
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(err))
    }

    /// Build a failure from a plain message.
    pub fn msg(msg: impl Into<String>) -> Self {
        Self::new(MessageError(msg.into()))
    }

    /// Borrow the underlying error.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Debug for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StreamFailure").field(&self.0).finish()
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct MessageError(String);
