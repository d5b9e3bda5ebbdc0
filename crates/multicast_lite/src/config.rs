use std::time::Duration;

/// Configuration for a reference-counted multicast.
#[derive(Debug, Clone)]
pub struct RefCountConfig {
    /// Number of live consumers required before the upstream is connected.
    pub minimum_subscribers: usize,

    /// Delay between the last consumer leaving and the upstream being cancelled.
    /// `None` (or zero) disconnects immediately, on the cancelling thread.
    pub grace_period: Option<Duration>,
}

impl Default for RefCountConfig {
    fn default() -> Self {
        Self {
            minimum_subscribers: 1,
            grace_period: None,
        }
    }
}

impl RefCountConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the subscriber threshold that triggers `connect`.
    pub fn with_minimum_subscribers(mut self, minimum_subscribers: usize) -> Self {
        self.minimum_subscribers = minimum_subscribers;
        self
    }

    /// Set the grace period before disconnecting an idle upstream.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = Some(grace_period);
        self
    }

    /// The grace period, with a zero duration treated as none.
    pub(crate) fn effective_grace_period(&self) -> Option<Duration> {
        self.grace_period.filter(|grace| !grace.is_zero())
    }
}
