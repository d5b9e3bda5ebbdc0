use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::RefCountConfig;
use crate::connection::Connection;
use crate::consumer::SubscriberStream;
use crate::error::RefCountError;
use crate::multicast::ConnectableSource;
use crate::subscriber::{Publisher, Subscriber};
use crate::timer::{TokioClock, WorkerClock};
use crate::tracking::RefCountSubscriber;

/// Keeps a connectable source connected for as long as it has consumers.
///
/// Each subscribe joins the current connection generation, creating one if
/// none is live. The source is connected once the configured number of
/// consumers has joined, and cancelled once they have all left, either right
/// away or after the grace period. Cloning yields another handle to the same
/// front.
///
/// # Example
/// ```ignore
/// let shared = MulticastSource::new(upstream).ref_count_with(
///     RefCountConfig::new().with_grace_period(Duration::from_millis(250)),
/// )?;
/// let mut a = shared.subscribe_stream();
/// let mut b = shared.subscribe_stream();
/// ```
pub struct RefCount<T> {
    inner: Arc<RefCountInner<T>>,
}

impl<T> Clone for RefCount<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Grace {
    period: Duration,
    clock: Arc<dyn WorkerClock>,
}

/// State shared between the front handles and the trackers they create.
pub(crate) struct RefCountInner<T> {
    source: Arc<dyn ConnectableSource<T>>,
    minimum_subscribers: u64,
    grace: Option<Grace>,
    // The single lock of this front. Connection state is only touched while held.
    current: Mutex<Option<Arc<Connection>>>,
}

impl<T> RefCount<T>
where
    T: Send + 'static,
{
    /// Create a front over `source`.
    ///
    /// A grace period is timed on the current tokio runtime, so configuring one
    /// outside a runtime fails.
    pub fn new(
        source: impl ConnectableSource<T> + 'static,
        config: RefCountConfig,
    ) -> Result<Self, RefCountError> {
        validate(&config)?;
        let clock: Option<Arc<dyn WorkerClock>> = match config.effective_grace_period() {
            Some(_) => Some(Arc::new(TokioClock::current()?) as Arc<dyn WorkerClock>),
            None => None,
        };
        Ok(Self::build(Arc::new(source), &config, clock))
    }

    /// Create a front whose grace timers run on `clock`.
    pub fn with_clock(
        source: impl ConnectableSource<T> + 'static,
        config: RefCountConfig,
        clock: Arc<dyn WorkerClock>,
    ) -> Result<Self, RefCountError> {
        validate(&config)?;
        Ok(Self::build(Arc::new(source), &config, Some(clock)))
    }

    fn build(
        source: Arc<dyn ConnectableSource<T>>,
        config: &RefCountConfig,
        clock: Option<Arc<dyn WorkerClock>>,
    ) -> Self {
        let grace = config
            .effective_grace_period()
            .zip(clock)
            .map(|(period, clock)| Grace { period, clock });

        Self {
            inner: Arc::new(RefCountInner {
                source,
                minimum_subscribers: config.minimum_subscribers as u64,
                grace,
                current: Mutex::new(None),
            }),
        }
    }

    /// Subscribe and consume the shared items as a [`futures::Stream`].
    pub fn subscribe_stream(&self) -> SubscriberStream<T> {
        SubscriberStream::attach(self)
    }

    /// Whether the live generation has been connected.
    pub fn is_connected(&self) -> bool {
        self.inner
            .current
            .lock()
            .as_ref()
            .is_some_and(|connection| connection.is_connected())
    }

    /// Consumers counted against the live generation.
    pub fn current_subscribers(&self) -> u64 {
        self.inner
            .current
            .lock()
            .as_ref()
            .map_or(0, |connection| connection.subscriber_count())
    }

    /// Whether a grace-period disconnect is pending.
    pub fn has_pending_disconnect(&self) -> bool {
        self.inner
            .current
            .lock()
            .as_ref()
            .is_some_and(|connection| connection.has_timer())
    }

    /// Id of the live generation, if any.
    pub fn current_generation(&self) -> Option<Uuid> {
        self.inner.current.lock().as_ref().map(|connection| connection.id())
    }
}

impl<T> Publisher<T> for RefCount<T>
where
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.inner.subscribe(subscriber);
    }
}

fn validate(config: &RefCountConfig) -> Result<(), RefCountError> {
    if config.minimum_subscribers == 0 {
        return Err(RefCountError::InvalidMinimumSubscribers(
            config.minimum_subscribers,
        ));
    }
    Ok(())
}

fn is_current(current: &Option<Arc<Connection>>, connection: &Arc<Connection>) -> bool {
    current
        .as_ref()
        .is_some_and(|live| Connection::same_generation(live, connection))
}

impl<T> RefCountInner<T>
where
    T: Send + 'static,
{
    fn subscribe(self: &Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let (connection, connect) = {
            let mut current = self.current.lock();
            let connection = match current.as_ref() {
                Some(connection) => Arc::clone(connection),
                None => {
                    let connection = Connection::new();
                    debug!(generation = %connection.id(), "Created connection generation");
                    *current = Some(Arc::clone(&connection));
                    connection
                }
            };

            // A new arrival preempts any scheduled teardown.
            connection.cancel_timer();
            let connect = connection.increment_and_should_connect(self.minimum_subscribers);
            (connection, connect)
        };

        let tracker =
            RefCountSubscriber::new(subscriber, Arc::downgrade(self), Arc::clone(&connection));
        self.source.subscribe(tracker);

        if !connect {
            return;
        }

        // The arrival may have cancelled while subscribing and retired the generation.
        let live = {
            let current = self.current.lock();
            let live = is_current(&current, &connection);
            if !live {
                connection.finish_connect();
            }
            live
        };
        if !live {
            debug!(generation = %connection.id(), "Generation retired before connecting");
            return;
        }

        debug!(
            generation = %connection.id(),
            subscribers = self.minimum_subscribers,
            "Subscriber threshold reached, connecting"
        );
        self.source.connect(&connection);

        let owed = {
            let _current = self.current.lock();
            connection.finish_connect()
        };
        if owed {
            debug!(generation = %connection.id(), "Generation retired while connecting");
            self.cancel_upstream(&connection);
        }
    }

    /// A consumer cancelled before any terminal signal reached it.
    pub(crate) fn on_cancel(self: &Arc<Self>, connection: &Arc<Connection>) {
        let armed = {
            let mut current = self.current.lock();
            if !is_current(&current, connection) {
                trace!(generation = %connection.id(), "Ignoring cancel for retired generation");
                return;
            }

            let remaining = connection.decrement();
            if remaining != 0 || !connection.is_connected() {
                trace!(
                    generation = %connection.id(),
                    subscribers = remaining,
                    "Consumer cancelled"
                );
                return;
            }

            match self.grace {
                Some(_) => connection.arm_timer(),
                None => {
                    if self.retire_if_idle(&mut current, connection, None)
                        && connection.claim_teardown()
                    {
                        drop(current);
                        self.cancel_upstream(connection);
                    }
                    return;
                }
            }
        };

        self.schedule_disconnect(connection, armed);
    }

    /// The upstream terminated and the signal reached one consumer.
    pub(crate) fn on_terminate(&self, connection: &Arc<Connection>) {
        let drained = {
            let mut current = self.current.lock();
            if is_current(&current, connection) {
                *current = None;
                connection.cancel_timer();
                debug!(generation = %connection.id(), "Upstream terminated, generation retired");
            }
            connection.decrement() == 0 && connection.claim_teardown()
        };

        if drained {
            self.cancel_upstream(connection);
        }
    }

    /// Tear down `connection` if it is still live and idle.
    ///
    /// `epoch` identifies the grace timer asking; a timer armed under an older
    /// epoch has been superseded and does nothing.
    fn disconnect_now(&self, connection: &Arc<Connection>, epoch: Option<u64>) {
        {
            let mut current = self.current.lock();
            if !self.retire_if_idle(&mut current, connection, epoch)
                || !connection.claim_teardown()
            {
                return;
            }
        }
        self.cancel_upstream(connection);
    }

    fn retire_if_idle(
        &self,
        current: &mut Option<Arc<Connection>>,
        connection: &Arc<Connection>,
        epoch: Option<u64>,
    ) -> bool {
        if !is_current(current, connection) || connection.subscriber_count() != 0 {
            trace!(generation = %connection.id(), "Generation no longer idle, keeping it");
            return false;
        }
        if epoch.is_some_and(|epoch| !connection.is_timer_epoch(epoch)) {
            trace!(generation = %connection.id(), "Grace timer superseded");
            return false;
        }

        *current = None;
        connection.cancel_timer();
        debug!(generation = %connection.id(), "Last consumer gone, generation retired");
        true
    }

    fn schedule_disconnect(self: &Arc<Self>, connection: &Arc<Connection>, epoch: u64) {
        let Some(grace) = &self.grace else {
            return;
        };

        let front = Arc::downgrade(self);
        let target = Arc::clone(connection);
        let timer = grace.clock.schedule(
            grace.period,
            Box::new(move || {
                if let Some(front) = front.upgrade() {
                    front.disconnect_now(&target, Some(epoch));
                }
            }),
        );

        let rejected = {
            let _current = self.current.lock();
            connection.install_timer(epoch, timer)
        };
        match rejected {
            Some(stale) => stale.cancel(),
            None => debug!(
                generation = %connection.id(),
                grace = ?grace.period,
                "Last consumer gone, disconnect scheduled"
            ),
        }
    }

    fn cancel_upstream(&self, connection: &Connection) {
        if let Some(cancel) = self.source.cancel_capability() {
            debug!(generation = %connection.id(), "Cancelling upstream");
            cancel.cancel(connection);
        }
    }
}
