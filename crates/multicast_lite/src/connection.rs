use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::timer::TimerHandle;

/// One generation of the shared upstream link.
///
/// A `Connection` only holds state. Its fields are mutated by the owning
/// `RefCount` while that front holds its own lock, so the inner mutex here is a
/// leaf lock and never contended across fronts. Generations are compared by
/// identity, see [`Connection::same_generation`].
pub struct Connection {
    id: Uuid,
    state: Mutex<ConnectionState>,
}

#[derive(Default)]
struct ConnectionState {
    subscribers: u64,
    connected: bool,
    // `connect` has been decided but has not returned yet.
    connecting: bool,
    teardown_owed: bool,
    timer: Option<TimerHandle>,
    // Bumped whenever a grace timer is armed or cancelled; a timer only acts
    // if the epoch it was armed under is still current.
    timer_epoch: u64,
}

impl Connection {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            state: Mutex::new(ConnectionState::default()),
        })
    }

    /// Log-correlation id of this generation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of consumers currently counted against this generation.
    pub fn subscriber_count(&self) -> u64 {
        self.state.lock().subscribers
    }

    /// Whether `connect` has been issued for this generation.
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Whether a grace-period disconnect is pending.
    pub fn has_timer(&self) -> bool {
        self.state.lock().timer.is_some()
    }

    pub fn same_generation(a: &Arc<Connection>, b: &Arc<Connection>) -> bool {
        Arc::ptr_eq(a, b)
    }

    /// Count one more consumer and report whether this arrival must connect.
    ///
    /// Connect fires once per generation: when the count first reaches
    /// `required` and the generation is not yet connected.
    pub(crate) fn increment_and_should_connect(&self, required: u64) -> bool {
        let mut state = self.state.lock();
        state.subscribers += 1;
        if !state.connected && state.subscribers == required {
            state.connected = true;
            state.connecting = true;
            return true;
        }
        false
    }

    /// Remove one consumer and return the remaining count.
    pub(crate) fn decrement(&self) -> u64 {
        let mut state = self.state.lock();
        state.subscribers = state.subscribers.saturating_sub(1);
        state.subscribers
    }

    /// Claim the upstream teardown of this generation.
    ///
    /// While `connect` is still in flight nothing can be cancelled yet, so the
    /// teardown is recorded as owed and handed back by
    /// [`Connection::finish_connect`] instead.
    pub(crate) fn claim_teardown(&self) -> bool {
        let mut state = self.state.lock();
        if state.connecting {
            state.teardown_owed = true;
            return false;
        }
        true
    }

    /// Mark `connect` as returned, reporting whether a teardown became owed
    /// meanwhile.
    pub(crate) fn finish_connect(&self) -> bool {
        let mut state = self.state.lock();
        state.connecting = false;
        std::mem::take(&mut state.teardown_owed)
    }

    /// Cancel and drop any pending grace timer, invalidating in-flight arming.
    pub(crate) fn cancel_timer(&self) {
        let timer = {
            let mut state = self.state.lock();
            state.timer_epoch += 1;
            state.timer.take()
        };
        if let Some(timer) = timer {
            timer.cancel();
        }
    }

    /// Start arming a grace timer and return the epoch it belongs to.
    pub(crate) fn arm_timer(&self) -> u64 {
        self.cancel_timer();
        self.state.lock().timer_epoch
    }

    /// Store the handle of a timer armed under `epoch`.
    ///
    /// Any returned handle must be cancelled by the caller: it is either `timer`
    /// itself, when the arming was superseded meanwhile, or a handle it replaced.
    pub(crate) fn install_timer(&self, epoch: u64, timer: TimerHandle) -> Option<TimerHandle> {
        let mut state = self.state.lock();
        if state.timer_epoch != epoch {
            return Some(timer);
        }
        state.timer.replace(timer)
    }

    pub(crate) fn is_timer_epoch(&self, epoch: u64) -> bool {
        self.state.lock().timer_epoch == epoch
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("subscribers", &state.subscribers)
            .field("connected", &state.connected)
            .field("connecting", &state.connecting)
            .field("timer_pending", &state.timer.is_some())
            .field("timer_epoch", &state.timer_epoch)
            .finish()
    }
}
