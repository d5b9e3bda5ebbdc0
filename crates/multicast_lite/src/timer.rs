use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::error::RuntimeError;
use crate::subscriber::Cancellable;

/// A deferred action to run on a worker clock.
pub type TimerAction = Box<dyn FnOnce() + Send + 'static>;

/// A clock able to run an action after a delay.
pub trait WorkerClock: Send + Sync {
    /// Schedule `action` to run once `delay` has elapsed.
    fn schedule(&self, delay: Duration, action: TimerAction) -> TimerHandle;
}

/// Cancel handle for a scheduled action.
///
/// `cancel` may be called any number of times and after the action has fired.
#[derive(Clone)]
pub struct TimerHandle {
    inner: Arc<dyn Cancellable>,
}

impl TimerHandle {
    pub fn new(cancel: impl Cancellable + 'static) -> Self {
        Self {
            inner: Arc::new(cancel),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle").finish_non_exhaustive()
    }
}

/// A worker clock that runs actions on tokio tasks.
#[derive(Debug, Clone)]
pub struct TokioClock {
    handle: Handle,
}

impl TokioClock {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    pub fn current() -> Result<Self, RuntimeError> {
        Ok(Self::new(Handle::try_current()?))
    }
}

impl WorkerClock for TokioClock {
    fn schedule(&self, delay: Duration, action: TimerAction) -> TimerHandle {
        // Fix the deadline now, not when the task first gets polled.
        let deadline = tokio::time::Instant::now() + delay;
        let task = self.handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            action();
        });
        TimerHandle::new(AbortTask(task.abort_handle()))
    }
}

struct AbortTask(AbortHandle);

impl Cancellable for AbortTask {
    fn cancel(&self) {
        self.0.abort();
    }
}
