//! [`Ticker`] – interruptible fixed-interval wait used by the process monitor.
//!
//! A plain `thread::sleep` cannot be woken early.  [`Ticker::wait`] instead
//! blocks on a condition variable owned by a [`CancelHandle`], so any clone of
//! the handle (for example one held by a Ctrl-C handler) can end the wait
//! immediately.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use mockrobot_driver::ticker::{CancelHandle, Tick, Ticker};
//!
//! let cancel = CancelHandle::new();
//! let ticker = Ticker::new(Duration::from_millis(1), cancel.clone());
//! assert_eq!(ticker.wait(), Tick::Elapsed);
//!
//! cancel.cancel();
//! assert_eq!(ticker.wait(), Tick::Cancelled);
//! ```

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Outcome of one [`Ticker::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The full interval passed.
    Elapsed,
    /// The wait was cut short by [`CancelHandle::cancel`].
    Cancelled,
}

/// Shared cancellation flag.  Clone it cheaply; all clones share one flag.
#[derive(Clone, Default)]
pub struct CancelHandle {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiting [`Ticker`].
    pub fn cancel(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lower the flag so the next wait runs its full interval.
    pub fn reset(&self) {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Waits a fixed interval at a time, unless cancelled.
#[derive(Debug, Clone)]
pub struct Ticker {
    interval: Duration,
    cancel: CancelHandle,
}

impl Ticker {
    pub fn new(interval: Duration, cancel: CancelHandle) -> Self {
        Self { interval, cancel }
    }

    /// Block for one interval.  Returns immediately with [`Tick::Cancelled`]
    /// if the handle is already cancelled.
    pub fn wait(&self) -> Tick {
        let (flag, condvar) = &*self.cancel.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = condvar
            .wait_timeout_while(guard, self.interval, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        if *guard { Tick::Cancelled } else { Tick::Elapsed }
    }
}
