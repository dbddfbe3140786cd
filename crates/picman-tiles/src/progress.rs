//! Progress reporting and cooperative cancellation.
//!
//! A [`Progress`] is checked by the region iterator between steps. Raising
//! the abort flag ends the iteration with [`Error::Cancelled`] at the next
//! step boundary; a step that is already running always completes.
//!
//! [`Error::Cancelled`]: picman_core::Error::Cancelled

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type Callback = Box<dyn Fn(f64) + Send + Sync>;

/// Abort flag plus optional progress callback.
#[derive(Default)]
pub struct Progress {
    abort: Arc<AtomicBool>,
    callback: Option<Callback>,
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("cancelled", &self.is_cancelled())
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Cloneable handle that cancels a [`Progress`] from elsewhere.
#[derive(Debug, Clone)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Requests cancellation.
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl Progress {
    /// Creates a progress without callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a progress reporting the processed fraction to `callback`.
    pub fn with_callback(callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self {
            abort: Arc::default(),
            callback: Some(Box::new(callback)),
        }
    }

    /// Handle for cancelling from another thread or callback.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(Arc::clone(&self.abort))
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Reports the processed fraction in [0, 1].
    pub fn report(&self, fraction: f64) {
        if let Some(cb) = &self.callback {
            cb(fraction.clamp(0.0, 1.0));
        }
    }
}
