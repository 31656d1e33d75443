use log::info;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Elapsed,
    Cancelled,
}

#[derive(Debug)]
struct TimerState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Named, cancellable waits for settle and maintenance windows.
///
/// Every wait is `scale × nominal`, so a cluster configured with shortened
/// maintenance intervals can be tested without real-time waits. Cancelling
/// wakes the current wait and makes every later one return at once.
#[derive(Debug, Clone)]
pub struct Timers {
    state: Arc<TimerState>,
    scale: f64,
}

/// Cancels the timers it was taken from, from any thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Arc<TimerState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let mut cancelled = self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.state.wake.notify_all();
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Timers {
    pub fn new(scale: f64) -> Self {
        Self {
            state: Arc::new(TimerState {
                cancelled: Mutex::new(false),
                wake: Condvar::new(),
            }),
            // Negative or NaN scales collapse to "no wait".
            scale: if scale.is_finite() { scale.max(0.0) } else { 0.0 },
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn scaled(&self, nominal: Duration) -> Duration {
        Duration::try_from_secs_f64(nominal.as_secs_f64() * self.scale).unwrap_or(Duration::MAX)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: self.state.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sleep(&self, name: &str, nominal: Duration) -> TimerOutcome {
        let duration = self.scaled(nominal);
        info!("Waiting {:?} ({})...", duration, name);

        let cancelled = self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (cancelled, _) = self
            .state
            .wake
            .wait_timeout_while(cancelled, duration, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);

        if *cancelled {
            TimerOutcome::Cancelled
        } else {
            TimerOutcome::Elapsed
        }
    }
}
