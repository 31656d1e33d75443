//! Counting completion gate.
//!
//! The test driver registers how many asynchronous operations it issued with
//! [`CompletionGate::begin`], then parks in [`CompletionGate::wait`] until every
//! one of them has signalled. Signals may come from any thread and in any
//! order, including before the driver reaches `wait`. The accumulator `T`
//! lives under the same lock as the counter so result callbacks racing each
//! other (or racing the final completion) never tear it.

use log::{error, warn};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Token for one begin/wait round. Callbacks carry it so that a completion
/// arriving after its round has been closed cannot leak into the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round(u64);

#[derive(Debug)]
struct GateState<T> {
    pending: usize,
    round: u64,
    open: bool,
    acc: T,
}

#[derive(Debug)]
pub struct CompletionGate<T = ()> {
    state: Mutex<GateState<T>>,
    done: Condvar,
}

impl<T: Default> Default for CompletionGate<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> CompletionGate<T> {
    pub fn new(acc: T) -> Self {
        Self {
            state: Mutex::new(GateState {
                pending: 0,
                round: 0,
                open: false,
                acc,
            }),
            done: Condvar::new(),
        }
    }

    // A panicking callback must not wedge the driver; the counter is still sound.
    fn lock(&self) -> MutexGuard<'_, GateState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `n` more outstanding operations. Opens a new round unless
    /// one is already open, in which case the operations join it.
    pub fn begin(&self, n: usize) -> Round {
        let mut state = self.lock();
        if !state.open {
            state.round += 1;
            state.open = true;
        }
        state.pending += n;
        Round(state.round)
    }

    /// One operation of the current round finished.
    pub fn signal(&self) {
        let mut state = self.lock();
        if Self::release(&mut state) {
            self.done.notify_all();
        }
    }

    /// Applies `f` to the accumulator and signals, atomically. Ignored if
    /// `round` is no longer outstanding.
    pub fn complete<F>(&self, round: Round, f: F)
    where
        F: FnOnce(&mut T),
    {
        let mut state = self.lock();
        if !Self::is_live(&state, round) {
            warn!("Dropping completion for closed round {:?}", round);
            return;
        }
        f(&mut state.acc);
        if Self::release(&mut state) {
            self.done.notify_all();
        }
    }

    /// Applies `f` to the accumulator without signalling. Returns false when
    /// `round` is no longer outstanding and `f` was not run.
    pub fn record<F>(&self, round: Round, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        let mut state = self.lock();
        if !Self::is_live(&state, round) {
            warn!("Dropping late result for closed round {:?}", round);
            return false;
        }
        f(&mut state.acc);
        true
    }

    /// Blocks until the outstanding count of the open round reaches zero,
    /// then closes the round.
    pub fn wait(&self) {
        let state = self.lock();
        if !state.open {
            error!("CompletionGate::wait called without a matching begin");
            return;
        }
        let mut state = self
            .done
            .wait_while(state, |s| s.pending > 0)
            .unwrap_or_else(PoisonError::into_inner);
        state.open = false;
    }

    pub fn update<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        f(&mut self.lock().acc)
    }

    pub fn pending(&self) -> usize {
        self.lock().pending
    }

    pub fn take(&self) -> T
    where
        T: Default,
    {
        std::mem::take(&mut self.lock().acc)
    }

    fn is_live(state: &GateState<T>, round: Round) -> bool {
        state.open && state.round == round.0 && state.pending > 0
    }

    fn release(state: &mut GateState<T>) -> bool {
        match state.pending.checked_sub(1) {
            Some(left) => {
                state.pending = left;
                true
            }
            None => {
                error!("CompletionGate signalled with no outstanding operation");
                false
            }
        }
    }
}
