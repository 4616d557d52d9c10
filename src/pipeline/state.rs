// Per-run state: lifecycle, abort signal, in-flight accounting.
//
// Idle -> Running -> Draining -> Terminated
//                 \-> Aborting -> Terminated
//
// Draining may still turn into Aborting when the sink or a late worker fails.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use tracing::debug;

use super::abort::{AbortSignal, CancelToken};
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum RunState {
    Idle = 0,
    Running = 1,
    Draining = 2,
    Aborting = 3,
    Terminated = 4,
}

impl RunState {
    fn from_u8(value: u8) -> RunState {
        match value {
            0 => RunState::Idle,
            1 => RunState::Running,
            2 => RunState::Draining,
            3 => RunState::Aborting,
            _ => RunState::Terminated,
        }
    }

    fn can_become(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Draining)
                | (Running, Aborting)
                | (Draining, Aborting)
                | (Draining, Terminated)
                | (Aborting, Terminated)
        )
    }
}

#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    fn new() -> Self {
        Lifecycle(AtomicU8::new(RunState::Idle as u8))
    }

    pub(crate) fn get(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` if that is a legal step from the current state.
    pub(crate) fn advance(&self, next: RunState) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let from = RunState::from_u8(current);
            if !from.can_become(next) {
                return false;
            }
            match self.0.compare_exchange_weak(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    debug!(?from, to = ?next, "run state");
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }
}

/// Everything the reader, the workers and the drain share during one run.
#[derive(Debug)]
pub(crate) struct RunContext {
    signal: AbortSignal,
    cancel: CancelToken,
    lifecycle: Lifecycle,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl RunContext {
    pub(crate) fn new(cancel: CancelToken) -> Self {
        RunContext {
            signal: AbortSignal::default(),
            cancel,
            lifecycle: Lifecycle::new(),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn state(&self) -> RunState {
        self.lifecycle.get()
    }

    pub(crate) fn advance(&self, next: RunState) -> bool {
        self.lifecycle.advance(next)
    }

    /// Raise a fatal error. Only the first cause is kept.
    pub(crate) fn abort(&self, cause: PipelineError) {
        if self.signal.raise(cause) {
            self.lifecycle.advance(RunState::Aborting);
        }
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.signal.is_raised()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn task_started(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);
    }

    pub(crate) fn task_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn into_cause(self) -> Option<PipelineError> {
        self.signal.into_cause()
    }
}
