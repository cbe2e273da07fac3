//! Event-time values: the transition record handed to callbacks and the
//! policy for triggers fired while another dispatch is in flight.

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use strum_macros::{Display as StrumDisplay, EnumString};

use crate::support::{CancellationToken, Payload};

/// Policy for triggers fired while another dispatch is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString)]
pub enum FiringMode {
    /// A re-fired trigger is processed as soon as the currently running
    /// action completes, before the outer entry chain continues.
    Immediate,
    /// A re-fired trigger waits until the current transition has fully
    /// completed, entry actions and listeners included.
    Queued,
}

impl Default for FiringMode {
    fn default() -> Self {
        FiringMode::Immediate
    }
}

/// A fired trigger waiting in the pending queue.
pub(crate) struct FiredTrigger<T> {
    pub(crate) trigger: T,
    pub(crate) payload: Payload,
    pub(crate) token: CancellationToken,
}

/// Record of one transition, passed to exit actions, entry actions, internal
/// actions and transition listeners.
#[derive(Clone)]
pub struct Transition<S, T> {
    source: S,
    destination: S,
    trigger: T,
    payload: Payload,
    is_reentry: bool,
    is_initial: bool,
    token: CancellationToken,
}

impl<S, T> Transition<S, T>
where
    S: Copy,
    T: Copy,
{
    pub(crate) fn new(
        source: S,
        destination: S,
        trigger: T,
        payload: Payload,
        is_reentry: bool,
        token: CancellationToken,
    ) -> Self {
        Transition {
            source,
            destination,
            trigger,
            payload,
            is_reentry,
            is_initial: false,
            token,
        }
    }

    pub fn source(&self) -> S {
        self.source
    }

    pub fn destination(&self) -> S {
        self.destination
    }

    pub fn trigger(&self) -> T {
        self.trigger
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// True when the transition leaves and re-enters its own source state.
    pub fn is_reentry(&self) -> bool {
        self.is_reentry
    }

    /// True only for the synthetic record describing entry into the initial
    /// state; ordinary dispatch never sets it.
    pub fn is_initial(&self) -> bool {
        self.is_initial
    }

    /// Token of the dispatching call; actions may observe cancellation, but
    /// an in-flight transition always completes.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.token
    }
}

impl<S: Debug, T: Debug> Debug for Transition<S, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Transition(source={:?}, destination={:?}, trigger={:?}, reentry={})",
            self.source, self.destination, self.trigger, self.is_reentry
        )
    }
}

impl<S: Debug, T: Debug> Display for Transition<S, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(self, f)
    }
}
