//! Shared plumbing: the type-erased trigger payload, the cooperative
//! cancellation token and the typed-action trampoline.

use std::any::Any;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Error;
use crate::event::Transition;
use crate::Result;

/// Description recorded for callables the caller did not describe.
pub const DEFAULT_DESCRIPTION: &str = "Function";

pub(crate) fn describe(description: &str) -> String {
    if description.is_empty() {
        DEFAULT_DESCRIPTION.to_string()
    } else {
        description.to_string()
    }
}

/// Type-erased value carried by every fired trigger.
///
/// Guards, dynamic selectors and actions downcast on entry via
/// [`Payload::get`]. [`Payload::none`] is the sentinel for "nothing was
/// passed"; it is the only way to express an absent payload, so an
/// explicitly-absent value and a never-passed one are indistinguishable.
#[derive(Clone, Default)]
pub struct Payload {
    value: Option<Arc<dyn Any + Send + Sync>>,
}

impl Payload {
    pub fn new<V: Any + Send + Sync>(value: V) -> Self {
        Payload {
            value: Some(Arc::new(value)),
        }
    }

    pub fn none() -> Self {
        Payload { value: None }
    }

    pub fn is_none(&self) -> bool {
        self.value.is_none()
    }

    /// The payload as a `V`, if one was passed and the type matches.
    pub fn get<V: Any>(&self) -> Option<&V> {
        self.value.as_ref().and_then(|value| value.downcast_ref())
    }
}

impl Debug for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.value {
            Some(_) => write!(f, "Payload(..)"),
            None => write!(f, "Payload(none)"),
        }
    }
}

/// Cooperative cancellation for [`StateMachine::fire_with_cancellation`].
///
/// The token is checked once, before dispatch begins. Actions receive it
/// through the [`Transition`] value and may observe it, but an in-flight
/// transition always runs to completion.
///
/// [`StateMachine::fire_with_cancellation`]: crate::StateMachine::fire_with_cancellation
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Debug for CancellationToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "CancellationToken(cancelled={})", self.is_cancelled())
    }
}

/// Wraps a typed action in a cast-and-call trampoline.
///
/// The payload stays type-erased inside the machine; the returned closure
/// downcasts it on entry and fails with [`Error::ParameterConversion`] when
/// the payload is absent or of another type.
pub fn typed_action<S, T, V, F>(
    action: F,
) -> impl Fn(&Transition<S, T>) -> Result<()> + Send + Sync + 'static
where
    S: Copy + 'static,
    T: Copy + 'static,
    V: Any,
    F: Fn(&V, &Transition<S, T>) -> Result<()> + Send + Sync + 'static,
{
    move |transition| match transition.payload().get::<V>() {
        Some(value) => action(value, transition),
        None => Err(Error::ParameterConversion {
            expected: std::any::type_name::<V>(),
        }),
    }
}
