//! A hierarchical state machine library.
//!
//! A [`StateMachine`] is parameterised on a state identifier type `S` and a
//! trigger identifier type `T` and configured at runtime: each state
//! declares the transitions, guards and entry/exit actions that apply to it,
//! and may nest inside a superstate whose configuration it inherits and can
//! shadow. Firing a trigger walks the hierarchy, evaluates guards, runs the
//! exit and entry chains in order and stores the new state, either in the
//! machine itself or through caller-supplied accessors.
//!
//! ```
//! use restless::{Payload, StateMachine};
//!
//! #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
//! enum State { Idle, Running }
//! #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
//! enum Trigger { Start, Stop }
//!
//! let machine = StateMachine::new(State::Idle);
//! machine.configure(State::Idle).permit(Trigger::Start, State::Running)?;
//! machine.configure(State::Running).permit(Trigger::Stop, State::Idle)?;
//!
//! machine.fire(Trigger::Start, Payload::none())?;
//! assert_eq!(machine.state(), State::Running);
//! # Ok::<(), restless::Error>(())
//! ```

mod builder;
mod core;
mod error;
mod event;
mod info;
mod machine;
mod support;

pub mod dot;
pub mod mermaid;

pub use crate::builder::StateConfiguration;
pub use crate::core::{DynamicDestination, Guard, GuardEvaluation};
pub use crate::error::Error;
pub use crate::event::{FiringMode, Transition};
pub use crate::info::{
    ActionInfo, DynamicDestinationInfo, DynamicTransitionInfo, FixedTransitionInfo,
    IgnoredTriggerInfo, MachineInfo, StateInfo,
};
pub use crate::machine::StateMachine;
pub use crate::mermaid::MermaidDirection;
pub use crate::support::{typed_action, CancellationToken, Payload, DEFAULT_DESCRIPTION};

pub type Result<T> = std::result::Result<T, error::Error>;
