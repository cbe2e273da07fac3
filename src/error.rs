//! Error kinds surfaced by the machine.
//!
//! The dispatcher distinguishes expected guard rejections, which steer
//! behaviour selection and are never propagated, from everything else, which
//! surfaces out of the calling operation.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A configuration constraint was violated, e.g. a substate cycle or a
    /// trigger reconfigured with conflicting internal and external semantics.
    #[error("InvalidOperation: {0}")]
    InvalidOperation(String),
    /// Malformed caller input outside the configuration model itself.
    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),
    /// A trigger was fired for which no behaviour, at any level of the
    /// hierarchy, has a satisfied guard.
    #[error("{}", invalid_transition_message(.state, .trigger, .permitted_triggers, .unmet_guards))]
    InvalidTransition {
        state: String,
        trigger: String,
        permitted_triggers: Vec<String>,
        unmet_guards: Vec<String>,
    },
    /// A typed action received a payload of a different type.
    #[error("ParameterConversion: payload could not be converted to {expected}")]
    ParameterConversion { expected: &'static str },
    /// Expected, structured failure raised inside a guard predicate. The
    /// dispatcher treats it as "guard failed" and records the reason.
    #[error("GuardRejection: {0}")]
    GuardRejection(String),
    /// The cancellation token was cancelled before dispatch started.
    #[error("Cancelled: the operation was cancelled before dispatch started")]
    Cancelled,
}

impl Error {
    /// Shorthand for a guard rejection carrying `reason`.
    pub fn rejection<R: Into<String>>(reason: R) -> Self {
        Error::GuardRejection(reason.into())
    }
}

fn invalid_transition_message(
    state: &str,
    trigger: &str,
    permitted_triggers: &[String],
    unmet_guards: &[String],
) -> String {
    if !unmet_guards.is_empty() {
        format!(
            "InvalidTransition: trigger '{}' is valid in state '{}' but guard conditions are not met: [{}]",
            trigger,
            state,
            unmet_guards.join(", ")
        )
    } else if !permitted_triggers.is_empty() {
        format!(
            "InvalidTransition: no transition is configured for trigger '{}' in state '{}'; permitted triggers: [{}]",
            trigger,
            state,
            permitted_triggers.join(", ")
        )
    } else {
        format!(
            "InvalidTransition: no valid leaving transitions are permitted from state '{}' for trigger '{}'",
            state, trigger
        )
    }
}
