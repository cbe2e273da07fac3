//! Fluent configuration façade, entered through [`StateMachine::configure`].
//!
//! Methods that can violate a configuration constraint return
//! `Result<&mut Self>` so declarations chain with `?`; the purely additive
//! ones return `&mut Self` directly.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crate::core::{
    BehaviourKind, DynamicDestination, EntryAction, ExitAction, Guard, LifecycleAction,
    TriggerBehaviour,
};
use crate::error::Error;
use crate::event::Transition;
use crate::machine::StateMachine;
use crate::support::{describe, Payload};
use crate::Result;

pub struct StateConfiguration<'a, S, T> {
    machine: &'a StateMachine<S, T>,
    state: S,
}

impl<'a, S, T> StateConfiguration<'a, S, T>
where
    S: Copy + Eq + Hash + Debug,
    T: Copy + Eq + Hash + Debug,
{
    pub(crate) fn new(machine: &'a StateMachine<S, T>, state: S) -> Self {
        StateConfiguration { machine, state }
    }

    /// The state being configured.
    pub fn state(&self) -> S {
        self.state
    }

    /// On `trigger`, transition to `destination`.
    pub fn permit(&mut self, trigger: T, destination: S) -> Result<&mut Self> {
        self.permit_if_with(trigger, destination, Guard::new())
    }

    /// On `trigger`, transition to `destination` when `guard` passes.
    pub fn permit_if<F>(
        &mut self,
        trigger: T,
        destination: S,
        guard: F,
        description: &str,
    ) -> Result<&mut Self>
    where
        F: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        self.permit_if_with(trigger, destination, Guard::from_fn(guard, description))
    }

    /// Like [`StateConfiguration::permit_if`], with a multi-condition guard.
    pub fn permit_if_with(
        &mut self,
        trigger: T,
        destination: S,
        guard: Guard,
    ) -> Result<&mut Self> {
        if destination == self.state {
            return Err(Error::InvalidOperation(format!(
                "permit requires a destination different from {:?}; use permit_reentry or ignore",
                self.state
            )));
        }
        self.add_behaviour(trigger, TriggerBehaviour::new(BehaviourKind::Fixed { destination }, guard))
    }

    /// On `trigger`, exit and re-enter this state, running its exit and
    /// entry actions. When the behaviour is inherited by a substate, this
    /// state is still the one left and re-entered.
    pub fn permit_reentry(&mut self, trigger: T) -> Result<&mut Self> {
        self.add_behaviour(trigger, TriggerBehaviour::new(BehaviourKind::Reentry, Guard::new()))
    }

    pub fn permit_reentry_if<F>(
        &mut self,
        trigger: T,
        guard: F,
        description: &str,
    ) -> Result<&mut Self>
    where
        F: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        self.add_behaviour(
            trigger,
            TriggerBehaviour::new(BehaviourKind::Reentry, Guard::from_fn(guard, description)),
        )
    }

    /// On `trigger`, compute the destination from the payload. The
    /// destination hints are used only by introspection and the diagram
    /// renderers; the selector's result is never validated against them.
    pub fn permit_dynamic<F>(
        &mut self,
        trigger: T,
        selector: F,
        description: &str,
        possible_destinations: Vec<DynamicDestination<S>>,
    ) -> Result<&mut Self>
    where
        F: Fn(&Payload) -> S + Send + Sync + 'static,
    {
        self.permit_dynamic_if(
            trigger,
            selector,
            description,
            Guard::new(),
            possible_destinations,
        )
    }

    pub fn permit_dynamic_if<F>(
        &mut self,
        trigger: T,
        selector: F,
        description: &str,
        guard: Guard,
        possible_destinations: Vec<DynamicDestination<S>>,
    ) -> Result<&mut Self>
    where
        F: Fn(&Payload) -> S + Send + Sync + 'static,
    {
        self.add_behaviour(
            trigger,
            TriggerBehaviour::new(
                BehaviourKind::Dynamic {
                    selector: Arc::new(selector),
                    description: describe(description),
                    possible_destinations,
                },
                guard,
            ),
        )
    }

    /// On `trigger`, do nothing: no actions, no events, no state change.
    /// Ignoring in a substate shadows a transition configured on a
    /// superstate.
    pub fn ignore(&mut self, trigger: T) -> Result<&mut Self> {
        self.add_behaviour(trigger, TriggerBehaviour::new(BehaviourKind::Ignored, Guard::new()))
    }

    pub fn ignore_if<F>(&mut self, trigger: T, guard: F, description: &str) -> Result<&mut Self>
    where
        F: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        self.add_behaviour(
            trigger,
            TriggerBehaviour::new(BehaviourKind::Ignored, Guard::from_fn(guard, description)),
        )
    }

    /// On `trigger`, run `action` without leaving the state: no exit or
    /// entry actions run and no transition listeners fire.
    pub fn internal_transition<F>(&mut self, trigger: T, action: F) -> Result<&mut Self>
    where
        F: Fn(&Transition<S, T>) -> Result<()> + Send + Sync + 'static,
    {
        self.add_behaviour(
            trigger,
            TriggerBehaviour::new(
                BehaviourKind::Internal {
                    action: Arc::new(action),
                },
                Guard::new(),
            ),
        )
    }

    /// Runs `action` whenever this state is entered.
    pub fn on_entry<F>(&mut self, action: F, description: &str) -> &mut Self
    where
        F: Fn(&Transition<S, T>) -> Result<()> + Send + Sync + 'static,
    {
        self.add_entry_action(None, action, description)
    }

    /// Runs `action` only when this state is entered through a transition
    /// fired by `trigger`.
    pub fn on_entry_from<F>(&mut self, trigger: T, action: F, description: &str) -> &mut Self
    where
        F: Fn(&Transition<S, T>) -> Result<()> + Send + Sync + 'static,
    {
        self.add_entry_action(Some(trigger), action, description)
    }

    /// Runs `action` whenever this state is exited.
    pub fn on_exit<F>(&mut self, action: F, description: &str) -> &mut Self
    where
        F: Fn(&Transition<S, T>) -> Result<()> + Send + Sync + 'static,
    {
        let state = self.state;
        self.machine.with_inner_mut(|inner| {
            inner.registry.representation_mut(state).add_exit_action(ExitAction {
                action: Arc::new(action),
                description: describe(description),
            });
        });
        self
    }

    pub fn on_activate<F>(&mut self, action: F, description: &str) -> &mut Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.add_lifecycle_action(true, action, description)
    }

    pub fn on_deactivate<F>(&mut self, action: F, description: &str) -> &mut Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.add_lifecycle_action(false, action, description)
    }

    /// Declares this state a substate of `superstate`. The parent links must
    /// form a forest; a cycle is rejected.
    pub fn substate_of(&mut self, superstate: S) -> Result<&mut Self> {
        if superstate == self.state {
            return Err(Error::InvalidOperation(format!(
                "state {:?} cannot be a substate of itself",
                self.state
            )));
        }
        let state = self.state;
        self.machine.with_inner_mut(|inner| {
            if inner.registry.would_create_cycle(state, superstate) {
                return Err(Error::InvalidOperation(format!(
                    "making {:?} a substate of {:?} would create a cycle",
                    state, superstate
                )));
            }
            inner.registry.representation_mut(superstate);
            inner.registry.representation_mut(state).set_superstate(superstate);
            Ok(())
        })?;
        Ok(self)
    }

    fn add_behaviour(&mut self, trigger: T, behaviour: TriggerBehaviour<S, T>) -> Result<&mut Self> {
        let state = self.state;
        self.machine.with_inner_mut(|inner| {
            let rep = inner.registry.representation_mut(state);
            if let Some(existing) = rep.behaviours(trigger) {
                let has_internal = existing.iter().any(|b| b.kind.is_internal());
                let has_external = existing.iter().any(|b| b.kind.is_external());
                if (behaviour.kind.is_internal() && has_external)
                    || (behaviour.kind.is_external() && has_internal)
                {
                    return Err(Error::InvalidOperation(format!(
                        "trigger {:?} on state {:?} is already configured with conflicting internal and external semantics",
                        trigger, state
                    )));
                }
            }
            rep.add_trigger_behaviour(trigger, behaviour);
            Ok(())
        })?;
        Ok(self)
    }

    fn add_entry_action<F>(&mut self, from_trigger: Option<T>, action: F, description: &str) -> &mut Self
    where
        F: Fn(&Transition<S, T>) -> Result<()> + Send + Sync + 'static,
    {
        let state = self.state;
        self.machine.with_inner_mut(|inner| {
            inner.registry.representation_mut(state).add_entry_action(EntryAction {
                action: Arc::new(action),
                from_trigger,
                description: describe(description),
            });
        });
        self
    }

    fn add_lifecycle_action<F>(&mut self, activate: bool, action: F, description: &str) -> &mut Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let state = self.state;
        let lifecycle = LifecycleAction {
            action: Arc::new(action),
            description: describe(description),
        };
        self.machine.with_inner_mut(|inner| {
            let rep = inner.registry.representation_mut(state);
            if activate {
                rep.add_activate_action(lifecycle);
            } else {
                rep.add_deactivate_action(lifecycle);
            }
        });
        self
    }
}
