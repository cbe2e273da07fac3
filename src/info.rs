//! Read-only snapshot of a machine's configuration.
//!
//! The snapshot is a pure projection: it carries both the underlying
//! identifiers and their rendered names, so the diagram renderers work on
//! plain strings and mutating the machine afterwards cannot affect it.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::core::{BehaviourKind, Registry, StateRepresentation};

/// Snapshot of the whole configuration, in configuration order.
#[derive(Clone, Debug)]
pub struct MachineInfo<S, T> {
    pub initial_state: S,
    pub initial_state_name: String,
    pub states: Vec<StateInfo<S, T>>,
}

impl<S: PartialEq, T> MachineInfo<S, T> {
    pub fn state(&self, id: S) -> Option<&StateInfo<S, T>> {
        self.states.iter().find(|state| state.id == id)
    }
}

/// Snapshot of one configured state.
#[derive(Clone, Debug)]
pub struct StateInfo<S, T> {
    pub id: S,
    pub name: String,
    pub superstate: Option<S>,
    pub superstate_name: Option<String>,
    /// Direct substates, in configuration order.
    pub substates: Vec<String>,
    pub entry_actions: Vec<ActionInfo<T>>,
    pub exit_actions: Vec<String>,
    pub activate_actions: Vec<String>,
    pub deactivate_actions: Vec<String>,
    pub fixed_transitions: Vec<FixedTransitionInfo<S, T>>,
    pub dynamic_transitions: Vec<DynamicTransitionInfo<T>>,
    pub ignored_triggers: Vec<IgnoredTriggerInfo<T>>,
}

/// An entry action descriptor; `from_trigger` narrows it to transitions
/// fired by that trigger.
#[derive(Clone, Debug)]
pub struct ActionInfo<T> {
    pub description: String,
    pub from_trigger: Option<T>,
    pub from_trigger_name: Option<String>,
}

/// A fixed-destination transition; reentries target their own state and
/// internal transitions additionally set `is_internal`.
#[derive(Clone, Debug)]
pub struct FixedTransitionInfo<S, T> {
    pub trigger: T,
    pub trigger_name: String,
    pub destination: S,
    pub destination_name: String,
    pub guards: Vec<String>,
    pub is_internal: bool,
}

#[derive(Clone, Debug)]
pub struct DynamicTransitionInfo<T> {
    pub trigger: T,
    pub trigger_name: String,
    pub selector_description: String,
    pub guards: Vec<String>,
    pub possible_destinations: Vec<DynamicDestinationInfo>,
}

#[derive(Clone, Debug)]
pub struct DynamicDestinationInfo {
    pub destination: String,
    pub criterion: String,
}

#[derive(Clone, Debug)]
pub struct IgnoredTriggerInfo<T> {
    pub trigger: T,
    pub trigger_name: String,
    pub guards: Vec<String>,
}

pub(crate) fn snapshot<S, T>(registry: &Registry<S, T>, initial_state: S) -> MachineInfo<S, T>
where
    S: Copy + Eq + Hash + Debug + Display,
    T: Copy + Eq + Hash + Debug + Display,
{
    let mut states: Vec<StateInfo<S, T>> = registry
        .iter()
        .map(|rep| state_info(registry, rep))
        .collect();
    if !states.iter().any(|state| state.id == initial_state) {
        states.push(StateInfo {
            id: initial_state,
            name: initial_state.to_string(),
            superstate: None,
            superstate_name: None,
            substates: Vec::new(),
            entry_actions: Vec::new(),
            exit_actions: Vec::new(),
            activate_actions: Vec::new(),
            deactivate_actions: Vec::new(),
            fixed_transitions: Vec::new(),
            dynamic_transitions: Vec::new(),
            ignored_triggers: Vec::new(),
        });
    }
    MachineInfo {
        initial_state,
        initial_state_name: initial_state.to_string(),
        states,
    }
}

fn state_info<S, T>(registry: &Registry<S, T>, rep: &StateRepresentation<S, T>) -> StateInfo<S, T>
where
    S: Copy + Eq + Hash + Debug + Display,
    T: Copy + Eq + Hash + Debug + Display,
{
    let mut fixed_transitions = Vec::new();
    let mut dynamic_transitions = Vec::new();
    let mut ignored_triggers = Vec::new();

    for (trigger, behaviours) in rep.behaviour_table() {
        for behaviour in behaviours {
            let guards = behaviour.guard.descriptions();
            match &behaviour.kind {
                BehaviourKind::Fixed { destination } => {
                    fixed_transitions.push(FixedTransitionInfo {
                        trigger: *trigger,
                        trigger_name: trigger.to_string(),
                        destination: *destination,
                        destination_name: destination.to_string(),
                        guards,
                        is_internal: false,
                    });
                }
                BehaviourKind::Reentry => {
                    fixed_transitions.push(FixedTransitionInfo {
                        trigger: *trigger,
                        trigger_name: trigger.to_string(),
                        destination: rep.state(),
                        destination_name: rep.state().to_string(),
                        guards,
                        is_internal: false,
                    });
                }
                BehaviourKind::Internal { .. } => {
                    fixed_transitions.push(FixedTransitionInfo {
                        trigger: *trigger,
                        trigger_name: trigger.to_string(),
                        destination: rep.state(),
                        destination_name: rep.state().to_string(),
                        guards,
                        is_internal: true,
                    });
                }
                BehaviourKind::Dynamic {
                    description,
                    possible_destinations,
                    ..
                } => {
                    dynamic_transitions.push(DynamicTransitionInfo {
                        trigger: *trigger,
                        trigger_name: trigger.to_string(),
                        selector_description: description.clone(),
                        guards,
                        possible_destinations: possible_destinations
                            .iter()
                            .map(|hint| DynamicDestinationInfo {
                                destination: hint.destination.to_string(),
                                criterion: hint.criterion.clone(),
                            })
                            .collect(),
                    });
                }
                BehaviourKind::Ignored => {
                    ignored_triggers.push(IgnoredTriggerInfo {
                        trigger: *trigger,
                        trigger_name: trigger.to_string(),
                        guards,
                    });
                }
            }
        }
    }

    StateInfo {
        id: rep.state(),
        name: rep.state().to_string(),
        superstate: rep.superstate(),
        superstate_name: rep.superstate().map(|parent| parent.to_string()),
        substates: registry
            .substates(rep.state())
            .into_iter()
            .map(|substate| substate.to_string())
            .collect(),
        entry_actions: rep
            .entry_actions()
            .iter()
            .map(|entry| ActionInfo {
                description: entry.description.clone(),
                from_trigger: entry.from_trigger,
                from_trigger_name: entry.from_trigger.map(|trigger| trigger.to_string()),
            })
            .collect(),
        exit_actions: rep
            .exit_actions()
            .iter()
            .map(|exit| exit.description.clone())
            .collect(),
        activate_actions: rep
            .activate_actions()
            .iter()
            .map(|action| action.description.clone())
            .collect(),
        deactivate_actions: rep
            .deactivate_actions()
            .iter()
            .map(|action| action.description.clone())
            .collect(),
        fixed_transitions,
        dynamic_transitions,
        ignored_triggers,
    }
}
