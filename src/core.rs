//! Central configuration model: guard conditions, per-trigger behaviours and
//! the per-state representation the dispatcher walks.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::Error;
use crate::event::Transition;
use crate::support::{describe, Payload};
use crate::Result;

pub(crate) type ActionFn<S, T> = Arc<dyn Fn(&Transition<S, T>) -> Result<()> + Send + Sync>;
pub(crate) type SelectorFn<S> = Arc<dyn Fn(&Payload) -> S + Send + Sync>;
pub(crate) type LifecycleFn = Arc<dyn Fn() -> Result<()> + Send + Sync>;
type GuardFn = Arc<dyn Fn(&Payload) -> Result<bool> + Send + Sync>;

/// A single predicate with its human description.
#[derive(Clone)]
struct GuardCondition {
    predicate: GuardFn,
    description: String,
}

impl GuardCondition {
    /// `None` when met; the description or rejection reason when unmet.
    fn evaluate(&self, payload: &Payload) -> Result<Option<String>> {
        match (self.predicate)(payload) {
            Ok(true) => Ok(None),
            Ok(false) => Ok(Some(self.description.clone())),
            Err(Error::GuardRejection(reason)) => Ok(Some(reason)),
            Err(err) => Err(err),
        }
    }
}

/// Ordered set of predicates gating a trigger behaviour.
///
/// An empty guard is trivially satisfied. Predicates are evaluated in the
/// order they were added and every unmet one is reported.
#[derive(Clone, Default)]
pub struct Guard {
    conditions: Vec<GuardCondition>,
}

impl Guard {
    pub fn new() -> Self {
        Guard::default()
    }

    /// Single-predicate guard.
    pub fn from_fn<F>(predicate: F, description: &str) -> Self
    where
        F: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        Guard::new().require(predicate, description)
    }

    /// Adds a predicate returning plain `bool`.
    pub fn require<F>(mut self, predicate: F, description: &str) -> Self
    where
        F: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        self.conditions.push(GuardCondition {
            predicate: Arc::new(move |payload| Ok(predicate(payload))),
            description: describe(description),
        });
        self
    }

    /// Adds a predicate that may signal a structured rejection. A
    /// [`Error::GuardRejection`] counts as "unmet" and its reason is
    /// collected; any other error propagates out of dispatch.
    pub fn require_checked<F>(mut self, predicate: F, description: &str) -> Self
    where
        F: Fn(&Payload) -> Result<bool> + Send + Sync + 'static,
    {
        self.conditions.push(GuardCondition {
            predicate: Arc::new(predicate),
            description: describe(description),
        });
        self
    }

    /// Builds a guard from parallel predicate and description lists.
    pub fn with_descriptions<F>(predicates: Vec<F>, descriptions: &[&str]) -> Result<Self>
    where
        F: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        if predicates.len() != descriptions.len() {
            return Err(Error::InvalidArgument(format!(
                "guard description count ({}) must match the number of predicates ({})",
                descriptions.len(),
                predicates.len()
            )));
        }
        let mut guard = Guard::new();
        for (predicate, description) in predicates.into_iter().zip(descriptions) {
            guard = guard.require(predicate, description);
        }
        Ok(guard)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub(crate) fn descriptions(&self) -> Vec<String> {
        self.conditions
            .iter()
            .map(|condition| condition.description.clone())
            .collect()
    }

    /// Evaluates every predicate in order, collecting the descriptions of
    /// unmet ones and the reasons of rejected ones.
    pub fn evaluate(&self, payload: &Payload) -> Result<GuardEvaluation> {
        let mut unmet = Vec::new();
        for condition in &self.conditions {
            if let Some(reason) = condition.evaluate(payload)? {
                unmet.push(reason);
            }
        }
        Ok(GuardEvaluation { unmet })
    }
}

impl Debug for Guard {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Guard({:?})", self.descriptions())
    }
}

/// Outcome of evaluating a [`Guard`] against a payload.
#[derive(Debug)]
pub struct GuardEvaluation {
    unmet: Vec<String>,
}

impl GuardEvaluation {
    pub fn is_met(&self) -> bool {
        self.unmet.is_empty()
    }

    pub fn unmet(&self) -> &[String] {
        &self.unmet
    }

    pub(crate) fn into_unmet(self) -> Vec<String> {
        self.unmet
    }
}

/// Destination hint for a dynamic transition, used only by introspection and
/// the diagram renderers; the selector is never validated against it.
#[derive(Clone, Debug)]
pub struct DynamicDestination<S> {
    pub destination: S,
    pub criterion: String,
}

impl<S> DynamicDestination<S> {
    pub fn new<C: Into<String>>(destination: S, criterion: C) -> Self {
        DynamicDestination {
            destination,
            criterion: criterion.into(),
        }
    }
}

/// What a trigger means in the state it was configured on.
#[derive(Clone)]
pub(crate) enum BehaviourKind<S, T> {
    Fixed {
        destination: S,
    },
    Dynamic {
        selector: SelectorFn<S>,
        description: String,
        possible_destinations: Vec<DynamicDestination<S>>,
    },
    Internal {
        action: ActionFn<S, T>,
    },
    Ignored,
    Reentry,
}

impl<S, T> BehaviourKind<S, T> {
    pub(crate) fn is_internal(&self) -> bool {
        matches!(self, BehaviourKind::Internal { .. })
    }

    /// Fixed, dynamic and reentry behaviours leave the state; internal and
    /// ignored ones do not.
    pub(crate) fn is_external(&self) -> bool {
        matches!(
            self,
            BehaviourKind::Fixed { .. } | BehaviourKind::Dynamic { .. } | BehaviourKind::Reentry
        )
    }
}

/// One configured behaviour for a `(state, trigger)` pair.
#[derive(Clone)]
pub(crate) struct TriggerBehaviour<S, T> {
    pub(crate) guard: Guard,
    pub(crate) kind: BehaviourKind<S, T>,
}

impl<S, T> TriggerBehaviour<S, T> {
    pub(crate) fn new(kind: BehaviourKind<S, T>, guard: Guard) -> Self {
        TriggerBehaviour { guard, kind }
    }
}

/// An entry action, optionally narrowed to transitions on one trigger.
#[derive(Clone)]
pub(crate) struct EntryAction<S, T> {
    pub(crate) action: ActionFn<S, T>,
    pub(crate) from_trigger: Option<T>,
    pub(crate) description: String,
}

#[derive(Clone)]
pub(crate) struct ExitAction<S, T> {
    pub(crate) action: ActionFn<S, T>,
    pub(crate) description: String,
}

/// An activate or deactivate action.
#[derive(Clone)]
pub(crate) struct LifecycleAction {
    pub(crate) action: LifecycleFn,
    pub(crate) description: String,
}

/// Everything configured for a single state. A representation holds only its
/// parent's identifier, never a reference; the registry resolves identifiers
/// back to representations, so the hierarchy cannot form reference cycles.
pub(crate) struct StateRepresentation<S, T> {
    state: S,
    superstate: Option<S>,
    entry_actions: Vec<EntryAction<S, T>>,
    exit_actions: Vec<ExitAction<S, T>>,
    activate_actions: Vec<LifecycleAction>,
    deactivate_actions: Vec<LifecycleAction>,
    trigger_behaviours: IndexMap<T, Vec<TriggerBehaviour<S, T>>>,
}

impl<S, T> StateRepresentation<S, T>
where
    S: Copy + Eq + Hash + Debug,
    T: Copy + Eq + Hash + Debug,
{
    pub(crate) fn new(state: S) -> Self {
        StateRepresentation {
            state,
            superstate: None,
            entry_actions: Vec::new(),
            exit_actions: Vec::new(),
            activate_actions: Vec::new(),
            deactivate_actions: Vec::new(),
            trigger_behaviours: IndexMap::new(),
        }
    }

    pub(crate) fn state(&self) -> S {
        self.state
    }

    pub(crate) fn superstate(&self) -> Option<S> {
        self.superstate
    }

    pub(crate) fn set_superstate(&mut self, superstate: S) {
        self.superstate = Some(superstate);
    }

    pub(crate) fn add_trigger_behaviour(&mut self, trigger: T, behaviour: TriggerBehaviour<S, T>) {
        self.trigger_behaviours
            .entry(trigger)
            .or_insert_with(Vec::new)
            .push(behaviour);
    }

    pub(crate) fn behaviours(&self, trigger: T) -> Option<&[TriggerBehaviour<S, T>]> {
        self.trigger_behaviours
            .get(&trigger)
            .map(|behaviours| behaviours.as_slice())
    }

    pub(crate) fn behaviour_table(&self) -> &IndexMap<T, Vec<TriggerBehaviour<S, T>>> {
        &self.trigger_behaviours
    }

    pub(crate) fn add_entry_action(&mut self, action: EntryAction<S, T>) {
        self.entry_actions.push(action);
    }

    pub(crate) fn add_exit_action(&mut self, action: ExitAction<S, T>) {
        self.exit_actions.push(action);
    }

    pub(crate) fn add_activate_action(&mut self, action: LifecycleAction) {
        self.activate_actions.push(action);
    }

    pub(crate) fn add_deactivate_action(&mut self, action: LifecycleAction) {
        self.deactivate_actions.push(action);
    }

    pub(crate) fn entry_actions(&self) -> &[EntryAction<S, T>] {
        &self.entry_actions
    }

    pub(crate) fn exit_actions(&self) -> &[ExitAction<S, T>] {
        &self.exit_actions
    }

    pub(crate) fn activate_actions(&self) -> &[LifecycleAction] {
        &self.activate_actions
    }

    pub(crate) fn deactivate_actions(&self) -> &[LifecycleAction] {
        &self.deactivate_actions
    }
}

impl<S: Debug, T: Debug> Debug for StateRepresentation<S, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "StateRepresentation(state={:?}, superstate={:?}, triggers={:?})",
            self.state,
            self.superstate,
            self.trigger_behaviours.keys().collect::<Vec<_>>()
        )
    }
}

/// The machine's single `id -> representation` mapping, in configuration
/// order. Ancestor walks and substate membership are recomputed on demand.
pub(crate) struct Registry<S, T> {
    states: IndexMap<S, StateRepresentation<S, T>>,
}

impl<S, T> Registry<S, T>
where
    S: Copy + Eq + Hash + Debug,
    T: Copy + Eq + Hash + Debug,
{
    pub(crate) fn new() -> Self {
        Registry {
            states: IndexMap::new(),
        }
    }

    pub(crate) fn representation(&self, state: S) -> Option<&StateRepresentation<S, T>> {
        self.states.get(&state)
    }

    pub(crate) fn representation_mut(&mut self, state: S) -> &mut StateRepresentation<S, T> {
        self.states
            .entry(state)
            .or_insert_with(|| StateRepresentation::new(state))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &StateRepresentation<S, T>> {
        self.states.values()
    }

    pub(crate) fn superstate(&self, state: S) -> Option<S> {
        self.states.get(&state).and_then(|rep| rep.superstate())
    }

    /// `state` and all its ancestors, innermost first. Unconfigured states
    /// are their own one-element chain.
    pub(crate) fn ancestor_chain(&self, state: S) -> Vec<S> {
        let mut chain = vec![state];
        let mut cursor = state;
        while let Some(parent) = self.superstate(cursor) {
            chain.push(parent);
            cursor = parent;
        }
        chain
    }

    /// True when `query` is `current` itself or one of its ancestors.
    pub(crate) fn is_in_state(&self, current: S, query: S) -> bool {
        self.ancestor_chain(current).contains(&query)
    }

    /// Direct substates of `parent`, in configuration order.
    pub(crate) fn substates(&self, parent: S) -> Vec<S> {
        self.states
            .values()
            .filter(|rep| rep.superstate() == Some(parent))
            .map(|rep| rep.state())
            .collect()
    }

    /// Innermost state that is an ancestor (or self) of both, if any.
    pub(crate) fn lowest_common_ancestor(&self, a: S, b: S) -> Option<S> {
        let chain_b = self.ancestor_chain(b);
        self.ancestor_chain(a)
            .into_iter()
            .find(|state| chain_b.contains(state))
    }

    /// Would making `child` a substate of `parent` close a cycle?
    pub(crate) fn would_create_cycle(&self, child: S, parent: S) -> bool {
        self.ancestor_chain(parent).contains(&child)
    }
}
