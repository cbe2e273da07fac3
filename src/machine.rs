//! The state machine: trigger dispatch, hierarchical transition
//! orchestration, firing modes, activation and listener bookkeeping.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info};
use parking_lot::{Mutex, ReentrantMutex};

use crate::builder::StateConfiguration;
use crate::core::{
    BehaviourKind, EntryAction, ExitAction, LifecycleAction, Registry, TriggerBehaviour,
};
use crate::error::Error;
use crate::event::{FiredTrigger, FiringMode, Transition};
use crate::info::MachineInfo;
use crate::support::{CancellationToken, Payload};
use crate::Result;

type TransitionListener<S, T> = Arc<dyn Fn(&Transition<S, T>) + Send + Sync>;
type UnhandledTriggerHandler<S, T> = Arc<dyn Fn(S, T, &[String]) + Send + Sync>;
type StateReader<S> = Arc<dyn Fn() -> S + Send + Sync>;
type StateWriter<S> = Arc<dyn Fn(S) + Send + Sync>;

/// Where the current state lives. The accessors of the external variant are
/// called with the machine mutex held; they must not fire back into the
/// machine.
enum StateStorage<S> {
    Internal(S),
    External {
        read: StateReader<S>,
        write: StateWriter<S>,
    },
}

pub(crate) struct Inner<S, T> {
    pub(crate) registry: Registry<S, T>,
    storage: StateStorage<S>,
    initial_state: S,
    activated: bool,
    transition_listeners: Vec<TransitionListener<S, T>>,
    completed_listeners: Vec<TransitionListener<S, T>>,
    unhandled_trigger_handler: Option<UnhandledTriggerHandler<S, T>>,
}

/// State guarded by the reentrant machine mutex. The `dispatching` flag
/// marks the owning thread as inside a dispatch, which is how a `fire` from
/// within a callback is recognised; the `RefCell` is only ever borrowed for
/// short snapshot or mutation windows, never across a user callback.
struct Shared<S, T> {
    dispatching: Cell<bool>,
    inner: RefCell<Inner<S, T>>,
}

/// Outcome of walking the hierarchy for a `(state, trigger, payload)`.
enum Selection<S, T> {
    Found {
        behaviour: TriggerBehaviour<S, T>,
        firing_state: S,
    },
    Unhandled {
        unmet_guards: Vec<String>,
    },
}

/// A hierarchical state machine over state identifiers `S` and trigger
/// identifiers `T`.
///
/// Configuration happens at runtime through [`StateMachine::configure`] and
/// may continue at any point; firing concurrently with configuration is the
/// caller's responsibility. All callbacks run synchronously on the firing
/// thread.
pub struct StateMachine<S, T> {
    sync: ReentrantMutex<Shared<S, T>>,
    pending: Mutex<VecDeque<FiredTrigger<T>>>,
    busy: AtomicBool,
    mode: FiringMode,
}

impl<S, T> StateMachine<S, T>
where
    S: Copy + Eq + Hash + Debug,
    T: Copy + Eq + Hash + Debug,
{
    /// A machine holding its state internally, dispatching immediately.
    pub fn new(initial_state: S) -> Self {
        Self::build(initial_state, StateStorage::Internal(initial_state), FiringMode::Immediate)
    }

    /// A machine holding its state internally with the given firing mode.
    pub fn with_mode(initial_state: S, mode: FiringMode) -> Self {
        Self::build(initial_state, StateStorage::Internal(initial_state), mode)
    }

    /// A machine reading and writing its state through caller-supplied
    /// accessors. The accessors run under the machine mutex and must not
    /// fire triggers themselves.
    pub fn with_external_storage<R, W>(read: R, write: W) -> Self
    where
        R: Fn() -> S + Send + Sync + 'static,
        W: Fn(S) + Send + Sync + 'static,
    {
        let initial_state = read();
        Self::build(
            initial_state,
            StateStorage::External {
                read: Arc::new(read),
                write: Arc::new(write),
            },
            FiringMode::Immediate,
        )
    }

    fn build(initial_state: S, storage: StateStorage<S>, mode: FiringMode) -> Self {
        StateMachine {
            sync: ReentrantMutex::new(Shared {
                dispatching: Cell::new(false),
                inner: RefCell::new(Inner {
                    registry: Registry::new(),
                    storage,
                    initial_state,
                    activated: false,
                    transition_listeners: Vec::new(),
                    completed_listeners: Vec::new(),
                    unhandled_trigger_handler: None,
                }),
            }),
            pending: Mutex::new(VecDeque::new()),
            busy: AtomicBool::new(false),
            mode,
        }
    }

    /// The current state.
    pub fn state(&self) -> S {
        let shared = self.sync.lock();
        self.read_state(&shared)
    }

    pub fn firing_mode(&self) -> FiringMode {
        self.mode
    }

    /// Begins (or resumes) configuring `state`.
    pub fn configure(&self, state: S) -> StateConfiguration<'_, S, T> {
        self.with_inner_mut(|inner| {
            inner.registry.representation_mut(state);
        });
        StateConfiguration::new(self, state)
    }

    /// Fires `trigger` with `payload`, running the full transition before
    /// returning. Triggers fired from within callbacks are linearised
    /// according to the machine's [`FiringMode`].
    pub fn fire(&self, trigger: T, payload: Payload) -> Result<()> {
        self.fire_with_cancellation(&CancellationToken::new(), trigger, payload)
    }

    /// Like [`StateMachine::fire`], but fails with [`Error::Cancelled`] when
    /// `token` is already cancelled. The token is checked once, before
    /// dispatch; an in-flight transition always completes.
    pub fn fire_with_cancellation(
        &self,
        token: &CancellationToken,
        trigger: T,
        payload: Payload,
    ) -> Result<()> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let fired = FiredTrigger {
            trigger,
            payload,
            token: token.clone(),
        };
        match self.mode {
            FiringMode::Immediate => self.dispatch_immediate(fired),
            FiringMode::Queued => self.dispatch_queued(fired),
        }
    }

    /// True when firing `trigger` with `payload` would not fail with
    /// `InvalidTransition`. Guards run, so side-effecting guards void the
    /// equivalence.
    pub fn can_fire(&self, trigger: T, payload: &Payload) -> Result<bool> {
        let shared = self.sync.lock();
        let source = self.read_state(&shared);
        match self.select_behaviour(&shared, source, trigger, payload)? {
            Selection::Found { .. } => Ok(true),
            Selection::Unhandled { .. } => Ok(false),
        }
    }

    /// Triggers with at least one guard-satisfied behaviour anywhere in the
    /// current state's ancestor chain, in discovery order.
    pub fn permitted_triggers(&self, payload: &Payload) -> Result<Vec<T>> {
        let shared = self.sync.lock();
        let source = self.read_state(&shared);
        self.permitted_triggers_in(&shared, source, payload)
    }

    /// True when `state` is the current state or one of its ancestors.
    pub fn is_in_state(&self, state: S) -> bool {
        let shared = self.sync.lock();
        let current = self.read_state(&shared);
        let inner = shared.inner.borrow();
        inner.registry.is_in_state(current, state)
    }

    /// Runs the activate actions of the current state's ancestor chain,
    /// outermost first. Idempotent; does not fire transition listeners.
    pub fn activate(&self) -> Result<()> {
        let shared = self.sync.lock();
        if shared.inner.borrow().activated {
            return Ok(());
        }
        let current = self.read_state(&shared);
        let chain = {
            let inner = shared.inner.borrow();
            let mut chain = inner.registry.ancestor_chain(current);
            chain.reverse();
            chain
        };
        debug!("Activating state {:?}. Processing callbacks...", current);
        for state in chain {
            for action in self.lifecycle_actions(&shared, state, true) {
                debug!("Running activate action '{}' of {:?}.", action.description, state);
                (action.action)()?;
            }
        }
        shared.inner.borrow_mut().activated = true;
        Ok(())
    }

    /// Runs the deactivate actions of the current state's ancestor chain,
    /// innermost first. Idempotent; does not fire transition listeners.
    pub fn deactivate(&self) -> Result<()> {
        let shared = self.sync.lock();
        if !shared.inner.borrow().activated {
            return Ok(());
        }
        let current = self.read_state(&shared);
        let chain = {
            let inner = shared.inner.borrow();
            inner.registry.ancestor_chain(current)
        };
        debug!("Deactivating state {:?}. Processing callbacks...", current);
        for state in chain {
            for action in self.lifecycle_actions(&shared, state, false) {
                debug!(
                    "Running deactivate action '{}' of {:?}.",
                    action.description, state
                );
                (action.action)()?;
            }
        }
        shared.inner.borrow_mut().activated = false;
        Ok(())
    }

    /// Replaces the `InvalidTransition` failure with `handler`, which is
    /// invoked with the current state, the trigger and the descriptions of
    /// the guards that were not met.
    pub fn on_unhandled_trigger<F>(&self, handler: F)
    where
        F: Fn(S, T, &[String]) + Send + Sync + 'static,
    {
        self.with_inner_mut(|inner| {
            inner.unhandled_trigger_handler = Some(Arc::new(handler));
        });
    }

    /// Registers a listener notified after the exit chain has run and the
    /// new state has been stored, before the entry chain begins.
    pub fn on_transitioned<F>(&self, listener: F)
    where
        F: Fn(&Transition<S, T>) + Send + Sync + 'static,
    {
        self.with_inner_mut(|inner| {
            inner.transition_listeners.push(Arc::new(listener));
        });
    }

    /// Registers a listener notified once a transition has fully completed,
    /// entry actions included.
    pub fn on_transition_completed<F>(&self, listener: F)
    where
        F: Fn(&Transition<S, T>) + Send + Sync + 'static,
    {
        self.with_inner_mut(|inner| {
            inner.completed_listeners.push(Arc::new(listener));
        });
    }

    /// Drops every registered listener and the unhandled-trigger handler.
    pub fn unregister_all_callbacks(&self) {
        self.with_inner_mut(|inner| {
            inner.transition_listeners.clear();
            inner.completed_listeners.clear();
            inner.unhandled_trigger_handler = None;
        });
    }

    /// A read-only snapshot of the whole configuration. Mutating the machine
    /// afterwards does not affect a snapshot already taken.
    pub fn get_info(&self) -> MachineInfo<S, T>
    where
        S: Display,
        T: Display,
    {
        let shared = self.sync.lock();
        let inner = shared.inner.borrow();
        crate::info::snapshot(&inner.registry, inner.initial_state)
    }

    pub(crate) fn with_inner_mut<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut Inner<S, T>) -> R,
    {
        let shared = self.sync.lock();
        let mut inner = shared.inner.borrow_mut();
        f(&mut inner)
    }

    // ---- dispatch ----------------------------------------------------

    fn dispatch_immediate(&self, fired: FiredTrigger<T>) -> Result<()> {
        let shared = self.sync.lock();
        if shared.dispatching.get() {
            debug!(
                "Trigger {:?} fired from within a callback; queued until the current step completes.",
                fired.trigger
            );
            self.pending.lock().push_back(fired);
            return Ok(());
        }
        shared.dispatching.set(true);
        let result = self
            .process_fired(&shared, fired)
            .and_then(|_| self.drain_pending(&shared));
        if result.is_err() {
            self.pending.lock().clear();
        }
        shared.dispatching.set(false);
        result
    }

    fn dispatch_queued(&self, fired: FiredTrigger<T>) -> Result<()> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Dispatcher busy; trigger {:?} queued.", fired.trigger);
            self.pending.lock().push_back(fired);
            // The dispatcher may have exited between the exchange and the
            // enqueue; reclaim the queue if so.
            return self.drain_as_dispatcher();
        }
        let shared = self.sync.lock();
        shared.dispatching.set(true);
        let mut result = self.process_fired(&shared, fired);
        if result.is_ok() {
            result = self.drain_pending(&shared);
        }
        if result.is_err() {
            self.pending.lock().clear();
        }
        shared.dispatching.set(false);
        drop(shared);
        self.busy.store(false, Ordering::SeqCst);
        if result.is_ok() {
            result = self.drain_as_dispatcher();
        }
        result
    }

    /// Takes over the dispatcher role while pending triggers remain and no
    /// other thread holds it.
    fn drain_as_dispatcher(&self) -> Result<()> {
        loop {
            if self.pending.lock().is_empty() {
                return Ok(());
            }
            if self
                .busy
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                // An active dispatcher will drain the queue.
                return Ok(());
            }
            let shared = self.sync.lock();
            shared.dispatching.set(true);
            let result = self.drain_pending(&shared);
            if result.is_err() {
                self.pending.lock().clear();
            }
            shared.dispatching.set(false);
            drop(shared);
            self.busy.store(false, Ordering::SeqCst);
            result?;
        }
    }

    fn drain_pending(&self, shared: &Shared<S, T>) -> Result<()> {
        loop {
            let next = self.pending.lock().pop_front();
            match next {
                Some(fired) => self.process_fired(shared, fired)?,
                None => return Ok(()),
            }
        }
    }

    /// In immediate mode, re-fired triggers are processed as soon as the
    /// action that fired them returns.
    fn step_boundary(&self, shared: &Shared<S, T>) -> Result<()> {
        match self.mode {
            FiringMode::Immediate => self.drain_pending(shared),
            FiringMode::Queued => Ok(()),
        }
    }

    fn process_fired(&self, shared: &Shared<S, T>, fired: FiredTrigger<T>) -> Result<()> {
        let FiredTrigger {
            trigger,
            payload,
            token,
        } = fired;
        let source = self.read_state(shared);
        debug!("Firing trigger {:?} in state {:?}.", trigger, source);

        let (behaviour, firing_state) =
            match self.select_behaviour(shared, source, trigger, &payload)? {
                Selection::Found {
                    behaviour,
                    firing_state,
                } => (behaviour, firing_state),
                Selection::Unhandled { unmet_guards } => {
                    let handler = shared.inner.borrow().unhandled_trigger_handler.clone();
                    return match handler {
                        Some(handler) => {
                            info!(
                                "Unhandled trigger {:?} in state {:?} delegated to handler.",
                                trigger, source
                            );
                            handler(source, trigger, &unmet_guards);
                            Ok(())
                        }
                        None => Err(Error::InvalidTransition {
                            state: format!("{:?}", source),
                            trigger: format!("{:?}", trigger),
                            permitted_triggers: self
                                .permitted_triggers_in(shared, source, &payload)
                                .map(|triggers| {
                                    triggers.iter().map(|t| format!("{:?}", t)).collect()
                                })
                                .unwrap_or_default(),
                            unmet_guards,
                        }),
                    };
                }
            };

        match behaviour.kind {
            BehaviourKind::Ignored => {
                debug!("Trigger {:?} ignored in state {:?}.", trigger, source);
                Ok(())
            }
            BehaviourKind::Internal { action } => {
                debug!(
                    "Internal transition on {:?} in state {:?}; no state change.",
                    trigger, source
                );
                let transition = Transition::new(source, source, trigger, payload, false, token);
                action(&transition)?;
                self.step_boundary(shared)
            }
            BehaviourKind::Fixed { destination } => {
                let is_reentry = destination == source && firing_state == source;
                let transition =
                    Transition::new(source, destination, trigger, payload, is_reentry, token);
                self.execute_transition(shared, &transition)
            }
            BehaviourKind::Dynamic { selector, .. } => {
                let destination = selector(&payload);
                let is_reentry = destination == source && firing_state == source;
                let transition =
                    Transition::new(source, destination, trigger, payload, is_reentry, token);
                self.execute_transition(shared, &transition)
            }
            BehaviourKind::Reentry => {
                let transition =
                    Transition::new(source, firing_state, trigger, payload, true, token);
                self.execute_transition(shared, &transition)
            }
        }
    }

    /// Walks from `source` towards the root; at each level the behaviours
    /// for `trigger` are tried in configuration order and the first whose
    /// guard is met wins, so substate configuration shadows superstate
    /// configuration.
    fn select_behaviour(
        &self,
        shared: &Shared<S, T>,
        source: S,
        trigger: T,
        payload: &Payload,
    ) -> Result<Selection<S, T>> {
        let levels: Vec<(S, Vec<TriggerBehaviour<S, T>>)> = {
            let inner = shared.inner.borrow();
            inner
                .registry
                .ancestor_chain(source)
                .into_iter()
                .filter_map(|state| {
                    inner
                        .registry
                        .representation(state)
                        .and_then(|rep| rep.behaviours(trigger))
                        .map(|behaviours| (state, behaviours.to_vec()))
                })
                .collect()
        };
        let mut unmet_guards = Vec::new();
        for (firing_state, behaviours) in levels {
            for behaviour in behaviours {
                let evaluation = behaviour.guard.evaluate(payload)?;
                if evaluation.is_met() {
                    return Ok(Selection::Found {
                        behaviour,
                        firing_state,
                    });
                }
                unmet_guards.extend(evaluation.into_unmet());
            }
        }
        Ok(Selection::Unhandled { unmet_guards })
    }

    /// Runs the full exit/entry sequence for a non-internal transition: exit
    /// actions source-first, state mutation, transition listeners, entry
    /// actions outermost-first, completed listeners.
    fn execute_transition(&self, shared: &Shared<S, T>, transition: &Transition<S, T>) -> Result<()> {
        let (exit_chain, entry_chain) = self.transition_chains(shared, transition);
        info!(
            "Transitioning from {:?} to {:?} on {:?}.",
            transition.source(),
            transition.destination(),
            transition.trigger()
        );

        for state in exit_chain {
            for exit in self.exit_actions(shared, state) {
                debug!("Exiting state {:?} via '{}'.", state, exit.description);
                (exit.action)(transition)?;
                self.step_boundary(shared)?;
            }
        }

        // The new state becomes observable here: listeners and entry actions
        // see it, exit actions ran while the source was still current.
        self.write_state(shared, transition.destination());

        for listener in self.listener_snapshot(shared, false) {
            listener(transition);
        }

        for state in entry_chain {
            for entry in self.entry_actions(shared, state) {
                if entry
                    .from_trigger
                    .map_or(true, |narrowed| narrowed == transition.trigger())
                {
                    debug!("Entering state {:?} via '{}'.", state, entry.description);
                    (entry.action)(transition)?;
                    self.step_boundary(shared)?;
                }
            }
        }

        for listener in self.listener_snapshot(shared, true) {
            listener(transition);
        }
        Ok(())
    }

    /// The states to exit (source-first) and enter (outermost-first). For a
    /// reentry the boundary is the destination's superstate, so the firing
    /// state itself is exited and re-entered even when it is a superstate;
    /// otherwise it is the lowest common ancestor of source and destination.
    fn transition_chains(
        &self,
        shared: &Shared<S, T>,
        transition: &Transition<S, T>,
    ) -> (Vec<S>, Vec<S>) {
        let inner = shared.inner.borrow();
        let boundary = if transition.is_reentry() {
            inner.registry.superstate(transition.destination())
        } else {
            inner
                .registry
                .lowest_common_ancestor(transition.source(), transition.destination())
        };
        let exit_chain: Vec<S> = inner
            .registry
            .ancestor_chain(transition.source())
            .into_iter()
            .take_while(|state| Some(*state) != boundary)
            .collect();
        let mut entry_chain: Vec<S> = inner
            .registry
            .ancestor_chain(transition.destination())
            .into_iter()
            .take_while(|state| Some(*state) != boundary)
            .collect();
        entry_chain.reverse();
        (exit_chain, entry_chain)
    }

    fn permitted_triggers_in(
        &self,
        shared: &Shared<S, T>,
        source: S,
        payload: &Payload,
    ) -> Result<Vec<T>> {
        let table: IndexMap<T, Vec<TriggerBehaviour<S, T>>> = {
            let inner = shared.inner.borrow();
            let mut table = IndexMap::new();
            for state in inner.registry.ancestor_chain(source) {
                if let Some(rep) = inner.registry.representation(state) {
                    for (trigger, behaviours) in rep.behaviour_table() {
                        table
                            .entry(*trigger)
                            .or_insert_with(Vec::new)
                            .extend(behaviours.iter().cloned());
                    }
                }
            }
            table
        };
        let mut permitted = Vec::new();
        for (trigger, behaviours) in table {
            for behaviour in behaviours {
                if behaviour.guard.evaluate(payload)?.is_met() {
                    permitted.push(trigger);
                    break;
                }
            }
        }
        Ok(permitted)
    }

    // ---- snapshots and storage ---------------------------------------

    fn read_state(&self, shared: &Shared<S, T>) -> S {
        let reader = {
            let inner = shared.inner.borrow();
            match &inner.storage {
                StateStorage::Internal(state) => return *state,
                StateStorage::External { read, .. } => Arc::clone(read),
            }
        };
        reader()
    }

    fn write_state(&self, shared: &Shared<S, T>, next: S) {
        let writer = {
            let mut inner = shared.inner.borrow_mut();
            match &mut inner.storage {
                StateStorage::Internal(state) => {
                    *state = next;
                    return;
                }
                StateStorage::External { write, .. } => Arc::clone(write),
            }
        };
        writer(next);
    }

    fn exit_actions(&self, shared: &Shared<S, T>, state: S) -> Vec<ExitAction<S, T>> {
        shared
            .inner
            .borrow()
            .registry
            .representation(state)
            .map(|rep| rep.exit_actions().to_vec())
            .unwrap_or_default()
    }

    fn entry_actions(&self, shared: &Shared<S, T>, state: S) -> Vec<EntryAction<S, T>> {
        shared
            .inner
            .borrow()
            .registry
            .representation(state)
            .map(|rep| rep.entry_actions().to_vec())
            .unwrap_or_default()
    }

    fn lifecycle_actions(
        &self,
        shared: &Shared<S, T>,
        state: S,
        activate: bool,
    ) -> Vec<LifecycleAction> {
        shared
            .inner
            .borrow()
            .registry
            .representation(state)
            .map(|rep| {
                if activate {
                    rep.activate_actions().to_vec()
                } else {
                    rep.deactivate_actions().to_vec()
                }
            })
            .unwrap_or_default()
    }

    /// Listeners are snapshotted before notification, so additions made
    /// during dispatch only take effect for subsequent transitions.
    fn listener_snapshot(
        &self,
        shared: &Shared<S, T>,
        completed: bool,
    ) -> Vec<TransitionListener<S, T>> {
        let inner = shared.inner.borrow();
        if completed {
            inner.completed_listeners.clone()
        } else {
            inner.transition_listeners.clone()
        }
    }
}

impl<S, T> Display for StateMachine<S, T>
where
    S: Copy + Eq + Hash + Debug,
    T: Copy + Eq + Hash + Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let permitted = self
            .permitted_triggers(&Payload::none())
            .unwrap_or_default();
        write!(
            f,
            "StateMachine(state={:?}, permitted_triggers={:?})",
            self.state(),
            permitted
        )
    }
}

impl<S, T> Debug for StateMachine<S, T>
where
    S: Copy + Eq + Hash + Debug,
    T: Copy + Eq + Hash + Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "StateMachine(state={:?}, mode={:?})", self.state(), self.mode)
    }
}
