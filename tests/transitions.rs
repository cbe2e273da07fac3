//! Flat-machine dispatch: permits, guards, internal and ignored triggers,
//! listeners, payloads, storage and cancellation.

use std::sync::{Arc, Mutex};

use restless::{
    typed_action, CancellationToken, Error, Guard, Payload, StateMachine, Transition,
};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum State {
    A,
    B,
    C,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum Trigger {
    X,
    Y,
    Z,
}

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(log: &Log, entry: &str) {
    log.lock().unwrap().push(entry.to_string());
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[test]
fn firing_a_permitted_trigger_moves_to_the_destination() {
    let machine = StateMachine::new(State::A);
    machine.configure(State::A).permit(Trigger::X, State::B).unwrap();

    let events = new_log();
    {
        let events = events.clone();
        machine.on_transitioned(move |t: &Transition<State, Trigger>| {
            events.lock().unwrap().push(format!(
                "Transitioned({:?}->{:?},{:?})",
                t.source(),
                t.destination(),
                t.trigger()
            ));
        });
    }
    {
        let events = events.clone();
        machine.on_transition_completed(move |_| record(&events, "Completed"));
    }

    machine.fire(Trigger::X, Payload::none()).unwrap();
    assert_eq!(machine.state(), State::B);
    assert_eq!(entries(&events), ["Transitioned(A->B,X)", "Completed"]);
}

#[test]
fn unpermitted_trigger_fails_and_reports_permitted_triggers() {
    let machine = StateMachine::new(State::A);
    machine.configure(State::A).permit(Trigger::X, State::B).unwrap();

    match machine.fire(Trigger::Y, Payload::none()) {
        Err(Error::InvalidTransition {
            state,
            trigger,
            permitted_triggers,
            unmet_guards,
        }) => {
            assert_eq!(state, "A");
            assert_eq!(trigger, "Y");
            assert_eq!(permitted_triggers, ["X"]);
            assert!(unmet_guards.is_empty());
        }
        other => panic!("expected InvalidTransition, got {:?}", other),
    }
    assert_eq!(machine.state(), State::A);
}

#[test]
fn the_first_behaviour_with_a_met_guard_wins() {
    let machine = StateMachine::new(State::A);
    machine
        .configure(State::A)
        .permit_if(Trigger::X, State::B, |_| true, "g1")
        .unwrap()
        .permit_if(Trigger::X, State::C, |_| false, "g2")
        .unwrap();

    machine.fire(Trigger::X, Payload::none()).unwrap();
    assert_eq!(machine.state(), State::B);
}

#[test]
fn guard_rejections_collect_their_reason() {
    let machine = StateMachine::new(State::A);
    machine
        .configure(State::A)
        .permit_if_with(
            Trigger::X,
            State::B,
            Guard::new().require_checked(|_| Err(Error::rejection("not ready")), "readiness"),
        )
        .unwrap();

    match machine.fire(Trigger::X, Payload::none()) {
        Err(Error::InvalidTransition { unmet_guards, .. }) => {
            assert_eq!(unmet_guards, ["not ready"]);
        }
        other => panic!("expected InvalidTransition, got {:?}", other),
    }
}

#[test]
fn unexpected_guard_errors_propagate_out_of_fire() {
    let machine = StateMachine::new(State::A);
    machine
        .configure(State::A)
        .permit_if_with(
            Trigger::X,
            State::B,
            Guard::new().require_checked(
                |_| Err(Error::InvalidArgument("guard exploded".to_string())),
                "exploding",
            ),
        )
        .unwrap();

    assert!(matches!(
        machine.fire(Trigger::X, Payload::none()),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(machine.state(), State::A);
}

#[test]
fn ignored_triggers_run_nothing_and_fire_no_events() {
    let machine = StateMachine::new(State::A);
    machine.configure(State::A).ignore(Trigger::X).unwrap();

    let events = new_log();
    {
        let events = events.clone();
        machine.on_transitioned(move |_| record(&events, "Transitioned"));
    }

    machine.fire(Trigger::X, Payload::none()).unwrap();
    assert_eq!(machine.state(), State::A);
    assert!(entries(&events).is_empty());
}

#[test]
fn internal_transitions_run_the_action_without_exit_or_entry() {
    let machine = StateMachine::new(State::A);
    let events = new_log();
    {
        let events = events.clone();
        machine
            .configure(State::A)
            .internal_transition(Trigger::X, {
                let events = events.clone();
                move |t| {
                    assert_eq!(t.source(), State::A);
                    assert_eq!(t.destination(), State::A);
                    record(&events, "InternalAction");
                    Ok(())
                }
            })
            .unwrap()
            .on_entry(
                {
                    let events = events.clone();
                    move |_| {
                        record(&events, "EnterA");
                        Ok(())
                    }
                },
                "enter a",
            )
            .on_exit(
                {
                    let events = events.clone();
                    move |_| {
                        record(&events, "ExitA");
                        Ok(())
                    }
                },
                "exit a",
            );
    }
    {
        let events = events.clone();
        machine.on_transitioned(move |_| record(&events, "Transitioned"));
    }

    machine.fire(Trigger::X, Payload::none()).unwrap();
    assert_eq!(machine.state(), State::A);
    assert_eq!(entries(&events), ["InternalAction"]);
}

#[test]
fn unhandled_trigger_handler_takes_the_place_of_the_error() {
    let machine = StateMachine::new(State::A);
    machine
        .configure(State::A)
        .permit_if(Trigger::X, State::B, |_| false, "never")
        .unwrap();

    let seen = new_log();
    {
        let seen = seen.clone();
        machine.on_unhandled_trigger(move |state, trigger, unmet: &[String]| {
            seen.lock()
                .unwrap()
                .push(format!("{:?}/{:?}/{:?}", state, trigger, unmet));
        });
    }

    machine.fire(Trigger::X, Payload::none()).unwrap();
    machine.fire(Trigger::Y, Payload::none()).unwrap();
    assert_eq!(
        entries(&seen),
        ["A/X/[\"never\"]", "A/Y/[]"]
    );
    assert_eq!(machine.state(), State::A);
}

#[test]
fn can_fire_agrees_with_fire() {
    let machine = StateMachine::new(State::A);
    machine
        .configure(State::A)
        .permit(Trigger::X, State::B)
        .unwrap()
        .permit_if(Trigger::Y, State::C, |_| false, "never")
        .unwrap()
        .ignore(Trigger::Z)
        .unwrap();

    assert!(machine.can_fire(Trigger::X, &Payload::none()).unwrap());
    assert!(!machine.can_fire(Trigger::Y, &Payload::none()).unwrap());
    // ignored triggers are handled, so firing them is not an error
    assert!(machine.can_fire(Trigger::Z, &Payload::none()).unwrap());

    assert!(machine.fire(Trigger::Z, Payload::none()).is_ok());
    assert!(machine.fire(Trigger::Y, Payload::none()).is_err());
    assert!(machine.fire(Trigger::X, Payload::none()).is_ok());
}

#[test]
fn permitted_triggers_respect_guards() {
    let machine = StateMachine::new(State::A);
    machine
        .configure(State::A)
        .permit(Trigger::X, State::B)
        .unwrap()
        .permit_if(Trigger::Y, State::C, |p| p.get::<u8>().is_some(), "has payload")
        .unwrap();

    assert_eq!(
        machine.permitted_triggers(&Payload::none()).unwrap(),
        [Trigger::X]
    );
    assert_eq!(
        machine.permitted_triggers(&Payload::new(1u8)).unwrap(),
        [Trigger::X, Trigger::Y]
    );
}

#[test]
fn payloads_reach_guards_selectors_and_actions() {
    let machine = StateMachine::new(State::A);
    machine
        .configure(State::A)
        .permit_if(
            Trigger::X,
            State::B,
            |p| p.get::<u32>().map_or(false, |n| *n > 10),
            "payload over ten",
        )
        .unwrap();

    let seen = Arc::new(Mutex::new(0u32));
    {
        let seen = seen.clone();
        let action = typed_action(move |n: &u32, _t: &Transition<State, Trigger>| {
            *seen.lock().unwrap() = *n;
            Ok(())
        });
        machine.configure(State::B).on_entry(action, "record payload");
    }

    assert!(machine.fire(Trigger::X, Payload::new(3u32)).is_err());
    machine.fire(Trigger::X, Payload::new(42u32)).unwrap();
    assert_eq!(*seen.lock().unwrap(), 42);
}

#[test]
fn typed_actions_fail_on_a_mismatched_payload() {
    let machine = StateMachine::new(State::A);
    machine.configure(State::A).permit(Trigger::X, State::B).unwrap();
    machine.configure(State::B).on_entry(
        typed_action(|_n: &u32, _t: &Transition<State, Trigger>| Ok(())),
        "typed entry",
    );

    match machine.fire(Trigger::X, Payload::new("a string")) {
        Err(Error::ParameterConversion { expected }) => assert_eq!(expected, "u32"),
        other => panic!("expected ParameterConversion, got {:?}", other),
    }
    // the mutation had already been applied when the entry action failed
    assert_eq!(machine.state(), State::B);
}

#[test]
fn action_errors_propagate_without_rolling_back_the_state() {
    let machine = StateMachine::new(State::A);
    machine.configure(State::A).permit(Trigger::X, State::B).unwrap();
    machine.configure(State::B).on_entry(
        |_| Err(Error::InvalidOperation("entry failed".to_string())),
        "failing entry",
    );

    assert!(machine.fire(Trigger::X, Payload::none()).is_err());
    assert_eq!(machine.state(), State::B);
}

#[test]
fn external_storage_accessors_hold_the_state() {
    let cell = Arc::new(Mutex::new(State::A));
    let machine = {
        let read = cell.clone();
        let write = cell.clone();
        StateMachine::with_external_storage(
            move || *read.lock().unwrap(),
            move |next| *write.lock().unwrap() = next,
        )
    };
    machine.configure(State::A).permit(Trigger::X, State::B).unwrap();

    assert_eq!(machine.state(), State::A);
    machine.fire(Trigger::X, Payload::none()).unwrap();
    assert_eq!(*cell.lock().unwrap(), State::B);

    // the accessor pair is authoritative: writes from outside are seen
    *cell.lock().unwrap() = State::A;
    assert_eq!(machine.state(), State::A);
}

#[test]
fn cancelled_tokens_fail_before_any_action_runs() {
    let machine = StateMachine::new(State::A);
    let events = new_log();
    machine.configure(State::A).permit(Trigger::X, State::B).unwrap();
    {
        let events = events.clone();
        machine.configure(State::B).on_entry(
            move |_| {
                record(&events, "EnterB");
                Ok(())
            },
            "enter b",
        );
    }

    let token = CancellationToken::new();
    token.cancel();
    assert!(matches!(
        machine.fire_with_cancellation(&token, Trigger::X, Payload::none()),
        Err(Error::Cancelled)
    ));
    assert_eq!(machine.state(), State::A);
    assert!(entries(&events).is_empty());

    let live = CancellationToken::new();
    machine
        .fire_with_cancellation(&live, Trigger::X, Payload::none())
        .unwrap();
    assert_eq!(machine.state(), State::B);
    assert_eq!(entries(&events), ["EnterB"]);
}

#[test]
fn actions_observe_the_dispatching_token() {
    let machine = StateMachine::new(State::A);
    machine.configure(State::A).permit(Trigger::X, State::B).unwrap();
    let observed = Arc::new(Mutex::new(None));
    {
        let observed = observed.clone();
        machine.configure(State::B).on_entry(
            move |t| {
                *observed.lock().unwrap() = Some(t.cancellation().is_cancelled());
                Ok(())
            },
            "observe token",
        );
    }
    machine
        .fire_with_cancellation(&CancellationToken::new(), Trigger::X, Payload::none())
        .unwrap();
    assert_eq!(*observed.lock().unwrap(), Some(false));
}

#[test]
fn listeners_run_in_registration_order() {
    let machine = StateMachine::new(State::A);
    machine.configure(State::A).permit(Trigger::X, State::B).unwrap();

    let events = new_log();
    for name in ["first", "second", "third"].iter() {
        let events = events.clone();
        let name = name.to_string();
        machine.on_transitioned(move |_| record(&events, &name));
    }

    machine.fire(Trigger::X, Payload::none()).unwrap();
    assert_eq!(entries(&events), ["first", "second", "third"]);
}

#[test]
fn unregister_all_callbacks_drops_listeners_and_handler() {
    let machine = StateMachine::new(State::A);
    machine
        .configure(State::A)
        .permit(Trigger::X, State::B)
        .unwrap();
    machine.configure(State::B).permit(Trigger::Y, State::A).unwrap();

    let events = new_log();
    {
        let events = events.clone();
        machine.on_transitioned(move |_| record(&events, "Transitioned"));
    }
    machine.on_unhandled_trigger(|_, _, _| {});

    machine.unregister_all_callbacks();
    machine.fire(Trigger::X, Payload::none()).unwrap();
    assert!(entries(&events).is_empty());
    // with the handler gone, unhandled triggers fail again
    assert!(machine.fire(Trigger::Z, Payload::none()).is_err());
}

#[test]
fn ordinary_transitions_are_neither_reentries_nor_initial() {
    let machine = StateMachine::new(State::A);
    machine.configure(State::A).permit(Trigger::X, State::B).unwrap();
    let flags = Arc::new(Mutex::new(None));
    {
        let flags = flags.clone();
        machine.on_transitioned(move |t: &Transition<State, Trigger>| {
            *flags.lock().unwrap() = Some((t.is_reentry(), t.is_initial()));
        });
    }
    machine.fire(Trigger::X, Payload::none()).unwrap();
    assert_eq!(*flags.lock().unwrap(), Some((false, false)));
}

#[test]
fn display_reports_state_and_permitted_triggers() {
    let machine = StateMachine::new(State::A);
    machine.configure(State::A).permit(Trigger::X, State::B).unwrap();
    let rendered = machine.to_string();
    assert!(rendered.contains("A"));
    assert!(rendered.contains("X"));
}
