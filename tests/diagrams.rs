//! DOT and Mermaid rendering of configuration snapshots. States are
//! `&'static str` here so the diagrams exercise name sanitisation.

use restless::{dot, mermaid, DynamicDestination, MermaidDirection, StateMachine};

fn phone() -> StateMachine<&'static str, &'static str> {
    let machine = StateMachine::new("OnHook");
    machine.configure("OnHook").permit("PickUp", "OffHook").unwrap();
    machine
        .configure("OffHook")
        .permit("HangUp", "OnHook")
        .unwrap()
        .ignore("PickUp")
        .unwrap()
        .on_entry(|_| Ok(()), "start tone")
        .on_exit(|_| Ok(()), "stop tone");
    machine
        .configure("Connected")
        .substate_of("OffHook")
        .unwrap()
        .permit_if("Dial", "OnHold", |_| true, "line free")
        .unwrap();
    machine.configure("OnHold").substate_of("OffHook").unwrap();
    machine
        .configure("OnHook")
        .permit_dynamic(
            "Route",
            |payload| {
                if payload.get::<bool>().copied().unwrap_or(false) {
                    "Connected"
                } else {
                    "OffHook"
                }
            },
            "route by line state",
            vec![
                DynamicDestination::new("Connected", "line ready"),
                DynamicDestination::new("OffHook", "line busy"),
            ],
        )
        .unwrap();
    machine
}

#[test]
fn dot_output_is_byte_identical_across_renders() {
    let machine = phone();
    let info = machine.get_info();
    assert_eq!(dot::render(&info), dot::render(&info));
    assert_eq!(dot::render(&machine.get_info()), dot::render(&machine.get_info()));
}

#[test]
fn mermaid_output_is_byte_identical_across_renders() {
    let machine = phone();
    let info = machine.get_info();
    assert_eq!(
        mermaid::render(&info, Some(MermaidDirection::LR)),
        mermaid::render(&info, Some(MermaidDirection::LR))
    );
}

#[test]
fn dot_has_the_uml_header_and_initial_marker() {
    let machine = phone();
    let rendered = dot::render(&machine.get_info());
    assert!(rendered.starts_with("digraph {\ncompound=true;\nnode [shape=Mrecord]\nrankdir=\"LR\"\n"));
    assert!(rendered.contains(" init [label=\"\", shape=point];\n"));
    assert!(rendered.contains(" init -> \"OnHook\"[style = \"solid\"]\n"));
    assert!(rendered.trim_end().ends_with('}'));
}

#[test]
fn dot_renders_superstates_as_clusters() {
    let machine = phone();
    let rendered = dot::render(&machine.get_info());
    assert!(rendered.contains("subgraph \"clusterOffHook\" {"));
    assert!(rendered.contains("label=\"OffHook\";"));
    assert!(rendered.contains("\"Connected\" [label=\"Connected\"];"));
}

#[test]
fn dot_lists_entry_and_exit_actions_in_the_state_box() {
    let machine: StateMachine<&str, &str> = StateMachine::new("A");
    machine.configure("A").permit("X", "B").unwrap();
    machine
        .configure("B")
        .on_entry(|_| Ok(()), "greet")
        .on_exit(|_| Ok(()), "leave");
    let rendered = dot::render(&machine.get_info());
    assert!(rendered.contains("\"B\" [label=\"B|entry / greet\\nexit / leave\"];"));
}

#[test]
fn dot_puts_trigger_narrowed_entry_actions_on_the_edge() {
    let machine: StateMachine<&str, &str> = StateMachine::new("A");
    machine.configure("A").permit("X", "B").unwrap();
    machine.configure("B").on_entry_from("X", |_| Ok(()), "announce");
    let rendered = dot::render(&machine.get_info());
    assert!(rendered.contains("\"A\" -> \"B\" [style=\"solid\", label=\"X / announce\"];"));
    assert!(rendered.contains("\"B\" [label=\"B\"];"));
}

#[test]
fn dot_appends_guard_descriptions_to_edge_labels() {
    let machine = phone();
    let rendered = dot::render(&machine.get_info());
    assert!(rendered.contains("label=\"Dial [line free]\""));
}

#[test]
fn dot_renders_dynamic_transitions_through_a_decision_diamond() {
    let machine = phone();
    let rendered = dot::render(&machine.get_info());
    assert!(rendered.contains("\"Decision1\" [shape = \"diamond\", label = \"route by line state\"];"));
    assert!(rendered.contains("\"OnHook\" -> \"Decision1\" [style=\"solid\", label=\"Route\"];"));
    assert!(rendered.contains("\"Decision1\" -> \"Connected\" [style=\"solid\", label=\"line ready\"];"));
    assert!(rendered.contains("\"Decision1\" -> \"OffHook\" [style=\"solid\", label=\"line busy\"];"));
}

#[test]
fn dot_renders_ignored_triggers_as_plain_self_loops() {
    let machine = phone();
    let rendered = dot::render(&machine.get_info());
    assert!(rendered.contains("\"OffHook\" -> \"OffHook\" [style=\"solid\", label=\"PickUp\"];"));
}

#[test]
fn dot_escapes_backslashes_and_quotes() {
    let machine: StateMachine<&str, &str> = StateMachine::new("say \"hi\"");
    machine.configure("say \"hi\"").permit("X", "b\\slash").unwrap();
    let rendered = dot::render(&machine.get_info());
    assert!(rendered.contains("\"say \\\"hi\\\"\""));
    assert!(rendered.contains("\"b\\\\slash\""));
}

#[test]
fn mermaid_has_the_header_direction_and_initial_marker() {
    let machine = phone();
    let rendered = mermaid::render(&machine.get_info(), Some(MermaidDirection::TB));
    assert!(rendered.starts_with("stateDiagram-v2\n\tdirection TB\n"));
    assert!(rendered.contains("\t[*] --> OnHook\n"));

    let plain = mermaid::render(&machine.get_info(), None);
    assert!(!plain.contains("direction"));
}

#[test]
fn mermaid_renders_superstates_as_blocks() {
    let machine = phone();
    let rendered = mermaid::render(&machine.get_info(), None);
    assert!(rendered.contains("\tstate OffHook {\n\t\tConnected\n\t\tOnHold\n\t}\n"));
}

#[test]
fn mermaid_renders_transitions_with_actions_and_guards() {
    let machine: StateMachine<&str, &str> = StateMachine::new("A");
    machine
        .configure("A")
        .permit_if("X", "B", |_| true, "armed")
        .unwrap();
    machine.configure("B").on_entry_from("X", |_| Ok(()), "announce");
    let rendered = mermaid::render(&machine.get_info(), None);
    assert!(rendered.contains("\tA --> B : X / announce [armed]\n"));
}

#[test]
fn mermaid_declares_choice_nodes_for_dynamic_transitions() {
    let machine = phone();
    let rendered = mermaid::render(&machine.get_info(), None);
    assert!(rendered.contains("\tstate Decision1 <<choice>>\n"));
    assert!(rendered.contains("\tOnHook --> Decision1 : Route\n"));
    assert!(rendered.contains("\tDecision1 --> Connected : line ready\n"));
}

#[test]
fn mermaid_sanitises_awkward_state_names() {
    let machine: StateMachine<&str, &str> = StateMachine::new("On Fire");
    machine.configure("On Fire").permit("X", "all-clear").unwrap();
    let rendered = mermaid::render(&machine.get_info(), None);
    assert!(rendered.contains("\tOnFire : On Fire\n"));
    assert!(rendered.contains("\tallclear : all-clear\n"));
    assert!(rendered.contains("\t[*] --> OnFire\n"));
    assert!(rendered.contains("\tOnFire --> allclear : X\n"));
}

#[test]
fn mermaid_uniquifies_colliding_sanitised_names() {
    let machine: StateMachine<&str, &str> = StateMachine::new("A 1");
    machine.configure("A 1").permit("X", "A-1").unwrap();
    let rendered = mermaid::render(&machine.get_info(), None);
    assert!(rendered.contains("\tA1 : A 1\n"));
    assert!(rendered.contains("\tA1_1 : A-1\n"));
    assert!(rendered.contains("\tA1 --> A1_1 : X\n"));
}

#[test]
fn snapshots_are_unaffected_by_later_configuration() {
    let machine = phone();
    let info = machine.get_info();
    let before = dot::render(&info);
    machine.configure("Voicemail").permit("HangUp", "OnHook").unwrap();
    assert_eq!(dot::render(&info), before);
    assert_ne!(dot::render(&machine.get_info()), before);
}
