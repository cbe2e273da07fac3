//! UML-flavoured DOT rendering of a configuration snapshot.
//!
//! The output is deterministic for a given [`MachineInfo`]: states are
//! written in name order and edges are sorted by source state, destination
//! state, then trigger.

use std::collections::HashMap;

use crate::info::{MachineInfo, StateInfo};

/// Escapes a DOT label: `\` first, then `"`.
fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

struct Edge {
    source: String,
    destination: String,
    trigger: String,
    label: String,
}

/// Renders `info` as a DOT digraph.
pub fn render<S, T>(info: &MachineInfo<S, T>) -> String {
    let mut states: Vec<&StateInfo<S, T>> = info.states.iter().collect();
    states.sort_by(|a, b| a.name.cmp(&b.name));
    let by_name: HashMap<&str, &StateInfo<S, T>> = states
        .iter()
        .map(|state| (state.name.as_str(), *state))
        .collect();

    let mut out = String::new();
    out.push_str("digraph {\n");
    out.push_str("compound=true;\n");
    out.push_str("node [shape=Mrecord]\n");
    out.push_str("rankdir=\"LR\"\n");

    for state in states.iter().filter(|state| state.superstate.is_none()) {
        write_state(&mut out, state, &by_name, 0);
    }

    // Decision diamonds for dynamic transitions, numbered in state order.
    let mut decision = 0usize;
    let mut edges = Vec::new();
    for state in &states {
        for transition in &state.fixed_transitions {
            let actions = if transition.is_internal {
                Vec::new()
            } else {
                entry_actions_for(&by_name, &transition.destination_name, &transition.trigger_name)
            };
            edges.push(Edge {
                source: state.name.clone(),
                destination: transition.destination_name.clone(),
                trigger: transition.trigger_name.clone(),
                label: edge_label(&transition.trigger_name, &actions, &transition.guards),
            });
        }
        for transition in &state.dynamic_transitions {
            decision += 1;
            let node = format!("Decision{}", decision);
            out.push_str(&format!(
                "\"{}\" [shape = \"diamond\", label = \"{}\"];\n",
                node,
                escape(&transition.selector_description)
            ));
            edges.push(Edge {
                source: state.name.clone(),
                destination: node.clone(),
                trigger: transition.trigger_name.clone(),
                label: edge_label(&transition.trigger_name, &[], &transition.guards),
            });
            for hint in &transition.possible_destinations {
                edges.push(Edge {
                    source: node.clone(),
                    destination: hint.destination.clone(),
                    trigger: String::new(),
                    label: hint.criterion.clone(),
                });
            }
        }
        for ignored in &state.ignored_triggers {
            edges.push(Edge {
                source: state.name.clone(),
                destination: state.name.clone(),
                trigger: ignored.trigger_name.clone(),
                label: edge_label(&ignored.trigger_name, &[], &ignored.guards),
            });
        }
    }

    edges.sort_by(|a, b| {
        (&a.source, &a.destination, &a.trigger).cmp(&(&b.source, &b.destination, &b.trigger))
    });
    for edge in edges {
        out.push_str(&format!(
            "\"{}\" -> \"{}\" [style=\"solid\", label=\"{}\"];\n",
            escape(&edge.source),
            escape(&edge.destination),
            escape(&edge.label)
        ));
    }

    out.push_str(" init [label=\"\", shape=point];\n");
    out.push_str(&format!(
        " init -> \"{}\"[style = \"solid\"]\n",
        escape(&info.initial_state_name)
    ));
    out.push_str("}\n");
    out
}

/// `trigger / action1, action2 [guard1] [guard2]`
fn edge_label(trigger: &str, actions: &[String], guards: &[String]) -> String {
    let mut label = trigger.to_string();
    if !actions.is_empty() {
        label.push_str(" / ");
        label.push_str(&actions.join(", "));
    }
    for guard in guards {
        label.push_str(&format!(" [{}]", guard));
    }
    label
}

/// Entry actions of `destination` narrowed to `trigger`; these appear on the
/// edge rather than in the destination's state box.
fn entry_actions_for<S, T>(
    by_name: &HashMap<&str, &StateInfo<S, T>>,
    destination: &str,
    trigger: &str,
) -> Vec<String> {
    by_name
        .get(destination)
        .map(|state| {
            state
                .entry_actions
                .iter()
                .filter(|entry| entry.from_trigger_name.as_deref() == Some(trigger))
                .map(|entry| entry.description.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn write_state<S, T>(
    out: &mut String,
    state: &StateInfo<S, T>,
    by_name: &HashMap<&str, &StateInfo<S, T>>,
    depth: usize,
) {
    let indent = "\t".repeat(depth);
    if state.substates.is_empty() {
        out.push_str(&format!(
            "{}\"{}\" [label=\"{}\"];\n",
            indent,
            escape(&state.name),
            state_label(state)
        ));
        return;
    }
    out.push_str(&format!(
        "{}subgraph \"cluster{}\" {{\n",
        indent,
        escape(&state.name)
    ));
    out.push_str(&format!("{}\tlabel=\"{}\";\n", indent, escape(&state.name)));
    let mut substates = state.substates.clone();
    substates.sort();
    for substate in substates {
        if let Some(child) = by_name.get(substate.as_str()) {
            write_state(out, child, by_name, depth + 1);
        }
    }
    out.push_str(&format!("{}}}\n", indent));
}

/// `Name` or `Name|entry / a\nexit / b`, already escaped; the parts are
/// escaped individually so the `\n` separators survive as DOT escapes.
/// Entry actions narrowed to a trigger are listed on the corresponding edge
/// instead.
fn state_label<S, T>(state: &StateInfo<S, T>) -> String {
    let mut actions = Vec::new();
    for entry in &state.entry_actions {
        if entry.from_trigger.is_none() {
            actions.push(format!("entry / {}", escape(&entry.description)));
        }
    }
    for exit in &state.exit_actions {
        actions.push(format!("exit / {}", escape(exit)));
    }
    if actions.is_empty() {
        escape(&state.name)
    } else {
        format!("{}|{}", escape(&state.name), actions.join("\\n"))
    }
}
