//! Mermaid `stateDiagram-v2` rendering of a configuration snapshot.
//!
//! State names containing whitespace, `:` or `-` are sanitised by removing
//! those characters and declared through `<Sanitised> : <Original>` aliases,
//! uniquified with `_1`, `_2`, ... on collision. Output is deterministic for
//! a given [`MachineInfo`].

use std::collections::{HashMap, HashSet};

use strum_macros::{Display as StrumDisplay, EnumString};

use crate::info::{MachineInfo, StateInfo};

/// Optional `direction` header of the diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString)]
pub enum MermaidDirection {
    TB,
    BT,
    LR,
    RL,
}

fn sanitise(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect()
}

fn register(names: &mut HashMap<String, String>, used: &mut HashSet<String>, name: &str) {
    if names.contains_key(name) {
        return;
    }
    let base = sanitise(name);
    let mut candidate = base.clone();
    let mut suffix = 0usize;
    while used.contains(&candidate) {
        suffix += 1;
        candidate = format!("{}_{}", base, suffix);
    }
    used.insert(candidate.clone());
    names.insert(name.to_string(), candidate);
}

struct Edge {
    source: String,
    destination: String,
    label: String,
}

/// Renders `info` as a Mermaid state diagram.
pub fn render<S, T>(info: &MachineInfo<S, T>, direction: Option<MermaidDirection>) -> String {
    let mut states: Vec<&StateInfo<S, T>> = info.states.iter().collect();
    states.sort_by(|a, b| a.name.cmp(&b.name));
    let by_name: HashMap<&str, &StateInfo<S, T>> = states
        .iter()
        .map(|state| (state.name.as_str(), *state))
        .collect();

    // Deterministic alias table: configured states first, then any referenced
    // destination the configuration never mentions as a state.
    let mut names = HashMap::new();
    let mut used = HashSet::new();
    let mut aliases = Vec::new();
    let mut referenced = Vec::new();
    for state in &states {
        register(&mut names, &mut used, &state.name);
    }
    for state in &states {
        for transition in &state.fixed_transitions {
            referenced.push(transition.destination_name.clone());
        }
        for transition in &state.dynamic_transitions {
            for hint in &transition.possible_destinations {
                referenced.push(hint.destination.clone());
            }
        }
    }
    referenced.sort();
    referenced.dedup();
    for name in &referenced {
        register(&mut names, &mut used, name);
    }
    let mut aliased: Vec<String> = states.iter().map(|state| state.name.clone()).collect();
    for name in referenced {
        if !aliased.contains(&name) {
            aliased.push(name);
        }
    }
    for name in aliased {
        let sanitised = &names[&name];
        if *sanitised != name {
            aliases.push(format!("\t{} : {}\n", sanitised, name));
        }
    }

    let mut out = String::from("stateDiagram-v2\n");
    if let Some(direction) = direction {
        out.push_str(&format!("\tdirection {}\n", direction));
    }
    for alias in aliases {
        out.push_str(&alias);
    }

    for state in states
        .iter()
        .filter(|state| state.superstate.is_none() && !state.substates.is_empty())
    {
        write_superstate(&mut out, state, &by_name, &names, 1);
    }

    let mut decision = 0usize;
    let mut edges = Vec::new();
    for state in &states {
        let source = names[&state.name].clone();
        for transition in &state.fixed_transitions {
            let actions = if transition.is_internal {
                Vec::new()
            } else {
                entry_actions_for(&by_name, &transition.destination_name, &transition.trigger_name)
            };
            edges.push(Edge {
                source: source.clone(),
                destination: names[&transition.destination_name].clone(),
                label: edge_label(&transition.trigger_name, &actions, &transition.guards),
            });
        }
        for transition in &state.dynamic_transitions {
            decision += 1;
            let node = format!("Decision{}", decision);
            out.push_str(&format!("\tstate {} <<choice>>\n", node));
            edges.push(Edge {
                source: source.clone(),
                destination: node.clone(),
                label: edge_label(&transition.trigger_name, &[], &transition.guards),
            });
            for hint in &transition.possible_destinations {
                edges.push(Edge {
                    source: node.clone(),
                    destination: names[&hint.destination].clone(),
                    label: hint.criterion.clone(),
                });
            }
        }
        for ignored in &state.ignored_triggers {
            edges.push(Edge {
                source: source.clone(),
                destination: source.clone(),
                label: edge_label(&ignored.trigger_name, &[], &ignored.guards),
            });
        }
    }

    out.push_str(&format!("\t[*] --> {}\n", names[&info.initial_state_name]));

    edges.sort_by(|a, b| {
        (&a.source, &a.destination, &a.label).cmp(&(&b.source, &b.destination, &b.label))
    });
    for edge in edges {
        if edge.label.is_empty() {
            out.push_str(&format!("\t{} --> {}\n", edge.source, edge.destination));
        } else {
            out.push_str(&format!(
                "\t{} --> {} : {}\n",
                edge.source, edge.destination, edge.label
            ));
        }
    }
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

fn write_superstate<S, T>(
    out: &mut String,
    state: &StateInfo<S, T>,
    by_name: &HashMap<&str, &StateInfo<S, T>>,
    names: &HashMap<String, String>,
    depth: usize,
) {
    let indent = "\t".repeat(depth);
    out.push_str(&format!("{}state {} {{\n", indent, names[&state.name]));
    let mut substates = state.substates.clone();
    substates.sort();
    for substate in substates {
        match by_name.get(substate.as_str()) {
            Some(child) if !child.substates.is_empty() => {
                write_superstate(out, child, by_name, names, depth + 1);
            }
            _ => {
                out.push_str(&format!("{}\t{}\n", indent, names[&substate]));
            }
        }
    }
    out.push_str(&format!("{}}}\n", indent));
}
