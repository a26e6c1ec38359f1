//! Unit tests for the document store and command log

use crate::document::*;
use crate::model::{
    Machine, Machines, NodeKind, Point, StateNode, Transition, Variable, VariableType,
};

fn test_machines() -> Machines {
    let mut machine = Machine::new("m1", "Machine One");
    machine.nodes = vec![
        StateNode::new("a", "A", NodeKind::Simple).at(0.0, 0.0),
        StateNode::new("b", "B", NodeKind::Simple).at(0.0, 100.0),
        StateNode::new("c", "C", NodeKind::Simple).at(0.0, 200.0),
    ];
    machine.transitions = vec![
        Transition::new("t-ab", "a", "b"),
        Transition::new("t-bc", "b", "c"),
    ];
    let mut machines = Machines::new();
    machines.insert(machine.id.clone(), machine);
    machines
}

fn create_node_action(id: &str) -> EditAction {
    EditAction::CreateNode {
        machine_id: "m1".to_string(),
        node: StateNode::new(id, id.to_uppercase(), NodeKind::Simple),
    }
}

#[test]
fn test_commit_applies_forward() {
    let mut store = DocumentStore::new(test_machines());
    let mut log = CommandLog::default();

    log.commit(create_node_action("d"), &mut store);

    assert!(store.machine("m1").unwrap().node("d").is_some());
    assert!(log.can_undo());
    assert!(!log.can_redo());
}

#[test]
fn test_n_commits_n_undos_is_identity() {
    let mut store = DocumentStore::new(test_machines());
    let before = store.machines().clone();
    let mut log = CommandLog::default();

    log.commit(create_node_action("d"), &mut store);
    log.commit(
        EditAction::CreateTransition {
            machine_id: "m1".to_string(),
            transition: Transition::new("t-ad", "a", "d"),
        },
        &mut store,
    );
    log.commit(
        EditAction::AddVariable {
            machine_id: "m1".to_string(),
            name: "Flag".to_string(),
            variable: Variable::new(VariableType::Input),
        },
        &mut store,
    );

    assert!(log.undo(&mut store).is_some());
    assert!(log.undo(&mut store).is_some());
    assert!(log.undo(&mut store).is_some());
    assert!(log.undo(&mut store).is_none());

    assert_eq!(*store.machines(), before);
}

#[test]
fn test_undo_then_redo_replays() {
    let mut store = DocumentStore::new(test_machines());
    let mut log = CommandLog::default();

    log.commit(create_node_action("d"), &mut store);
    let after_commit = store.machines().clone();

    assert_eq!(log.undo(&mut store), Some("create node"));
    assert!(store.machine("m1").unwrap().node("d").is_none());

    assert_eq!(log.redo(&mut store), Some("create node"));
    assert_eq!(*store.machines(), after_commit);
    assert!(log.can_undo());
    assert!(!log.can_redo());
}

#[test]
fn test_new_commit_clears_redo() {
    let mut store = DocumentStore::new(test_machines());
    let mut log = CommandLog::default();

    log.commit(create_node_action("d"), &mut store);
    log.undo(&mut store);
    assert!(log.can_redo());

    log.commit(create_node_action("e"), &mut store);
    assert!(!log.can_redo());
    assert!(log.redo(&mut store).is_none());
}

#[test]
fn test_undo_cap_evicts_oldest_in_order() {
    let mut store = DocumentStore::new(test_machines());
    let mut log = CommandLog::with_capacity(3);

    for id in ["d", "e", "f", "g", "h"] {
        log.commit(create_node_action(id), &mut store);
    }
    assert_eq!(log.undo_depth(), 3);

    // Only the newest three commits can be rolled back
    assert!(log.undo(&mut store).is_some());
    assert!(log.undo(&mut store).is_some());
    assert!(log.undo(&mut store).is_some());
    assert!(log.undo(&mut store).is_none());

    let machine = store.machine("m1").unwrap();
    assert!(machine.node("d").is_some());
    assert!(machine.node("e").is_some());
    assert!(machine.node("f").is_none());
    assert!(machine.node("g").is_none());
    assert!(machine.node("h").is_none());
}

#[test]
fn test_delete_node_captures_exactly_incident_transitions() {
    let machines = test_machines();
    let action = delete_node_action(machines.get("m1").unwrap(), "b").unwrap();

    let EditAction::DeleteNode {
        node,
        connected_transitions,
        ..
    } = &action
    else {
        panic!("expected DeleteNode");
    };
    assert_eq!(node.id, "b");
    let ids: Vec<&str> = connected_transitions.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t-ab", "t-bc"]);
}

#[test]
fn test_delete_node_undo_restores_node_and_edges() {
    let mut store = DocumentStore::new(test_machines());
    let before = store.machines().clone();
    let mut log = CommandLog::default();

    let action = delete_node_action(store.machine("m1").unwrap(), "b").unwrap();
    log.commit(action, &mut store);

    let machine = store.machine("m1").unwrap();
    assert!(machine.node("b").is_none());
    assert!(machine.transition("t-ab").is_none());
    assert!(machine.transition("t-bc").is_none());

    log.undo(&mut store);
    let machine = store.machine("m1").unwrap();
    assert!(machine.node("b").is_some());
    assert!(machine.transition("t-ab").is_some());
    assert!(machine.transition("t-bc").is_some());
    // Same content, order aside
    assert_eq!(
        store.machines().get("m1").unwrap().transitions.len(),
        before.get("m1").unwrap().transitions.len()
    );
}

#[test]
fn test_update_transition_details_round_trip() {
    let mut store = DocumentStore::new(test_machines());
    let mut log = CommandLog::default();

    log.commit(
        EditAction::UpdateTransitionDetails {
            machine_id: "m1".to_string(),
            transition_id: "t-ab".to_string(),
            old_rules: None,
            new_rules: Some("ready == true".to_string()),
            old_from_side: crate::model::ConnectionSide::Bottom,
            new_from_side: crate::model::ConnectionSide::Right,
            old_to_side: crate::model::ConnectionSide::Top,
            new_to_side: crate::model::ConnectionSide::Left,
            old_midpoint_offset: Point::ZERO,
            new_midpoint_offset: Point::new(30.0, -15.0),
        },
        &mut store,
    );

    let t = store.machine("m1").unwrap().transition("t-ab").unwrap();
    assert_eq!(t.rules.as_deref(), Some("ready == true"));
    assert_eq!(t.ui.from_side, crate::model::ConnectionSide::Right);
    assert_eq!(t.ui.midpoint_offset, Point::new(30.0, -15.0));

    log.undo(&mut store);
    let t = store.machine("m1").unwrap().transition("t-ab").unwrap();
    assert_eq!(t.rules, None);
    assert_eq!(t.ui.from_side, crate::model::ConnectionSide::Bottom);
    assert_eq!(t.ui.midpoint_offset, Point::ZERO);
}

#[test]
fn test_toggle_expansion_round_trip() {
    let mut store = DocumentStore::new(test_machines());
    let mut log = CommandLog::default();

    log.commit(
        EditAction::ToggleNodeExpansion {
            machine_id: "m1".to_string(),
            node_id: "a".to_string(),
            old_expanded: false,
            new_expanded: true,
        },
        &mut store,
    );
    assert!(store.machine("m1").unwrap().node("a").unwrap().ui.is_expanded);

    log.undo(&mut store);
    assert!(!store.machine("m1").unwrap().node("a").unwrap().ui.is_expanded);
}

#[test]
fn test_variable_actions_round_trip() {
    let mut store = DocumentStore::new(test_machines());
    let mut log = CommandLog::default();

    log.commit(
        EditAction::AddVariable {
            machine_id: "m1".to_string(),
            name: "Flag".to_string(),
            variable: Variable::new(VariableType::Output),
        },
        &mut store,
    );
    assert!(store.machine("m1").unwrap().variables.contains_key("Flag"));

    log.commit(
        EditAction::RemoveVariable {
            machine_id: "m1".to_string(),
            name: "Flag".to_string(),
            variable: Variable::new(VariableType::Output),
        },
        &mut store,
    );
    assert!(!store.machine("m1").unwrap().variables.contains_key("Flag"));

    log.undo(&mut store);
    assert!(store.machine("m1").unwrap().variables.contains_key("Flag"));
    log.undo(&mut store);
    assert!(!store.machine("m1").unwrap().variables.contains_key("Flag"));
}

#[test]
fn test_clear_drops_both_stacks() {
    let mut store = DocumentStore::new(test_machines());
    let mut log = CommandLog::default();

    log.commit(create_node_action("d"), &mut store);
    log.commit(create_node_action("e"), &mut store);
    log.undo(&mut store);
    assert!(log.can_undo());
    assert!(log.can_redo());

    log.clear();
    assert!(!log.can_undo());
    assert!(!log.can_redo());
    // The document itself is untouched by clear
    assert!(store.machine("m1").unwrap().node("d").is_some());
}

#[test]
fn test_unlogged_setters_bump_revision() {
    let mut store = DocumentStore::new(test_machines());
    let rev = store.revision();

    store.set_node_position("m1", "a", Point::new(42.0, 7.0));
    assert_eq!(store.revision(), rev + 1);
    assert_eq!(
        store.machine("m1").unwrap().node("a").unwrap().ui.position,
        Point::new(42.0, 7.0)
    );

    store.set_midpoint_offset("m1", "t-ab", Point::new(5.0, 5.0));
    assert_eq!(store.revision(), rev + 2);
}

#[test]
fn test_unlogged_setters_ignore_missing_targets() {
    let mut store = DocumentStore::new(test_machines());
    let rev = store.revision();

    store.set_node_position("m1", "nope", Point::new(1.0, 1.0));
    store.set_node_position("nope", "a", Point::new(1.0, 1.0));
    store.set_midpoint_offset("m1", "nope", Point::new(1.0, 1.0));

    assert_eq!(store.revision(), rev);
}

#[test]
fn test_action_on_unknown_machine_is_noop() {
    let mut store = DocumentStore::new(test_machines());
    let before = store.machines().clone();
    let mut log = CommandLog::default();

    log.commit(
        EditAction::CreateNode {
            machine_id: "ghost".to_string(),
            node: StateNode::new("x", "X", NodeKind::Simple),
        },
        &mut store,
    );
    log.undo(&mut store);

    assert_eq!(*store.machines(), before);
}
