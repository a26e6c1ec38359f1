//! Unit tests for the diagram data model

use crate::model::*;

#[test]
fn test_machine_new() {
    let machine = Machine::new("m1", "Test Machine");
    assert_eq!(machine.id, "m1");
    assert_eq!(machine.name, "Test Machine");
    assert!(machine.nodes.is_empty());
    assert!(machine.transitions.is_empty());
    assert!(machine.variables.is_empty());
}

#[test]
fn test_node_size_fallback() {
    let simple = StateNode::new("a", "A", NodeKind::Simple);
    assert_eq!(simple.size(), Size::new(NODE_WIDTH, NODE_HEIGHT));

    let hierarchical = StateNode::new("b", "B", NodeKind::Hierarchical);
    assert_eq!(
        hierarchical.size(),
        Size::new(NODE_WIDTH, NODE_HEIGHT + 10.0)
    );

    let mut sized = StateNode::new("c", "C", NodeKind::Simple);
    sized.ui.size = Some(Size::new(200.0, 120.0));
    assert_eq!(sized.size(), Size::new(200.0, 120.0));
}

#[test]
fn test_default_node_height_composition() {
    assert_eq!(
        NODE_HEIGHT,
        NODE_HEADER_HEIGHT + NODE_MIN_CONTENT_HEIGHT + NODE_CONTENT_PADDING
    );
}

#[test]
fn test_assign_node_sizes_only_fills_missing() {
    let mut nodes = vec![
        StateNode::new("a", "A", NodeKind::Simple),
        StateNode::new("b", "B", NodeKind::Hierarchical),
    ];
    nodes[0].ui.size = Some(Size::new(300.0, 80.0));
    assign_node_sizes(&mut nodes);

    assert_eq!(nodes[0].ui.size, Some(Size::new(300.0, 80.0)));
    assert_eq!(nodes[1].ui.size, Some(Size::new(NODE_WIDTH, NODE_HEIGHT + 10.0)));
}

#[test]
fn test_transition_ui_defaults() {
    let ui = TransitionUi::default();
    assert_eq!(ui.from_side, ConnectionSide::Bottom);
    assert_eq!(ui.to_side, ConnectionSide::Top);
    assert_eq!(ui.midpoint_offset, Point::ZERO);
}

#[test]
fn test_transitions_touching() {
    let mut machine = Machine::new("m1", "M");
    machine.nodes = vec![
        StateNode::new("a", "A", NodeKind::Simple),
        StateNode::new("b", "B", NodeKind::Simple),
        StateNode::new("c", "C", NodeKind::Simple),
    ];
    machine.transitions = vec![
        Transition::new("t1", "a", "b"),
        Transition::new("t2", "b", "c"),
        Transition::new("t3", "c", "a"),
    ];

    let touching = machine.transitions_touching("b");
    let ids: Vec<&str> = touching.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "t2"]);
}

#[test]
fn test_connection_side_serde_names() {
    let json = serde_json::to_string(&ConnectionSide::Bottom).unwrap();
    assert_eq!(json, "\"bottom\"");
    let side: ConnectionSide = serde_json::from_str("\"left\"").unwrap();
    assert_eq!(side, ConnectionSide::Left);
}

#[test]
fn test_node_kind_serde_names() {
    let json = serde_json::to_string(&NodeKind::Hierarchical).unwrap();
    assert_eq!(json, "\"HIERARCHICAL\"");
    let kind: NodeKind = serde_json::from_str("\"SIMPLE\"").unwrap();
    assert_eq!(kind, NodeKind::Simple);
}

#[test]
fn test_generate_id_unique_and_prefixed() {
    let a = generate_id("node-");
    let b = generate_id("node-");
    assert!(a.starts_with("node-"));
    assert!(b.starts_with("node-"));
    assert_ne!(a, b);
}
