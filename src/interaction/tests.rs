//! Unit tests for the view transform, hit-testing and gesture controller

use egui::{pos2, Rect};

use crate::geometry::{self, Scene};
use crate::interaction::*;
use crate::model::{
    ConnectionSide, Machine, Machines, NodeKind, Point, Size, StateNode, Transition,
};

fn sized_node(id: &str, x: f32, y: f32) -> StateNode {
    let mut node = StateNode::new(id, id.to_uppercase(), NodeKind::Simple).at(x, y);
    node.ui.size = Some(Size::new(180.0, 60.0));
    node
}

/// Two stacked nodes connected bottom-to-top; handle at (90, 80).
fn stacked_machines() -> Machines {
    let mut machine = Machine::new("m1", "M");
    machine.nodes = vec![sized_node("a", 0.0, 0.0), sized_node("b", 0.0, 100.0)];
    machine.transitions = vec![Transition::new("t", "a", "b")];
    let mut machines = Machines::new();
    machines.insert(machine.id.clone(), machine);
    machines
}

/// Two far-apart nodes with no transitions, for connect gestures.
fn unconnected_machines() -> Machines {
    let mut machine = Machine::new("m1", "M");
    machine.nodes = vec![sized_node("a", 0.0, 0.0), sized_node("b", 0.0, 300.0)];
    let mut machines = Machines::new();
    machines.insert(machine.id.clone(), machine);
    machines
}

fn scene_of(machines: &Machines) -> Scene {
    geometry::resolve("m1", machines)
}

fn position_lookup(machines: &Machines) -> impl Fn(&str, &str) -> Option<Point> + '_ {
    |machine_id, node_id| {
        machines
            .get(machine_id)
            .and_then(|m| m.node(node_id))
            .map(|n| n.ui.position)
    }
}

// ---- ViewTransform ----

#[test]
fn test_world_screen_round_trip() {
    let vt = ViewTransform {
        offset: egui::vec2(30.0, 40.0),
        scale: 2.0,
    };
    let world = pos2(10.0, -5.0);
    let screen = vt.world_to_screen(world);
    assert_eq!(screen, pos2(50.0, 30.0));
    let back = vt.screen_to_world(screen);
    assert!((back.x - world.x).abs() < 1e-5);
    assert!((back.y - world.y).abs() < 1e-5);
}

#[test]
fn test_zoom_clamped_to_bounds() {
    let mut vt = ViewTransform::default();
    vt.zoom_at(pos2(100.0, 100.0), 99.0);
    assert_eq!(vt.scale, MAX_ZOOM);
    vt.zoom_at(pos2(100.0, 100.0), 0.0001);
    assert_eq!(vt.scale, MIN_ZOOM);
}

#[test]
fn test_zoom_preserves_anchor() {
    let mut vt = ViewTransform {
        offset: egui::vec2(17.0, -8.0),
        scale: 1.0,
    };
    let anchor = pos2(250.0, 180.0);
    let world_before = vt.screen_to_world(anchor);

    vt.zoom_at(anchor, 2.5);
    let world_after = vt.screen_to_world(anchor);
    assert!((world_after.x - world_before.x).abs() < 1e-3);
    assert!((world_after.y - world_before.y).abs() < 1e-3);
}

#[test]
fn test_wheel_zoom_is_multiplicative() {
    let mut vt = ViewTransform::default();
    vt.wheel_zoom(pos2(0.0, 0.0), 1000.0);
    assert!((vt.scale - 2.0).abs() < 1e-5);
    vt.wheel_zoom(pos2(0.0, 0.0), -500.0);
    assert!((vt.scale - 1.0).abs() < 1e-5);
}

#[test]
fn test_zoom_to_fit_centers_content() {
    let mut vt = ViewTransform::default();
    let bounds = Rect::from_min_max(pos2(0.0, 0.0), pos2(400.0, 300.0));
    let viewport = Rect::from_min_max(pos2(0.0, 0.0), pos2(900.0, 700.0));
    vt.zoom_to_fit(bounds, viewport);

    assert!((vt.scale - 2.0).abs() < 1e-5);
    assert_eq!(vt.world_to_screen(pos2(0.0, 0.0)), pos2(50.0, 50.0));
    assert_eq!(vt.world_to_screen(pos2(400.0, 300.0)), pos2(850.0, 650.0));
}

// ---- Hit testing ----

#[test]
fn test_connection_point_beats_node_body() {
    let machines = unconnected_machines();
    let scene = scene_of(&machines);

    let hit = hit_test(&scene, pos2(180.0, 30.0));
    assert_eq!(
        hit,
        Hit::ConnectionPoint {
            machine_id: "m1".to_string(),
            node_id: "a".to_string(),
            side: ConnectionSide::Right,
            point: pos2(180.0, 30.0),
        }
    );
}

#[test]
fn test_handle_beats_transition_line() {
    let machines = stacked_machines();
    let scene = scene_of(&machines);

    // On the handle
    assert!(matches!(
        hit_test(&scene, pos2(90.0, 80.0)),
        Hit::Handle { .. }
    ));
    // On the curve, outside both the handle and the edge points
    assert!(matches!(
        hit_test(&scene, pos2(95.0, 68.0)),
        Hit::TransitionLine { .. }
    ));
}

#[test]
fn test_expand_toggle_hit_requires_sub_machine() {
    let mut machine = Machine::new("m1", "M");
    let mut host = StateNode::new("host", "Host", NodeKind::Hierarchical).at(0.0, 0.0);
    host.sub_machine_id = Some("child".to_string());
    machine.nodes = vec![host, sized_node("plain", 400.0, 0.0)];
    let mut machines = Machines::new();
    machines.insert(machine.id.clone(), machine);
    let scene = scene_of(&machines);

    let toggle_center = expand_toggle_rect(scene.node("m1", "host").unwrap().rect).center();
    assert!(matches!(
        hit_test(&scene, toggle_center),
        Hit::ExpandToggle { .. }
    ));

    // Same spot on a node without a sub-machine is just the body
    let plain_center = expand_toggle_rect(scene.node("m1", "plain").unwrap().rect).center();
    assert!(matches!(
        hit_test(&scene, plain_center),
        Hit::NodeBody { .. }
    ));
}

#[test]
fn test_empty_space_is_canvas() {
    let machines = unconnected_machines();
    let scene = scene_of(&machines);
    assert_eq!(hit_test(&scene, pos2(1000.0, 1000.0)), Hit::Canvas);
}

// ---- Gestures ----

#[test]
fn test_node_click_selects() {
    let machines = unconnected_machines();
    let scene = scene_of(&machines);
    let mut c = Controller::new();

    assert!(c
        .pointer_down(pos2(50.0, 30.0), &scene, position_lookup(&machines))
        .is_none());
    let intent = c.pointer_up(pos2(50.0, 30.0), &scene);
    assert_eq!(
        intent,
        Some(Intent::Select(Selection {
            kind: SelectionKind::Node,
            machine_id: "m1".to_string(),
            id: "a".to_string(),
        }))
    );
    assert!(c.is_idle());
}

#[test]
fn test_node_drag_below_threshold_is_still_a_click() {
    let machines = unconnected_machines();
    let scene = scene_of(&machines);
    let mut c = Controller::new();

    c.pointer_down(pos2(50.0, 30.0), &scene, position_lookup(&machines));
    assert!(c.pointer_move(pos2(53.0, 31.0)).is_none());
    let intent = c.pointer_up(pos2(53.0, 31.0), &scene);
    assert!(matches!(intent, Some(Intent::Select(_))));
}

#[test]
fn test_node_drag_emits_live_moves() {
    let machines = unconnected_machines();
    let scene = scene_of(&machines);
    let mut c = Controller::new();

    c.pointer_down(pos2(50.0, 30.0), &scene, position_lookup(&machines));
    let intent = c.pointer_move(pos2(60.0, 30.0));
    assert_eq!(
        intent,
        Some(Intent::MoveNodeLive {
            machine_id: "m1".to_string(),
            node_id: "a".to_string(),
            position: Point::new(10.0, 0.0),
        })
    );
    // Release after a real drag neither selects nor commits
    assert!(c.pointer_up(pos2(60.0, 30.0), &scene).is_none());
}

#[test]
fn test_handle_drag_commits_once_on_release() {
    let machines = stacked_machines();
    let scene = scene_of(&machines);
    let mut c = Controller::new();

    c.pointer_down(pos2(90.0, 80.0), &scene, position_lookup(&machines));
    let live = c.pointer_move(pos2(100.0, 95.0));
    assert_eq!(
        live,
        Some(Intent::SetMidpointLive {
            machine_id: "m1".to_string(),
            transition_id: "t".to_string(),
            offset: Point::new(10.0, 15.0),
        })
    );

    let commit = c.pointer_up(pos2(100.0, 95.0), &scene);
    assert_eq!(
        commit,
        Some(Intent::CommitMidpoint {
            machine_id: "m1".to_string(),
            transition_id: "t".to_string(),
            old_offset: Point::ZERO,
            new_offset: Point::new(10.0, 15.0),
        })
    );
}

#[test]
fn test_handle_click_selects_transition() {
    let machines = stacked_machines();
    let scene = scene_of(&machines);
    let mut c = Controller::new();

    c.pointer_down(pos2(90.0, 80.0), &scene, position_lookup(&machines));
    let intent = c.pointer_up(pos2(90.0, 80.0), &scene);
    assert_eq!(
        intent,
        Some(Intent::Select(Selection {
            kind: SelectionKind::Transition,
            machine_id: "m1".to_string(),
            id: "t".to_string(),
        }))
    );
}

#[test]
fn test_handle_drag_cancel_rolls_back() {
    let machines = stacked_machines();
    let scene = scene_of(&machines);
    let mut c = Controller::new();

    c.pointer_down(pos2(90.0, 80.0), &scene, position_lookup(&machines));
    c.pointer_move(pos2(120.0, 120.0));
    let intent = c.cancel();
    assert_eq!(
        intent,
        Some(Intent::SetMidpointLive {
            machine_id: "m1".to_string(),
            transition_id: "t".to_string(),
            offset: Point::ZERO,
        })
    );
    assert!(c.is_idle());
}

#[test]
fn test_connect_produces_one_transition_with_chosen_sides() {
    let machines = unconnected_machines();
    let scene = scene_of(&machines);
    let mut c = Controller::new();

    // Right edge of `a` to left edge of `b`
    c.pointer_down(pos2(180.0, 30.0), &scene, position_lookup(&machines));
    assert!(c.connect_preview().is_some());
    c.pointer_move(pos2(100.0, 200.0));
    let intent = c.pointer_up(pos2(0.0, 330.0), &scene);
    assert_eq!(
        intent,
        Some(Intent::CompleteConnection {
            machine_id: "m1".to_string(),
            from_node_id: "a".to_string(),
            from_side: ConnectionSide::Right,
            to_node_id: "b".to_string(),
            to_side: ConnectionSide::Left,
        })
    );
    assert!(c.connect_preview().is_none());
}

#[test]
fn test_connect_released_on_empty_space_cancels() {
    let machines = unconnected_machines();
    let scene = scene_of(&machines);
    let mut c = Controller::new();

    c.pointer_down(pos2(180.0, 30.0), &scene, position_lookup(&machines));
    let intent = c.pointer_up(pos2(700.0, 700.0), &scene);
    assert_eq!(intent, Some(Intent::ConnectionCancelled));
}

#[test]
fn test_connect_across_machines_cancels() {
    // Parent hosting an expanded child; both have connection points on screen
    let mut parent = Machine::new("m1", "Parent");
    let mut host = StateNode::new("host", "Host", NodeKind::Hierarchical).at(0.0, 0.0);
    host.sub_machine_id = Some("child".to_string());
    host.ui.is_expanded = true;
    host.ui.size = Some(Size::new(180.0, 60.0));
    parent.nodes = vec![host];
    let mut child = Machine::new("child", "Child");
    child.nodes = vec![sized_node("inner", 100.0, 50.0)];
    let mut machines = Machines::new();
    machines.insert(parent.id.clone(), parent);
    machines.insert(child.id.clone(), child);
    let scene = geometry::resolve("m1", &machines);

    let mut c = Controller::new();
    c.pointer_down(pos2(90.0, 0.0), &scene, position_lookup(&machines));
    // Release on the child node's top connection point
    let target = scene.node("child", "inner").unwrap().rect;
    let release = pos2(target.center().x, target.top());
    let intent = c.pointer_up(release, &scene);
    assert_eq!(intent, Some(Intent::ConnectionCancelled));
}

#[test]
fn test_expand_toggle_press_emits_immediately() {
    let mut machine = Machine::new("m1", "M");
    let mut host = StateNode::new("host", "Host", NodeKind::Hierarchical).at(0.0, 0.0);
    host.sub_machine_id = Some("child".to_string());
    machine.nodes = vec![host];
    let mut machines = Machines::new();
    machines.insert(machine.id.clone(), machine);
    let scene = scene_of(&machines);

    let mut c = Controller::new();
    let toggle = expand_toggle_rect(scene.node("m1", "host").unwrap().rect).center();
    let intent = c.pointer_down(toggle, &scene, position_lookup(&machines));
    assert_eq!(
        intent,
        Some(Intent::ToggleExpansion {
            machine_id: "m1".to_string(),
            node_id: "host".to_string(),
        })
    );
    assert!(c.is_idle());
}

#[test]
fn test_pan_moves_view_and_preserves_selection() {
    let machines = unconnected_machines();
    let scene = scene_of(&machines);
    let mut c = Controller::new();

    c.pointer_down(pos2(700.0, 700.0), &scene, position_lookup(&machines));
    c.pointer_move(pos2(710.0, 695.0));
    assert_eq!(c.view.offset, egui::vec2(10.0, -5.0));
    // A real pan does not clear the selection on release
    assert!(c.pointer_up(pos2(710.0, 695.0), &scene).is_none());
}

#[test]
fn test_click_on_empty_space_clears_selection() {
    let machines = unconnected_machines();
    let scene = scene_of(&machines);
    let mut c = Controller::new();

    c.pointer_down(pos2(700.0, 700.0), &scene, position_lookup(&machines));
    let intent = c.pointer_up(pos2(700.0, 700.0), &scene);
    assert_eq!(intent, Some(Intent::ClearSelection));
}

#[test]
fn test_pointer_events_respect_view_transform() {
    let machines = unconnected_machines();
    let scene = scene_of(&machines);
    let mut c = Controller::new();
    c.view = ViewTransform {
        offset: egui::vec2(100.0, 50.0),
        scale: 2.0,
    };

    // World (50, 30) inside node `a` maps to screen (200, 110)
    c.pointer_down(pos2(200.0, 110.0), &scene, position_lookup(&machines));
    let intent = c.pointer_up(pos2(200.0, 110.0), &scene);
    assert!(matches!(intent, Some(Intent::Select(_))));
}
