//! Geometry Resolver
//! Projects the nested document into absolute, render-ready coordinates

use egui::{pos2, Pos2, Rect, Vec2};

use crate::model::{
    ConnectionSide, Machines, NodeKind, StateNode, NODE_HEADER_HEIGHT, SUB_MACHINE_PADDING,
};


/// Recursion cap for expanded sub-machine content. Documents may contain
/// sub-machine cycles; anything deeper than this is silently omitted.
pub const MAX_DEPTH: u32 = 5;

/// A node with its absolute on-canvas rectangle.
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    pub machine_id: String,
    pub node_id: String,
    pub title: String,
    pub kind: NodeKind,
    pub is_expanded: bool,
    pub has_sub_machine: bool,
    pub depth: u32,
    pub rect: Rect,
}

/// A transition routed through absolute coordinates: a quadratic curve from
/// `start` to `end` with control point `control`, plus the draggable handle.
#[derive(Debug, Clone)]
pub struct ResolvedTransition {
    pub machine_id: String,
    pub transition_id: String,
    pub start: Pos2,
    pub end: Pos2,
    /// Unmodified geometric midpoint of start and end
    pub midpoint: Pos2,
    /// Where the drag handle and midpoint arrow sit: midpoint + offset
    pub handle: Pos2,
    /// Quadratic Bezier control point: midpoint + 2*offset, so the curve
    /// passes through the handle at t = 0.5
    pub control: Pos2,
    /// Curve tangent at the handle, in radians, for arrow orientation
    pub tangent_angle: f32,
    pub depth: u32,
}

/// Everything the renderer and hit-testing need for one frame.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub nodes: Vec<ResolvedNode>,
    pub transitions: Vec<ResolvedTransition>,
}

impl Scene {
    pub fn node(&self, machine_id: &str, node_id: &str) -> Option<&ResolvedNode> {
        self.nodes
            .iter()
            .find(|n| n.machine_id == machine_id && n.node_id == node_id)
    }

    pub fn transition(&self, machine_id: &str, transition_id: &str) -> Option<&ResolvedTransition> {
        self.transitions
            .iter()
            .find(|t| t.machine_id == machine_id && t.transition_id == transition_id)
    }
}

/// The point on a node's bounding box where a given side attaches.
pub fn edge_point(rect: Rect, side: ConnectionSide) -> Pos2 {
    match side {
        ConnectionSide::Top => pos2(rect.center().x, rect.top()),
        ConnectionSide::Bottom => pos2(rect.center().x, rect.bottom()),
        ConnectionSide::Left => pos2(rect.left(), rect.center().y),
        ConnectionSide::Right => pos2(rect.right(), rect.center().y),
    }
}

fn node_rect(node: &StateNode, offset: Vec2) -> Rect {
    let size = node.size();
    Rect::from_min_size(
        node.ui.position.to_pos2() + offset,
        egui::vec2(size.width, size.height),
    )
}

/// Resolve the active machine and every expanded sub-machine into absolute
/// coordinates. Pure projection: unknown machine ids yield an empty scene,
/// transitions with unresolvable endpoints are skipped.
pub fn resolve(active_machine_id: &str, machines: &Machines) -> Scene {
    let mut scene = Scene::default();
    resolve_machine(active_machine_id, machines, Vec2::ZERO, 0, &mut scene);
    scene
}

fn resolve_machine(
    machine_id: &str,
    machines: &Machines,
    offset: Vec2,
    depth: u32,
    scene: &mut Scene,
) {
    if depth > MAX_DEPTH {
        return;
    }
    let Some(machine) = machines.get(machine_id) else {
        return;
    };

    for transition in &machine.transitions {
        let (Some(from), Some(to)) = (
            machine.node(&transition.from_node_id),
            machine.node(&transition.to_node_id),
        ) else {
            continue;
        };
        let start = edge_point(node_rect(from, offset), transition.ui.from_side);
        let end = edge_point(node_rect(to, offset), transition.ui.to_side);
        let midpoint = pos2((start.x + end.x) / 2.0, (start.y + end.y) / 2.0);
        let user_offset = transition.ui.midpoint_offset.to_vec2();
        let handle = midpoint + user_offset;
        let control = midpoint + 2.0 * user_offset;
        // Sum of the two Bezier legs; collapses to end - start, which is the
        // curve's tangent direction at t = 0.5.
        let tangent = (control - start) + (end - control);
        let tangent_angle = tangent.y.atan2(tangent.x);

        scene.transitions.push(ResolvedTransition {
            machine_id: machine_id.to_string(),
            transition_id: transition.id.clone(),
            start,
            end,
            midpoint,
            handle,
            control,
            tangent_angle,
            depth,
        });
    }

    for node in &machine.nodes {
        let rect = node_rect(node, offset);
        scene.nodes.push(ResolvedNode {
            machine_id: machine_id.to_string(),
            node_id: node.id.clone(),
            title: node.title.clone(),
            kind: node.kind,
            is_expanded: node.ui.is_expanded,
            has_sub_machine: node.sub_machine_id.is_some(),
            depth,
            rect,
        });

        if node.kind == NodeKind::Hierarchical && node.ui.is_expanded {
            if let Some(sub_id) = &node.sub_machine_id {
                let sub_offset = rect.min.to_vec2()
                    + egui::vec2(SUB_MACHINE_PADDING, NODE_HEADER_HEIGHT + SUB_MACHINE_PADDING);
                resolve_machine(sub_id, machines, sub_offset, depth + 1, scene);
            }
        }
    }
}

/// Bounding box of all resolved node rects, or None for an empty scene.
/// Feeds zoom-to-fit.
pub fn scene_bounds(scene: &Scene) -> Option<Rect> {
    let mut iter = scene.nodes.iter();
    let first = iter.next()?;
    let mut bounds = first.rect;
    for node in iter {
        bounds = bounds.union(node.rect);
    }
    Some(bounds)
}
