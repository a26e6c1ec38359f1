//! Diagram Data Model
//! Core types for hierarchical state-machine diagrams

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests;

/// Default node box width
pub const NODE_WIDTH: f32 = 180.0;
/// Height of the title header strip at the top of every node
pub const NODE_HEADER_HEIGHT: f32 = 32.0;
/// Minimum height of the content area below the header
pub const NODE_MIN_CONTENT_HEIGHT: f32 = 20.0;
/// Vertical padding inside the node body
pub const NODE_CONTENT_PADDING: f32 = 8.0;
/// Default node box height (header + min content + padding)
pub const NODE_HEIGHT: f32 = NODE_HEADER_HEIGHT + NODE_MIN_CONTENT_HEIGHT + NODE_CONTENT_PADDING;
/// Inset applied to an expanded hierarchical node's embedded diagram
pub const SUB_MACHINE_PADDING: f32 = 20.0;
/// Radius of the four connection points on a node's edges
pub const CONNECTION_POINT_RADIUS: f32 = 5.0;

/// The full document: every machine, keyed by id. Nesting is expressed by
/// `StateNode::sub_machine_id` references into this map, never by containment.
pub type Machines = BTreeMap<String, Machine>;

/// A 2D point in diagram (world) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn to_pos2(self) -> egui::Pos2 {
        egui::pos2(self.x, self.y)
    }

    pub fn to_vec2(self) -> egui::Vec2 {
        egui::vec2(self.x, self.y)
    }
}

impl From<egui::Pos2> for Point {
    fn from(p: egui::Pos2) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<egui::Vec2> for Point {
    fn from(v: egui::Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }
}

/// A width/height pair for a node's bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Which edge of a node's bounding box a transition attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionSide {
    Top,
    Bottom,
    Left,
    Right,
}

impl ConnectionSide {
    pub const ALL: [ConnectionSide; 4] = [
        ConnectionSide::Top,
        ConnectionSide::Bottom,
        ConnectionSide::Left,
        ConnectionSide::Right,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ConnectionSide::Top => "top",
            ConnectionSide::Bottom => "bottom",
            ConnectionSide::Left => "left",
            ConnectionSide::Right => "right",
        }
    }
}

/// Kind of state node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    /// Leaf state with no child diagram
    Simple,
    /// Embeds another machine as a child diagram, expandable in place
    Hierarchical,
}

/// UI placement of a node, relative to the origin of its owning machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUi {
    pub position: Point,
    pub size: Option<Size>,
    pub is_expanded: bool,
}

impl Default for NodeUi {
    fn default() -> Self {
        Self {
            position: Point::ZERO,
            size: None,
            is_expanded: false,
        }
    }
}

/// A state in a machine diagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateNode {
    /// Node id, unique within its owning machine (not globally)
    pub id: String,
    pub title: String,
    pub kind: NodeKind,
    /// Names of variables this node reads (plain strings, no referential integrity)
    pub inputs: Vec<String>,
    /// Names of variables this node writes
    pub outputs: Vec<String>,
    /// For hierarchical nodes: id of the embedded machine. A dangling
    /// reference is tolerated and renders as empty.
    pub sub_machine_id: Option<String>,
    pub ui: NodeUi,
}

impl StateNode {
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            sub_machine_id: None,
            ui: NodeUi::default(),
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.ui.position = Point::new(x, y);
        self
    }

    /// The node's box size, falling back to the defaults when unset.
    pub fn size(&self) -> Size {
        self.ui
            .size
            .unwrap_or(Size::new(NODE_WIDTH, default_height_for(self.kind)))
    }
}

/// UI shape of a transition: anchor sides and curvature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionUi {
    pub from_side: ConnectionSide,
    pub to_side: ConnectionSide,
    /// Displacement of the curve's handle from the geometric midpoint of the
    /// two edge points. Zero means a straight line.
    pub midpoint_offset: Point,
}

impl Default for TransitionUi {
    fn default() -> Self {
        Self {
            from_side: ConnectionSide::Bottom,
            to_side: ConnectionSide::Top,
            midpoint_offset: Point::ZERO,
        }
    }
}

/// A directed edge between two nodes of the same machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    /// Free-form rule text; never parsed or evaluated by the editor
    pub rules: Option<String>,
    pub ui: TransitionUi,
}

impl Transition {
    pub fn new(
        id: impl Into<String>,
        from_node_id: impl Into<String>,
        to_node_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            from_node_id: from_node_id.into(),
            to_node_id: to_node_id.into(),
            rules: None,
            ui: TransitionUi::default(),
        }
    }
}

/// Kind of machine-level variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Input,
    Output,
    Intermediate,
}

impl VariableType {
    pub const ALL: [VariableType; 3] = [
        VariableType::Input,
        VariableType::Output,
        VariableType::Intermediate,
    ];

    pub fn label(self) -> &'static str {
        match self {
            VariableType::Input => "input",
            VariableType::Output => "output",
            VariableType::Intermediate => "intermediate",
        }
    }
}

/// A machine-level variable. Names are unique per machine but may shadow
/// identically-named inputs/outputs declared on nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub kind: VariableType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl Variable {
    pub fn new(kind: VariableType) -> Self {
        Self { kind, value: None }
    }
}

/// One named state diagram: nodes, transitions and variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub name: String,
    pub nodes: Vec<StateNode>,
    pub transitions: Vec<Transition>,
    pub variables: BTreeMap<String, Variable>,
}

impl Machine {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            transitions: Vec::new(),
            variables: BTreeMap::new(),
        }
    }

    pub fn node(&self, node_id: &str) -> Option<&StateNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub fn node_mut(&mut self, node_id: &str) -> Option<&mut StateNode> {
        self.nodes.iter_mut().find(|n| n.id == node_id)
    }

    pub fn transition(&self, transition_id: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.id == transition_id)
    }

    pub fn transition_mut(&mut self, transition_id: &str) -> Option<&mut Transition> {
        self.transitions.iter_mut().find(|t| t.id == transition_id)
    }

    /// Transitions with the given node as source or target.
    pub fn transitions_touching(&self, node_id: &str) -> Vec<Transition> {
        self.transitions
            .iter()
            .filter(|t| t.from_node_id == node_id || t.to_node_id == node_id)
            .cloned()
            .collect()
    }
}

fn default_height_for(kind: NodeKind) -> f32 {
    match kind {
        NodeKind::Simple => NODE_HEIGHT,
        // Expanded hierarchical nodes get a taller base box
        NodeKind::Hierarchical => NODE_HEIGHT + 10.0,
    }
}

/// Give every node without an explicit size the default box for its kind.
pub fn assign_node_sizes(nodes: &mut [StateNode]) {
    for node in nodes {
        if node.ui.size.is_none() {
            node.ui.size = Some(Size::new(NODE_WIDTH, default_height_for(node.kind)));
        }
    }
}

/// Generate a unique entity id with the given prefix.
pub fn generate_id(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let counter = {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    };
    format!("{prefix}{nanos:x}-{counter:x}")
}
