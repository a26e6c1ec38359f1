//! Interaction Controller
//! Pointer gestures over the resolved scene: pan, zoom, node drag,
//! curvature drag and the modal connect gesture

use egui::{pos2, Pos2, Rect, Vec2};

use crate::geometry::{edge_point, Scene};
use crate::model::{ConnectionSide, Point, CONNECTION_POINT_RADIUS, NODE_HEADER_HEIGHT};

#[cfg(test)]
mod tests;

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 3.0;
pub const ZOOM_SENSITIVITY: f32 = 0.001;
/// Screen-space displacement below which a press-and-release counts as a
/// click (selection) rather than a drag.
pub const DRAG_THRESHOLD: f32 = 5.0;
/// Padding around the content when zooming to fit, in screen pixels.
pub const FIT_PADDING: f32 = 50.0;

/// Hit radius around a connection point, in world units.
const CONNECTION_HIT_RADIUS: f32 = CONNECTION_POINT_RADIUS + 3.0;
/// Hit radius around a transition's midpoint handle, in world units.
const HANDLE_HIT_RADIUS: f32 = 12.0;
/// Maximum distance from a transition curve that still counts as hovering it.
const LINE_HIT_DISTANCE: f32 = 6.0;
/// Side length of the expand/collapse toggle square in a node header.
const TOGGLE_SIZE: f32 = 16.0;

/// World <-> screen mapping: `screen = world * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub offset: Vec2,
    pub scale: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            scale: 1.0,
        }
    }
}

impl ViewTransform {
    pub fn world_to_screen(&self, world: Pos2) -> Pos2 {
        pos2(world.x * self.scale, world.y * self.scale) + self.offset
    }

    pub fn screen_to_world(&self, screen: Pos2) -> Pos2 {
        let p = screen - self.offset;
        pos2(p.x / self.scale, p.y / self.scale)
    }

    /// Set the scale, clamped to the zoom bounds, keeping the world point
    /// under `anchor_screen` fixed on screen.
    pub fn zoom_at(&mut self, anchor_screen: Pos2, new_scale: f32) {
        let new_scale = new_scale.clamp(MIN_ZOOM, MAX_ZOOM);
        let anchor_world = self.screen_to_world(anchor_screen);
        self.scale = new_scale;
        self.offset = anchor_screen - pos2(anchor_world.x * new_scale, anchor_world.y * new_scale);
    }

    /// Multiplicative wheel zoom anchored at the pointer.
    pub fn wheel_zoom(&mut self, anchor_screen: Pos2, scroll_delta_y: f32) {
        let factor = 1.0 + scroll_delta_y * ZOOM_SENSITIVITY;
        self.zoom_at(anchor_screen, self.scale * factor);
    }

    /// Scale/translate so `bounds` (world space) is centered in `viewport`
    /// (screen space) with fixed padding, clamped to the zoom bounds.
    pub fn zoom_to_fit(&mut self, bounds: Rect, viewport: Rect) {
        if viewport.width() <= 0.0 || viewport.height() <= 0.0 {
            return;
        }
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            // Degenerate content: center it at scale 1
            self.scale = 1.0;
            self.offset = viewport.center() - bounds.center();
            return;
        }
        let scale_x = (viewport.width() - 2.0 * FIT_PADDING) / bounds.width();
        let scale_y = (viewport.height() - 2.0 * FIT_PADDING) / bounds.height();
        let scale = scale_x.min(scale_y).clamp(MIN_ZOOM, MAX_ZOOM);
        self.scale = scale;
        let content_screen = egui::vec2(bounds.width() * scale, bounds.height() * scale);
        self.offset = viewport.min.to_vec2() + (viewport.size() - content_screen) / 2.0
            - bounds.min.to_vec2() * scale;
    }
}

/// What kind of entity a selection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Node,
    Transition,
}

/// The currently selected component, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub kind: SelectionKind,
    pub machine_id: String,
    pub id: String,
}

/// Result of probing the scene at a world position, topmost entity first.
#[derive(Debug, Clone, PartialEq)]
pub enum Hit {
    ConnectionPoint {
        machine_id: String,
        node_id: String,
        side: ConnectionSide,
        point: Pos2,
    },
    Handle {
        machine_id: String,
        transition_id: String,
    },
    ExpandToggle {
        machine_id: String,
        node_id: String,
    },
    NodeBody {
        machine_id: String,
        node_id: String,
    },
    TransitionLine {
        machine_id: String,
        transition_id: String,
    },
    Canvas,
}

/// The expand/collapse toggle square at the right end of a node header.
pub fn expand_toggle_rect(node_rect: Rect) -> Rect {
    let center = pos2(
        node_rect.right() - NODE_HEADER_HEIGHT / 2.0,
        node_rect.top() + NODE_HEADER_HEIGHT / 2.0,
    );
    Rect::from_center_size(center, egui::vec2(TOGGLE_SIZE, TOGGLE_SIZE))
}

fn distance_to_quadratic(start: Pos2, control: Pos2, end: Pos2, p: Pos2) -> f32 {
    // Sampled distance is plenty for hit-testing
    const SAMPLES: u32 = 24;
    let mut best = f32::INFINITY;
    for i in 0..=SAMPLES {
        let t = i as f32 / SAMPLES as f32;
        let u = 1.0 - t;
        let q = pos2(
            u * u * start.x + 2.0 * u * t * control.x + t * t * end.x,
            u * u * start.y + 2.0 * u * t * control.y + t * t * end.y,
        );
        best = best.min(q.distance(p));
    }
    best
}

/// Probe the scene at a world position. Later-drawn entities win: connection
/// points, then handles, then expand toggles and node bodies, then the
/// transition curves themselves.
pub fn hit_test(scene: &Scene, world: Pos2) -> Hit {
    // Nodes draw above transitions; deeper nested content draws above its
    // parent, so iterate in reverse draw order.
    for node in scene.nodes.iter().rev() {
        for side in ConnectionSide::ALL {
            let point = edge_point(node.rect, side);
            if point.distance(world) <= CONNECTION_HIT_RADIUS {
                return Hit::ConnectionPoint {
                    machine_id: node.machine_id.clone(),
                    node_id: node.node_id.clone(),
                    side,
                    point,
                };
            }
        }
    }

    for transition in scene.transitions.iter().rev() {
        if transition.handle.distance(world) <= HANDLE_HIT_RADIUS {
            return Hit::Handle {
                machine_id: transition.machine_id.clone(),
                transition_id: transition.transition_id.clone(),
            };
        }
    }

    for node in scene.nodes.iter().rev() {
        if node.has_sub_machine && expand_toggle_rect(node.rect).contains(world) {
            return Hit::ExpandToggle {
                machine_id: node.machine_id.clone(),
                node_id: node.node_id.clone(),
            };
        }
        if node.rect.contains(world) {
            return Hit::NodeBody {
                machine_id: node.machine_id.clone(),
                node_id: node.node_id.clone(),
            };
        }
    }

    for transition in scene.transitions.iter().rev() {
        let d = distance_to_quadratic(transition.start, transition.control, transition.end, world);
        if d <= LINE_HIT_DISTANCE {
            return Hit::TransitionLine {
                machine_id: transition.machine_id.clone(),
                transition_id: transition.transition_id.clone(),
            };
        }
    }

    Hit::Canvas
}

/// The five mutually exclusive pointer gestures.
#[derive(Debug, Clone, PartialEq)]
pub enum Gesture {
    Idle,
    Panning {
        last_screen: Pos2,
        moved: bool,
    },
    DraggingNode {
        machine_id: String,
        node_id: String,
        /// Node's relative (in-machine) position when the press started
        start_position: Point,
        /// World-space pointer position when the press started
        start_world: Pos2,
        /// Screen-space pointer position when the press started
        start_screen: Pos2,
        dragged: bool,
    },
    DraggingHandle {
        machine_id: String,
        transition_id: String,
        /// midpoint_offset when the press started; the undo value
        initial_offset: Point,
        start_world: Pos2,
        start_screen: Pos2,
        dragged: bool,
    },
    Connecting {
        source_machine_id: String,
        from_node_id: String,
        from_side: ConnectionSide,
        /// Where the preview line starts (the source connection point)
        anchor: Pos2,
        /// Transient preview endpoint, tracks the pointer
        preview_end: Pos2,
    },
}

/// A document- or selection-affecting outcome of a pointer event. The
/// application shell applies these through the store and command log.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Select(Selection),
    ClearSelection,
    /// Live node move; not logged as an undoable action
    MoveNodeLive {
        machine_id: String,
        node_id: String,
        position: Point,
    },
    /// Live curvature change; not logged
    SetMidpointLive {
        machine_id: String,
        transition_id: String,
        offset: Point,
    },
    /// One undoable curvature edit, committed when the handle drag ends
    CommitMidpoint {
        machine_id: String,
        transition_id: String,
        old_offset: Point,
        new_offset: Point,
    },
    /// A completed connect gesture: exactly one new transition
    CompleteConnection {
        machine_id: String,
        from_node_id: String,
        from_side: ConnectionSide,
        to_node_id: String,
        to_side: ConnectionSide,
    },
    ConnectionCancelled,
    ToggleExpansion {
        machine_id: String,
        node_id: String,
    },
}

/// Gesture state machine driven by pointer events. Owns the view transform
/// and the transient gesture state; document mutations leave as [`Intent`]s.
#[derive(Debug, Default)]
pub struct Controller {
    pub view: ViewTransform,
    gesture: Gesture,
}

impl Default for Gesture {
    fn default() -> Self {
        Gesture::Idle
    }
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.gesture, Gesture::Idle)
    }

    /// The preview line of an in-progress connect gesture, if any.
    pub fn connect_preview(&self) -> Option<(Pos2, Pos2)> {
        match &self.gesture {
            Gesture::Connecting {
                anchor, preview_end, ..
            } => Some((*anchor, *preview_end)),
            _ => None,
        }
    }

    /// Classify a pointer press. `node_position` looks up a node's current
    /// relative position so a drag can be anchored to it; a None return (the
    /// node vanished) downgrades the press to a no-op.
    pub fn pointer_down(
        &mut self,
        screen: Pos2,
        scene: &Scene,
        node_position: impl Fn(&str, &str) -> Option<Point>,
    ) -> Option<Intent> {
        if !self.is_idle() {
            return None;
        }
        let world = self.view.screen_to_world(screen);
        match hit_test(scene, world) {
            Hit::ConnectionPoint {
                machine_id,
                node_id,
                side,
                point,
            } => {
                self.gesture = Gesture::Connecting {
                    source_machine_id: machine_id,
                    from_node_id: node_id,
                    from_side: side,
                    anchor: point,
                    preview_end: world,
                };
                None
            }
            Hit::Handle {
                machine_id,
                transition_id,
            } => {
                let initial_offset = scene
                    .transition(&machine_id, &transition_id)
                    .map(|t| Point::new(t.handle.x - t.midpoint.x, t.handle.y - t.midpoint.y))?;
                self.gesture = Gesture::DraggingHandle {
                    machine_id,
                    transition_id,
                    initial_offset,
                    start_world: world,
                    start_screen: screen,
                    dragged: false,
                };
                None
            }
            Hit::ExpandToggle {
                machine_id,
                node_id,
            } => Some(Intent::ToggleExpansion {
                machine_id,
                node_id,
            }),
            Hit::NodeBody {
                machine_id,
                node_id,
            } => {
                let start_position = node_position(&machine_id, &node_id)?;
                self.gesture = Gesture::DraggingNode {
                    machine_id,
                    node_id,
                    start_position,
                    start_world: world,
                    start_screen: screen,
                    dragged: false,
                };
                None
            }
            Hit::TransitionLine {
                machine_id,
                transition_id,
            } => Some(Intent::Select(Selection {
                kind: SelectionKind::Transition,
                machine_id,
                id: transition_id,
            })),
            Hit::Canvas => {
                self.gesture = Gesture::Panning {
                    last_screen: screen,
                    moved: false,
                };
                None
            }
        }
    }

    pub fn pointer_move(&mut self, screen: Pos2) -> Option<Intent> {
        let world = self.view.screen_to_world(screen);
        match &mut self.gesture {
            Gesture::Idle => None,
            Gesture::Panning { last_screen, moved } => {
                let delta = screen - *last_screen;
                *last_screen = screen;
                if delta != Vec2::ZERO {
                    *moved = true;
                }
                self.view.offset += delta;
                None
            }
            Gesture::DraggingNode {
                machine_id,
                node_id,
                start_position,
                start_world,
                start_screen,
                dragged,
            } => {
                if !*dragged && (screen - *start_screen).length() <= DRAG_THRESHOLD {
                    return None;
                }
                *dragged = true;
                let delta = world - *start_world;
                Some(Intent::MoveNodeLive {
                    machine_id: machine_id.clone(),
                    node_id: node_id.clone(),
                    position: Point::new(start_position.x + delta.x, start_position.y + delta.y),
                })
            }
            Gesture::DraggingHandle {
                machine_id,
                transition_id,
                initial_offset,
                start_world,
                start_screen,
                dragged,
            } => {
                if !*dragged && (screen - *start_screen).length() <= DRAG_THRESHOLD {
                    return None;
                }
                *dragged = true;
                let delta = world - *start_world;
                Some(Intent::SetMidpointLive {
                    machine_id: machine_id.clone(),
                    transition_id: transition_id.clone(),
                    offset: Point::new(initial_offset.x + delta.x, initial_offset.y + delta.y),
                })
            }
            Gesture::Connecting { preview_end, .. } => {
                *preview_end = world;
                None
            }
        }
    }

    /// Finish the current gesture. Click-vs-drag is decided here: node and
    /// handle presses that never crossed the threshold become selections.
    pub fn pointer_up(&mut self, screen: Pos2, scene: &Scene) -> Option<Intent> {
        let world = self.view.screen_to_world(screen);
        let gesture = std::mem::take(&mut self.gesture);
        match gesture {
            Gesture::Idle => None,
            Gesture::Panning { moved, .. } => {
                if moved {
                    None
                } else {
                    Some(Intent::ClearSelection)
                }
            }
            Gesture::DraggingNode {
                machine_id,
                node_id,
                dragged,
                ..
            } => {
                if dragged {
                    // Final position was already applied live on the last move
                    None
                } else {
                    Some(Intent::Select(Selection {
                        kind: SelectionKind::Node,
                        machine_id,
                        id: node_id,
                    }))
                }
            }
            Gesture::DraggingHandle {
                machine_id,
                transition_id,
                initial_offset,
                start_world,
                dragged,
                ..
            } => {
                if dragged {
                    let delta = world - start_world;
                    Some(Intent::CommitMidpoint {
                        machine_id,
                        transition_id,
                        old_offset: initial_offset,
                        new_offset: Point::new(
                            initial_offset.x + delta.x,
                            initial_offset.y + delta.y,
                        ),
                    })
                } else {
                    Some(Intent::Select(Selection {
                        kind: SelectionKind::Transition,
                        machine_id,
                        id: transition_id,
                    }))
                }
            }
            Gesture::Connecting {
                source_machine_id,
                from_node_id,
                from_side,
                ..
            } => match hit_test(scene, world) {
                Hit::ConnectionPoint {
                    machine_id,
                    node_id,
                    side,
                    ..
                } if machine_id == source_machine_id => Some(Intent::CompleteConnection {
                    machine_id,
                    from_node_id,
                    from_side,
                    to_node_id: node_id,
                    to_side: side,
                }),
                _ => Some(Intent::ConnectionCancelled),
            },
        }
    }

    /// Abort the current gesture without committing anything: pointer left
    /// the canvas or an escape-equivalent fired. Live handle changes roll
    /// back to the pre-drag offset.
    pub fn cancel(&mut self) -> Option<Intent> {
        let gesture = std::mem::take(&mut self.gesture);
        match gesture {
            Gesture::DraggingHandle {
                machine_id,
                transition_id,
                initial_offset,
                dragged: true,
                ..
            } => Some(Intent::SetMidpointLive {
                machine_id,
                transition_id,
                offset: initial_offset,
            }),
            Gesture::Connecting { .. } => Some(Intent::ConnectionCancelled),
            _ => None,
        }
    }
}
