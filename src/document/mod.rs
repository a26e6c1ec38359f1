//! Document Store and Command Log
//! Reversible edits over the machine map, with bounded undo/redo

use std::collections::VecDeque;

use crate::model::{ConnectionSide, Machine, Machines, Point, StateNode, Transition, Variable};

#[cfg(test)]
mod tests;

/// Maximum number of actions kept on the undo stack; the oldest entry is
/// evicted when a commit pushes past the cap.
pub const MAX_UNDO_DEPTH: usize = 50;

/// Owns the current document. All logged mutations go through the
/// [`CommandLog`]; drags use the unlogged setters for live preview updates.
#[derive(Debug, Default)]
pub struct DocumentStore {
    machines: Machines,
    revision: u64,
}

impl DocumentStore {
    pub fn new(machines: Machines) -> Self {
        Self {
            machines,
            revision: 0,
        }
    }

    pub fn machines(&self) -> &Machines {
        &self.machines
    }

    pub fn machine(&self, machine_id: &str) -> Option<&Machine> {
        self.machines.get(machine_id)
    }

    /// Monotonic counter, bumped once per top-level mutation. Observers can
    /// compare revisions to detect that a recompute is needed.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Single mutation entry point. The closure sees the whole map, so any
    /// multi-machine update lands atomically in one revision.
    pub fn mutate(&mut self, f: impl FnOnce(&mut Machines)) {
        f(&mut self.machines);
        self.revision += 1;
    }

    /// Replace the entire document (import). The caller is responsible for
    /// clearing the command log.
    pub fn replace(&mut self, machines: Machines) {
        self.machines = machines;
        self.revision += 1;
    }

    /// Live (unlogged) node position update used during a drag. Missing
    /// targets are a silent no-op.
    pub fn set_node_position(&mut self, machine_id: &str, node_id: &str, position: Point) {
        let updated = self
            .machines
            .get_mut(machine_id)
            .and_then(|m| m.node_mut(node_id))
            .map(|n| n.ui.position = position)
            .is_some();
        if updated {
            self.revision += 1;
        }
    }

    /// Live (unlogged) curvature update used while dragging a midpoint handle.
    pub fn set_midpoint_offset(&mut self, machine_id: &str, transition_id: &str, offset: Point) {
        let updated = self
            .machines
            .get_mut(machine_id)
            .and_then(|m| m.transition_mut(transition_id))
            .map(|t| t.ui.midpoint_offset = offset)
            .is_some();
        if updated {
            self.revision += 1;
        }
    }
}

/// One reversible user edit. Carries enough prior state to exactly undo
/// itself; inverses are captured at construction time, not recomputed later.
#[derive(Debug, Clone, PartialEq)]
pub enum EditAction {
    CreateNode {
        machine_id: String,
        node: StateNode,
    },
    DeleteNode {
        machine_id: String,
        node: StateNode,
        /// Every transition that had the node as source or target, captured
        /// so undo resurrects node and edges together.
        connected_transitions: Vec<Transition>,
    },
    CreateTransition {
        machine_id: String,
        transition: Transition,
    },
    DeleteTransition {
        machine_id: String,
        transition: Transition,
    },
    UpdateTransitionDetails {
        machine_id: String,
        transition_id: String,
        old_rules: Option<String>,
        new_rules: Option<String>,
        old_from_side: ConnectionSide,
        new_from_side: ConnectionSide,
        old_to_side: ConnectionSide,
        new_to_side: ConnectionSide,
        old_midpoint_offset: Point,
        new_midpoint_offset: Point,
    },
    ToggleNodeExpansion {
        machine_id: String,
        node_id: String,
        old_expanded: bool,
        new_expanded: bool,
    },
    AddVariable {
        machine_id: String,
        name: String,
        variable: Variable,
    },
    RemoveVariable {
        machine_id: String,
        name: String,
        variable: Variable,
    },
}

impl EditAction {
    pub fn machine_id(&self) -> &str {
        match self {
            EditAction::CreateNode { machine_id, .. }
            | EditAction::DeleteNode { machine_id, .. }
            | EditAction::CreateTransition { machine_id, .. }
            | EditAction::DeleteTransition { machine_id, .. }
            | EditAction::UpdateTransitionDetails { machine_id, .. }
            | EditAction::ToggleNodeExpansion { machine_id, .. }
            | EditAction::AddVariable { machine_id, .. }
            | EditAction::RemoveVariable { machine_id, .. } => machine_id,
        }
    }

    /// Short lowercase description for notifications ("delete node", ...).
    pub fn describe(&self) -> &'static str {
        match self {
            EditAction::CreateNode { .. } => "create node",
            EditAction::DeleteNode { .. } => "delete node",
            EditAction::CreateTransition { .. } => "create transition",
            EditAction::DeleteTransition { .. } => "delete transition",
            EditAction::UpdateTransitionDetails { .. } => "update transition details",
            EditAction::ToggleNodeExpansion { .. } => "toggle node expansion",
            EditAction::AddVariable { .. } => "add variable",
            EditAction::RemoveVariable { .. } => "remove variable",
        }
    }

    /// Forward effect. Unknown machine ids make this a no-op; the log does
    /// not validate because actions are built from live in-memory entities.
    fn apply(&self, machines: &mut Machines) {
        let Some(machine) = machines.get_mut(self.machine_id()) else {
            return;
        };
        match self {
            EditAction::CreateNode { node, .. } => {
                machine.nodes.push(node.clone());
            }
            EditAction::DeleteNode { node, .. } => {
                machine.nodes.retain(|n| n.id != node.id);
                machine
                    .transitions
                    .retain(|t| t.from_node_id != node.id && t.to_node_id != node.id);
            }
            EditAction::CreateTransition { transition, .. } => {
                machine.transitions.push(transition.clone());
            }
            EditAction::DeleteTransition { transition, .. } => {
                machine.transitions.retain(|t| t.id != transition.id);
            }
            EditAction::UpdateTransitionDetails {
                transition_id,
                new_rules,
                new_from_side,
                new_to_side,
                new_midpoint_offset,
                ..
            } => {
                if let Some(t) = machine.transition_mut(transition_id) {
                    t.rules = new_rules.clone();
                    t.ui.from_side = *new_from_side;
                    t.ui.to_side = *new_to_side;
                    t.ui.midpoint_offset = *new_midpoint_offset;
                }
            }
            EditAction::ToggleNodeExpansion {
                node_id,
                new_expanded,
                ..
            } => {
                if let Some(n) = machine.node_mut(node_id) {
                    n.ui.is_expanded = *new_expanded;
                }
            }
            EditAction::AddVariable { name, variable, .. } => {
                machine.variables.insert(name.clone(), variable.clone());
            }
            EditAction::RemoveVariable { name, .. } => {
                machine.variables.remove(name);
            }
        }
    }

    /// Inverse effect, exact left inverse of [`apply`].
    fn revert(&self, machines: &mut Machines) {
        let Some(machine) = machines.get_mut(self.machine_id()) else {
            return;
        };
        match self {
            EditAction::CreateNode { node, .. } => {
                machine.nodes.retain(|n| n.id != node.id);
            }
            EditAction::DeleteNode {
                node,
                connected_transitions,
                ..
            } => {
                machine.nodes.push(node.clone());
                machine
                    .transitions
                    .extend(connected_transitions.iter().cloned());
            }
            EditAction::CreateTransition { transition, .. } => {
                machine.transitions.retain(|t| t.id != transition.id);
            }
            EditAction::DeleteTransition { transition, .. } => {
                machine.transitions.push(transition.clone());
            }
            EditAction::UpdateTransitionDetails {
                transition_id,
                old_rules,
                old_from_side,
                old_to_side,
                old_midpoint_offset,
                ..
            } => {
                if let Some(t) = machine.transition_mut(transition_id) {
                    t.rules = old_rules.clone();
                    t.ui.from_side = *old_from_side;
                    t.ui.to_side = *old_to_side;
                    t.ui.midpoint_offset = *old_midpoint_offset;
                }
            }
            EditAction::ToggleNodeExpansion {
                node_id,
                old_expanded,
                ..
            } => {
                if let Some(n) = machine.node_mut(node_id) {
                    n.ui.is_expanded = *old_expanded;
                }
            }
            EditAction::AddVariable { name, .. } => {
                machine.variables.remove(name);
            }
            EditAction::RemoveVariable { name, variable, .. } => {
                machine.variables.insert(name.clone(), variable.clone());
            }
        }
    }
}

/// Build the delete-node action for a machine, capturing the node and every
/// incident transition so the whole group undoes atomically.
pub fn delete_node_action(machine: &Machine, node_id: &str) -> Option<EditAction> {
    let node = machine.node(node_id)?.clone();
    let connected_transitions = machine.transitions_touching(node_id);
    Some(EditAction::DeleteNode {
        machine_id: machine.id.clone(),
        node,
        connected_transitions,
    })
}

/// Bounded undo/redo stacks over [`EditAction`]s.
#[derive(Debug)]
pub struct CommandLog {
    undo_stack: VecDeque<EditAction>,
    redo_stack: Vec<EditAction>,
    capacity: usize,
}

impl Default for CommandLog {
    fn default() -> Self {
        Self::with_capacity(MAX_UNDO_DEPTH)
    }
}

impl CommandLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            capacity,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Apply the forward effect, push onto the undo stack (evicting the
    /// oldest entry past the cap) and clear the redo stack.
    pub fn commit(&mut self, action: EditAction, store: &mut DocumentStore) {
        log::debug!("commit: {}", action.describe());
        store.mutate(|machines| action.apply(machines));
        self.undo_stack.push_back(action);
        if self.undo_stack.len() > self.capacity {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
    }

    /// Pop the most recent action, apply its inverse and move it to the redo
    /// stack. Returns the undone action's description, or None when empty.
    pub fn undo(&mut self, store: &mut DocumentStore) -> Option<&'static str> {
        let action = self.undo_stack.pop_back()?;
        log::debug!("undo: {}", action.describe());
        store.mutate(|machines| action.revert(machines));
        let label = action.describe();
        self.redo_stack.push(action);
        Some(label)
    }

    /// Pop from the redo stack, reapply the forward effect and push back onto
    /// the undo stack.
    pub fn redo(&mut self, store: &mut DocumentStore) -> Option<&'static str> {
        let action = self.redo_stack.pop()?;
        log::debug!("redo: {}", action.describe());
        store.mutate(|machines| action.apply(machines));
        let label = action.describe();
        self.undo_stack.push_back(action);
        Some(label)
    }

    /// Drop all history. Called when the active machine changes or a new
    /// document is loaded; cross-machine undo is not supported.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }
}
