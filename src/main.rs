//! Machina GUI - State Machine Diagram Editor
//! Interactive editor for hierarchical state-machine diagrams with
//! undo/redo, nested sub-machine rendering and JSON exchange

use std::time::{Duration, Instant};

use egui::{pos2, vec2, Align2, Color32, FontId, Pos2, Rect, Stroke, Vec2};

use machina::document::{delete_node_action, CommandLog, DocumentStore, EditAction};
use machina::geometry::{self, Scene};
use machina::interaction::{
    expand_toggle_rect, hit_test, Controller, Hit, Intent, Selection, SelectionKind,
};
use machina::io;
use machina::model::{
    generate_id, ConnectionSide, Machine, Machines, NodeKind, Point, Size, StateNode, Transition,
    Variable, VariableType, CONNECTION_POINT_RADIUS, NODE_HEADER_HEIGHT,
};

/// How long a transition must stay hovered before its rules tooltip shows.
const TOOLTIP_DELAY: Duration = Duration::from_millis(150);
/// How long a toast stays on screen.
const TOAST_DURATION: Duration = Duration::from_secs(3);

fn machina_icon() -> egui::IconData {
    // Simple generated icon (64x64): dark background + two connected boxes.
    // Avoids external assets and works cross-platform.
    let w: u32 = 64;
    let h: u32 = 64;
    let mut rgba = vec![0u8; (w * h * 4) as usize];

    let top_box = (14i32, 10i32, 50i32, 26i32);
    let bottom_box = (14i32, 38i32, 50i32, 54i32);
    let in_box = |x: i32, y: i32, b: (i32, i32, i32, i32)| {
        x >= b.0 && x <= b.2 && y >= b.1 && y <= b.3
    };

    for y in 0..h {
        for x in 0..w {
            let (xi, yi) = (x as i32, y as i32);

            // Base background.
            let mut r = 20u8;
            let mut g = 24u8;
            let mut b = 30u8;

            // Connecting spine between the two boxes.
            if (30..=33).contains(&xi) && yi > top_box.3 && yi < bottom_box.1 {
                r = 120;
                g = 170;
                b = 255;
            }

            if in_box(xi, yi, top_box) || in_box(xi, yi, bottom_box) {
                let which = if in_box(xi, yi, top_box) { top_box } else { bottom_box };
                // Header strip on each box.
                if yi - which.1 <= 5 {
                    r = 120;
                    g = 170;
                    b = 255;
                } else {
                    r = 52;
                    g = 62;
                    b = 80;
                }
            }

            let idx = ((y * w + x) * 4) as usize;
            rgba[idx] = r;
            rgba[idx + 1] = g;
            rgba[idx + 2] = b;
            rgba[idx + 3] = 255;
        }
    }

    egui::IconData { rgba, width: w, height: h }
}

fn main() -> eframe::Result<()> {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 900.0])
            .with_title("Machina - State Machine Editor")
            .with_icon(machina_icon()),
        ..Default::default()
    };

    eframe::run_native(
        "Machina",
        options,
        Box::new(|cc| Ok(Box::new(MachinaApp::new(cc)))),
    )
}

/// The document every fresh session starts with: a small controller machine
/// with one expandable sub-machine, so nesting is visible immediately.
fn default_document() -> Machines {
    let mut main = Machine::new("mainController", "Main System Controller");

    let mut idle = StateNode::new("node-main-idle", "Idle", NodeKind::Simple).at(150.0, 50.0);
    idle.inputs = vec!["SystemReset".into()];
    idle.outputs = vec!["IsReady".into()];
    idle.ui.size = Some(Size::new(180.0, 100.0));

    let mut active =
        StateNode::new("node-main-active", "Active Mission", NodeKind::Hierarchical).at(150.0, 250.0);
    active.inputs = vec!["StartCommand".into(), "SensorData".into()];
    active.outputs = vec!["MissionStatus".into()];
    active.sub_machine_id = Some("missionLogic".into());
    active.ui.size = Some(Size::new(180.0, 120.0));

    let mut error = StateNode::new("node-main-error", "Error State", NodeKind::Simple).at(150.0, 450.0);
    error.inputs = vec!["FaultDetected".into()];
    error.outputs = vec!["ErrorCode".into()];
    error.ui.size = Some(Size::new(180.0, 100.0));

    main.nodes = vec![idle, active, error];

    let mut t1 = Transition::new("t-main-1", "node-main-idle", "node-main-active");
    t1.rules = Some("StartCommand received AND IsReady == true".into());
    let mut t2 = Transition::new("t-main-2", "node-main-active", "node-main-idle");
    t2.rules = Some("MissionStatus == \"Completed\" OR SystemReset".into());
    let mut t3 = Transition::new("t-main-3", "node-main-active", "node-main-error");
    t3.rules = Some("FaultDetected OR MissionStatus == \"Failed\"".into());
    let mut t4 = Transition::new("t-main-4", "node-main-error", "node-main-idle");
    t4.rules = Some("SystemReset".into());
    main.transitions = vec![t1, t2, t3, t4];

    for (name, kind, value) in [
        ("SystemReset", VariableType::Input, serde_json::json!(false)),
        ("StartCommand", VariableType::Input, serde_json::json!(false)),
        ("SensorData", VariableType::Input, serde_json::json!({})),
        ("FaultDetected", VariableType::Input, serde_json::json!(false)),
        ("IsReady", VariableType::Output, serde_json::json!(true)),
        ("MissionStatus", VariableType::Output, serde_json::json!("Pending")),
        ("ErrorCode", VariableType::Output, serde_json::json!(0)),
        ("InternalCounter", VariableType::Intermediate, serde_json::json!(0)),
    ] {
        main.variables.insert(
            name.to_string(),
            Variable { kind, value: Some(value) },
        );
    }

    let mut sub = Machine::new("missionLogic", "Mission Logic (Sub-Machine)");

    let mut init = StateNode::new("node-sub-init", "Initialize", NodeKind::Simple).at(100.0, 50.0);
    init.inputs = vec!["StartCommand".into()];
    init.outputs = vec!["SubInitializeComplete".into()];
    init.ui.size = Some(Size::new(180.0, 100.0));

    let mut process =
        StateNode::new("node-sub-process", "Processing Data", NodeKind::Simple).at(100.0, 250.0);
    process.inputs = vec!["SensorData".into(), "SubInitializeComplete".into()];
    process.outputs = vec!["ProcessedData".into(), "SubProcessingStatus".into()];
    process.ui.size = Some(Size::new(180.0, 120.0));

    let mut finalize =
        StateNode::new("node-sub-finalize", "Finalize", NodeKind::Simple).at(100.0, 450.0);
    finalize.inputs = vec!["SubProcessingStatus".into()];
    finalize.outputs = vec!["MissionOutcome".into()];
    finalize.ui.size = Some(Size::new(180.0, 100.0));

    sub.nodes = vec![init, process, finalize];

    let mut s1 = Transition::new("t-sub-1", "node-sub-init", "node-sub-process");
    s1.rules = Some("SubInitializeComplete == true".into());
    let mut s2 = Transition::new("t-sub-2", "node-sub-process", "node-sub-finalize");
    s2.rules = Some("SubProcessingStatus == \"Done\"".into());
    let mut s3 = Transition::new("t-sub-3", "node-sub-process", "node-sub-init");
    s3.rules = Some("SensorData.error == true".into());
    sub.transitions = vec![s1, s2, s3];

    for (name, kind, value) in [
        ("StartCommand", VariableType::Input, None),
        ("SensorData", VariableType::Input, None),
        ("SubInitializeComplete", VariableType::Output, Some(serde_json::json!(false))),
        ("ProcessedData", VariableType::Intermediate, Some(serde_json::Value::Null)),
        ("SubProcessingStatus", VariableType::Output, Some(serde_json::json!("Idle"))),
        ("MissionOutcome", VariableType::Output, Some(serde_json::Value::Null)),
    ] {
        sub.variables.insert(name.to_string(), Variable { kind, value });
    }

    let mut machines = Machines::new();
    machines.insert(main.id.clone(), main);
    machines.insert(sub.id.clone(), sub);
    machines
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ToastKind {
    Success,
    Error,
    Info,
    Warning,
}

#[derive(Clone, Debug)]
struct Toast {
    message: String,
    kind: ToastKind,
    created: Instant,
}

/// Edit buffers for the Transition Details dialog. Old values are captured
/// when the dialog opens so Save commits one exact reversible action.
struct TransitionDialog {
    machine_id: String,
    transition_id: String,
    rules: String,
    from_side: ConnectionSide,
    to_side: ConnectionSide,
    offset_x: f32,
    offset_y: f32,
    original: Transition,
}

struct AddNodeDialog {
    machine_id: String,
    title: String,
    kind: NodeKind,
    /// Comma-separated variable names
    inputs: String,
    outputs: String,
    position: Point,
}

struct AddVariableDialog {
    machine_id: String,
    name: String,
    kind: VariableType,
}

/// What the last right-click landed on; drives the context menu contents.
#[derive(Clone, Debug)]
enum ContextTarget {
    Node { machine_id: String, node_id: String },
    Transition { machine_id: String, transition_id: String },
    Canvas { world: Point },
}

struct TransitionHover {
    machine_id: String,
    transition_id: String,
    since: Instant,
}

struct MachinaApp {
    /// The document: every machine, keyed by id
    store: DocumentStore,
    /// Undo/redo for the active machine; cleared on switch and import
    log: CommandLog,
    /// Which machine the canvas shows
    active_machine_id: String,
    /// Pointer gesture state + view transform
    controller: Controller,
    /// Currently selected node or transition
    selection: Option<Selection>,
    /// Resolved scene for the current revision
    scene: Scene,
    /// (revision, machine) the cached scene was resolved for
    scene_stamp: Option<(u64, String)>,
    /// Canvas size from the previous frame, for menu-driven zoom anchoring
    canvas_size: Vec2,
    /// Pending rules tooltip
    hover: Option<TransitionHover>,
    toasts: Vec<Toast>,
    transition_dialog: Option<TransitionDialog>,
    add_node_dialog: Option<AddNodeDialog>,
    add_variable_dialog: Option<AddVariableDialog>,
    context_target: Option<ContextTarget>,
}

impl MachinaApp {
    fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let machines = default_document();
        let active_machine_id = "mainController".to_string();
        Self {
            store: DocumentStore::new(machines),
            log: CommandLog::default(),
            active_machine_id,
            controller: Controller::new(),
            selection: None,
            scene: Scene::default(),
            scene_stamp: None,
            canvas_size: Vec2::ZERO,
            hover: None,
            toasts: Vec::new(),
            transition_dialog: None,
            add_node_dialog: None,
            add_variable_dialog: None,
            context_target: None,
        }
    }

    fn toast(&mut self, kind: ToastKind, message: impl Into<String>) {
        self.toasts.push(Toast {
            message: message.into(),
            kind,
            created: Instant::now(),
        });
    }

    /// Re-resolve the scene if the document or active machine changed.
    fn refresh_scene(&mut self) {
        let stamp = (self.store.revision(), self.active_machine_id.clone());
        if self.scene_stamp.as_ref() != Some(&stamp) {
            self.scene = geometry::resolve(&self.active_machine_id, self.store.machines());
            self.scene_stamp = Some(stamp);
        }
    }

    /// Switch the canvas to another machine. History never spans machines.
    fn switch_machine(&mut self, machine_id: &str) {
        if machine_id == self.active_machine_id {
            return;
        }
        self.active_machine_id = machine_id.to_string();
        self.log.clear();
        self.selection = None;
        self.controller.cancel();
    }

    fn commit(&mut self, action: EditAction) {
        let label = action.describe();
        self.log.commit(action, &mut self.store);
        self.toast(ToastKind::Success, format!("Done: {label}"));
    }

    fn undo(&mut self) {
        match self.log.undo(&mut self.store) {
            Some(label) => self.toast(ToastKind::Info, format!("Undid: {label}")),
            None => self.toast(ToastKind::Warning, "Nothing to undo"),
        }
    }

    fn redo(&mut self) {
        match self.log.redo(&mut self.store) {
            Some(label) => self.toast(ToastKind::Info, format!("Redid: {label}")),
            None => self.toast(ToastKind::Warning, "Nothing to redo"),
        }
    }

    fn open_document(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("JSON", &["json"])
            .pick_file()
        else {
            return;
        };
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                self.toast(ToastKind::Error, format!("Could not read file: {e}"));
                return;
            }
        };
        match io::import_document(&text) {
            Ok(imported) => {
                let count = imported.machines.len();
                let active = imported
                    .first_machine_id
                    .or_else(|| imported.machines.keys().next().cloned());
                self.store.replace(imported.machines);
                if let Some(id) = active {
                    self.active_machine_id = id;
                }
                self.log.clear();
                self.selection = None;
                self.controller.cancel();
                self.toast(ToastKind::Success, format!("Imported {count} machine(s)"));
            }
            Err(e) => {
                log::warn!("import failed: {e}");
                self.toast(ToastKind::Error, format!("Import failed: {e}"));
            }
        }
    }

    fn export_document(&mut self) {
        let text = match io::export_document(self.store.machines()) {
            Ok(text) => text,
            Err(e) => {
                self.toast(ToastKind::Error, format!("Export failed: {e}"));
                return;
            }
        };
        let Some(path) = rfd::FileDialog::new()
            .add_filter("JSON", &["json"])
            .set_file_name("state-machines.json")
            .save_file()
        else {
            return;
        };
        match std::fs::write(&path, text) {
            Ok(()) => self.toast(ToastKind::Success, "Document exported"),
            Err(e) => self.toast(ToastKind::Error, format!("Could not write file: {e}")),
        }
    }

    fn delete_selection(&mut self) {
        let Some(selection) = self.selection.take() else {
            return;
        };
        let action = match selection.kind {
            SelectionKind::Node => self
                .store
                .machine(&selection.machine_id)
                .and_then(|m| delete_node_action(m, &selection.id)),
            SelectionKind::Transition => self
                .store
                .machine(&selection.machine_id)
                .and_then(|m| m.transition(&selection.id))
                .cloned()
                .map(|transition| EditAction::DeleteTransition {
                    machine_id: selection.machine_id.clone(),
                    transition,
                }),
        };
        if let Some(action) = action {
            self.commit(action);
        }
    }

    fn open_transition_dialog(&mut self, machine_id: &str, transition_id: &str) {
        let Some(transition) = self
            .store
            .machine(machine_id)
            .and_then(|m| m.transition(transition_id))
            .cloned()
        else {
            return;
        };
        self.transition_dialog = Some(TransitionDialog {
            machine_id: machine_id.to_string(),
            transition_id: transition_id.to_string(),
            rules: transition.rules.clone().unwrap_or_default(),
            from_side: transition.ui.from_side,
            to_side: transition.ui.to_side,
            offset_x: transition.ui.midpoint_offset.x,
            offset_y: transition.ui.midpoint_offset.y,
            original: transition,
        });
    }

    fn apply_intent(&mut self, intent: Intent) {
        match intent {
            Intent::Select(selection) => self.selection = Some(selection),
            Intent::ClearSelection => self.selection = None,
            Intent::MoveNodeLive {
                machine_id,
                node_id,
                position,
            } => self.store.set_node_position(&machine_id, &node_id, position),
            Intent::SetMidpointLive {
                machine_id,
                transition_id,
                offset,
            } => self
                .store
                .set_midpoint_offset(&machine_id, &transition_id, offset),
            Intent::CommitMidpoint {
                machine_id,
                transition_id,
                old_offset,
                new_offset,
            } => {
                let Some(transition) = self
                    .store
                    .machine(&machine_id)
                    .and_then(|m| m.transition(&transition_id))
                    .cloned()
                else {
                    return;
                };
                self.commit(EditAction::UpdateTransitionDetails {
                    machine_id,
                    transition_id,
                    old_rules: transition.rules.clone(),
                    new_rules: transition.rules.clone(),
                    old_from_side: transition.ui.from_side,
                    new_from_side: transition.ui.from_side,
                    old_to_side: transition.ui.to_side,
                    new_to_side: transition.ui.to_side,
                    old_midpoint_offset: old_offset,
                    new_midpoint_offset: new_offset,
                });
            }
            Intent::CompleteConnection {
                machine_id,
                from_node_id,
                from_side,
                to_node_id,
                to_side,
            } => {
                let mut transition = Transition::new(generate_id("t-"), from_node_id, to_node_id);
                transition.ui.from_side = from_side;
                transition.ui.to_side = to_side;
                let id = transition.id.clone();
                self.commit(EditAction::CreateTransition {
                    machine_id: machine_id.clone(),
                    transition,
                });
                self.selection = Some(Selection {
                    kind: SelectionKind::Transition,
                    machine_id: machine_id.clone(),
                    id: id.clone(),
                });
                // New transitions go straight into rules editing
                self.open_transition_dialog(&machine_id, &id);
            }
            Intent::ConnectionCancelled => {
                self.toast(ToastKind::Info, "Connection cancelled");
            }
            Intent::ToggleExpansion {
                machine_id,
                node_id,
            } => {
                let Some(expanded) = self
                    .store
                    .machine(&machine_id)
                    .and_then(|m| m.node(&node_id))
                    .map(|n| n.ui.is_expanded)
                else {
                    return;
                };
                self.commit(EditAction::ToggleNodeExpansion {
                    machine_id,
                    node_id,
                    old_expanded: expanded,
                    new_expanded: !expanded,
                });
            }
        }
    }

    // ---- UI sections ----

    fn menu_bar(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        egui::menu::bar(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("📂 Open JSON...").clicked() {
                    self.open_document();
                    ui.close_menu();
                }
                if ui.button("💾 Export JSON...").clicked() {
                    self.export_document();
                    ui.close_menu();
                }
                ui.separator();
                if ui.button("Quit").clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });

            ui.menu_button("Edit", |ui| {
                if ui
                    .add_enabled(self.log.can_undo(), egui::Button::new("↩ Undo"))
                    .clicked()
                {
                    self.undo();
                    ui.close_menu();
                }
                if ui
                    .add_enabled(self.log.can_redo(), egui::Button::new("↪ Redo"))
                    .clicked()
                {
                    self.redo();
                    ui.close_menu();
                }
            });

            ui.menu_button("View", |ui| {
                let center = pos2(self.canvas_size.x / 2.0, self.canvas_size.y / 2.0);
                if ui.button("🔍 Zoom In").clicked() {
                    let scale = self.controller.view.scale * 1.2;
                    self.controller.view.zoom_at(center, scale);
                    ui.close_menu();
                }
                if ui.button("🔍 Zoom Out").clicked() {
                    let scale = self.controller.view.scale * 0.8;
                    self.controller.view.zoom_at(center, scale);
                    ui.close_menu();
                }
                if ui.button("⛶ Zoom to Fit").clicked() {
                    if let Some(bounds) = geometry::scene_bounds(&self.scene) {
                        let viewport = Rect::from_min_size(Pos2::ZERO, self.canvas_size);
                        self.controller.view.zoom_to_fit(bounds, viewport);
                    }
                    ui.close_menu();
                }
                ui.separator();
                if ui.button("Reset View").clicked() {
                    self.controller.view = Default::default();
                    ui.close_menu();
                }
            });
        });
    }

    fn sidebar(&mut self, ui: &mut egui::Ui) {
        ui.heading("Machines");
        ui.separator();

        let machine_ids: Vec<String> = self.store.machines().keys().cloned().collect();
        let mut switch_to: Option<String> = None;
        let mut select: Option<Selection> = None;
        let mut add_node_in: Option<String> = None;
        let mut add_variable_in: Option<String> = None;

        egui::ScrollArea::vertical().show(ui, |ui| {
            for machine_id in &machine_ids {
                let Some(machine) = self.store.machine(machine_id) else {
                    continue;
                };
                let is_active = *machine_id == self.active_machine_id;
                let header = if is_active {
                    format!("▶ {}", machine.name)
                } else {
                    machine.name.clone()
                };
                egui::CollapsingHeader::new(header)
                    .id_salt(machine_id)
                    .default_open(is_active)
                    .show(ui, |ui| {
                        if !is_active && ui.button("Show on canvas").clicked() {
                            switch_to = Some(machine_id.clone());
                        }

                        ui.label(egui::RichText::new("Nodes").strong());
                        for node in &machine.nodes {
                            let selected = self.selection.as_ref().is_some_and(|s| {
                                s.kind == SelectionKind::Node
                                    && s.machine_id == *machine_id
                                    && s.id == node.id
                            });
                            let tag = match node.kind {
                                NodeKind::Simple => "□",
                                NodeKind::Hierarchical => "▣",
                            };
                            if ui
                                .selectable_label(selected, format!("{tag} {}", node.title))
                                .clicked()
                            {
                                select = Some(Selection {
                                    kind: SelectionKind::Node,
                                    machine_id: machine_id.clone(),
                                    id: node.id.clone(),
                                });
                            }
                        }
                        if ui.button("➕ Add Node...").clicked() {
                            add_node_in = Some(machine_id.clone());
                        }

                        ui.add_space(4.0);
                        ui.label(egui::RichText::new("Variables").strong());
                        for (name, variable) in &machine.variables {
                            ui.label(format!("{name} ({})", variable.kind.label()));
                        }
                        if ui.button("➕ Add Variable...").clicked() {
                            add_variable_in = Some(machine_id.clone());
                        }
                    });
            }
        });

        if let Some(id) = switch_to {
            self.switch_machine(&id);
        }
        if let Some(selection) = select {
            self.selection = Some(selection);
        }
        if let Some(machine_id) = add_node_in {
            self.add_node_dialog = Some(AddNodeDialog {
                machine_id,
                title: "New State".to_string(),
                kind: NodeKind::Simple,
                inputs: String::new(),
                outputs: String::new(),
                position: Point::new(100.0, 100.0),
            });
        }
        if let Some(machine_id) = add_variable_in {
            self.add_variable_dialog = Some(AddVariableDialog {
                machine_id,
                name: String::new(),
                kind: VariableType::Input,
            });
        }
    }

    fn canvas(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        let (response, painter) =
            ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
        let rect = response.rect;
        self.canvas_size = rect.size();

        // Pointer handling in canvas-local coordinates
        let pointer = ctx.input(|i| i.pointer.interact_pos());
        let (pressed, released, down) = ctx.input(|i| {
            (
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
                i.pointer.primary_down(),
            )
        });

        let mut intent = None;
        if let Some(pos) = pointer {
            let local = pos - rect.min.to_vec2();
            let store = &self.store;
            let scene = &self.scene;
            let controller = &mut self.controller;
            if pressed && response.hovered() {
                intent = controller.pointer_down(local, scene, |machine_id, node_id| {
                    store
                        .machine(machine_id)
                        .and_then(|m| m.node(node_id))
                        .map(|n| n.ui.position)
                });
            } else if released {
                intent = controller.pointer_up(local, scene);
            } else if !rect.contains(pos) && !controller.is_idle() {
                // Pointer left the canvas mid-gesture
                intent = controller.cancel();
            } else if down {
                intent = controller.pointer_move(local);
            }
        } else if !self.controller.is_idle() {
            // Pointer left the window mid-gesture
            intent = self.controller.cancel();
        }
        if let Some(intent) = intent {
            self.apply_intent(intent);
            self.refresh_scene();
        }

        // Wheel zoom anchored at the pointer
        if response.hovered() {
            let scroll = ctx.input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0 {
                if let Some(pos) = pointer {
                    let local = pos - rect.min.to_vec2();
                    self.controller.view.wheel_zoom(local, scroll);
                }
            }
        }

        // Double-click a transition opens the details dialog
        if response.double_clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                let world = self
                    .controller
                    .view
                    .screen_to_world(pos - rect.min.to_vec2());
                match hit_test(&self.scene, world) {
                    Hit::Handle {
                        machine_id,
                        transition_id,
                    }
                    | Hit::TransitionLine {
                        machine_id,
                        transition_id,
                    } => self.open_transition_dialog(&machine_id, &transition_id),
                    _ => {}
                }
            }
        }

        // Right-click records a context target before the menu opens
        if response.secondary_clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                let world = self
                    .controller
                    .view
                    .screen_to_world(pos - rect.min.to_vec2());
                self.context_target = Some(match hit_test(&self.scene, world) {
                    Hit::NodeBody {
                        machine_id,
                        node_id,
                    }
                    | Hit::ExpandToggle {
                        machine_id,
                        node_id,
                    }
                    | Hit::ConnectionPoint {
                        machine_id,
                        node_id,
                        ..
                    } => ContextTarget::Node {
                        machine_id,
                        node_id,
                    },
                    Hit::Handle {
                        machine_id,
                        transition_id,
                    }
                    | Hit::TransitionLine {
                        machine_id,
                        transition_id,
                    } => ContextTarget::Transition {
                        machine_id,
                        transition_id,
                    },
                    Hit::Canvas => ContextTarget::Canvas {
                        world: Point::new(world.x, world.y),
                    },
                });
            }
        }
        self.context_menu(&response);

        // Hover tracking for the rules tooltip; only while idle
        self.track_hover(pointer, rect);

        self.paint_scene(&painter, rect);
        self.paint_tooltip(&painter, pointer, rect);
    }

    fn context_menu(&mut self, response: &egui::Response) {
        let target = self.context_target.clone();
        let mut delete_transition: Option<(String, String)> = None;
        let mut edit_transition: Option<(String, String)> = None;
        let mut delete_node: Option<(String, String)> = None;
        let mut add_node_at: Option<Point> = None;

        response.context_menu(|ui| match &target {
            Some(ContextTarget::Transition {
                machine_id,
                transition_id,
            }) => {
                if ui.button("✏ Edit Transition...").clicked() {
                    edit_transition = Some((machine_id.clone(), transition_id.clone()));
                    ui.close_menu();
                }
                if ui.button("🗑 Delete Transition").clicked() {
                    delete_transition = Some((machine_id.clone(), transition_id.clone()));
                    ui.close_menu();
                }
            }
            Some(ContextTarget::Node {
                machine_id,
                node_id,
            }) => {
                if ui.button("🗑 Delete Node").clicked() {
                    delete_node = Some((machine_id.clone(), node_id.clone()));
                    ui.close_menu();
                }
            }
            Some(ContextTarget::Canvas { world }) => {
                if ui.button("➕ Add Node Here...").clicked() {
                    add_node_at = Some(*world);
                    ui.close_menu();
                }
            }
            None => {
                ui.label("Nothing here");
            }
        });

        if let Some((machine_id, transition_id)) = edit_transition {
            self.open_transition_dialog(&machine_id, &transition_id);
        }
        if let Some((machine_id, transition_id)) = delete_transition {
            let action = self
                .store
                .machine(&machine_id)
                .and_then(|m| m.transition(&transition_id))
                .cloned()
                .map(|transition| EditAction::DeleteTransition {
                    machine_id,
                    transition,
                });
            if let Some(action) = action {
                self.commit(action);
            }
        }
        if let Some((machine_id, node_id)) = delete_node {
            let action = self
                .store
                .machine(&machine_id)
                .and_then(|m| delete_node_action(m, &node_id));
            if let Some(action) = action {
                self.commit(action);
            }
        }
        if let Some(position) = add_node_at {
            self.add_node_dialog = Some(AddNodeDialog {
                machine_id: self.active_machine_id.clone(),
                title: "New State".to_string(),
                kind: NodeKind::Simple,
                inputs: String::new(),
                outputs: String::new(),
                position,
            });
        }
    }

    fn track_hover(&mut self, pointer: Option<Pos2>, rect: Rect) {
        if !self.controller.is_idle() {
            self.hover = None;
            return;
        }
        let hovered = pointer.filter(|p| rect.contains(*p)).and_then(|pos| {
            let world = self
                .controller
                .view
                .screen_to_world(pos - rect.min.to_vec2());
            match hit_test(&self.scene, world) {
                Hit::Handle {
                    machine_id,
                    transition_id,
                }
                | Hit::TransitionLine {
                    machine_id,
                    transition_id,
                } => Some((machine_id, transition_id)),
                _ => None,
            }
        });
        match hovered {
            Some((machine_id, transition_id)) => {
                let same = self
                    .hover
                    .as_ref()
                    .is_some_and(|h| h.machine_id == machine_id && h.transition_id == transition_id);
                if !same {
                    // Restart the debounce when the hovered transition changes
                    self.hover = Some(TransitionHover {
                        machine_id,
                        transition_id,
                        since: Instant::now(),
                    });
                }
            }
            None => self.hover = None,
        }
    }

    // ---- Painting ----

    fn paint_scene(&self, painter: &egui::Painter, rect: Rect) {
        let view = &self.controller.view;
        let to_screen = |world: Pos2| rect.min + view.world_to_screen(world).to_vec2();

        painter.rect_filled(rect, 0.0, Color32::from_rgb(25, 28, 32));

        // Grid
        let spacing = 50.0 * view.scale;
        if spacing > 8.0 {
            let grid_color = Color32::from_rgb(33, 37, 43);
            let mut x = rect.left() + view.offset.x.rem_euclid(spacing);
            while x < rect.right() {
                painter.line_segment(
                    [pos2(x, rect.top()), pos2(x, rect.bottom())],
                    Stroke::new(1.0, grid_color),
                );
                x += spacing;
            }
            let mut y = rect.top() + view.offset.y.rem_euclid(spacing);
            while y < rect.bottom() {
                painter.line_segment(
                    [pos2(rect.left(), y), pos2(rect.right(), y)],
                    Stroke::new(1.0, grid_color),
                );
                y += spacing;
            }
        }

        // Transitions under nodes, same order the resolver emits
        for transition in &self.scene.transitions {
            let selected = self.selection.as_ref().is_some_and(|s| {
                s.kind == SelectionKind::Transition
                    && s.machine_id == transition.machine_id
                    && s.id == transition.transition_id
            });
            let color = if selected {
                Color32::from_rgb(255, 180, 60)
            } else {
                Color32::from_rgb(150, 160, 175)
            };
            let stroke = Stroke::new(if selected { 2.5 } else { 1.5 }, color);

            let start = to_screen(transition.start);
            let control = to_screen(transition.control);
            let end = to_screen(transition.end);
            painter.add(egui::epaint::QuadraticBezierShape::from_points_stroke(
                [start, control, end],
                false,
                Color32::TRANSPARENT,
                stroke,
            ));

            // Direction arrow at the midpoint handle
            let handle = to_screen(transition.handle);
            let size = 7.0 * view.scale.clamp(0.5, 2.0);
            let dir = vec2(
                transition.tangent_angle.cos(),
                transition.tangent_angle.sin(),
            );
            let perp = vec2(-dir.y, dir.x);
            painter.add(egui::Shape::convex_polygon(
                vec![
                    handle + dir * size,
                    handle - dir * size * 0.6 + perp * size * 0.7,
                    handle - dir * size * 0.6 - perp * size * 0.7,
                ],
                color,
                Stroke::NONE,
            ));

            if selected {
                // Drag handle for curvature
                painter.circle_filled(handle, 5.0 * view.scale.clamp(0.5, 2.0), Color32::WHITE);
                painter.circle_stroke(
                    handle,
                    5.0 * view.scale.clamp(0.5, 2.0),
                    Stroke::new(1.0, Color32::from_rgb(255, 180, 60)),
                );
            }
        }

        // Nodes
        for node in &self.scene.nodes {
            let selected = self.selection.as_ref().is_some_and(|s| {
                s.kind == SelectionKind::Node
                    && s.machine_id == node.machine_id
                    && s.id == node.node_id
            });
            let screen_rect =
                Rect::from_min_max(to_screen(node.rect.min), to_screen(node.rect.max));
            let header_rect = Rect::from_min_max(
                screen_rect.min,
                pos2(
                    screen_rect.right(),
                    screen_rect.top() + NODE_HEADER_HEIGHT * view.scale,
                ),
            );

            let (body_color, header_color) = match node.kind {
                NodeKind::Simple => {
                    (Color32::from_rgb(45, 52, 65), Color32::from_rgb(60, 70, 88))
                }
                NodeKind::Hierarchical => {
                    (Color32::from_rgb(42, 56, 58), Color32::from_rgb(52, 84, 88))
                }
            };
            painter.rect_filled(screen_rect, 4.0, body_color);
            painter.rect_filled(header_rect, 4.0, header_color);
            let outline = if selected {
                Stroke::new(2.0, Color32::from_rgb(255, 180, 60))
            } else {
                Stroke::new(1.0, Color32::from_rgb(80, 90, 105))
            };
            painter.rect_stroke(screen_rect, 4.0, outline);

            painter.text(
                pos2(
                    header_rect.left() + 8.0 * view.scale,
                    header_rect.center().y,
                ),
                Align2::LEFT_CENTER,
                &node.title,
                FontId::proportional((13.0 * view.scale).clamp(8.0, 22.0)),
                Color32::WHITE,
            );

            // Expand/collapse triangle for nodes with an embedded machine
            if node.has_sub_machine {
                let toggle = expand_toggle_rect(node.rect);
                let center = to_screen(toggle.center());
                let s = 5.0 * view.scale.clamp(0.5, 2.0);
                let points = if node.is_expanded {
                    vec![
                        center + vec2(-s, -s * 0.6),
                        center + vec2(s, -s * 0.6),
                        center + vec2(0.0, s * 0.8),
                    ]
                } else {
                    vec![
                        center + vec2(-s * 0.6, -s),
                        center + vec2(s * 0.8, 0.0),
                        center + vec2(-s * 0.6, s),
                    ]
                };
                painter.add(egui::Shape::convex_polygon(
                    points,
                    Color32::from_rgb(200, 210, 225),
                    Stroke::NONE,
                ));
            }

            // Connection points on the four edges
            for side in ConnectionSide::ALL {
                let p = to_screen(geometry::edge_point(node.rect, side));
                painter.circle_filled(
                    p,
                    CONNECTION_POINT_RADIUS * view.scale.clamp(0.5, 2.0),
                    Color32::from_rgb(120, 170, 255),
                );
            }
        }

        // In-progress connection preview
        if let Some((anchor, preview_end)) = self.controller.connect_preview() {
            let shapes = egui::Shape::dashed_line(
                &[to_screen(anchor), to_screen(preview_end)],
                Stroke::new(1.5, Color32::from_rgb(120, 170, 255)),
                6.0,
                4.0,
            );
            painter.extend(shapes);
        }
    }

    fn paint_tooltip(&self, painter: &egui::Painter, pointer: Option<Pos2>, rect: Rect) {
        let Some(hover) = &self.hover else {
            return;
        };
        if hover.since.elapsed() < TOOLTIP_DELAY {
            return;
        }
        let Some(pos) = pointer else {
            return;
        };
        let Some(rules) = self
            .store
            .machine(&hover.machine_id)
            .and_then(|m| m.transition(&hover.transition_id))
            .and_then(|t| t.rules.clone())
        else {
            return;
        };

        let font = FontId::proportional(12.0);
        let galley = painter.layout(rules, font, Color32::from_rgb(220, 225, 235), 320.0);
        let padding = vec2(8.0, 6.0);
        let mut tip_rect =
            Rect::from_min_size(pos + vec2(12.0, 12.0), galley.size() + padding * 2.0);
        // Keep the tooltip inside the canvas
        if tip_rect.right() > rect.right() {
            tip_rect = tip_rect.translate(vec2(rect.right() - tip_rect.right(), 0.0));
        }
        if tip_rect.bottom() > rect.bottom() {
            tip_rect = tip_rect.translate(vec2(0.0, rect.bottom() - tip_rect.bottom()));
        }

        painter.rect_filled(tip_rect, 3.0, Color32::from_rgb(30, 35, 45));
        painter.rect_stroke(
            tip_rect,
            3.0,
            Stroke::new(1.0, Color32::from_rgb(70, 80, 95)),
        );
        painter.galley(tip_rect.min + padding, galley, Color32::WHITE);
    }

    // ---- Dialogs ----

    fn transition_dialog(&mut self, ctx: &egui::Context) {
        let Some(dialog) = &mut self.transition_dialog else {
            return;
        };
        let mut save = false;
        let mut close = false;

        egui::Window::new("✏ Transition Details")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label("Rules:");
                ui.add(
                    egui::TextEdit::multiline(&mut dialog.rules)
                        .desired_width(360.0)
                        .desired_rows(3)
                        .hint_text("e.g. StartCommand AND IsReady == true"),
                );

                ui.add_space(5.0);
                ui.horizontal(|ui| {
                    ui.label("From side:");
                    egui::ComboBox::from_id_salt("from_side")
                        .selected_text(dialog.from_side.label())
                        .show_ui(ui, |ui| {
                            for side in ConnectionSide::ALL {
                                ui.selectable_value(&mut dialog.from_side, side, side.label());
                            }
                        });
                    ui.label("To side:");
                    egui::ComboBox::from_id_salt("to_side")
                        .selected_text(dialog.to_side.label())
                        .show_ui(ui, |ui| {
                            for side in ConnectionSide::ALL {
                                ui.selectable_value(&mut dialog.to_side, side, side.label());
                            }
                        });
                });

                ui.horizontal(|ui| {
                    ui.label("Curve offset:");
                    ui.add(egui::DragValue::new(&mut dialog.offset_x).prefix("x: "));
                    ui.add(egui::DragValue::new(&mut dialog.offset_y).prefix("y: "));
                });

                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("✓ Save").clicked() {
                        save = true;
                    }
                    if ui.button("✗ Cancel").clicked() {
                        close = true;
                    }
                });
            });

        if save {
            let Some(dialog) = self.transition_dialog.take() else {
                return;
            };
            let new_rules = if dialog.rules.trim().is_empty() {
                None
            } else {
                Some(dialog.rules.clone())
            };
            self.commit(EditAction::UpdateTransitionDetails {
                machine_id: dialog.machine_id,
                transition_id: dialog.transition_id,
                old_rules: dialog.original.rules.clone(),
                new_rules,
                old_from_side: dialog.original.ui.from_side,
                new_from_side: dialog.from_side,
                old_to_side: dialog.original.ui.to_side,
                new_to_side: dialog.to_side,
                old_midpoint_offset: dialog.original.ui.midpoint_offset,
                new_midpoint_offset: Point::new(dialog.offset_x, dialog.offset_y),
            });
        } else if close {
            self.transition_dialog = None;
        }
    }

    fn add_node_dialog(&mut self, ctx: &egui::Context) {
        let Some(dialog) = &mut self.add_node_dialog else {
            return;
        };
        let mut create = false;
        let mut close = false;

        egui::Window::new("➕ Add Node")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label("Title:");
                    ui.text_edit_singleline(&mut dialog.title);
                });
                ui.horizontal(|ui| {
                    ui.label("Kind:");
                    ui.selectable_value(&mut dialog.kind, NodeKind::Simple, "Simple");
                    ui.selectable_value(&mut dialog.kind, NodeKind::Hierarchical, "Hierarchical");
                });
                ui.horizontal(|ui| {
                    ui.label("Inputs:");
                    ui.add(
                        egui::TextEdit::singleline(&mut dialog.inputs)
                            .hint_text("comma-separated"),
                    );
                });
                ui.horizontal(|ui| {
                    ui.label("Outputs:");
                    ui.add(
                        egui::TextEdit::singleline(&mut dialog.outputs)
                            .hint_text("comma-separated"),
                    );
                });

                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("✓ Create").clicked() && !dialog.title.trim().is_empty() {
                        create = true;
                    }
                    if ui.button("✗ Cancel").clicked() {
                        close = true;
                    }
                });
            });

        if create {
            let Some(dialog) = self.add_node_dialog.take() else {
                return;
            };
            let split = |text: &str| -> Vec<String> {
                text.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            };
            let mut node = StateNode::new(generate_id("node-"), dialog.title.trim(), dialog.kind);
            node.inputs = split(&dialog.inputs);
            node.outputs = split(&dialog.outputs);
            node.ui.position = dialog.position;
            self.commit(EditAction::CreateNode {
                machine_id: dialog.machine_id,
                node,
            });
        } else if close {
            self.add_node_dialog = None;
        }
    }

    fn add_variable_dialog(&mut self, ctx: &egui::Context) {
        let Some(dialog) = &mut self.add_variable_dialog else {
            return;
        };
        let mut create = false;
        let mut close = false;

        egui::Window::new("➕ Add Variable")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label("Name:");
                    ui.text_edit_singleline(&mut dialog.name);
                });
                ui.horizontal(|ui| {
                    ui.label("Kind:");
                    egui::ComboBox::from_id_salt("variable_kind")
                        .selected_text(dialog.kind.label())
                        .show_ui(ui, |ui| {
                            for kind in VariableType::ALL {
                                ui.selectable_value(&mut dialog.kind, kind, kind.label());
                            }
                        });
                });

                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("✓ Add").clicked() && !dialog.name.trim().is_empty() {
                        create = true;
                    }
                    if ui.button("✗ Cancel").clicked() {
                        close = true;
                    }
                });
            });

        if create {
            let Some(dialog) = self.add_variable_dialog.take() else {
                return;
            };
            let name = dialog.name.trim().to_string();
            let duplicate = self
                .store
                .machine(&dialog.machine_id)
                .is_some_and(|m| m.variables.contains_key(&name));
            if duplicate {
                self.toast(
                    ToastKind::Error,
                    format!("Variable `{name}` already exists"),
                );
                return;
            }
            self.commit(EditAction::AddVariable {
                machine_id: dialog.machine_id,
                name,
                variable: Variable::new(dialog.kind),
            });
        } else if close {
            self.add_variable_dialog = None;
        }
    }

    fn toast_overlay(&mut self, ctx: &egui::Context) {
        self.toasts
            .retain(|t| t.created.elapsed() < TOAST_DURATION);
        if self.toasts.is_empty() {
            return;
        }
        ctx.request_repaint_after(Duration::from_millis(250));

        egui::Area::new(egui::Id::new("toast_overlay"))
            .anchor(Align2::RIGHT_BOTTOM, vec2(-12.0, -12.0))
            .interactable(false)
            .show(ctx, |ui| {
                for toast in &self.toasts {
                    let (icon, color) = match toast.kind {
                        ToastKind::Success => ("✔", Color32::from_rgb(120, 200, 120)),
                        ToastKind::Error => ("✖", Color32::from_rgb(230, 110, 110)),
                        ToastKind::Info => ("ℹ", Color32::from_rgb(120, 170, 255)),
                        ToastKind::Warning => ("⚠", Color32::from_rgb(235, 195, 90)),
                    };
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.horizontal(|ui| {
                            ui.colored_label(color, icon);
                            ui.label(&toast.message);
                        });
                    });
                }
            });
    }

    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        // Text fields and open dialogs swallow editing keys
        if ctx.wants_keyboard_input()
            || self.transition_dialog.is_some()
            || self.add_node_dialog.is_some()
            || self.add_variable_dialog.is_some()
        {
            return;
        }

        let (undo, redo, delete) = ctx.input(|i| {
            let undo = i.modifiers.command && !i.modifiers.shift && i.key_pressed(egui::Key::Z);
            let redo = i.modifiers.command
                && (i.key_pressed(egui::Key::Y)
                    || (i.modifiers.shift && i.key_pressed(egui::Key::Z)));
            let delete =
                i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace);
            (undo, redo, delete)
        });

        if undo {
            self.undo();
        }
        if redo {
            self.redo();
        }
        if delete && self.selection.is_some() {
            self.delete_selection();
        }
    }
}

impl eframe::App for MachinaApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.refresh_scene();

        // Top menu bar
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            self.menu_bar(ctx, ui);
        });

        // Left panel: machine/node/variable tree
        egui::SidePanel::left("machine_tree")
            .default_width(260.0)
            .resizable(true)
            .show(ctx, |ui| {
                self.sidebar(ui);
            });

        self.handle_keyboard(ctx);

        // Canvas
        egui::CentralPanel::default().show(ctx, |ui| {
            self.refresh_scene();
            self.canvas(ctx, ui);
        });

        self.transition_dialog(ctx);
        self.add_node_dialog(ctx);
        self.add_variable_dialog(ctx);
        self.toast_overlay(ctx);

        // Pending tooltip needs a repaint to appear without pointer motion
        if self.hover.is_some() {
            ctx.request_repaint_after(TOOLTIP_DELAY);
        }
    }
}
