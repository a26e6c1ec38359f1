//! Document Exchange
//! JSON import with legacy-shape tolerance, and export back to the
//! canonical camelCase shape

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::model::{
    ConnectionSide, Machine, Machines, NodeKind, NodeUi, Point, Size, StateNode, Transition,
    TransitionUi, Variable, VariableType,
};


#[derive(Error, Debug)]
pub enum ImportError {
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid document structure: {0}")]
    Structure(String),
}

/// A successfully imported document plus which machine should become active.
#[derive(Debug, Clone)]
pub struct ImportedDocument {
    pub machines: Machines,
    /// Id of the first machine in the imported array, if any.
    pub first_machine_id: Option<String>,
}

/// Parse an exported document: a JSON array of machines. The whole file is
/// validated before anything is returned, so a failed import leaves the
/// caller's current document untouched.
///
/// Older exports carried UI fields (`position`, `size`, `isExpanded`,
/// `fromNodeSide`, `toNodeSide`, `midPointOffset`) at the entity's top level
/// instead of under `metadata`; both shapes are accepted.
pub fn import_document(text: &str) -> Result<ImportedDocument, ImportError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Array(entries) = value else {
        return Err(ImportError::Structure(
            "expected a top-level array of machines".into(),
        ));
    };

    let mut machines = Machines::new();
    let mut first_machine_id = None;
    for (index, entry) in entries.iter().enumerate() {
        let machine = parse_machine(entry)
            .map_err(|why| ImportError::Structure(format!("machine #{index}: {why}")))?;
        if first_machine_id.is_none() {
            first_machine_id = Some(machine.id.clone());
        }
        machines.insert(machine.id.clone(), machine);
    }

    log::info!("imported {} machine(s)", machines.len());
    Ok(ImportedDocument {
        machines,
        first_machine_id,
    })
}

fn parse_machine(value: &Value) -> Result<Machine, String> {
    let obj = value.as_object().ok_or("not an object")?;
    let id = required_str(obj, "id")?;
    let name = required_str(obj, "name")?;
    let node_entries = obj
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or("missing `nodes` array")?;
    let transition_entries = obj
        .get("transitions")
        .and_then(Value::as_array)
        .ok_or("missing `transitions` array")?;

    let mut nodes = Vec::with_capacity(node_entries.len());
    for (index, entry) in node_entries.iter().enumerate() {
        nodes.push(parse_node(entry).map_err(|why| format!("node #{index}: {why}"))?);
    }
    let mut transitions = Vec::with_capacity(transition_entries.len());
    for (index, entry) in transition_entries.iter().enumerate() {
        transitions
            .push(parse_transition(entry).map_err(|why| format!("transition #{index}: {why}"))?);
    }

    let mut variables = BTreeMap::new();
    if let Some(map) = obj.get("variables").and_then(Value::as_object) {
        for (var_name, var_value) in map {
            variables.insert(var_name.clone(), parse_variable(var_value));
        }
    }

    Ok(Machine {
        id,
        name,
        nodes,
        transitions,
        variables,
    })
}

fn parse_node(value: &Value) -> Result<StateNode, String> {
    let obj = value.as_object().ok_or("not an object")?;
    let id = required_str(obj, "id")?;
    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(&id)
        .to_string();
    let kind = match obj.get("type").and_then(Value::as_str) {
        Some("HIERARCHICAL") => NodeKind::Hierarchical,
        // Unknown kinds degrade to a plain state
        _ => NodeKind::Simple,
    };
    let inputs = string_list(obj.get("inputs"));
    let outputs = string_list(obj.get("outputs"));
    let sub_machine_id = obj
        .get("subMachineId")
        .and_then(Value::as_str)
        .map(str::to_string);

    let ui = NodeUi {
        position: ui_field(obj, "position")
            .and_then(parse_point)
            .unwrap_or(Point::ZERO),
        size: ui_field(obj, "size").and_then(parse_size),
        is_expanded: ui_field(obj, "isExpanded")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    };

    Ok(StateNode {
        id,
        title,
        kind,
        inputs,
        outputs,
        sub_machine_id,
        ui,
    })
}

fn parse_transition(value: &Value) -> Result<Transition, String> {
    let obj = value.as_object().ok_or("not an object")?;
    let id = required_str(obj, "id")?;
    let from_node_id = required_str(obj, "fromNodeId")?;
    let to_node_id = required_str(obj, "toNodeId")?;
    let rules = obj
        .get("rules")
        .and_then(Value::as_str)
        .map(str::to_string);

    let ui = TransitionUi {
        from_side: ui_field(obj, "fromNodeSide")
            .and_then(parse_side)
            .unwrap_or(ConnectionSide::Bottom),
        to_side: ui_field(obj, "toNodeSide")
            .and_then(parse_side)
            .unwrap_or(ConnectionSide::Top),
        midpoint_offset: ui_field(obj, "midPointOffset")
            .and_then(parse_point)
            .unwrap_or(Point::ZERO),
    };

    Ok(Transition {
        id,
        from_node_id,
        to_node_id,
        rules,
        ui,
    })
}

fn parse_variable(value: &Value) -> Variable {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .and_then(|s| match s {
            "input" => Some(VariableType::Input),
            "output" => Some(VariableType::Output),
            "intermediate" => Some(VariableType::Intermediate),
            _ => None,
        })
        .unwrap_or(VariableType::Intermediate);
    Variable {
        kind,
        value: value.get("value").cloned(),
    }
}

/// Look up a UI field under `metadata`, falling back to the entity's top
/// level for pre-metadata exports.
fn ui_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get("metadata")
        .and_then(Value::as_object)
        .and_then(|m| m.get(key))
        .or_else(|| obj.get(key))
}

fn required_str(obj: &Map<String, Value>, key: &str) -> Result<String, String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("missing `{key}`"))
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_point(value: &Value) -> Option<Point> {
    Some(Point::new(
        value.get("x")?.as_f64()? as f32,
        value.get("y")?.as_f64()? as f32,
    ))
}

fn parse_size(value: &Value) -> Option<Size> {
    Some(Size::new(
        value.get("width")?.as_f64()? as f32,
        value.get("height")?.as_f64()? as f32,
    ))
}

fn parse_side(value: &Value) -> Option<ConnectionSide> {
    match value.as_str()? {
        "top" => Some(ConnectionSide::Top),
        "bottom" => Some(ConnectionSide::Bottom),
        "left" => Some(ConnectionSide::Left),
        "right" => Some(ConnectionSide::Right),
        _ => None,
    }
}

/// Serialize the document to the exchange shape: an array of machines with
/// camelCase keys and UI fields nested under `metadata`, pretty-printed.
pub fn export_document(machines: &Machines) -> Result<String, ImportError> {
    let entries: Vec<Value> = machines.values().map(machine_to_value).collect();
    let text = serde_json::to_string_pretty(&Value::Array(entries))?;
    log::info!("exported {} machine(s)", machines.len());
    Ok(text)
}

fn machine_to_value(machine: &Machine) -> Value {
    let nodes: Vec<Value> = machine.nodes.iter().map(node_to_value).collect();
    let transitions: Vec<Value> = machine.transitions.iter().map(transition_to_value).collect();
    let variables: Map<String, Value> = machine
        .variables
        .iter()
        .map(|(name, v)| (name.clone(), variable_to_value(v)))
        .collect();

    json!({
        "id": machine.id,
        "name": machine.name,
        "nodes": nodes,
        "transitions": transitions,
        "variables": variables,
    })
}

fn node_to_value(node: &StateNode) -> Value {
    let mut metadata = Map::new();
    metadata.insert("position".into(), point_to_value(node.ui.position));
    if let Some(size) = node.ui.size {
        metadata.insert(
            "size".into(),
            json!({ "width": size.width, "height": size.height }),
        );
    }
    metadata.insert("isExpanded".into(), json!(node.ui.is_expanded));

    let mut obj = Map::new();
    obj.insert("id".into(), json!(node.id));
    obj.insert("title".into(), json!(node.title));
    obj.insert(
        "type".into(),
        json!(match node.kind {
            NodeKind::Simple => "SIMPLE",
            NodeKind::Hierarchical => "HIERARCHICAL",
        }),
    );
    obj.insert("inputs".into(), json!(node.inputs));
    obj.insert("outputs".into(), json!(node.outputs));
    if let Some(sub) = &node.sub_machine_id {
        obj.insert("subMachineId".into(), json!(sub));
    }
    obj.insert("metadata".into(), Value::Object(metadata));
    Value::Object(obj)
}

fn transition_to_value(transition: &Transition) -> Value {
    let metadata = json!({
        "fromNodeSide": transition.ui.from_side.label(),
        "toNodeSide": transition.ui.to_side.label(),
        "midPointOffset": point_to_value(transition.ui.midpoint_offset),
    });

    let mut obj = Map::new();
    obj.insert("id".into(), json!(transition.id));
    obj.insert("fromNodeId".into(), json!(transition.from_node_id));
    obj.insert("toNodeId".into(), json!(transition.to_node_id));
    if let Some(rules) = &transition.rules {
        obj.insert("rules".into(), json!(rules));
    }
    obj.insert("metadata".into(), metadata);
    Value::Object(obj)
}

fn variable_to_value(variable: &Variable) -> Value {
    let mut obj = Map::new();
    obj.insert("type".into(), json!(variable.kind.label()));
    if let Some(value) = &variable.value {
        obj.insert("value".into(), value.clone());
    }
    Value::Object(obj)
}

fn point_to_value(point: Point) -> Value {
    json!({ "x": point.x, "y": point.y })
}
