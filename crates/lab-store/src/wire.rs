use crate::Result;
use lab_record::Record;
use serde_json::{json, Map, Value};

// Wire groups of the remote server's record schema. A flat canonical record
// is split into nested groups on the way out; `Data` is the catch-all, so a
// field added to the record model lands there unless it is claimed below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Program,
    SpliceInputs,
    WrapInputs,
    SpliceOutputs,
    WrapOutputs,
    Dependencies,
    System,
    Data,
}

const FIELD_PLACEMENTS: &[(&str, Placement)] = &[
    ("executable", Placement::Program),
    ("repository", Placement::Program),
    ("main_file", Placement::Program),
    ("launch_mode", Placement::Program),
    ("version", Placement::Program),
    ("input_data", Placement::SpliceInputs),
    ("parameters", Placement::WrapInputs),
    ("script_arguments", Placement::WrapInputs),
    ("output_data", Placement::SpliceOutputs),
    ("stdout_stderr", Placement::WrapOutputs),
    ("dependencies", Placement::Dependencies),
    ("platforms", Placement::System),
];

fn placement_of(field: &str) -> Placement {
    FIELD_PLACEMENTS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, placement)| *placement)
        .unwrap_or(Placement::Data)
}

/// Split a flat canonical record into the remote server's nested wire form.
///
/// The `system` group keeps only the first platform entry; the mapping is
/// lossy and one-directional for records with more than one platform.
pub fn to_wire(record: &Record, status: &str) -> Result<Value> {
    let flat: Map<String, Value> = serde_json::from_value(serde_json::to_value(record)?)?;

    let mut program = Map::new();
    let mut inputs: Vec<Value> = Vec::new();
    let mut wrapped_inputs: Vec<Value> = Vec::new();
    let mut outputs: Vec<Value> = Vec::new();
    let mut wrapped_outputs: Vec<Value> = Vec::new();
    let mut dependencies = Value::Array(Vec::new());
    let mut system = json!({});
    let mut data = Map::new();

    for (field, value) in flat {
        match placement_of(&field) {
            Placement::Program => {
                program.insert(field, value);
            }
            Placement::SpliceInputs => {
                if let Value::Array(entries) = value {
                    inputs.extend(entries);
                }
            }
            Placement::WrapInputs => {
                wrapped_inputs.push(wrap(field, value));
            }
            Placement::SpliceOutputs => {
                if let Value::Array(entries) = value {
                    outputs.extend(entries);
                }
            }
            Placement::WrapOutputs => {
                wrapped_outputs.push(wrap(field, value));
            }
            Placement::Dependencies => {
                dependencies = value;
            }
            Placement::System => {
                if let Some(first) = value.as_array().and_then(|platforms| platforms.first()) {
                    system = first.clone();
                }
            }
            Placement::Data => {
                data.insert(field, value);
            }
        }
    }

    // Data entries come first, wrapped scalars after them.
    inputs.extend(wrapped_inputs);
    outputs.extend(wrapped_outputs);

    Ok(json!({
        "status": status,
        "system": system,
        "program": Value::Object(program),
        "inputs": Value::Array(inputs),
        "outputs": Value::Array(outputs),
        "dependencies": dependencies,
        "data": Value::Object(data),
    }))
}

/// Re-flatten a wire-form document into a canonical record.
///
/// Designed independently of `to_wire` for consumers receiving documents
/// from the administrative channel: the `status` group member has no
/// canonical counterpart and is dropped, and a record that carried several
/// platforms comes back with only the one the wire kept.
pub fn from_wire(wire: &Value) -> Result<Record> {
    let mut flat = wire
        .get("data")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if let Some(program) = wire.get("program").and_then(Value::as_object) {
        for (field, value) in program {
            flat.insert(field.clone(), value.clone());
        }
    }

    let (input_data, unwrapped_inputs) = split_group(wire.get("inputs"), Placement::WrapInputs);
    let (output_data, unwrapped_outputs) = split_group(wire.get("outputs"), Placement::WrapOutputs);
    flat.insert("input_data".to_string(), Value::Array(input_data));
    flat.insert("output_data".to_string(), Value::Array(output_data));
    for (field, value) in unwrapped_inputs.into_iter().chain(unwrapped_outputs) {
        flat.insert(field, value);
    }

    flat.insert(
        "dependencies".to_string(),
        wire.get("dependencies").cloned().unwrap_or(Value::Array(Vec::new())),
    );

    let platforms = match wire.get("system") {
        Some(Value::Object(system)) if !system.is_empty() => {
            vec![Value::Object(system.clone())]
        }
        None | Some(Value::Null) | Some(Value::Object(_)) | Some(Value::Array(_)) => Vec::new(),
        Some(other) => vec![other.clone()],
    };
    flat.insert("platforms".to_string(), Value::Array(platforms));

    Ok(serde_json::from_value(Value::Object(flat))?)
}

fn wrap(field: String, value: Value) -> Value {
    let mut wrapper = Map::new();
    wrapper.insert(field, value);
    Value::Object(wrapper)
}

// Partition a wire list into plain entries and the single-key wrapper
// objects whose key the mapping table assigns to `wrapped`.
fn split_group(group: Option<&Value>, wrapped: Placement) -> (Vec<Value>, Vec<(String, Value)>) {
    let mut entries = Vec::new();
    let mut unwrapped = Vec::new();
    let Some(Value::Array(members)) = group else {
        return (entries, unwrapped);
    };
    for member in members {
        let wrapper = member.as_object().and_then(|obj| {
            if obj.len() != 1 {
                return None;
            }
            let (field, value) = obj.iter().next()?;
            (placement_of(field) == wrapped).then(|| (field.clone(), value.clone()))
        });
        match wrapper {
            Some((field, value)) => unwrapped.push((field, value)),
            None => entries.push(member.clone()),
        }
    }
    (entries, unwrapped)
}
