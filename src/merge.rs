//! Field-level Merge Engine
//!
//! Last-writer-wins per field, with nested objects merged recursively. Pure: no
//! I/O and no shared state. Anomalies in node shape (missing or malformed
//! metadata, type mismatches between old and new values) never fail the merge;
//! they fall back to "no known history" and plain state comparison.

use crate::types::{now_millis, states_of, META_FIELD, SOUL_FIELD, STATE_FIELD};
use crate::types::{Node, State};
use serde_json::{Map, Value};

/// Merge an incoming (possibly partial) node into the stored one, using the
/// wall clock for incoming fields that carry no state.
pub fn merge(old: Option<&Node>, new: Option<&Node>) -> Option<Node> {
    merge_at(old, new, now_millis())
}

/// Merge with an explicit "now" for state-less incoming fields.
///
/// Returns `None` only when both sides are absent. A single present side is
/// returned as an owned copy.
pub fn merge_at(old: Option<&Node>, new: Option<&Node>, now: u64) -> Option<Node> {
    match (old, new) {
        (None, None) => None,
        (None, Some(new)) => Some(new.clone()),
        (Some(old), None) => Some(old.clone()),
        (Some(old), Some(new)) => Some(Node::from_map(merge_maps(
            old.as_map(),
            new.as_map(),
            now,
        ))),
    }
}

fn merge_maps(old: &Map<String, Value>, new: &Map<String, Value>, now: u64) -> Map<String, Value> {
    let old_states = states_of(old);
    let new_states = states_of(new);

    let mut merged = old.clone();
    let mut meta = match old.get(META_FIELD) {
        Some(Value::Object(meta)) => meta.clone(),
        _ => Map::new(),
    };
    if !meta.contains_key(SOUL_FIELD) {
        if let Some(soul) = new
            .get(META_FIELD)
            .and_then(Value::as_object)
            .and_then(|m| m.get(SOUL_FIELD))
        {
            meta.insert(SOUL_FIELD.to_string(), soul.clone());
        }
    }
    let mut merged_states = old_states.clone();

    for (field, new_value) in new {
        if field == META_FIELD {
            continue;
        }
        let new_state = incoming_state(&new_states, field, now);

        match old.get(field) {
            None => {
                merged.insert(field.clone(), new_value.clone());
                merged_states.insert(field.clone(), new_state);
            }
            Some(Value::Object(old_child)) if new_value.is_object() => {
                if let Value::Object(new_child) = new_value {
                    merged.insert(
                        field.clone(),
                        Value::Object(merge_maps(old_child, new_child, now)),
                    );
                }
            }
            Some(_) => {
                let old_state = stored_state(&old_states, field);
                if as_state(&new_state) > old_state {
                    merged.insert(field.clone(), new_value.clone());
                    merged_states.insert(field.clone(), new_state);
                }
            }
        }
    }

    meta.insert(STATE_FIELD.to_string(), Value::Object(merged_states));
    merged.insert(META_FIELD.to_string(), Value::Object(meta));
    merged
}

/// Incoming state as stored, or `now` when absent or not a number.
fn incoming_state(states: &Map<String, Value>, field: &str, now: u64) -> Value {
    match states.get(field) {
        Some(state) if state.is_number() => state.clone(),
        _ => Value::from(now),
    }
}

fn stored_state(states: &Map<String, Value>, field: &str) -> State {
    states.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}

fn as_state(value: &Value) -> State {
    value.as_f64().unwrap_or(0.0)
}
