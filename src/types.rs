//! Core node types shared by the merge engine, the cache and the adapter.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifying key of a node in the graph.
pub type Soul = String;

/// Logical clock value attached to a field.
pub type State = f64;

/// Reserved metadata field on every node.
pub const META_FIELD: &str = "_";
/// Soul entry inside the metadata field.
pub const SOUL_FIELD: &str = "#";
/// Alternate soul entry accepted from hosts that label nodes by `id`.
pub const ID_FIELD: &str = "id";
/// Per-field state map inside the metadata field.
pub const STATE_FIELD: &str = ">";

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A graph node: field name to JSON value, plus the `_` metadata field.
///
/// The wrapped map is kept verbatim so that anything a host stores round-trips
/// unchanged; accessors degrade to "no metadata" when `_` is malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Node(Map<String, Value>);

impl Node {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Builder: set a data field together with its state.
    pub fn with_field(mut self, field: &str, value: Value, state: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value);
        self.set_state(field, state.into());
        self
    }

    /// Builder: set a data field without recording any state for it.
    pub fn with_value(mut self, field: &str, value: Value) -> Self {
        self.0.insert(field.to_string(), value);
        self
    }

    /// Builder: record the node's soul in its metadata.
    pub fn with_soul(mut self, soul: &str) -> Self {
        self.meta_mut()
            .insert(SOUL_FIELD.to_string(), Value::String(soul.to_string()));
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        if field == META_FIELD {
            return None;
        }
        self.0.get(field)
    }

    /// Data fields, skipping the metadata field.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().filter(|(k, _)| k.as_str() != META_FIELD)
    }

    pub fn is_empty(&self) -> bool {
        self.fields().next().is_none()
    }

    /// Soul from `_["#"]`, falling back to `_.id`.
    pub fn soul(&self) -> Option<&str> {
        let meta = self.0.get(META_FIELD)?.as_object()?;
        meta.get(SOUL_FIELD)
            .and_then(Value::as_str)
            .or_else(|| meta.get(ID_FIELD).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
    }

    /// Raw per-field state entries. Empty when metadata is absent or malformed.
    pub fn states(&self) -> Map<String, Value> {
        states_of(&self.0)
    }

    /// Numeric state of `field`, if one is recorded.
    pub fn state(&self, field: &str) -> Option<State> {
        state_of(&self.0, field)
    }

    pub fn set_state(&mut self, field: &str, state: Value) {
        let meta = self.meta_mut();
        if !matches!(meta.get(STATE_FIELD), Some(Value::Object(_))) {
            meta.insert(STATE_FIELD.to_string(), Value::Object(Map::new()));
        }
        if let Some(Value::Object(states)) = meta.get_mut(STATE_FIELD) {
            states.insert(field.to_string(), state);
        }
    }

    fn meta_mut(&mut self) -> &mut Map<String, Value> {
        let slot = self
            .0
            .entry(META_FIELD.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(meta) => meta,
            _ => unreachable!("metadata slot holds an object"),
        }
    }
}

impl TryFrom<Value> for Node {
    type Error = ApiError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Node(map)),
            other => Err(ApiError::MalformedNode(format!(
                "expected an object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        node.into_value()
    }
}

/// State map of a raw node map; malformed metadata yields an empty map.
pub(crate) fn states_of(map: &Map<String, Value>) -> Map<String, Value> {
    map.get(META_FIELD)
        .and_then(Value::as_object)
        .and_then(|meta| meta.get(STATE_FIELD))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

pub(crate) fn state_of(map: &Map<String, Value>, field: &str) -> Option<State> {
    map.get(META_FIELD)?
        .as_object()?
        .get(STATE_FIELD)?
        .as_object()?
        .get(field)?
        .as_f64()
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
