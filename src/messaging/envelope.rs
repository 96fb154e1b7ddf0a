//! # Envelope
//!
//! The JSON unit exchanged over the queues: `{headers: {...}, data: {parameters: {...}, ...}}`.
//! Header order is preserved. Producers that encode an empty mapping as `[]` or
//! `""` are tolerated: non-object `headers`/`data` decode as empty mappings.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::messaging::errors::{MessagingError, MessagingResult};

/// Key under `data` holding copied task variables
pub const PARAMETERS_KEY: &str = "parameters";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, deserialize_with = "lenient_map")]
    pub headers: Map<String, Value>,

    #[serde(default, deserialize_with = "lenient_map")]
    pub data: Map<String, Value>,

    /// Top-level members other producers attach; carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode from a JSON object body
    pub fn from_slice(bytes: &[u8]) -> MessagingResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    pub fn from_json_str(text: &str) -> MessagingResult<Self> {
        Self::from_slice(text.as_bytes())
    }

    pub fn from_value(value: Value) -> MessagingResult<Self> {
        if !value.is_object() {
            return Err(MessagingError::MessageSerialization {
                message: "envelope must be a JSON object".to_string(),
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_bytes(&self) -> MessagingResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn to_json_string(&self) -> MessagingResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn header(&self, key: &str) -> Option<&Value> {
        self.headers.get(key).filter(|value| !value.is_null())
    }

    pub fn has_header(&self, key: &str) -> bool {
        self.header(key).is_some()
    }

    /// Header rendered as text; empty strings count as absent
    pub fn header_text(&self, key: &str) -> Option<String> {
        self.header(key).and_then(value_as_text)
    }

    /// Identity header: a non-empty string or a number, nothing else
    pub fn header_id(&self, key: &str) -> Option<String> {
        self.header(key).and_then(value_as_id)
    }

    pub fn header_i64(&self, key: &str) -> Option<i64> {
        self.header(key).and_then(value_as_i64)
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn remove_header(&mut self, key: &str) -> Option<Value> {
        self.headers.shift_remove(key)
    }

    /// `data.parameters`, replaced by an empty mapping when absent or not an object
    pub fn parameters_mut(&mut self) -> &mut Map<String, Value> {
        let slot = self
            .data
            .entry(PARAMETERS_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("parameters slot was just normalized to an object"),
        }
    }

    pub fn parameters(&self) -> Option<&Map<String, Value>> {
        self.data.get(PARAMETERS_KEY).and_then(Value::as_object)
    }
}

fn lenient_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// Integers, whole floats and numeric strings
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Non-empty strings as-is, numbers and booleans rendered
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Non-empty strings and numbers; booleans and containers are not ids
pub fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(_) | Value::Number(_) => value_as_text(value),
        _ => None,
    }
}

/// `true`, non-zero numbers, and the strings `"true"`/`"1"`
pub fn value_is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|f| f != 0.0),
        Value::String(text) => matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}
