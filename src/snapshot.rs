use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One payload from the data endpoint, kept as the server sent it.
///
/// Every field is optional and may carry any type. Accessors read what they
/// understand and treat anything else as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollSnapshot {
    fields: Map<String, Value>,
}

impl PollSnapshot {
    /// Interprets a raw poll body. An empty object means there is nothing to
    /// show yet and yields `None`.
    pub fn from_value(value: Value) -> Result<Option<Self>> {
        match value {
            Value::Object(map) if map.is_empty() => Ok(None),
            Value::Object(fields) => Ok(Some(Self { fields })),
            other => Err(Error::Snapshot(format!(
                "expected a JSON object, got {}",
                kind_of(&other)
            ))),
        }
    }

    fn field(&self, section: &str, name: &str) -> Option<&Value> {
        self.fields.get(section)?.as_object()?.get(name)
    }

    pub fn text_count(&self) -> usize {
        length_of(self.field("visible_data", "text_content"))
    }

    pub fn numeric_values(&self) -> &[Value] {
        list_of(self.field("visible_data", "numeric_data"))
    }

    pub fn request_count(&self) -> usize {
        length_of(self.field("network_data", "requests"))
    }

    pub fn api_call_count(&self) -> usize {
        length_of(self.field("network_data", "api_calls"))
    }

    pub fn encryption_indicators(&self) -> &[Value] {
        list_of(self.field("encryption_analysis", "encryption_indicators"))
    }

    /// Server-side capture time, whatever shape it came in.
    pub fn timestamp(&self) -> Option<&Value> {
        self.fields.get("timestamp")
    }
}

/// Element count of a list, or character count of a string.
fn length_of(value: Option<&Value>) -> usize {
    match value {
        Some(Value::Array(items)) => items.len(),
        Some(Value::String(text)) => text.chars().count(),
        _ => 0,
    }
}

fn list_of(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
