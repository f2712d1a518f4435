//! Thread-safe value tree produced from native descriptors

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A fully owned, dynamically shaped value
///
/// Built on the OS delivery thread and handed to the runtime context, so it
/// never borrows from a native descriptor. Serializes untagged, which is the
/// runtime-native shape delivered to script callbacks: `Null` becomes `null`,
/// `Object` becomes a plain string-keyed object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParsedValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ParsedValue>),
    Object(BTreeMap<String, ParsedValue>),
}

impl ParsedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Name of the active variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }
}

impl From<&str> for ParsedValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ParsedValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for ParsedValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for ParsedValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<ParsedValue>> for ParsedValue {
    fn from(items: Vec<ParsedValue>) -> Self {
        Self::Array(items)
    }
}

impl From<serde_json::Value> for ParsedValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(fields) => Self::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<ParsedValue> for serde_json::Value {
    fn from(value: ParsedValue) -> Self {
        match value {
            ParsedValue::Null => Self::Null,
            ParsedValue::Bool(b) => Self::Bool(b),
            // NaN and infinities have no JSON form
            ParsedValue::Number(n) => serde_json::Number::from_f64(n).map_or(Self::Null, Self::Number),
            ParsedValue::String(s) => Self::String(s),
            ParsedValue::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            ParsedValue::Object(fields) => Self::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_to_runtime_shape() {
        let mut fields = BTreeMap::new();
        fields.insert("kocl".to_string(), ParsedValue::from("window"));
        fields.insert("insh".to_string(), ParsedValue::Null);
        fields.insert(
            "list".to_string(),
            ParsedValue::Array(vec![1.0.into(), true.into()]),
        );
        let value = ParsedValue::Object(fields);

        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(
            json,
            json!({ "kocl": "window", "insh": null, "list": [1.0, true] })
        );
    }

    #[test]
    fn test_deserializes_from_runtime_shape() {
        let value: ParsedValue =
            serde_json::from_value(json!({ "a": [1, "two", false, null], "b": 2.5 })).unwrap();

        let ParsedValue::Object(fields) = value else {
            panic!("expected object");
        };
        assert_eq!(fields["b"], ParsedValue::Number(2.5));
        assert_eq!(
            fields["a"],
            ParsedValue::Array(vec![
                ParsedValue::Number(1.0),
                ParsedValue::from("two"),
                ParsedValue::Bool(false),
                ParsedValue::Null,
            ])
        );
    }

    #[test]
    fn test_json_conversion_handles_non_finite() {
        let json: serde_json::Value = ParsedValue::Number(f64::NAN).into();
        assert_eq!(json, serde_json::Value::Null);

        let back = ParsedValue::from(json!({ "n": 3 }));
        assert_eq!(back, ParsedValue::from(json!({ "n": 3.0 })));
    }
}
