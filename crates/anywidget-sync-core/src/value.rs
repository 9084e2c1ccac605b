//! In-memory state values: JSON plus structured binary views.
//!
//! Widget state travels as JSON with binary buffers supplied out-of-band.
//! After wire decoding, buffers live inline in the state tree as
//! [`StateValue::Bytes`] nodes. Deep equality (`PartialEq`) over this tree is
//! the diffing primitive used by the model's inbound-update path.

use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// A widget state value: any JSON value, or a binary buffer view.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<StateValue>),
    Object(BTreeMap<String, StateValue>),
}

/// A widget's field-name-to-value state mapping.
pub type StateMap = BTreeMap<String, StateValue>;

impl StateValue {
    /// Convert a JSON value into a state tree (no `Bytes` nodes).
    pub fn from_json(value: &Value) -> StateValue {
        match value {
            Value::Null => StateValue::Null,
            Value::Bool(b) => StateValue::Bool(*b),
            Value::Number(n) => StateValue::Number(n.clone()),
            Value::String(s) => StateValue::String(s.clone()),
            Value::Array(arr) => StateValue::Array(arr.iter().map(StateValue::from_json).collect()),
            Value::Object(map) => StateValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), StateValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn is_bytes(&self) -> bool {
        matches!(self, StateValue::Bytes(_))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            StateValue::Bytes(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, StateValue>> {
        match self {
            StateValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[StateValue]> {
        match self {
            StateValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            StateValue::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StateValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns `true` if any node in this tree is a binary view.
    pub fn contains_bytes(&self) -> bool {
        match self {
            StateValue::Bytes(_) => true,
            StateValue::Array(arr) => arr.iter().any(StateValue::contains_bytes),
            StateValue::Object(map) => map.values().any(StateValue::contains_bytes),
            _ => false,
        }
    }
}

impl From<Value> for StateValue {
    fn from(value: Value) -> Self {
        StateValue::from_json(&value)
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        StateValue::String(s.to_string())
    }
}

impl From<i64> for StateValue {
    fn from(n: i64) -> Self {
        StateValue::Number(Number::from(n))
    }
}

impl From<u64> for StateValue {
    fn from(n: u64) -> Self {
        StateValue::Number(Number::from(n))
    }
}

impl From<bool> for StateValue {
    fn from(b: bool) -> Self {
        StateValue::Bool(b)
    }
}

impl From<Vec<u8>> for StateValue {
    fn from(bytes: Vec<u8>) -> Self {
        StateValue::Bytes(bytes)
    }
}

/// Convert a JSON object into a [`StateMap`].
///
/// Returns `None` when the value is not an object.
pub fn state_map_from_json(value: &Value) -> Option<StateMap> {
    let map = value.as_object()?;
    Some(
        map.iter()
            .map(|(k, v)| (k.clone(), StateValue::from_json(v)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_roundtrip_shape() {
        let value = json!({"a": 1, "b": [true, null, "s"], "c": {"d": 2.5}});
        let state = StateValue::from_json(&value);
        let obj = state.as_object().unwrap();
        assert_eq!(obj["a"].as_i64(), Some(1));
        assert_eq!(obj["b"].as_array().unwrap().len(), 3);
        assert_eq!(obj["b"].as_array().unwrap()[2].as_str(), Some("s"));
        assert!(!state.contains_bytes());
    }

    #[test]
    fn test_deep_equality_sees_bytes() {
        let a = StateValue::Object(BTreeMap::from([(
            "buf".to_string(),
            StateValue::Bytes(vec![1, 2, 3]),
        )]));
        let b = StateValue::Object(BTreeMap::from([(
            "buf".to_string(),
            StateValue::Bytes(vec![1, 2, 3]),
        )]));
        let c = StateValue::Object(BTreeMap::from([(
            "buf".to_string(),
            StateValue::Bytes(vec![1, 2, 4]),
        )]));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.contains_bytes());
    }

    #[test]
    fn test_state_map_from_json_rejects_non_objects() {
        assert!(state_map_from_json(&json!([1, 2])).is_none());
        assert!(state_map_from_json(&json!("x")).is_none());
        let map = state_map_from_json(&json!({"k": 7})).unwrap();
        assert_eq!(map["k"].as_u64(), Some(7));
    }
}
