//! Dynamic values passed through the conversion engine.
//!
//! A record instance and its plain-mapping form are both [`Value::Map`]s; the
//! difference between them is which handlers have been applied to the fields,
//! not the container shape. That shared shape is what makes the identity
//! short-circuit in the generators possible.

use indexmap::IndexMap;

/// Insertion-ordered map used for both record instances and plain mappings.
pub type ValueMap = IndexMap<String, Value>;

/// A dynamically typed value.
///
/// `Timestamp` is the scalar whose wire form usually differs from its
/// in-memory form (epoch microseconds). Without a registered hook it is
/// passed through untouched.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    List(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    /// Lowercase name of the value's runtime kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Builds a `Value::Map` from key-value pairs, preserving their order.
    pub fn map_of<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<ValueMap> for Value {
    fn from(value: ValueMap) -> Self {
        Value::Map(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_equality_ignores_key_order() {
        let a = Value::map_of([("x", Value::Int(1)), ("y", Value::Int(2))]);
        let b = Value::map_of([("y", Value::Int(2)), ("x", Value::Int(1))]);
        assert_eq!(a, b);
    }

    #[test]
    fn kind_names_cover_all_variants() {
        assert_eq!(Value::Null.kind(), "null");
        assert_eq!(Value::Timestamp(0).kind(), "timestamp");
        assert_eq!(Value::from(vec![Value::Int(1)]).kind(), "list");
        assert_eq!(Value::Map(ValueMap::new()).kind(), "map");
    }

    #[test]
    fn serializes_untagged() {
        let v = Value::map_of([
            ("name", Value::from("ada")),
            ("age", Value::Int(36)),
            ("tags", Value::from(vec![Value::from("x")])),
            ("extra", Value::Null),
        ]);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "ada", "age": 36, "tags": ["x"], "extra": null})
        );
    }
}
