//! The dynamic value space the evaluator traffics in.
//!

use serde_json::Value as JsonValue;
use std::fmt;

/// A dynamically typed value.
///
/// SQL rows arrive as [`Obj`](#variant.Obj), aggregate SELECT results as
/// [`Arr`](#variant.Arr) of `Obj`.  Objects keep their keys in insertion
/// order; a duplicate key overwrites the earlier entry when the value is
/// materialized as JSON.
///
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Arr(Vec<Value>),
    Bool(bool),
    Float(f64),
    Int(i64),
    Null,
    Obj(Vec<(String, Value)>),
    Str(String),
}

macro_rules! value_from {
    ($type:ty, $variant:ident) => {
        impl From<$type> for Value {
            fn from(other: $type) -> Self {
                Self::$variant(other.into())
            }
        }
    };
}

value_from! { bool, Bool }
value_from! { f64, Float }
value_from! { i64, Int }
value_from! { &str, Str }
value_from! { String, Str }
value_from! { Vec<Value>, Arr }

impl Value {
    /// Coerce to a number if the value has one.
    ///
    /// Integers, floats, and booleans (as 0/1) convert directly; strings
    /// are parsed on demand; everything else is `None`.
    ///
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Coerce to text, e.g.
    /// ```text
    /// Str("foo")      -> "foo"
    /// Int(42)         -> "42"
    /// Bool(false)     -> "false"
    /// Null            -> "null"
    /// Arr(...)        -> JSON
    /// Obj(...)        -> JSON
    /// ```
    pub fn coerce_string(&self) -> String {
        match self {
            Self::Arr(_) | Self::Obj(_) => {
                serde_json::to_string(&self.to_json())
                    .unwrap_or_else(|_| String::from("null"))
            }
            Self::Bool(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Null => String::from("null"),
            Self::Str(s) => s.clone(),
        }
    }

    /// Convert from a `serde_json::Value`.
    ///
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Array(a) => {
                Self::Arr(a.into_iter().map(Self::from_json).collect())
            }
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Null => Self::Null,
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(0.0)),
            },
            JsonValue::Object(o) => Self::Obj(
                o.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
            JsonValue::String(s) => Self::Str(s),
        }
    }

    /// `null`, `false`, `0`, `0.0`, the empty string, the empty array, and
    /// the empty object are falsy.  Everything else is truthy.
    ///
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Arr(a) => !a.is_empty(),
            Self::Bool(b) => *b,
            Self::Float(v) => *v != 0.0,
            Self::Int(v) => *v != 0,
            Self::Null => false,
            Self::Obj(o) => !o.is_empty(),
            Self::Str(s) => !s.is_empty(),
        }
    }

    /// Equality with coercion: if both sides [coerce to numbers
    /// ](#method.as_number) compare numerically, otherwise compare the
    /// [coerced strings](#method.coerce_string).
    ///
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => self.coerce_string() == other.coerce_string(),
        }
    }

    /// Convert to a `serde_json::Value`.
    ///
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Arr(a) => {
                JsonValue::Array(a.iter().map(|v| v.to_json()).collect())
            }
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Int(v) => JsonValue::Number((*v).into()),
            Self::Null => JsonValue::Null,
            Self::Obj(o) => {
                let mut map = serde_json::Map::new();
                for (k, v) in o {
                    map.insert(k.clone(), v.to_json());
                }
                JsonValue::Object(map)
            }
            Self::Str(s) => JsonValue::String(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coerce_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        for falsy in [
            Value::Null,
            Value::Bool(false),
            Value::Int(0),
            Value::Float(0.0),
            Value::Str(String::new()),
            Value::Arr(Vec::new()),
            Value::Obj(Vec::new()),
        ] {
            assert!(!falsy.is_truthy(), "{:?} should be falsy", falsy);
        }
        for truthy in [
            Value::Bool(true),
            Value::Int(-1),
            Value::Float(0.5),
            Value::Str("0".to_string()),
            Value::Arr(vec![Value::Null]),
            Value::Obj(vec![("a".to_string(), Value::Null)]),
        ] {
            assert!(truthy.is_truthy(), "{:?} should be truthy", truthy);
        }
    }

    #[test]
    fn test_as_number() {
        assert_eq!(Value::Int(42).as_number(), Some(42.0));
        assert_eq!(Value::Str(" 15 ".to_string()).as_number(), Some(15.0));
        assert_eq!(Value::Str("abc".to_string()).as_number(), None);
        assert_eq!(Value::Null.as_number(), None);
        assert_eq!(Value::Arr(Vec::new()).as_number(), None);
    }

    #[test]
    fn test_loose_eq() {
        assert!(Value::Str("42".to_string()).loose_eq(&Value::Int(42)));
        assert!(Value::Str("admin".to_string())
            .loose_eq(&Value::Str("admin".to_string())));
        assert!(!Value::Null.loose_eq(&Value::Str("admin".to_string())));
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(!Value::Str("42x".to_string()).loose_eq(&Value::Int(42)));
    }

    #[test]
    fn test_coerce_string() {
        assert_eq!(Value::Int(42).coerce_string(), "42");
        assert_eq!(Value::Float(2.0).coerce_string(), "2");
        assert_eq!(Value::Null.coerce_string(), "null");
        assert_eq!(
            Value::Obj(vec![("ok".to_string(), Value::Bool(true))])
                .coerce_string(),
            r#"{"ok":true}"#,
        );
    }

    #[test]
    fn test_json_round_trip() {
        let json = json!({
            "user": {"id": 7, "name": "x"},
            "tags": ["a", "b"],
            "score": 1.5,
            "gone": null,
        });
        assert_eq!(Value::from_json(json.clone()).to_json(), json);
    }
}
