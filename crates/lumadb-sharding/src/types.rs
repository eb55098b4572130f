//! Shard key types, sharding methods and raw partition values.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::epoch::EpochParser;

/// Upper limit for `num` of a hash vdb.
pub const MAX_HASH_VALUE_COUNT: u32 = 1024;

/// Identifier of a virtual database.
pub type VdbId = i64;

/// Data type of a shard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KeyType {
    Int,
    Str,
    Date,
    DateTime,
}

impl KeyType {
    /// Date and datetime keys are stored as epoch seconds and compare numerically.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, KeyType::Str)
    }

    /// Interpret a literal as a key of this type.
    pub fn parse_key(&self, literal: &str, epoch: &dyn EpochParser) -> Option<KeyValue> {
        match self {
            KeyType::Int => literal.trim().parse().ok().map(KeyValue::Int),
            KeyType::Str => Some(KeyValue::Str(literal.to_string())),
            KeyType::Date | KeyType::DateTime => epoch.epoch_from_str(literal).map(KeyValue::Int),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyType::Int => "INT",
            KeyType::Str => "STR",
            KeyType::Date => "DATE",
            KeyType::DateTime => "DATETIME",
        };
        f.write_str(name)
    }
}

/// How a vdb spreads keys over its partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ShardMethod {
    Hash,
    Range,
    /// Unrecognized method name; rejected when the vdb is validated.
    Unknown,
}

impl fmt::Display for ShardMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShardMethod::Hash => "hash",
            ShardMethod::Range => "range",
            ShardMethod::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Parse a shard key type name, ignoring case.
pub fn sharding_type(name: &str) -> Option<KeyType> {
    const TYPES: [(&str, KeyType); 4] = [
        ("INT", KeyType::Int),
        ("STR", KeyType::Str),
        ("DATE", KeyType::Date),
        ("DATETIME", KeyType::DateTime),
    ];
    TYPES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, t)| *t)
}

/// Parse a sharding method name, ignoring case.
pub fn sharding_method(name: &str) -> ShardMethod {
    if name.eq_ignore_ascii_case("hash") {
        ShardMethod::Hash
    } else if name.eq_ignore_ascii_case("range") {
        ShardMethod::Range
    } else {
        ShardMethod::Unknown
    }
}

/// A shard key value: integers (and dates as epoch seconds) or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Str(String),
}

impl KeyValue {
    /// Order two keys of the same kind. Mixed kinds are incomparable.
    pub fn compare(&self, other: &KeyValue) -> Option<Ordering> {
        match (self, other) {
            (KeyValue::Int(a), KeyValue::Int(b)) => Some(a.cmp(b)),
            (KeyValue::Str(a), KeyValue::Str(b)) => Some(a.as_str().cmp(b.as_str())),
            _ => None,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// The value attached to one group in a vdb's `partitions` object.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Unbounded upper range bound.
    Null,
    /// Range boundary.
    Number(i64),
    /// Range boundary, date-parsed for date key types.
    Text(String),
    /// Hash bucket list.
    NumberArray(Vec<i64>),
    /// Several range partitions owned by the same group.
    TextArray(Vec<String>),
}

impl RawValue {
    /// Classify a parsed JSON node. Returns `None` for shapes that carry no
    /// partition meaning (booleans, objects, arrays of those). Array elements
    /// that do not match the first element's kind are left out and pushed to
    /// `rejected`.
    pub fn from_json<'a>(value: &'a Value, rejected: &mut Vec<&'a Value>) -> Option<RawValue> {
        match value {
            Value::Null => Some(RawValue::Null),
            Value::Number(_) => json_int(value).map(RawValue::Number),
            Value::String(s) => Some(RawValue::Text(s.clone())),
            Value::Array(items) => match items.first() {
                None => Some(RawValue::NumberArray(Vec::new())),
                Some(Value::Number(_)) => {
                    let mut buckets = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::Number(_) => buckets.extend(json_int(item)),
                            _ => rejected.push(item),
                        }
                    }
                    Some(RawValue::NumberArray(buckets))
                }
                Some(Value::String(_)) => {
                    let mut bounds = Vec::with_capacity(items.len());
                    for item in items {
                        match item.as_str() {
                            Some(s) => bounds.push(s.to_string()),
                            None => rejected.push(item),
                        }
                    }
                    Some(RawValue::TextArray(bounds))
                }
                Some(_) => None,
            },
            Value::Bool(_) | Value::Object(_) => None,
        }
    }
}

/// Integer view of a JSON node: numbers (fractions truncated) or numeric strings.
pub(crate) fn json_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sharding_type_ignores_case() {
        assert_eq!(sharding_type("int"), Some(KeyType::Int));
        assert_eq!(sharding_type("Str"), Some(KeyType::Str));
        assert_eq!(sharding_type("DATE"), Some(KeyType::Date));
        assert_eq!(sharding_type("datetime"), Some(KeyType::DateTime));
        assert_eq!(sharding_type("float"), None);
    }

    #[test]
    fn test_sharding_method() {
        assert_eq!(sharding_method("HASH"), ShardMethod::Hash);
        assert_eq!(sharding_method("range"), ShardMethod::Range);
        assert_eq!(sharding_method("list"), ShardMethod::Unknown);
    }

    #[test]
    fn test_raw_value_shapes() {
        let shape = |v: &Value| RawValue::from_json(v, &mut Vec::new());
        assert_eq!(shape(&json!(null)), Some(RawValue::Null));
        assert_eq!(shape(&json!(100)), Some(RawValue::Number(100)));
        assert_eq!(shape(&json!("m")), Some(RawValue::Text("m".into())));
        assert_eq!(
            shape(&json!(["a", "b"])),
            Some(RawValue::TextArray(vec!["a".into(), "b".into()]))
        );
        assert_eq!(shape(&json!(true)), None);
        assert_eq!(shape(&json!({"a": 1})), None);

        let mixed = json!([0, "x", 2]);
        let mut rejected = Vec::new();
        assert_eq!(
            RawValue::from_json(&mixed, &mut rejected),
            Some(RawValue::NumberArray(vec![0, 2]))
        );
        assert_eq!(rejected, vec![&json!("x")]);
    }

    #[test]
    fn test_key_compare_rejects_mixed_kinds() {
        assert_eq!(
            KeyValue::Int(1).compare(&KeyValue::Int(2)),
            Some(Ordering::Less)
        );
        assert_eq!(
            KeyValue::Str("b".into()).compare(&KeyValue::Str("a".into())),
            Some(Ordering::Greater)
        );
        assert_eq!(KeyValue::Int(1).compare(&KeyValue::Str("1".into())), None);
    }

    #[test]
    fn test_json_int_accepts_numeric_strings() {
        assert_eq!(json_int(&json!(7)), Some(7));
        assert_eq!(json_int(&json!("12")), Some(12));
        assert_eq!(json_int(&json!("x")), None);
    }
}
